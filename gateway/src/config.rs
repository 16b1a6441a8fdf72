//! Process configuration: CLI flags (`argh`), an optional TOML file for
//! static chain definitions, and the environment-variable overrides
//! spec.md §6 names. Mirrors the teacher's `AppConfig`/`TopConfig` split:
//! a small CLI surface over a richer file-backed config, with env vars as
//! the last-mile override on the hot path (chain URLs only; everything
//! else is read once at boot).

use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// NodeBridge RPC gateway.
#[derive(argh::FromArgs, Debug)]
pub struct CliArgs {
    /// path to a TOML file describing static chains. Optional: chains can
    /// also be sourced entirely from `{CHAIN}_EXECUTION_RPC_URL`-style env
    /// vars or from the Store.
    #[argh(option)]
    pub config: Option<PathBuf>,

    /// port to listen on. Overrides `PORT` and the config file.
    #[argh(option)]
    pub port: Option<u16>,

    /// postgres connection string. Overrides `DATABASE_URL`.
    #[argh(option)]
    pub database_url: Option<String>,

    /// run against an in-memory Store instead of Postgres. Useful for demos
    /// and local development; admin CRUD/persistence schema is out of
    /// scope for this binary, so this mode has no migration step to run.
    #[argh(switch)]
    pub no_database: bool,

    /// number of worker threads for the tokio runtime. Defaults to the
    /// number of logical CPUs.
    #[argh(option)]
    pub workers: Option<usize>,
}

/// Statically-defined chain, as loaded from the TOML config file.
#[derive(Debug, Clone, Deserialize)]
pub struct TomlChain {
    pub name: String,
    pub chain_id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub execution_urls: Vec<String>,
    #[serde(default)]
    pub consensus_urls: Vec<String>,
    #[serde(default)]
    pub prometheus_urls: Vec<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub chain: Vec<TomlChain>,
}

impl TomlConfig {
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }
}

/// Fully-resolved process configuration: CLI flags layered over env vars,
/// with sane defaults. `DEFAULT_MAX_RPS`/`DEFAULT_DAILY_REQUESTS` are kept
/// here only as the fallback the (out-of-scope) app-provisioning
/// collaborator consults when `DefaultAppSettings` is absent -- never read
/// on the hot path (spec.md §9).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: Option<String>,
    pub workers: usize,
    pub toml_chains: Vec<TomlChain>,
    pub default_max_rps: u32,
    pub default_daily_requests: u64,
    pub health_sample_interval: std::time::Duration,
}

impl AppConfig {
    pub fn load(args: CliArgs) -> anyhow::Result<Self> {
        let toml_chains = match &args.config {
            Some(path) => TomlConfig::load(path)?.chain,
            None => Vec::new(),
        };

        let port = args
            .port
            .or_else(|| std::env::var("PORT").ok().and_then(|v| v.parse().ok()))
            .unwrap_or(8080);

        let database_url = if args.no_database {
            None
        } else {
            args.database_url.or_else(|| std::env::var("DATABASE_URL").ok())
        };

        let workers = args.workers.unwrap_or_else(num_cpus_fallback);

        let default_max_rps = std::env::var("DEFAULT_MAX_RPS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        let default_daily_requests = std::env::var("DEFAULT_DAILY_REQUESTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(100_000);

        Ok(Self {
            port,
            database_url,
            workers,
            toml_chains,
            default_max_rps,
            default_daily_requests,
            health_sample_interval: std::time::Duration::from_secs(30),
        })
    }
}

fn num_cpus_fallback() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

/// Parse a comma-separated URL list the way spec.md §4.1 requires: trim
/// whitespace, discard empty tokens, and treat an all-empty value as
/// `absent` rather than `Some(vec![])`.
pub fn parse_url_list(raw: &str) -> Option<Vec<String>> {
    let urls: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect();

    if urls.is_empty() {
        None
    } else {
        Some(urls)
    }
}

/// Scan the process environment for `{CHAIN}_EXECUTION_RPC_URL`,
/// `{CHAIN}_CONSENSUS_API_URL`, and `{CHAIN}_PROMETHEUS_URL` variables.
/// Variables whose chain-name prefix is `DEFAULT` are never treated as a
/// chain (spec.md §4.1).
pub fn env_chain_urls() -> HashMap<String, (Option<Vec<String>>, Option<Vec<String>>, Option<Vec<String>>)> {
    let mut out: HashMap<String, (Option<Vec<String>>, Option<Vec<String>>, Option<Vec<String>>)> =
        HashMap::new();

    for (key, value) in std::env::vars() {
        let (chain, slot) = if let Some(prefix) = key.strip_suffix("_EXECUTION_RPC_URL") {
            (prefix, 0)
        } else if let Some(prefix) = key.strip_suffix("_CONSENSUS_API_URL") {
            (prefix, 1)
        } else if let Some(prefix) = key.strip_suffix("_PROMETHEUS_URL") {
            (prefix, 2)
        } else {
            continue;
        };

        if chain.eq_ignore_ascii_case("default") || chain.is_empty() {
            continue;
        }

        let entry = out.entry(chain.to_lowercase()).or_default();
        let parsed = parse_url_list(&value);
        match slot {
            0 => entry.0 = parsed,
            1 => entry.1 = parsed,
            _ => entry.2 = parsed,
        }
    }

    out
}
