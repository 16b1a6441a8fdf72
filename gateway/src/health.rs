//! C7: health aggregation. Fans out probes to every configured upstream
//! for a chain, composes a per-service-class status, then an overall
//! status per spec.md §4.7. The supervisor (C8) also runs this on a
//! periodic timer to keep a cached `HealthSnapshot` warm per chain.

use crate::app::GatewayState;
use crate::chain_registry::ChainConfig;
use crate::errors::GatewayError;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const MIN_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_PROBE_TIMEOUT: Duration = Duration::from_secs(50);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    NotConfigured,
    Healthy,
    Unhealthy,
    Available,
    Unavailable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Unhealthy,
    NotConfigured,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsensusDetail {
    pub is_syncing: Option<bool>,
    pub head_slot: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub chain: String,
    pub execution: ServiceStatus,
    pub consensus: ServiceStatus,
    pub metrics: ServiceStatus,
    pub consensus_detail: Option<ConsensusDetail>,
    pub overall: OverallStatus,
}

impl HealthSnapshot {
    /// Overall status is a pure function of the three per-service
    /// statuses, per spec.md §4.7.
    fn compose(chain: String, execution: ServiceStatus, consensus: ServiceStatus, metrics: ServiceStatus, consensus_detail: Option<ConsensusDetail>) -> Self {
        let not_configured = [execution, consensus, metrics]
            .iter()
            .filter(|s| **s == ServiceStatus::NotConfigured)
            .count();
        let unhealthy = [execution, consensus]
            .iter()
            .filter(|s| **s == ServiceStatus::Unhealthy)
            .count()
            + usize::from(metrics == ServiceStatus::Unavailable);

        let overall = if execution == ServiceStatus::NotConfigured && consensus == ServiceStatus::NotConfigured {
            OverallStatus::NotConfigured
        } else if unhealthy == 0 {
            OverallStatus::Healthy
        } else if unhealthy == 1 && unhealthy + not_configured < 2 {
            OverallStatus::Degraded
        } else {
            OverallStatus::Unhealthy
        };

        Self {
            chain,
            execution,
            consensus,
            metrics,
            consensus_detail,
            overall,
        }
    }

    pub fn http_status(&self) -> StatusCode {
        if self.execution == ServiceStatus::Unhealthy || self.consensus == ServiceStatus::Unhealthy || self.metrics == ServiceStatus::Unavailable {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::OK
        }
    }
}

async fn probe_execution(client: &reqwest::Client, url: &str) -> bool {
    let body = json!({"jsonrpc": "2.0", "method": "eth_syncing", "params": [], "id": 1});
    match timeout(MAX_PROBE_TIMEOUT, client.post(url).json(&body).send()).await {
        Ok(Ok(resp)) => resp.status().is_success(),
        _ => false,
    }
}

async fn probe_prometheus(client: &reqwest::Client, url: &str) -> bool {
    let target = format!("{}/metrics", url.trim_end_matches('/'));
    match timeout(MAX_PROBE_TIMEOUT, client.get(target).send()).await {
        Ok(Ok(resp)) => resp.status().is_success(),
        _ => false,
    }
}

async fn probe_consensus(client: &reqwest::Client, url: &str) -> (bool, Option<ConsensusDetail>) {
    let target = format!("{}/eth/v1/node/syncing", url.trim_end_matches('/'));
    match timeout(MAX_PROBE_TIMEOUT, client.get(target).send()).await {
        Ok(Ok(resp)) if resp.status().is_success() => {
            let detail = resp
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|body| {
                    let data = body.get("data")?;
                    Some(ConsensusDetail {
                        is_syncing: data.get("is_syncing").and_then(|v| v.as_bool()),
                        head_slot: data
                            .get("head_slot")
                            .and_then(|v| v.as_str().and_then(|s| s.parse().ok()).or_else(|| v.as_u64())),
                    })
                });
            (true, detail)
        }
        _ => (false, None),
    }
}

/// Probe all URLs in a list and report `healthy` if any of them are
/// reachable, `not_configured` if the list is empty (spec.md §4.7).
async fn aggregate_execution(client: &reqwest::Client, urls: &Option<Vec<String>>) -> ServiceStatus {
    match urls {
        None => ServiceStatus::NotConfigured,
        Some(urls) if urls.is_empty() => ServiceStatus::NotConfigured,
        Some(urls) => {
            let results = join_all(urls.iter().map(|url| probe_execution(client, url))).await;
            if results.into_iter().any(|ok| ok) {
                ServiceStatus::Healthy
            } else {
                ServiceStatus::Unhealthy
            }
        }
    }
}

async fn aggregate_consensus(client: &reqwest::Client, urls: &Option<Vec<String>>) -> (ServiceStatus, Option<ConsensusDetail>) {
    match urls {
        None => (ServiceStatus::NotConfigured, None),
        Some(urls) if urls.is_empty() => (ServiceStatus::NotConfigured, None),
        Some(urls) => {
            let results = join_all(urls.iter().map(|url| probe_consensus(client, url))).await;
            let mut any_ok = false;
            let mut detail = None;
            for (ok, d) in results {
                if ok {
                    any_ok = true;
                    detail = detail.or(d);
                }
            }
            let status = if any_ok { ServiceStatus::Healthy } else { ServiceStatus::Unhealthy };
            (status, detail)
        }
    }
}

async fn aggregate_prometheus(client: &reqwest::Client, urls: &Option<Vec<String>>) -> ServiceStatus {
    match urls {
        None => ServiceStatus::NotConfigured,
        Some(urls) if urls.is_empty() => ServiceStatus::NotConfigured,
        Some(urls) => {
            let results = join_all(urls.iter().map(|url| probe_prometheus(client, url))).await;
            if results.into_iter().any(|ok| ok) {
                ServiceStatus::Available
            } else {
                ServiceStatus::Unavailable
            }
        }
    }
}

pub async fn probe_chain(client: &reqwest::Client, chain_name: &str, config: &ChainConfig) -> HealthSnapshot {
    let (execution, (consensus, consensus_detail), metrics) = tokio::join!(
        aggregate_execution(client, &config.execution_urls),
        aggregate_consensus(client, &config.consensus_urls),
        aggregate_prometheus(client, &config.prometheus_urls),
    );

    HealthSnapshot::compose(chain_name.to_string(), execution, consensus, metrics, consensus_detail)
}

/// `GET /health/{chain}`. Serves the cached snapshot the periodic sampler
/// (C8) refreshes every 30s; falls back to a live probe if nothing has
/// been sampled yet (e.g. right after boot).
pub async fn health_handler(State(state): State<Arc<GatewayState>>, Path(chain): Path<String>) -> axum::response::Response {
    let Some(config) = state.chain_registry.get(&chain) else {
        return GatewayError::UnknownChain(chain).into_response();
    };

    let cached = state.health_cache.get(&chain.to_lowercase()).map(|entry| entry.clone());
    let snapshot = match cached {
        Some(snapshot) => snapshot,
        None => probe_chain(&state.http_client, &chain, &config).await,
    };

    (snapshot.http_status(), Json(snapshot)).into_response()
}

/// Refresh every configured chain's cached snapshot. Run on a `tokio`
/// interval by the supervisor; also callable directly for tests.
pub async fn sample_all_chains(state: &GatewayState) {
    for name in state.chain_registry.chain_names() {
        if let Some(config) = state.chain_registry.get(&name) {
            let snapshot = probe_chain(&state.http_client, &name, &config).await;
            state.health_cache.insert(name.to_lowercase(), snapshot);
        }
    }
}

pub fn start_sampler(state: Arc<GatewayState>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(MIN_PROBE_TIMEOUT));
        loop {
            ticker.tick().await;
            sample_all_chains(&state).await;
        }
    })
}
