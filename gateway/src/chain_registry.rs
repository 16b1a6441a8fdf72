//! C1: maps a chain name to its configured upstream URL pools.
//!
//! Backed by an `arc_swap::ArcSwap` so readers (every proxied request) never
//! block on a writer (env re-scan at boot, or an admin-triggered refresh
//! against the Store) -- the copy-on-write policy spec.md §5 calls for.

use crate::config::{env_chain_urls, AppConfig};
use arc_swap::ArcSwap;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::Arc;

/// The upstream pools configured for one chain, keyed internally by the
/// lowercased chain name.
#[derive(Debug, Clone, Default)]
pub struct ChainConfig {
    pub enabled: bool,
    pub execution_urls: Option<Vec<String>>,
    pub consensus_urls: Option<Vec<String>>,
    pub prometheus_urls: Option<Vec<String>>,
}

type Table = HashMap<String, ChainConfig>;

pub struct ChainRegistry {
    table: ArcSwap<Table>,
}

impl ChainRegistry {
    /// Build the registry from env-derived chains merged with whatever
    /// `Chain` rows the Store has persisted. Store rows win on conflicting
    /// fields since they represent an explicit admin decision; env vars
    /// fill in anything the Store didn't configure.
    pub fn from_sources(config: &AppConfig, store_chains: &[entities::chain::Model]) -> Self {
        let mut table: Table = HashMap::new();

        for (name, (execution, consensus, prometheus)) in env_chain_urls() {
            table.insert(
                name,
                ChainConfig {
                    enabled: true,
                    execution_urls: execution,
                    consensus_urls: consensus,
                    prometheus_urls: prometheus,
                },
            );
        }

        for chain in &config.toml_chains {
            let name = chain.name.to_lowercase();
            table.insert(
                name,
                ChainConfig {
                    enabled: chain.enabled,
                    execution_urls: non_empty(chain.execution_urls.clone()),
                    consensus_urls: non_empty(chain.consensus_urls.clone()),
                    prometheus_urls: non_empty(chain.prometheus_urls.clone()),
                },
            );
        }

        for chain in store_chains {
            let name = chain.name.to_lowercase();
            table.insert(
                name,
                ChainConfig {
                    enabled: chain.enabled,
                    execution_urls: crate::config::parse_url_list(&chain.execution_urls),
                    consensus_urls: crate::config::parse_url_list(&chain.consensus_urls),
                    prometheus_urls: crate::config::parse_url_list(&chain.prometheus_urls),
                },
            );
        }

        Self {
            table: ArcSwap::from_pointee(table),
        }
    }

    #[cfg(test)]
    pub fn empty() -> Self {
        Self {
            table: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    #[cfg(test)]
    pub fn insert_for_test(&self, name: &str, config: ChainConfig) {
        let mut table = (**self.table.load()).clone();
        table.insert(name.to_lowercase(), config);
        self.table.store(Arc::new(table));
    }

    /// Atomically swap in a freshly-rebuilt table (admin-triggered refresh).
    pub fn replace(&self, config: &AppConfig, store_chains: &[entities::chain::Model]) {
        let fresh = Self::from_sources(config, store_chains);
        self.table.store(fresh.table.load_full());
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<ChainConfig> {
        self.table.load().get(&name.to_lowercase()).cloned()
    }

    pub fn chain_names(&self) -> Vec<String> {
        self.table.load().keys().cloned().collect()
    }

    pub fn pick_execution(&self, name: &str) -> Option<String> {
        self.get(name)
            .and_then(|c| c.execution_urls)
            .and_then(|urls| pick(&urls))
    }

    pub fn pick_consensus(&self, name: &str) -> Option<String> {
        self.get(name)
            .and_then(|c| c.consensus_urls)
            .and_then(|urls| pick(&urls))
    }
}

fn non_empty(urls: Vec<String>) -> Option<Vec<String>> {
    if urls.is_empty() {
        None
    } else {
        Some(urls)
    }
}

fn pick(urls: &[String]) -> Option<String> {
    urls.choose(&mut rand::thread_rng()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = ChainRegistry::empty();
        registry.insert_for_test(
            "Sepolia",
            ChainConfig {
                enabled: true,
                execution_urls: Some(vec!["http://a".into()]),
                consensus_urls: None,
                prometheus_urls: None,
            },
        );

        assert!(registry.get("sepolia").is_some());
        assert!(registry.get("SEPOLIA").is_some());
        assert!(registry.get("sEpOlIa").is_some());
        assert!(registry.get("arbitrum").is_none());
    }

    #[test]
    fn pick_execution_returns_none_when_list_absent() {
        let registry = ChainRegistry::empty();
        registry.insert_for_test(
            "sepolia",
            ChainConfig {
                enabled: true,
                execution_urls: None,
                consensus_urls: None,
                prometheus_urls: None,
            },
        );

        assert_eq!(registry.pick_execution("sepolia"), None);
    }

    #[test]
    fn pick_execution_chooses_from_the_configured_list() {
        let registry = ChainRegistry::empty();
        registry.insert_for_test(
            "sepolia",
            ChainConfig {
                enabled: true,
                execution_urls: Some(vec!["http://a".into(), "http://b".into()]),
                consensus_urls: None,
                prometheus_urls: None,
            },
        );

        for _ in 0..20 {
            let picked = registry.pick_execution("sepolia").unwrap();
            assert!(picked == "http://a" || picked == "http://b");
        }
    }
}
