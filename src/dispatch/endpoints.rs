//! Endpoint pool for egress rotation
//!
//! Selection and failure marking happen under one lock, so two workers can
//! never both pick an endpoint that has just been marked failed, and the
//! round-robin cursor is never torn.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

/// One egress path, usually a proxy URL
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub url: String,
}

impl Endpoint {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;
        match url.scheme() {
            "http" | "https" | "socks5" | "socks5h" => {}
            other => {
                return Err(ConfigError::InvalidUrl {
                    url: raw.to_string(),
                    reason: format!("unsupported proxy scheme '{}'", other),
                })
            }
        }
        if url.host_str().is_none() {
            return Err(ConfigError::InvalidUrl {
                url: raw.to_string(),
                reason: "missing host".into(),
            });
        }
        Ok(Self {
            url: raw.trim_end_matches('/').to_string(),
        })
    }
}

/// Endpoint as written in configuration: a URL or `{protocol, host, port}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EndpointSpec {
    Url(String),
    Parts {
        #[serde(default = "default_protocol")]
        protocol: String,
        host: String,
        port: u16,
    },
}

fn default_protocol() -> String {
    "http".to_string()
}

impl EndpointSpec {
    pub fn to_endpoint(&self) -> Result<Endpoint, ConfigError> {
        match self {
            EndpointSpec::Url(url) => Endpoint::parse(url),
            EndpointSpec::Parts {
                protocol,
                host,
                port,
            } => Endpoint::parse(&format!("{}://{}:{}", protocol, host, port)),
        }
    }
}

/// Outcome of asking the pool for the next endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Use this endpoint
    Endpoint { index: usize, endpoint: Endpoint },
    /// Rotation is not configured
    Direct,
    /// Every endpoint is marked failed; go direct
    Exhausted,
}

struct PoolState {
    endpoints: Vec<Endpoint>,
    failed: Vec<bool>,
    cursor: usize,
}

/// Ordered set of endpoints, each alive or failed
pub struct EndpointPool {
    state: Mutex<PoolState>,
}

impl EndpointPool {
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        let failed = vec![false; endpoints.len()];
        Self {
            state: Mutex::new(PoolState {
                endpoints,
                failed,
                cursor: 0,
            }),
        }
    }

    /// A pool that never rotates
    pub fn disabled() -> Self {
        Self::new(Vec::new())
    }

    pub fn is_rotating(&self) -> bool {
        !self.state.lock().endpoints.is_empty()
    }

    /// Next alive endpoint in round-robin order
    pub fn select(&self) -> Selection {
        let mut state = self.state.lock();
        let len = state.endpoints.len();
        if len == 0 {
            return Selection::Direct;
        }

        for _ in 0..len {
            let index = state.cursor;
            state.cursor = (state.cursor + 1) % len;
            if !state.failed[index] {
                return Selection::Endpoint {
                    index,
                    endpoint: state.endpoints[index].clone(),
                };
            }
        }

        Selection::Exhausted
    }

    /// Move an endpoint to the failed set. Returns true if it was alive.
    pub fn mark_failed(&self, index: usize) -> bool {
        let mut state = self.state.lock();
        match state.failed.get_mut(index) {
            Some(failed) if !*failed => {
                *failed = true;
                true
            }
            _ => false,
        }
    }

    /// Bring every endpoint back to alive
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.failed.iter_mut().for_each(|f| *f = false);
        state.cursor = 0;
    }

    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.state.lock().endpoints.clone()
    }

    pub fn failed(&self) -> Vec<Endpoint> {
        let state = self.state.lock();
        state
            .endpoints
            .iter()
            .zip(&state.failed)
            .filter(|(_, failed)| **failed)
            .map(|(endpoint, _)| endpoint.clone())
            .collect()
    }

    pub fn alive(&self) -> Vec<Endpoint> {
        let state = self.state.lock();
        state
            .endpoints
            .iter()
            .zip(&state.failed)
            .filter(|(_, failed)| !**failed)
            .map(|(endpoint, _)| endpoint.clone())
            .collect()
    }

    pub fn is_exhausted(&self) -> bool {
        let state = self.state.lock();
        !state.endpoints.is_empty() && state.failed.iter().all(|f| *f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(n: usize) -> EndpointPool {
        EndpointPool::new(
            (1..=n)
                .map(|i| Endpoint::parse(&format!("http://proxy{}.local:8080", i)).unwrap())
                .collect(),
        )
    }

    fn picked(selection: Selection) -> usize {
        match selection {
            Selection::Endpoint { index, .. } => index,
            other => panic!("expected endpoint, got {:?}", other),
        }
    }

    #[test]
    fn test_round_robin_skips_failed() {
        let pool = pool(3);
        assert_eq!(picked(pool.select()), 0);
        assert_eq!(picked(pool.select()), 1);
        assert!(pool.mark_failed(1));
        assert!(!pool.mark_failed(1));
        assert_eq!(picked(pool.select()), 2);
        assert_eq!(picked(pool.select()), 0);
        assert_eq!(picked(pool.select()), 2);
        assert_eq!(pool.failed().len(), 1);
        assert_eq!(pool.alive().len(), 2);
    }

    #[test]
    fn test_exhausted_and_reset() {
        let pool = pool(2);
        pool.mark_failed(0);
        pool.mark_failed(1);
        assert_eq!(pool.select(), Selection::Exhausted);
        assert!(pool.is_exhausted());

        pool.reset();
        assert_eq!(picked(pool.select()), 0);
        assert_eq!(pool.endpoints().len(), 2);
    }

    #[test]
    fn test_disabled_pool_goes_direct() {
        let pool = EndpointPool::disabled();
        assert!(!pool.is_rotating());
        assert_eq!(pool.select(), Selection::Direct);
        assert!(!pool.is_exhausted());
    }

    #[test]
    fn test_endpoint_spec_forms() {
        let specs: Vec<EndpointSpec> = serde_json::from_str(
            r#"["socks5://127.0.0.1:9050", {"host": "10.0.0.2", "port": 3128}]"#,
        )
        .unwrap();
        let endpoints: Vec<_> = specs.iter().map(|s| s.to_endpoint().unwrap()).collect();
        assert_eq!(endpoints[0].url, "socks5://127.0.0.1:9050");
        assert_eq!(endpoints[1].url, "http://10.0.0.2:3128");

        assert!(Endpoint::parse("ftp://proxy:21").is_err());
        assert!(Endpoint::parse("not a url").is_err());
    }

    #[test]
    fn test_concurrent_marking_is_consistent() {
        let pool = std::sync::Arc::new(pool(4));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        if let Selection::Endpoint { index, .. } = pool.select() {
                            if index == i % 4 && i % 2 == 0 {
                                pool.mark_failed(index);
                            }
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let failed = pool.failed();
        assert!(failed
            .iter()
            .all(|e| e.url.contains("proxy1") || e.url.contains("proxy3")));
        for _ in 0..10 {
            match pool.select() {
                Selection::Endpoint { endpoint, .. } => assert!(!failed.contains(&endpoint)),
                other => panic!("unexpected {:?}", other),
            }
        }
    }
}
