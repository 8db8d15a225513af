//! Failover RPC client pool (C1, §4.1).
//!
//! Endpoints are tried starting from a "current" cursor; a successful call
//! promotes its endpoint to current so the common case (the first endpoint
//! stays healthy) costs nothing beyond the one in-flight request. A run of
//! failures rotates through every remaining endpoint once before giving up.
//! The cursor is a plain `AtomicUsize`, the same idiom the teacher uses for
//! `signer_cursor` in `src/chain/eip155/mod.rs` — reused here for routing
//! instead of signer rotation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use alloy_rpc_client::RpcClient;
use alloy_transport_http::Http;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use url::Url;

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum RpcPoolError {
    #[error("rpc pool has no endpoints configured")]
    NoEndpoints,
    #[error("call cancelled")]
    Cancelled,
    #[error("call to {endpoint} timed out")]
    Timeout { endpoint: String },
    #[error("every endpoint failed; last error from {endpoint}: {source}")]
    Exhausted {
        endpoint: String,
        #[source]
        source: alloy_transport::TransportError,
    },
    #[error("malformed response from {endpoint}: {detail}")]
    InvalidResponse { endpoint: String, detail: String },
}

struct Endpoint {
    url: Url,
    client: RpcClient,
    /// Reporting only — §4.1 "does not affect routing", kept up to date by
    /// [`super::health`]'s 60s prober ticker.
    healthy: AtomicBool,
}

/// A round-robin, promote-on-success JSON-RPC client pool over an ordered
/// list of endpoints.
pub struct RpcPool {
    endpoints: Vec<Endpoint>,
    current: AtomicUsize,
    call_timeout: Duration,
}

impl RpcPool {
    pub fn new(urls: Vec<Url>) -> Result<Self, RpcPoolError> {
        Self::with_timeout(urls, DEFAULT_CALL_TIMEOUT)
    }

    pub fn with_timeout(urls: Vec<Url>, call_timeout: Duration) -> Result<Self, RpcPoolError> {
        if urls.is_empty() {
            return Err(RpcPoolError::NoEndpoints);
        }
        let endpoints = urls
            .into_iter()
            .map(|url| {
                let http = Http::new(url.clone());
                Endpoint {
                    url,
                    client: RpcClient::new(http, false),
                    healthy: AtomicBool::new(true),
                }
            })
            .collect();
        Ok(RpcPool {
            endpoints,
            current: AtomicUsize::new(0),
            call_timeout,
        })
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Reports the last-known health of every endpoint, in pool order, for
    /// a status surface — never used to pick a routing target.
    pub fn health_snapshot(&self) -> Vec<(String, bool)> {
        self.endpoints
            .iter()
            .map(|e| (e.url.to_string(), e.healthy.load(Ordering::Relaxed)))
            .collect()
    }

    pub(super) fn endpoint_url(&self, index: usize) -> Option<&Url> {
        self.endpoints.get(index).map(|e| &e.url)
    }

    pub(super) fn mark_health(&self, index: usize, healthy: bool) {
        if let Some(endpoint) = self.endpoints.get(index) {
            endpoint.healthy.store(healthy, Ordering::Relaxed);
        }
    }

    pub(super) async fn probe_block_number(&self, index: usize) -> Result<u64, RpcPoolError> {
        let endpoint = self
            .endpoints
            .get(index)
            .ok_or(RpcPoolError::NoEndpoints)?;
        let hex: String = endpoint
            .client
            .request("eth_blockNumber", ())
            .await
            .map_err(|e| RpcPoolError::Exhausted {
                endpoint: endpoint.url.to_string(),
                source: e,
            })?;
        let trimmed = hex.trim_start_matches("0x");
        u64::from_str_radix(trimmed, 16).map_err(|_| RpcPoolError::InvalidResponse {
            endpoint: endpoint.url.to_string(),
            detail: format!("eth_blockNumber returned non-hex value {hex}"),
        })
    }

    /// Calls `method` on the current endpoint; on failure, rotates through
    /// the rest of the list (at most `endpoint_count()` total attempts). On
    /// success from a non-current endpoint, that endpoint is promoted to
    /// current.
    pub async fn call<P, R>(&self, method: &'static str, params: P, cancel: &CancellationToken) -> Result<R, RpcPoolError>
    where
        P: Serialize + Clone + Send + Sync,
        R: DeserializeOwned,
    {
        let n = self.endpoints.len();
        if n == 0 {
            return Err(RpcPoolError::NoEndpoints);
        }
        let start = self.current.load(Ordering::Relaxed) % n;

        let mut last_err = None;
        for offset in 0..n {
            let idx = (start + offset) % n;
            let endpoint = &self.endpoints[idx];

            let attempt = endpoint.client.request::<P, R>(method, params.clone());
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RpcPoolError::Cancelled),
                res = tokio::time::timeout(self.call_timeout, attempt) => res,
            };

            match outcome {
                Ok(Ok(value)) => {
                    if idx != start {
                        self.current.store(idx, Ordering::Relaxed);
                        tracing::info!(endpoint = %endpoint.url, "promoted rpc endpoint after failover");
                    }
                    return Ok(value);
                }
                Ok(Err(source)) => {
                    tracing::warn!(endpoint = %endpoint.url, error = %source, method, "rpc call failed, trying next endpoint");
                    last_err = Some(RpcPoolError::Exhausted {
                        endpoint: endpoint.url.to_string(),
                        source,
                    });
                }
                Err(_elapsed) => {
                    tracing::warn!(endpoint = %endpoint.url, method, "rpc call timed out, trying next endpoint");
                    last_err = Some(RpcPoolError::Timeout {
                        endpoint: endpoint.url.to_string(),
                    });
                }
            }
        }

        Err(last_err.unwrap_or(RpcPoolError::NoEndpoints))
    }
}

pub type SharedRpcPool = Arc<RpcPool>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_endpoint_list() {
        let result = RpcPool::new(vec![]);
        assert!(matches!(result, Err(RpcPoolError::NoEndpoints)));
    }

    #[test]
    fn starts_with_first_endpoint_current() {
        let pool = RpcPool::new(vec![Url::parse("http://localhost:8545").unwrap()]).unwrap();
        assert_eq!(pool.current.load(Ordering::Relaxed), 0);
        assert_eq!(pool.endpoint_count(), 1);
    }

    #[test]
    fn health_snapshot_starts_all_healthy() {
        let pool = RpcPool::new(vec![
            Url::parse("http://a:8545").unwrap(),
            Url::parse("http://b:8545").unwrap(),
        ])
        .unwrap();
        let snapshot = pool.health_snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().all(|(_, healthy)| *healthy));
    }
}
