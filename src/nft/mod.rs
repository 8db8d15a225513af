//! NFT metadata resolver (C6, §4.6).
//!
//! A bounded job queue feeding a small worker pool: each job calls
//! `tokenURI`/`uri` on-chain, normalizes the result, fetches the JSON
//! document over HTTP, and upserts it. Failures are logged and dropped —
//! the next transfer of the same token re-enqueues.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::U256;
use serde_json::Value;
use studio_indexer_types::{Addr, NftMetadata, TokenType};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::rpc::SharedRpcPool;

const METADATA_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

alloy_sol_types::sol! {
    function tokenURI(uint256 tokenId) external view returns (string);
    function uri(uint256 id) external view returns (string);
}

#[derive(Debug, Clone)]
pub struct MetadataJob {
    pub token_address: Addr,
    pub token_id: String,
    pub token_type: TokenType,
}

/// Every variant here is logged and dropped (§4.6: "failures are logged and
/// not retried inside the process"), never matched by a caller — this is
/// just enough structure to make `tracing::warn!` messages readable.
#[derive(Debug, thiserror::Error)]
enum NftError {
    #[error("token id {0:?} is not a valid decimal uint256")]
    InvalidTokenId(String),
    #[error("fungible tokens have no per-token metadata uri")]
    NotAnNft,
    #[error("rpc call failed: {0}")]
    Rpc(#[from] crate::rpc::RpcPoolError),
    #[error("malformed tokenURI/uri return value")]
    MalformedUri,
    #[error("metadata fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("store error: {0}")]
    Store(#[from] studio_indexer_store::StoreError),
}

type NftResult<T> = Result<T, NftError>;

struct QueueInner {
    jobs: Mutex<VecDeque<MetadataJob>>,
    notify: Notify,
    capacity: usize,
}

/// Bounded job queue (§4.6, §5): capacity 1024 by default, drops the
/// oldest entry with a warning when full rather than blocking the
/// enqueuing side (the ingestor's PERSISTING phase must never wait on
/// metadata resolution).
#[derive(Clone)]
pub struct MetadataQueue(Arc<QueueInner>);

impl MetadataQueue {
    pub fn new(capacity: usize) -> Self {
        MetadataQueue(Arc::new(QueueInner {
            jobs: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity: capacity.max(1),
        }))
    }

    pub fn enqueue(&self, job: MetadataJob) {
        let mut jobs = self.0.jobs.lock().expect("metadata queue mutex poisoned");
        if jobs.len() >= self.0.capacity {
            if let Some(dropped) = jobs.pop_front() {
                tracing::warn!(
                    token_address = %dropped.token_address,
                    token_id = %dropped.token_id,
                    "nft metadata queue full, dropping oldest job"
                );
            }
        }
        jobs.push_back(job);
        drop(jobs);
        self.0.notify.notify_one();
    }

    async fn dequeue(&self) -> MetadataJob {
        loop {
            if let Some(job) = self.0.jobs.lock().expect("metadata queue mutex poisoned").pop_front() {
                return job;
            }
            self.0.notify.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.0.jobs.lock().expect("metadata queue mutex poisoned").len()
    }
}

/// Spawns `worker_pool` tasks draining `queue` until `cancel` fires. Each
/// worker finishes whatever job it's holding before checking cancellation
/// again (§5: "workers drain their current item then exit").
pub fn spawn_workers(
    queue: MetadataQueue,
    pool: SharedRpcPool,
    store: studio_indexer_store::Store,
    worker_pool: usize,
    cancel: CancellationToken,
) -> Vec<tokio::task::JoinHandle<()>> {
    let http = reqwest::Client::builder()
        .timeout(METADATA_FETCH_TIMEOUT)
        .build()
        .expect("reqwest client builds with the default TLS backend");

    (0..worker_pool.max(1))
        .map(|worker_id| {
            let queue = queue.clone();
            let pool = pool.clone();
            let store = store.clone();
            let http = http.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    let job = tokio::select! {
                        _ = cancel.cancelled() => {
                            tracing::info!(worker_id, "nft metadata worker shutting down");
                            return;
                        }
                        job = queue.dequeue() => job,
                    };
                    if let Err(error) = process_job(&job, &pool, &store, &http, &cancel).await {
                        tracing::warn!(
                            worker_id,
                            token_address = %job.token_address,
                            token_id = %job.token_id,
                            %error,
                            "nft metadata resolution failed, dropping"
                        );
                    }
                }
            })
        })
        .collect()
}

async fn process_job(
    job: &MetadataJob,
    pool: &SharedRpcPool,
    store: &studio_indexer_store::Store,
    http: &reqwest::Client,
    cancel: &CancellationToken,
) -> NftResult<()> {
    let token_id = U256::from_str_radix(&job.token_id, 10).map_err(|_| NftError::InvalidTokenId(job.token_id.clone()))?;
    let uri = resolve_token_uri(pool, job.token_address, job.token_type, token_id, cancel).await?;
    let url = normalize_uri(&uri);

    let response = http.get(&url).send().await?;
    let document: Value = response.json().await?;

    let metadata = NftMetadata {
        token_address: job.token_address,
        token_id: job.token_id.clone(),
        document,
        resolved_at: chrono::Utc::now(),
    };
    store.update_nft_metadata(&metadata).await?;
    Ok(())
}

async fn resolve_token_uri(
    pool: &SharedRpcPool,
    address: Addr,
    token_type: TokenType,
    token_id: U256,
    cancel: &CancellationToken,
) -> NftResult<String> {
    use alloy_sol_types::SolCall;

    let calldata = match token_type {
        TokenType::Erc721 => tokenURICall { tokenId: token_id }.abi_encode(),
        TokenType::Erc1155 => uriCall { id: token_id }.abi_encode(),
        TokenType::Erc20 => return Err(NftError::NotAnNft),
    };

    let params = serde_json::json!([
        {
            "to": address.to_string(),
            "data": format!("0x{}", hex::encode(calldata)),
        },
        "latest"
    ]);
    let hex_result: String = pool.call("eth_call", params, cancel).await?;
    let trimmed = hex_result.strip_prefix("0x").unwrap_or(&hex_result);
    let raw = hex::decode(trimmed).map_err(|_| NftError::MalformedUri)?;
    let decoded = decode_abi_string(&raw).ok_or(NftError::MalformedUri)?;

    Ok(if token_type == TokenType::Erc1155 {
        decoded.replace("{id}", &format!("{token_id:064x}"))
    } else {
        decoded
    })
}

/// Decodes a bare ABI-encoded `string` return value: `[offset][length][data]`.
fn decode_abi_string(data: &[u8]) -> Option<String> {
    if data.len() < 64 {
        return None;
    }
    let offset = u64::try_from(U256::from_be_slice(&data[0..32])).ok()? as usize;
    let length_start = offset;
    let length = u64::try_from(U256::from_be_slice(data.get(length_start..length_start + 32)?)).ok()? as usize;
    let bytes = data.get(length_start + 32..length_start + 32 + length)?;
    String::from_utf8(bytes.to_vec()).ok()
}

/// §4.6 step 2: `ipfs://CID/...` becomes a fetchable HTTPS gateway URL.
/// Anything else (already `https://`, `data:`, ...) passes through.
fn normalize_uri(uri: &str) -> String {
    match uri.strip_prefix("ipfs://") {
        Some(rest) => format!("https://ipfs.io/ipfs/{rest}"),
        None => uri.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipfs_uri_is_rewritten_to_a_gateway_url() {
        assert_eq!(
            normalize_uri("ipfs://bafybeigd/1.json"),
            "https://ipfs.io/ipfs/bafybeigd/1.json"
        );
    }

    #[test]
    fn https_uri_passes_through_unchanged() {
        assert_eq!(normalize_uri("https://example.com/1.json"), "https://example.com/1.json");
    }

    #[test]
    fn decodes_a_simple_abi_string() {
        let mut data = vec![0u8; 32];
        data[31] = 0x20; // offset = 32
        let mut length_word = vec![0u8; 32];
        length_word[31] = 5; // length = 5
        data.extend_from_slice(&length_word);
        let mut payload = b"hello".to_vec();
        payload.resize(32, 0);
        data.extend_from_slice(&payload);
        assert_eq!(decode_abi_string(&data).as_deref(), Some("hello"));
    }

    #[test]
    fn erc1155_uri_template_is_substituted_with_the_padded_id() {
        let id = U256::from(291u64); // 0x123
        let template = "https://meta.example/{id}.json";
        let substituted = template.replace("{id}", &format!("{id:064x}"));
        assert_eq!(
            substituted,
            format!("https://meta.example/{}.json", "0".repeat(61) + "123")
        );
    }

    #[test]
    fn queue_drops_oldest_job_when_full() {
        let queue = MetadataQueue::new(2);
        let addr: Addr = "0x0000000000000000000000000000000000000001".parse().unwrap();
        queue.enqueue(MetadataJob { token_address: addr, token_id: "1".to_string(), token_type: TokenType::Erc721 });
        queue.enqueue(MetadataJob { token_address: addr, token_id: "2".to_string(), token_type: TokenType::Erc721 });
        queue.enqueue(MetadataJob { token_address: addr, token_id: "3".to_string(), token_type: TokenType::Erc721 });
        assert_eq!(queue.len(), 2);
    }
}
