//! Block ingestor (C5, §4.5).
//!
//! A single-threaded cooperative driver that walks the chain forward,
//! fetching up to `batch_window` blocks concurrently but persisting them
//! strictly in ascending order, so a reorg caught at block `H` never
//! leaves block `H+1` committed underneath it.

mod rpc_types;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use studio_indexer_store::{BlockUnit, Store, StoreError};
use studio_indexer_types::{Addr, Amount, Contract, EventLog, Hash32};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::classifier::{Classification, ContractClassifier};
use crate::decoder::{self, RawLog};
use crate::error::IndexerError;
use crate::nft::{MetadataJob, MetadataQueue};
use crate::rpc::SharedRpcPool;
use rpc_types::{RawBlock, RawReceipt};
use state::IngestorState;

/// One fetched-and-decoded block, ready to hand to [`Store::persist_block`].
struct FetchedBlock {
    height: u64,
    unit: BlockUnit,
}

pub struct Ingestor {
    pool: SharedRpcPool,
    store: Store,
    classifier: Arc<ContractClassifier>,
    metadata_queue: MetadataQueue,
    start_block: u64,
    confirmations: u64,
    batch_window: usize,
    poll_interval: Duration,
}

impl Ingestor {
    pub fn new(
        pool: SharedRpcPool,
        store: Store,
        classifier: Arc<ContractClassifier>,
        metadata_queue: MetadataQueue,
        start_block: u64,
        confirmations: u64,
        batch_window: usize,
        poll_interval_secs: u64,
    ) -> Self {
        Ingestor {
            pool,
            store,
            classifier,
            metadata_queue,
            start_block,
            confirmations,
            batch_window: batch_window.max(1),
            poll_interval: Duration::from_secs(poll_interval_secs.max(1)),
        }
    }

    /// Runs until `cancel` fires. Backfill and steady-state tailing are the
    /// same loop: both just walk `(cursor, safe]` forward (§4.5, §4.8).
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), IndexerError> {
        loop {
            if cancel.is_cancelled() {
                tracing::info!(state = %IngestorState::Done, "ingestor shutting down");
                return Ok(());
            }

            let cursor = self.store.cursor().await?;
            // No backward scan: if the configured start block is ahead of
            // whatever's already processed, jump forward to it rather than
            // walking from genesis (§4.8 backfill).
            let from = cursor.latest_processed.max(self.start_block.saturating_sub(1));

            let latest_chain = match self.latest_chain_height(&cancel).await {
                Ok(height) => height,
                Err(error) => {
                    tracing::warn!(%error, "failed to read latest chain height, retrying after poll interval");
                    self.sleep_or_cancel(&cancel).await;
                    continue;
                }
            };
            let safe = latest_chain.saturating_sub(self.confirmations);

            let Some(heights) = next_window(from, safe, self.batch_window) else {
                tracing::debug!(state = %IngestorState::Idle, from, safe, "caught up, idling");
                self.sleep_or_cancel(&cancel).await;
                continue;
            };

            match self.fetch_and_persist_window(heights, &cancel).await {
                Ok(()) => {}
                Err(IngestWindowOutcome::Reorg(rewind_to)) => {
                    tracing::warn!(state = %IngestorState::ReorgDetected, rewind_to, "reorg detected, rewinding store");
                    tracing::info!(state = %IngestorState::Rewinding, rewind_to);
                    self.store.reorg(rewind_to).await?;
                }
                Err(IngestWindowOutcome::Fatal(error)) => return Err(error),
            }
        }
    }

    /// §4.6 trigger: a persisted ERC-721/1155 transfer enqueues its token
    /// for metadata resolution only when the NFT row still lacks metadata
    /// (spec.md:158) — a re-transfer of an already-resolved token must not
    /// compete with genuinely new tokens for the bounded queue's capacity.
    async fn enqueue_metadata_jobs(&self, transfers: &[studio_indexer_types::TokenTransfer]) {
        for transfer in transfers {
            if !matches!(
                transfer.token_type,
                studio_indexer_types::TokenType::Erc721 | studio_indexer_types::TokenType::Erc1155
            ) {
                continue;
            }
            let Some(token_id) = &transfer.token_id else {
                continue;
            };
            let token_address = transfer.token_address.to_string();
            let has_metadata = match self.store.get_nft_token(&token_address, token_id).await {
                Ok(Some(existing)) => existing.metadata_uri.is_some(),
                Ok(None) => false,
                Err(error) => {
                    tracing::warn!(%error, %token_address, %token_id, "failed to check existing nft metadata, enqueuing anyway");
                    false
                }
            };
            if has_metadata {
                continue;
            }
            self.metadata_queue.enqueue(MetadataJob {
                token_address: transfer.token_address,
                token_id: token_id.clone(),
                token_type: transfer.token_type,
            });
        }
    }

    async fn sleep_or_cancel(&self, cancel: &CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(self.poll_interval) => {}
        }
    }

    async fn latest_chain_height(&self, cancel: &CancellationToken) -> Result<u64, IndexerError> {
        let hex: String = self.pool.call("eth_blockNumber", json!([]), cancel).await?;
        u64::from_str_radix(hex.trim_start_matches("0x"), 16)
            .map_err(|_| IndexerError::Unavailable("malformed eth_blockNumber response".to_string()))
    }

    /// Fetches+decodes `heights` with up to `batch_window` in flight, then
    /// persists them one at a time in ascending order. A fetch failure for
    /// a single block aborts the whole window (the chain driver will retry
    /// from the last committed cursor on the next loop iteration); a
    /// `ParentHashMismatch` from the store aborts it with a reorg signal.
    async fn fetch_and_persist_window(
        &self,
        heights: Vec<u64>,
        cancel: &CancellationToken,
    ) -> Result<(), IngestWindowOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.batch_window));
        let mut handles = Vec::with_capacity(heights.len());

        for height in heights {
            let semaphore = semaphore.clone();
            let pool = self.pool.clone();
            let classifier = self.classifier.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore is never closed");
                fetch_and_decode_block(height, &pool, &classifier, &cancel).await
            }));
        }

        for handle in handles {
            if cancel.is_cancelled() {
                return Ok(());
            }
            let fetched = match handle.await {
                Ok(Ok(fetched)) => fetched,
                Ok(Err(error)) => {
                    tracing::warn!(%error, "block fetch failed, aborting window");
                    return Ok(());
                }
                Err(join_error) => {
                    return Err(IngestWindowOutcome::Fatal(IndexerError::Unavailable(format!(
                        "block fetch task panicked: {join_error}"
                    ))));
                }
            };

            tracing::debug!(state = %IngestorState::Persisting, height = fetched.height, "persisting block");
            let transfers = fetched.unit.transfers.clone();
            match self.store.persist_block(fetched.unit).await {
                Ok(()) => self.enqueue_metadata_jobs(&transfers).await,
                Err(StoreError::ParentHashMismatch { parent_height, .. }) => {
                    return Err(IngestWindowOutcome::Reorg(parent_height));
                }
                Err(other) => return Err(IngestWindowOutcome::Fatal(other.into())),
            }
        }

        Ok(())
    }
}

enum IngestWindowOutcome {
    Reorg(u64),
    Fatal(IndexerError),
}

/// The next batch of heights to fetch, `(from, safe]` capped at
/// `batch_window` entries. `None` means we're caught up and should idle.
fn next_window(from: u64, safe: u64, batch_window: usize) -> Option<Vec<u64>> {
    if from >= safe {
        return None;
    }
    let window_end = safe.min(from + batch_window as u64);
    Some(((from + 1)..=window_end).collect())
}

/// FETCHING + DECODING for one block (§4.5): `eth_getBlockByNumber(H, true)`
/// followed by a per-transaction `eth_getTransactionReceipt` (concurrent
/// within the block), then the C3 decoder over every receipt's logs and the
/// C4 classifier over every contract-creation receipt.
async fn fetch_and_decode_block(
    height: u64,
    pool: &SharedRpcPool,
    classifier: &ContractClassifier,
    cancel: &CancellationToken,
) -> Result<FetchedBlock, IndexerError> {
    tracing::debug!(state = %IngestorState::Fetching, height, "fetching block");
    let hex_height = format!("0x{height:x}");
    let raw_block: RawBlock = pool
        .call("eth_getBlockByNumber", json!([hex_height, true]), cancel)
        .await?;

    let block_number = raw_block
        .number_u64()
        .ok_or_else(|| IndexerError::Unavailable("block missing number".to_string()))?;
    let block_hash: Hash32 = raw_block
        .hash
        .parse()
        .map_err(|_| IndexerError::Unavailable("malformed block hash".to_string()))?;
    let parent_hash: Hash32 = raw_block
        .parent_hash
        .parse()
        .map_err(|_| IndexerError::Unavailable("malformed parent hash".to_string()))?;
    let miner: Addr = raw_block
        .miner
        .parse()
        .map_err(|_| IndexerError::Unavailable("malformed miner address".to_string()))?;
    let timestamp = raw_block
        .timestamp_u64()
        .and_then(|secs| chrono::DateTime::<chrono::Utc>::from_timestamp(secs as i64, 0))
        .ok_or_else(|| IndexerError::Unavailable("malformed block timestamp".to_string()))?;

    let block = studio_indexer_types::Block {
        number: block_number,
        hash: block_hash,
        parent_hash,
        timestamp,
        miner,
        gas_limit: raw_block.gas_limit_u256().map(Amount::new).unwrap_or(Amount::ZERO),
        gas_used: raw_block.gas_used_u256().map(Amount::new).unwrap_or(Amount::ZERO),
        difficulty: Amount::new(raw_block.difficulty_u256()),
        extra_data: raw_block.extra_data.clone(),
        nonce: raw_block.nonce.clone(),
    };

    tracing::debug!(state = %IngestorState::Decoding, height, tx_count = raw_block.transactions.len());

    let mut transactions = Vec::with_capacity(raw_block.transactions.len());
    let mut raw_logs = Vec::new();
    let mut event_logs = Vec::new();
    let mut new_contracts = Vec::new();

    let receipt_futures = raw_block.transactions.iter().map(|tx| {
        let pool = pool.clone();
        let cancel = cancel.clone();
        let tx_hash = tx.hash.clone();
        async move {
            let receipt: RawReceipt = pool
                .call("eth_getTransactionReceipt", json!([tx_hash]), &cancel)
                .await?;
            Ok::<_, IndexerError>(receipt)
        }
    });
    let receipts = futures_util::future::try_join_all(receipt_futures).await?;

    for (tx, receipt) in raw_block.transactions.iter().zip(receipts.iter()) {
        let tx_hash: Hash32 = tx
            .hash
            .parse()
            .map_err(|_| IndexerError::Unavailable("malformed tx hash".to_string()))?;
        let from: Addr = tx
            .from
            .parse()
            .map_err(|_| IndexerError::Unavailable("malformed from address".to_string()))?;
        let to: Option<Addr> = match &tx.to {
            Some(addr) => Some(
                addr.parse()
                    .map_err(|_| IndexerError::Unavailable("malformed to address".to_string()))?,
            ),
            None => None,
        };
        let contract_address: Option<Addr> = match &receipt.contract_address {
            Some(addr) => Some(
                addr.parse()
                    .map_err(|_| IndexerError::Unavailable("malformed contract address".to_string()))?,
            ),
            None => None,
        };

        transactions.push(studio_indexer_types::Transaction {
            hash: tx_hash,
            block_number,
            transaction_index: receipt.transaction_index_u32().unwrap_or(0),
            from,
            to,
            value: tx.value_u256().map(Amount::new).unwrap_or(Amount::ZERO),
            gas_price: Amount::new(tx.gas_price_u256()),
            gas_limit: tx.gas_limit_u256().map(Amount::new).unwrap_or(Amount::ZERO),
            gas_used: receipt.gas_used_u256().map(Amount::new).unwrap_or(Amount::ZERO),
            input: tx.input.clone(),
            nonce: tx.nonce_u64().unwrap_or(0),
            status: receipt.status_bool(),
            timestamp,
            contract_address,
        });

        if let Some(address) = contract_address {
            // `classify` never returns `NotAContract` here: `eth_getCode`
            // already told us this address holds code (it's where the
            // receipt said the contract landed).
            if let Classification::Classified(contract_type) = classifier.classify(address, cancel).await {
                new_contracts.push(Contract {
                    address,
                    creator: from,
                    creation_tx_hash: tx_hash,
                    creation_block: block_number,
                    contract_type,
                    name: None,
                    symbol: None,
                    decimals: None,
                    total_supply: None,
                    transaction_count: 0,
                    verified: false,
                    source_code: None,
                    compiler_version: None,
                    optimization_used: None,
                    runs: None,
                    evm_version: None,
                    constructor_arguments: None,
                    libraries: None,
                    abi: None,
                    verified_at: None,
                });
            }
        }

        for log in &receipt.logs {
            let topics: Vec<Hash32> = log
                .topics
                .iter()
                .filter_map(|t| t.parse().ok())
                .collect();
            if topics.len() != log.topics.len() {
                tracing::warn!(tx_hash = %tx_hash, "skipping log with malformed topic");
                continue;
            }
            let log_address: Addr = match log.address.parse() {
                Ok(addr) => addr,
                Err(_) => {
                    tracing::warn!(tx_hash = %tx_hash, "skipping log with malformed address");
                    continue;
                }
            };
            let log_index = log.log_index_u32().unwrap_or(0);
            let data = log.data_bytes();

            raw_logs.push(RawLog {
                address: log_address,
                topics: topics.clone(),
                data: data.clone(),
                transaction_hash: tx_hash,
                log_index,
                block_number,
                timestamp,
            });

            let mut topic_iter = topics.iter();
            let topic0 = topic_iter.next().copied();
            let topic1 = topic_iter.next().copied();
            let topic2 = topic_iter.next().copied();
            let topic3 = topic_iter.next().copied();
            event_logs.push(EventLog {
                transaction_hash: tx_hash,
                log_index,
                block_number,
                address: log_address,
                topic0,
                topic1,
                topic2,
                topic3,
                data: format!("0x{}", hex::encode(&data)),
                timestamp,
            });
        }
    }

    let transfers = decoder::decode_logs(&raw_logs);

    Ok(FetchedBlock {
        height,
        unit: BlockUnit {
            block: Some(block),
            transactions,
            transfers,
            logs: event_logs,
            new_contracts,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_when_caught_up() {
        assert_eq!(next_window(100, 100, 8), None);
        assert_eq!(next_window(100, 99, 8), None);
    }

    #[test]
    fn window_caps_at_batch_window() {
        assert_eq!(next_window(100, 200, 8), Some((101..=108).collect()));
    }

    #[test]
    fn window_shrinks_to_available_range_near_tip() {
        assert_eq!(next_window(100, 103, 8), Some(vec![101, 102, 103]));
    }

    #[test]
    fn ingestor_state_display_matches_tracing_field_values() {
        assert_eq!(IngestorState::Fetching.to_string(), "fetching");
        assert_eq!(IngestorState::ReorgDetected.to_string(), "reorg_detected");
    }
}
