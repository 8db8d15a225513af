//! ERC-20/721/1155 transfer log decoder (C3, §4.3).
//!
//! Stateless and never calls the chain: given a block's logs it either
//! produces zero, one, or (for `TransferBatch`) several [`TokenTransfer`]
//! records per log, in the original log order. A malformed log is skipped
//! with a warning, never a hard error — a single bad log must not drop the
//! rest of the block.

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use studio_indexer_types::{Addr, Amount, Hash32, TokenTransfer, TokenType};

alloy_sol_types::sol! {
    event Transfer(address from, address to, uint256 value);
    event TransferSingle(address operator, address from, address to, uint256 id, uint256 value);
    event TransferBatch(address operator, address from, address to, uint256[] ids, uint256[] values);
}

/// A log entry as read off the chain, independent of whatever RPC response
/// type produced it — the ingestor is responsible for building these from
/// `alloy_rpc_types_eth::Log`.
#[derive(Debug, Clone)]
pub struct RawLog {
    pub address: Addr,
    pub topics: Vec<Hash32>,
    pub data: Vec<u8>,
    pub transaction_hash: Hash32,
    pub log_index: u32,
    pub block_number: u64,
    pub timestamp: DateTime<Utc>,
}

/// Decodes every transfer-shaped log in `logs`, preserving the input order.
/// Logs that don't match any known signature are silently ignored (they're
/// not malformed, just not transfers); logs that match a signature but carry
/// a malformed payload are skipped with a `tracing::warn!`.
pub fn decode_logs(logs: &[RawLog]) -> Vec<TokenTransfer> {
    let mut out = Vec::new();
    for log in logs {
        match decode_one(log) {
            Ok(mut transfers) => out.append(&mut transfers),
            Err(DecodeOutcome::NotATransfer) => {}
            Err(DecodeOutcome::Malformed(reason)) => {
                tracing::warn!(
                    tx_hash = %log.transaction_hash,
                    log_index = log.log_index,
                    reason,
                    "skipping malformed transfer log"
                );
            }
        }
    }
    out
}

enum DecodeOutcome {
    NotATransfer,
    Malformed(&'static str),
}

fn decode_one(log: &RawLog) -> Result<Vec<TokenTransfer>, DecodeOutcome> {
    let Some(topic0) = log.topics.first() else {
        return Err(DecodeOutcome::NotATransfer);
    };

    if topic0.inner() == Transfer::SIGNATURE_HASH {
        return decode_transfer(log);
    }
    if topic0.inner() == TransferSingle::SIGNATURE_HASH {
        return decode_transfer_single(log);
    }
    if topic0.inner() == TransferBatch::SIGNATURE_HASH {
        return decode_transfer_batch(log);
    }
    Err(DecodeOutcome::NotATransfer)
}

fn addr_from_topic(topic: &Hash32) -> Addr {
    let bytes = topic.inner();
    Addr::from(alloy_primitives::Address::from_slice(&bytes.as_slice()[12..]))
}

fn decode_uint256(data: &[u8]) -> Option<U256> {
    if data.len() < 32 {
        return None;
    }
    Some(U256::from_be_slice(&data[..32]))
}

/// `Transfer(address,address,uint256)`. Topic arity is the sole
/// disambiguator (§4.3): exactly 3 topics (sig + 2 indexed addresses) means
/// the third parameter travelled in `data`, i.e. ERC-20; 4 topics (sig +
/// from + to + indexed token id) means ERC-721.
fn decode_transfer(log: &RawLog) -> Result<Vec<TokenTransfer>, DecodeOutcome> {
    if log.topics.len() < 3 {
        return Err(DecodeOutcome::Malformed("Transfer log has fewer than 3 topics"));
    }
    let from = addr_from_topic(&log.topics[1]);
    let to = addr_from_topic(&log.topics[2]);

    if log.topics.len() >= 4 {
        let token_id = decode_uint256(log.topics[3].inner().as_slice())
            .ok_or(DecodeOutcome::Malformed("ERC-721 Transfer token id unreadable"))?;
        return Ok(vec![TokenTransfer {
            transaction_hash: log.transaction_hash,
            log_index: log.log_index,
            block_number: log.block_number,
            token_address: log.address,
            from,
            to,
            value: Amount::ONE,
            token_type: TokenType::Erc721,
            token_id: Some(token_id.to_string()),
            timestamp: log.timestamp,
        }]);
    }

    let value =
        decode_uint256(&log.data).ok_or(DecodeOutcome::Malformed("ERC-20 Transfer value unreadable"))?;

    Ok(vec![TokenTransfer {
        transaction_hash: log.transaction_hash,
        log_index: log.log_index,
        block_number: log.block_number,
        token_address: log.address,
        from,
        to,
        value: Amount::new(value),
        token_type: TokenType::Erc20,
        token_id: None,
        timestamp: log.timestamp,
    }])
}

/// `TransferSingle(operator, from, to, id, value)` -> one ERC-1155 record.
fn decode_transfer_single(log: &RawLog) -> Result<Vec<TokenTransfer>, DecodeOutcome> {
    if log.topics.len() < 4 {
        return Err(DecodeOutcome::Malformed("TransferSingle log has fewer than 4 topics"));
    }
    let from = addr_from_topic(&log.topics[2]);
    let to = addr_from_topic(&log.topics[3]);

    if log.data.len() < 64 {
        return Err(DecodeOutcome::Malformed("TransferSingle data shorter than two words"));
    }
    let id = U256::from_be_slice(&log.data[0..32]);
    let value = U256::from_be_slice(&log.data[32..64]);

    Ok(vec![TokenTransfer {
        transaction_hash: log.transaction_hash,
        log_index: log.log_index,
        block_number: log.block_number,
        token_address: log.address,
        from,
        to,
        value: Amount::new(value),
        token_type: TokenType::Erc1155,
        token_id: Some(id.to_string()),
        timestamp: log.timestamp,
    }])
}

/// `TransferBatch(operator, from, to, ids[], values[])` -> one record per
/// `(id, value)` pair. §4.3: on a length mismatch between `ids` and
/// `values`, emit `min(len(ids), len(values))` records and log a decode
/// warning rather than failing the whole log.
fn decode_transfer_batch(log: &RawLog) -> Result<Vec<TokenTransfer>, DecodeOutcome> {
    if log.topics.len() < 4 {
        return Err(DecodeOutcome::Malformed("TransferBatch log has fewer than 4 topics"));
    }
    let from = addr_from_topic(&log.topics[2]);
    let to = addr_from_topic(&log.topics[3]);

    let ids = decode_dynamic_uint256_array(&log.data, 0)
        .ok_or(DecodeOutcome::Malformed("TransferBatch ids array unreadable"))?;
    let values = decode_dynamic_uint256_array(&log.data, 32)
        .ok_or(DecodeOutcome::Malformed("TransferBatch values array unreadable"))?;

    if ids.len() != values.len() {
        tracing::warn!(
            tx_hash = %log.transaction_hash,
            log_index = log.log_index,
            ids_len = ids.len(),
            values_len = values.len(),
            "TransferBatch ids/values length mismatch, truncating to the shorter length"
        );
    }

    let count = ids.len().min(values.len());
    Ok((0..count)
        .map(|i| TokenTransfer {
            transaction_hash: log.transaction_hash,
            log_index: log.log_index,
            block_number: log.block_number,
            token_address: log.address,
            from,
            to,
            value: Amount::new(values[i]),
            token_type: TokenType::Erc1155,
            token_id: Some(ids[i].to_string()),
            timestamp: log.timestamp,
        })
        .collect())
}

/// Reads the dynamic `uint256[]` whose head-offset word sits at
/// `head_word_offset` within `data` (ABI tuple encoding: each dynamic
/// parameter's head slot holds a byte offset, relative to the start of
/// `data`, to a `[length, items...]` tail).
fn decode_dynamic_uint256_array(data: &[u8], head_word_offset: usize) -> Option<Vec<U256>> {
    if data.len() < head_word_offset + 32 {
        return None;
    }
    let offset = U256::from_be_slice(&data[head_word_offset..head_word_offset + 32]).to::<usize>();
    if data.len() < offset + 32 {
        return None;
    }
    let len = U256::from_be_slice(&data[offset..offset + 32]).to::<usize>();
    let items_start = offset + 32;
    let needed = len.checked_mul(32)?;
    if data.len() < items_start + needed {
        return None;
    }
    Some(
        (0..len)
            .map(|i| {
                let start = items_start + i * 32;
                U256::from_be_slice(&data[start..start + 32])
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, B256};

    fn addr(byte: u8) -> Addr {
        Addr::from(Address::with_last_byte(byte))
    }

    fn topic_for_address(addr: Addr) -> Hash32 {
        let mut bytes = [0u8; 32];
        bytes[12..].copy_from_slice(addr.inner().as_slice());
        Hash32::from(B256::from(bytes))
    }

    fn word(value: u64) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&value.to_be_bytes());
        bytes
    }

    fn base_log(topics: Vec<Hash32>, data: Vec<u8>) -> RawLog {
        RawLog {
            address: addr(1),
            topics,
            data,
            transaction_hash: Hash32::from(B256::with_last_byte(7)),
            log_index: 0,
            block_number: 100,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn three_topic_transfer_decodes_as_erc20() {
        let log = base_log(
            vec![
                Hash32::from(Transfer::SIGNATURE_HASH),
                topic_for_address(addr(2)),
                topic_for_address(addr(3)),
            ],
            word(1000).to_vec(),
        );
        let transfers = decode_logs(&[log]);
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].token_type, TokenType::Erc20);
        assert_eq!(transfers[0].value, Amount::from(1000u64));
        assert_eq!(transfers[0].token_id, None);
    }

    #[test]
    fn three_topic_transfer_with_empty_data_is_skipped_as_malformed() {
        let log = base_log(
            vec![
                Hash32::from(Transfer::SIGNATURE_HASH),
                topic_for_address(addr(2)),
                topic_for_address(addr(3)),
            ],
            vec![],
        );
        assert!(decode_logs(&[log]).is_empty());
    }

    #[test]
    fn four_topic_transfer_decodes_as_erc721() {
        let log = base_log(
            vec![
                Hash32::from(Transfer::SIGNATURE_HASH),
                topic_for_address(addr(2)),
                topic_for_address(addr(3)),
                Hash32::from(B256::from(word(5))),
            ],
            vec![],
        );
        let transfers = decode_logs(&[log]);
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].token_type, TokenType::Erc721);
        assert_eq!(transfers[0].token_id.as_deref(), Some("5"));
        assert_eq!(transfers[0].value, Amount::ONE);
    }

    #[test]
    fn transfer_single_decodes_one_erc1155_record() {
        let mut data = Vec::new();
        data.extend_from_slice(&word(9));
        data.extend_from_slice(&word(3));
        let log = base_log(
            vec![
                Hash32::from(TransferSingle::SIGNATURE_HASH),
                topic_for_address(addr(9)),
                topic_for_address(addr(2)),
                topic_for_address(addr(3)),
            ],
            data,
        );
        let transfers = decode_logs(&[log]);
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].token_type, TokenType::Erc1155);
        assert_eq!(transfers[0].token_id.as_deref(), Some("9"));
        assert_eq!(transfers[0].value, Amount::from(3u64));
    }

    #[test]
    fn transfer_batch_decodes_one_record_per_pair() {
        // heads: offset to ids (64), offset to values (64 + 32*3 = 160)
        let mut data = Vec::new();
        data.extend_from_slice(&word(64));
        data.extend_from_slice(&word(160));
        // ids: len 2, [1, 2]
        data.extend_from_slice(&word(2));
        data.extend_from_slice(&word(1));
        data.extend_from_slice(&word(2));
        // values: len 2, [10, 20]
        data.extend_from_slice(&word(2));
        data.extend_from_slice(&word(10));
        data.extend_from_slice(&word(20));

        let log = base_log(
            vec![
                Hash32::from(TransferBatch::SIGNATURE_HASH),
                topic_for_address(addr(9)),
                topic_for_address(addr(2)),
                topic_for_address(addr(3)),
            ],
            data,
        );
        let transfers = decode_logs(&[log]);
        assert_eq!(transfers.len(), 2);
        assert_eq!(transfers[0].token_id.as_deref(), Some("1"));
        assert_eq!(transfers[0].value, Amount::from(10u64));
        assert_eq!(transfers[1].token_id.as_deref(), Some("2"));
        assert_eq!(transfers[1].value, Amount::from(20u64));
    }

    #[test]
    fn transfer_batch_length_mismatch_truncates_to_shorter() {
        let mut data = Vec::new();
        data.extend_from_slice(&word(64));
        data.extend_from_slice(&word(128 + 32));
        // ids: len 2, [1, 2]
        data.extend_from_slice(&word(2));
        data.extend_from_slice(&word(1));
        data.extend_from_slice(&word(2));
        // values: len 1, [10]
        data.extend_from_slice(&word(1));
        data.extend_from_slice(&word(10));

        let log = base_log(
            vec![
                Hash32::from(TransferBatch::SIGNATURE_HASH),
                topic_for_address(addr(9)),
                topic_for_address(addr(2)),
                topic_for_address(addr(3)),
            ],
            data,
        );
        let transfers = decode_logs(&[log]);
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].token_id.as_deref(), Some("1"));
        assert_eq!(transfers[0].value, Amount::from(10u64));
    }

    #[test]
    fn unrelated_log_is_ignored_without_warning() {
        let log = base_log(vec![Hash32::from(B256::with_last_byte(0xff))], vec![]);
        assert!(decode_logs(&[log]).is_empty());
    }
}
