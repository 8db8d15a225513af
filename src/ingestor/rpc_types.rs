//! Minimal JSON-RPC response shapes for `eth_getBlockByNumber` and
//! `eth_getTransactionReceipt` (§6.1).
//!
//! Deliberately not `alloy_rpc_types_eth::Block`/`TransactionReceipt`: those
//! carry many fields this indexer never reads, and hand-rolled DTOs keep the
//! wire contract explicit and easy to audit against §3's entity shapes.
//! Every quantity field is the JSON-RPC `QUANTITY` hex-string encoding.

use alloy_primitives::U256;
use serde::Deserialize;

fn parse_hex_u64(s: &str) -> Option<u64> {
    u64::from_str_radix(s.trim_start_matches("0x"), 16).ok()
}

fn parse_hex_u256(s: &str) -> Option<U256> {
    U256::from_str_radix(s.trim_start_matches("0x"), 16).ok()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBlock {
    pub number: String,
    pub hash: String,
    pub parent_hash: String,
    pub timestamp: String,
    pub miner: String,
    pub gas_limit: String,
    pub gas_used: String,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub extra_data: String,
    #[serde(default)]
    pub nonce: String,
    pub transactions: Vec<RawTransaction>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    pub value: String,
    #[serde(default)]
    pub gas_price: Option<String>,
    pub gas: String,
    pub input: String,
    pub nonce: String,
    pub transaction_index: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReceipt {
    pub transaction_hash: String,
    pub transaction_index: String,
    pub status: Option<String>,
    pub gas_used: String,
    pub contract_address: Option<String>,
    pub logs: Vec<RawLogEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLogEntry {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub log_index: String,
}

impl RawBlock {
    pub fn number_u64(&self) -> Option<u64> {
        parse_hex_u64(&self.number)
    }

    pub fn timestamp_u64(&self) -> Option<u64> {
        parse_hex_u64(&self.timestamp)
    }

    pub fn gas_limit_u256(&self) -> Option<U256> {
        parse_hex_u256(&self.gas_limit)
    }

    pub fn gas_used_u256(&self) -> Option<U256> {
        parse_hex_u256(&self.gas_used)
    }

    pub fn difficulty_u256(&self) -> U256 {
        self.difficulty
            .as_deref()
            .and_then(parse_hex_u256)
            .unwrap_or(U256::ZERO)
    }
}

impl RawTransaction {
    pub fn value_u256(&self) -> Option<U256> {
        parse_hex_u256(&self.value)
    }

    pub fn gas_price_u256(&self) -> U256 {
        self.gas_price.as_deref().and_then(parse_hex_u256).unwrap_or(U256::ZERO)
    }

    pub fn gas_limit_u256(&self) -> Option<U256> {
        parse_hex_u256(&self.gas)
    }

    pub fn nonce_u64(&self) -> Option<u64> {
        parse_hex_u64(&self.nonce)
    }
}

impl RawReceipt {
    pub fn transaction_index_u32(&self) -> Option<u32> {
        parse_hex_u64(&self.transaction_index).map(|v| v as u32)
    }

    pub fn status_bool(&self) -> bool {
        self.status.as_deref().and_then(parse_hex_u64).unwrap_or(1) == 1
    }

    pub fn gas_used_u256(&self) -> Option<U256> {
        parse_hex_u256(&self.gas_used)
    }
}

impl RawLogEntry {
    pub fn log_index_u32(&self) -> Option<u32> {
        parse_hex_u64(&self.log_index).map(|v| v as u32)
    }

    pub fn data_bytes(&self) -> Vec<u8> {
        let trimmed = self.data.trim_start_matches("0x");
        hex::decode(trimmed).unwrap_or_default()
    }
}
