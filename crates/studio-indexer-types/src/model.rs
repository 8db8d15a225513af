//! Domain entities (§3 of the spec).
//!
//! These are pure value objects: the store (`studio-indexer-store`) accepts
//! and returns them, the decoder/classifier produce them, but no entity
//! holds a reference back into a database connection or RPC client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::hexid::{Addr, Hash32};

/// ERC token standard a contract was classified as, or `Unknown`.
///
/// `contract_type` is immutable once it leaves `Unknown` (§3 invariant);
/// the store enforces that, this enum just carries the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContractType {
    Erc20,
    Erc721,
    Erc1155,
    Unknown,
}

impl ContractType {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            ContractType::Erc20 => "ERC20",
            ContractType::Erc721 => "ERC721",
            ContractType::Erc1155 => "ERC1155",
            ContractType::Unknown => "UNKNOWN",
        }
    }

    pub fn from_db_str(s: &str) -> Self {
        match s {
            "ERC20" => ContractType::Erc20,
            "ERC721" => ContractType::Erc721,
            "ERC1155" => ContractType::Erc1155,
            _ => ContractType::Unknown,
        }
    }
}

/// Classification of an address as seen by the query facade (C8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    Wallet,
    Contract,
    Token,
}

/// Token standard a single `TokenTransfer` belongs to. Distinct from
/// `ContractType` because the decoder (C3) classifies per-log, cheaply and
/// without chain calls, while the classifier (C4) classifies per-contract
/// authoritatively; the two can disagree transiently (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TokenType {
    Erc20,
    Erc721,
    Erc1155,
}

impl TokenType {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            TokenType::Erc20 => "ERC20",
            TokenType::Erc721 => "ERC721",
            TokenType::Erc1155 => "ERC1155",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "ERC20" => Some(TokenType::Erc20),
            "ERC721" => Some(TokenType::Erc721),
            "ERC1155" => Some(TokenType::Erc1155),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub number: u64,
    pub hash: Hash32,
    pub parent_hash: Hash32,
    pub timestamp: DateTime<Utc>,
    pub miner: Addr,
    pub gas_limit: Amount,
    pub gas_used: Amount,
    pub difficulty: Amount,
    pub extra_data: String,
    pub nonce: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub hash: Hash32,
    pub block_number: u64,
    pub transaction_index: u32,
    pub from: Addr,
    pub to: Option<Addr>,
    pub value: Amount,
    pub gas_price: Amount,
    pub gas_limit: Amount,
    pub gas_used: Amount,
    pub input: String,
    pub nonce: u64,
    pub status: bool,
    pub timestamp: DateTime<Utc>,
    /// Present only when this transaction created a contract.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<Addr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub address: Addr,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub address: Addr,
    pub creator: Addr,
    pub creation_tx_hash: Hash32,
    pub creation_block: u64,
    pub contract_type: ContractType,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
    pub total_supply: Option<Amount>,
    pub transaction_count: u64,
    pub verified: bool,
    pub source_code: Option<String>,
    pub compiler_version: Option<String>,
    pub optimization_used: Option<bool>,
    pub runs: Option<u32>,
    pub evm_version: Option<String>,
    pub constructor_arguments: Option<String>,
    pub libraries: Option<serde_json::Value>,
    pub abi: Option<serde_json::Value>,
    pub verified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransfer {
    pub transaction_hash: Hash32,
    pub log_index: u32,
    pub block_number: u64,
    pub token_address: Addr,
    pub from: Addr,
    pub to: Addr,
    pub value: Amount,
    pub token_type: TokenType,
    pub token_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TokenTransfer {
    /// The logical key from §3: `(transaction_hash, token_address, from, to,
    /// coalesce(token_id, ''))`. `log_index` is carried for ordering only
    /// and is not part of the identity, so re-processing the same event
    /// twice is still an idempotent upsert.
    pub fn logical_key(&self) -> (Hash32, Addr, Addr, Addr, String) {
        (
            self.transaction_hash,
            self.token_address,
            self.from,
            self.to,
            self.token_id.clone().unwrap_or_default(),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftToken {
    pub token_address: Addr,
    pub token_id: String,
    pub owner: Addr,
    pub metadata_uri: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftMetadata {
    pub token_address: Addr,
    pub token_id: String,
    pub document: serde_json::Value,
    pub resolved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftCollection {
    pub token_address: Addr,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub total_supply: Option<Amount>,
    pub owner_count: Option<u64>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLog {
    pub transaction_hash: Hash32,
    pub log_index: u32,
    pub block_number: u64,
    pub address: Addr,
    pub topic0: Option<Hash32>,
    pub topic1: Option<Hash32>,
    pub topic2: Option<Hash32>,
    pub topic3: Option<Hash32>,
    pub data: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexerCursor {
    pub latest_processed: u64,
    pub latest_finalized: u64,
}
