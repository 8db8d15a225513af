//! Read-only queries backing the query facade (C8, §4.8).
//!
//! Every method here takes an already-clamped [`studio_indexer_types::Page`]
//! — clamping is the query facade's job, not the store's — and returns
//! rows in the deterministic order §4.2 specifies.

use chrono::{DateTime, Utc};
use serde_json::Value;
use studio_indexer_types::{
    Account, AddressKind, Block, Contract, ContractType, NftCollection,
    NftToken, Page, TokenTransfer, TokenType,
};

use crate::error::StoreResult;
use crate::store::Store;

/// Optional filters for `getTokenTransfers` (§4.8).
#[derive(Debug, Clone, Default)]
pub struct TokenTransferFilter {
    pub token_address: Option<String>,
    pub account_address: Option<String>,
    pub token_type: Option<TokenType>,
}

/// Lightweight activity summary used by the account-balances / address-type
/// endpoints (§6.2 `/address/:address/type`, `/account/:address/balances`).
#[derive(Debug, Clone)]
pub struct AddressActivity {
    pub kind: AddressKind,
    pub transaction_count: u64,
}

#[derive(sqlx::FromRow)]
struct BlockRow {
    number: i64,
    hash: String,
    parent_hash: String,
    timestamp: DateTime<Utc>,
    miner: String,
    gas_limit: String,
    gas_used: String,
    difficulty: String,
    extra_data: String,
    nonce: String,
}

impl From<BlockRow> for Block {
    fn from(row: BlockRow) -> Self {
        Block {
            number: row.number as u64,
            hash: row.hash.parse().expect("valid hash from db"),
            parent_hash: row.parent_hash.parse().expect("valid hash from db"),
            timestamp: row.timestamp,
            miner: row.miner.parse().expect("valid address from db"),
            gas_limit: row.gas_limit.parse().expect("valid amount from db"),
            gas_used: row.gas_used.parse().expect("valid amount from db"),
            difficulty: row.difficulty.parse().expect("valid amount from db"),
            extra_data: row.extra_data,
            nonce: row.nonce,
        }
    }
}

const BLOCK_COLUMNS: &str =
    "number, hash, parent_hash, timestamp, miner, gas_limit, gas_used, difficulty, extra_data, nonce";

#[derive(sqlx::FromRow)]
struct TransactionRow {
    hash: String,
    block_number: i64,
    transaction_index: i32,
    from_address: String,
    to_address: Option<String>,
    value: String,
    gas_price: String,
    gas_limit: String,
    gas_used: String,
    input: String,
    nonce: i64,
    status: bool,
    timestamp: DateTime<Utc>,
    contract_address: Option<String>,
}

impl From<TransactionRow> for studio_indexer_types::Transaction {
    fn from(row: TransactionRow) -> Self {
        studio_indexer_types::Transaction {
            hash: row.hash.parse().expect("valid hash from db"),
            block_number: row.block_number as u64,
            transaction_index: row.transaction_index as u32,
            from: row.from_address.parse().expect("valid address from db"),
            to: row.to_address.map(|a| a.parse().expect("valid address from db")),
            value: row.value.parse().expect("valid amount from db"),
            gas_price: row.gas_price.parse().expect("valid amount from db"),
            gas_limit: row.gas_limit.parse().expect("valid amount from db"),
            gas_used: row.gas_used.parse().expect("valid amount from db"),
            input: row.input,
            nonce: row.nonce as u64,
            status: row.status,
            timestamp: row.timestamp,
            contract_address: row.contract_address.map(|a| a.parse().expect("valid address from db")),
        }
    }
}

const TRANSACTION_COLUMNS: &str = "hash, block_number, transaction_index, from_address, to_address, value, gas_price, gas_limit, gas_used, input, nonce, status, timestamp, contract_address";

#[derive(sqlx::FromRow)]
struct TransferRow {
    transaction_hash: String,
    log_index: i32,
    block_number: i64,
    token_address: String,
    from_address: String,
    to_address: String,
    value: String,
    token_type: String,
    token_id: Option<String>,
    timestamp: DateTime<Utc>,
}

impl From<TransferRow> for TokenTransfer {
    fn from(row: TransferRow) -> Self {
        TokenTransfer {
            transaction_hash: row.transaction_hash.parse().expect("valid hash from db"),
            log_index: row.log_index as u32,
            block_number: row.block_number as u64,
            token_address: row.token_address.parse().expect("valid address from db"),
            from: row.from_address.parse().expect("valid address from db"),
            to: row.to_address.parse().expect("valid address from db"),
            value: row.value.parse().expect("valid amount from db"),
            token_type: TokenType::from_db_str(&row.token_type).unwrap_or(TokenType::Erc20),
            token_id: row.token_id,
            timestamp: row.timestamp,
        }
    }
}

const TRANSFER_COLUMNS: &str = "transaction_hash, log_index, block_number, token_address, from_address, to_address, value, token_type, token_id, timestamp";

#[derive(sqlx::FromRow)]
struct NftTokenRow {
    token_address: String,
    token_id: String,
    owner: String,
    metadata_uri: Option<String>,
    name: Option<String>,
    description: Option<String>,
    image_url: Option<String>,
    last_updated: DateTime<Utc>,
}

impl From<NftTokenRow> for NftToken {
    fn from(row: NftTokenRow) -> Self {
        NftToken {
            token_address: row.token_address.parse().expect("valid address from db"),
            token_id: row.token_id,
            owner: row.owner.parse().expect("valid address from db"),
            metadata_uri: row.metadata_uri,
            name: row.name,
            description: row.description,
            image_url: row.image_url,
            last_updated: row.last_updated,
        }
    }
}

const NFT_TOKEN_COLUMNS: &str =
    "token_address, token_id, owner, metadata_uri, name, description, image_url, last_updated";

#[derive(sqlx::FromRow)]
struct NftCollectionRow {
    token_address: String,
    name: Option<String>,
    symbol: Option<String>,
    total_supply: Option<String>,
    owner_count: Option<i64>,
    last_updated: DateTime<Utc>,
}

impl From<NftCollectionRow> for NftCollection {
    fn from(row: NftCollectionRow) -> Self {
        NftCollection {
            token_address: row.token_address.parse().expect("valid address from db"),
            name: row.name,
            symbol: row.symbol,
            total_supply: row.total_supply.map(|v| v.parse().expect("valid amount from db")),
            owner_count: row.owner_count.map(|v| v as u64),
            last_updated: row.last_updated,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    address: String,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            address: row.address.parse().expect("valid address from db"),
            first_seen: row.first_seen,
            last_seen: row.last_seen,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ContractRow {
    address: String,
    creator: String,
    creation_tx_hash: String,
    creation_block: i64,
    contract_type: String,
    name: Option<String>,
    symbol: Option<String>,
    decimals: Option<i16>,
    total_supply: Option<String>,
    transaction_count: i64,
    verified: bool,
    source_code: Option<String>,
    compiler_version: Option<String>,
    optimization_used: Option<bool>,
    runs: Option<i32>,
    evm_version: Option<String>,
    constructor_arguments: Option<String>,
    libraries: Option<Value>,
    abi: Option<Value>,
    verified_at: Option<DateTime<Utc>>,
}

impl From<ContractRow> for Contract {
    fn from(row: ContractRow) -> Self {
        Contract {
            address: row.address.parse().expect("valid address from db"),
            creator: row.creator.parse().expect("valid address from db"),
            creation_tx_hash: row.creation_tx_hash.parse().expect("valid hash from db"),
            creation_block: row.creation_block as u64,
            contract_type: ContractType::from_db_str(&row.contract_type),
            name: row.name,
            symbol: row.symbol,
            decimals: row.decimals.map(|d| d as u8),
            total_supply: row.total_supply.map(|v| v.parse().expect("valid amount from db")),
            transaction_count: row.transaction_count as u64,
            verified: row.verified,
            source_code: row.source_code,
            compiler_version: row.compiler_version,
            optimization_used: row.optimization_used,
            runs: row.runs.map(|r| r as u32),
            evm_version: row.evm_version,
            constructor_arguments: row.constructor_arguments,
            libraries: row.libraries,
            abi: row.abi,
            verified_at: row.verified_at,
        }
    }
}

const CONTRACT_COLUMNS: &str = "address, creator, creation_tx_hash, creation_block, contract_type, name, symbol, decimals, total_supply, transaction_count, verified, source_code, compiler_version, optimization_used, runs, evm_version, constructor_arguments, libraries, abi, verified_at";

impl Store {
    pub async fn get_block_by_number(&self, number: u64) -> StoreResult<Option<Block>> {
        let row: Option<BlockRow> = sqlx::query_as(&format!(
            "SELECT {BLOCK_COLUMNS} FROM blocks WHERE number = $1"
        ))
        .bind(number as i64)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(Into::into))
    }

    pub async fn get_block_by_hash(&self, hash: &str) -> StoreResult<Option<Block>> {
        let row: Option<BlockRow> = sqlx::query_as(&format!(
            "SELECT {BLOCK_COLUMNS} FROM blocks WHERE hash = $1"
        ))
        .bind(hash)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(Into::into))
    }

    /// §8 ordering-determinism property: exactly the blocks with the
    /// `limit` highest numbers strictly below `latest - offset`, i.e. a
    /// plain descending `number` scan with `OFFSET`/`LIMIT`.
    pub async fn get_latest_blocks(&self, page: Page) -> StoreResult<Vec<Block>> {
        let rows: Vec<BlockRow> = sqlx::query_as(&format!(
            "SELECT {BLOCK_COLUMNS} FROM blocks ORDER BY number DESC LIMIT $1 OFFSET $2"
        ))
        .bind(page.limit as i64)
        .bind(page.offset as i64)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn get_blocks_by_miner(&self, miner: &str, page: Page) -> StoreResult<Vec<Block>> {
        let rows: Vec<BlockRow> = sqlx::query_as(&format!(
            "SELECT {BLOCK_COLUMNS} FROM blocks WHERE miner = $1 ORDER BY number DESC LIMIT $2 OFFSET $3"
        ))
        .bind(miner)
        .bind(page.limit as i64)
        .bind(page.offset as i64)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// All blocks mined by `miner` (§9: the corrected, non-sampling
    /// semantics for the validator-payout endpoint).
    pub async fn count_blocks_by_miner(&self, miner: &str) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blocks WHERE miner = $1")
            .bind(miner)
            .fetch_one(self.pool())
            .await?;
        Ok(count as u64)
    }

    pub async fn distinct_miners(&self) -> StoreResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT DISTINCT miner FROM blocks")
            .fetch_all(self.pool())
            .await?;
        Ok(rows.into_iter().map(|(m,)| m).collect())
    }

    pub async fn get_transaction(&self, hash: &str) -> StoreResult<Option<studio_indexer_types::Transaction>> {
        let row: Option<TransactionRow> = sqlx::query_as(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE hash = $1"
        ))
        .bind(hash)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(Into::into))
    }

    pub async fn get_latest_transactions(&self, page: Page) -> StoreResult<Vec<studio_indexer_types::Transaction>> {
        let rows: Vec<TransactionRow> = sqlx::query_as(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions ORDER BY block_number DESC, transaction_index DESC LIMIT $1 OFFSET $2"
        ))
        .bind(page.limit as i64)
        .bind(page.offset as i64)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn get_transactions_by_address(
        &self,
        address: &str,
        page: Page,
    ) -> StoreResult<Vec<studio_indexer_types::Transaction>> {
        let rows: Vec<TransactionRow> = sqlx::query_as(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE from_address = $1 OR to_address = $1 ORDER BY block_number DESC, transaction_index DESC LIMIT $2 OFFSET $3"
        ))
        .bind(address)
        .bind(page.limit as i64)
        .bind(page.offset as i64)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn count_transactions_since(&self, since: DateTime<Utc>) -> StoreResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM transactions WHERE timestamp >= $1")
                .bind(since)
                .fetch_one(self.pool())
                .await?;
        Ok(count as u64)
    }

    pub async fn get_token_transfers(
        &self,
        filter: &TokenTransferFilter,
        page: Page,
    ) -> StoreResult<Vec<TokenTransfer>> {
        let mut sql = format!("SELECT {TRANSFER_COLUMNS} FROM token_transfers WHERE 1=1");
        let mut binds: Vec<String> = Vec::new();
        if let Some(token) = &filter.token_address {
            binds.push(token.clone());
            sql.push_str(&format!(" AND token_address = ${}", binds.len()));
        }
        if let Some(account) = &filter.account_address {
            binds.push(account.clone());
            let idx = binds.len();
            sql.push_str(&format!(" AND (from_address = ${idx} OR to_address = ${idx})"));
        }
        if let Some(token_type) = filter.token_type {
            binds.push(token_type.as_db_str().to_string());
            sql.push_str(&format!(" AND token_type = ${}", binds.len()));
        }
        sql.push_str(&format!(
            " ORDER BY block_number DESC, log_index DESC LIMIT ${} OFFSET ${}",
            binds.len() + 1,
            binds.len() + 2
        ));

        let mut query = sqlx::query_as::<_, TransferRow>(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }
        query = query.bind(page.limit as i64).bind(page.offset as i64);
        let rows = query.fetch_all(self.pool()).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn get_nft_token(&self, token_address: &str, token_id: &str) -> StoreResult<Option<NftToken>> {
        let row: Option<NftTokenRow> = sqlx::query_as(&format!(
            "SELECT {NFT_TOKEN_COLUMNS} FROM nft_tokens WHERE token_address = $1 AND token_id = $2"
        ))
        .bind(token_address)
        .bind(token_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(Into::into))
    }

    pub async fn get_nfts_by_owner(&self, owner: &str, page: Page) -> StoreResult<Vec<NftToken>> {
        let rows: Vec<NftTokenRow> = sqlx::query_as(&format!(
            "SELECT {NFT_TOKEN_COLUMNS} FROM nft_tokens WHERE owner = $1 ORDER BY last_updated DESC LIMIT $2 OFFSET $3"
        ))
        .bind(owner)
        .bind(page.limit as i64)
        .bind(page.offset as i64)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn get_nft_collection(&self, token_address: &str) -> StoreResult<Option<NftCollection>> {
        let row: Option<NftCollectionRow> = sqlx::query_as(
            "SELECT token_address, name, symbol, total_supply, owner_count, last_updated FROM nft_collections WHERE token_address = $1",
        )
        .bind(token_address)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(Into::into))
    }

    pub async fn get_contract(&self, address: &str) -> StoreResult<Option<Contract>> {
        let row: Option<ContractRow> = sqlx::query_as(&format!(
            "SELECT {CONTRACT_COLUMNS} FROM contracts WHERE address = $1"
        ))
        .bind(address)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(Into::into))
    }

    pub async fn get_account(&self, address: &str) -> StoreResult<Option<Account>> {
        let row: Option<AccountRow> = sqlx::query_as(
            "SELECT address, first_seen, last_seen FROM accounts WHERE address = $1",
        )
        .bind(address)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(Into::into))
    }

    /// Classifies an address for `/address/:address/type` (§6.2, §4.8
    /// `getAddressType`): `Token` if the contract classified as an ERC
    /// standard, `Contract` for any other deployed contract, `Wallet`
    /// otherwise.
    pub async fn address_activity(&self, address: &str) -> StoreResult<Option<AddressActivity>> {
        let account = self.get_account(address).await?;
        if account.is_none() {
            return Ok(None);
        }
        let contract = self.get_contract(address).await?;
        let tx_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM transactions WHERE from_address = $1 OR to_address = $1",
        )
        .bind(address)
        .fetch_one(self.pool())
        .await?;
        let kind = match &contract {
            Some(c) if !matches!(c.contract_type, ContractType::Unknown) => AddressKind::Token,
            Some(_) => AddressKind::Contract,
            None => AddressKind::Wallet,
        };
        Ok(Some(AddressActivity {
            kind,
            transaction_count: tx_count as u64,
        }))
    }

    pub async fn count_contracts(&self) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contracts")
            .fetch_one(self.pool())
            .await?;
        Ok(count as u64)
    }

    pub async fn count_token_contracts(&self, contract_type: ContractType) -> StoreResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM contracts WHERE contract_type = $1")
                .bind(contract_type.as_db_str())
                .fetch_one(self.pool())
                .await?;
        Ok(count as u64)
    }

    pub async fn count_event_logs(&self) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM event_logs")
            .fetch_one(self.pool())
            .await?;
        Ok(count as u64)
    }

    /// DESIGN.md Open Question 3: holders is "accounts with nonzero
    /// native balance", sourced from the ingestor's best-effort
    /// `native_balances` sampling cache, never the rejected
    /// distinct-transaction-address count.
    pub async fn count_accounts_with_nonzero_balance(&self) -> StoreResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM native_balances WHERE balance <> '0'")
                .fetch_one(self.pool())
                .await?;
        Ok(count as u64)
    }

    pub async fn latest_block_number(&self) -> StoreResult<Option<u64>> {
        let number: Option<i64> = sqlx::query_scalar("SELECT MAX(number) FROM blocks")
            .fetch_one(self.pool())
            .await?;
        Ok(number.map(|n| n as u64))
    }
}
