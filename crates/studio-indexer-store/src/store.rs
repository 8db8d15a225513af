use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use studio_indexer_types::{
    Block, Contract, EventLog, IndexerCursor, NftCollection, NftMetadata, TokenTransfer, TokenType,
};

use crate::error::{StoreError, StoreResult};

/// Everything produced by decoding and classifying one block (§4.5
/// DECODING), handed to [`Store::persist_block`] as a single unit so it
/// can be committed or rolled back atomically (§4.2).
#[derive(Debug, Clone, Default)]
pub struct BlockUnit {
    pub block: Option<Block>,
    pub transactions: Vec<studio_indexer_types::Transaction>,
    pub transfers: Vec<TokenTransfer>,
    pub logs: Vec<EventLog>,
    pub new_contracts: Vec<Contract>,
}

/// Fields written atomically by `setVerified` (§4.2, §4.7 step 9).
#[derive(Debug, Clone)]
pub struct VerificationFields {
    pub source_code: String,
    pub compiler_version: String,
    pub optimization_used: bool,
    pub runs: u32,
    pub evm_version: String,
    pub constructor_arguments: Option<String>,
    pub libraries: Option<serde_json::Value>,
    pub abi: serde_json::Value,
    pub verified_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Store { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Store { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Persists an entire block's derived state in one transaction:
    /// either every row lands or none does (§4.2, §8 block-atomicity).
    ///
    /// Returns [`StoreError::ParentHashMismatch`] without writing anything
    /// if `block.parent_hash` disagrees with the stored hash of
    /// `block.number - 1`; the ingestor catches this and calls
    /// [`Store::reorg`].
    pub async fn persist_block(&self, unit: BlockUnit) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        if let Some(block) = &unit.block {
            Self::check_parent_hash(&mut tx, block).await?;
            Self::upsert_block(&mut tx, block).await?;
        }

        for t in &unit.transactions {
            Self::touch_account(&mut tx, &t.from.to_string(), t.timestamp).await?;
            if let Some(to) = &t.to {
                Self::touch_account(&mut tx, &to.to_string(), t.timestamp).await?;
            }
            Self::upsert_transaction(&mut tx, t).await?;
        }

        for c in &unit.new_contracts {
            Self::upsert_contract_tx(&mut tx, c).await?;
        }

        // Contract counters only after new_contracts land, so a
        // same-block self-referencing creation tx counts correctly.
        for t in &unit.transactions {
            Self::bump_transaction_count(&mut tx, &t.from.to_string()).await?;
            if let Some(to) = &t.to {
                Self::bump_transaction_count(&mut tx, &to.to_string()).await?;
            }
        }

        for log in &unit.logs {
            Self::upsert_event_log(&mut tx, log).await?;
        }

        // Log order is preserved end-to-end (§4.3, §5): transfers are
        // applied in the order the caller handed them to us, so the last
        // write to a given NFT's ownership wins.
        for transfer in &unit.transfers {
            Self::upsert_token_transfer(&mut tx, transfer).await?;
            if matches!(transfer.token_type, TokenType::Erc721 | TokenType::Erc1155) {
                if let Some(token_id) = &transfer.token_id {
                    Self::update_nft_ownership(
                        &mut tx,
                        &transfer.token_address.to_string(),
                        token_id,
                        &transfer.to.to_string(),
                        transfer.timestamp,
                    )
                    .await?;
                }
            }
        }

        if let Some(block) = &unit.block {
            Self::advance_cursor(&mut tx, block.number).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn check_parent_hash(
        tx: &mut Transaction<'_, Postgres>,
        block: &Block,
    ) -> StoreResult<()> {
        if block.number == 0 {
            return Ok(());
        }
        let parent_height = block.number - 1;
        let stored: Option<String> =
            sqlx::query_scalar("SELECT hash FROM blocks WHERE number = $1")
                .bind(parent_height as i64)
                .fetch_optional(&mut **tx)
                .await?;
        if let Some(stored_hash) = stored {
            let incoming = block.parent_hash.to_string();
            if stored_hash != incoming {
                return Err(StoreError::ParentHashMismatch {
                    height: block.number,
                    parent_height,
                    stored: stored_hash,
                    incoming,
                });
            }
        }
        Ok(())
    }

    async fn upsert_block(tx: &mut Transaction<'_, Postgres>, block: &Block) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO blocks (number, hash, parent_hash, timestamp, miner, gas_limit, gas_used, difficulty, extra_data, nonce)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (number) DO UPDATE SET
                hash = EXCLUDED.hash,
                parent_hash = EXCLUDED.parent_hash,
                timestamp = EXCLUDED.timestamp,
                miner = EXCLUDED.miner,
                gas_limit = EXCLUDED.gas_limit,
                gas_used = EXCLUDED.gas_used,
                difficulty = EXCLUDED.difficulty,
                extra_data = EXCLUDED.extra_data,
                nonce = EXCLUDED.nonce
            "#,
        )
        .bind(block.number as i64)
        .bind(block.hash.to_string())
        .bind(block.parent_hash.to_string())
        .bind(block.timestamp)
        .bind(block.miner.to_string())
        .bind(block.gas_limit.to_string())
        .bind(block.gas_used.to_string())
        .bind(block.difficulty.to_string())
        .bind(&block.extra_data)
        .bind(&block.nonce)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn touch_account(
        tx: &mut Transaction<'_, Postgres>,
        address: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (address, first_seen, last_seen)
            VALUES ($1, $2, $2)
            ON CONFLICT (address) DO UPDATE SET
                last_seen = GREATEST(accounts.last_seen, EXCLUDED.last_seen)
            "#,
        )
        .bind(address)
        .bind(at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn upsert_transaction(
        tx: &mut Transaction<'_, Postgres>,
        t: &studio_indexer_types::Transaction,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions
                (hash, block_number, transaction_index, from_address, to_address, value, gas_price, gas_limit, gas_used, input, nonce, status, timestamp, contract_address)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (hash) DO UPDATE SET
                block_number = EXCLUDED.block_number,
                transaction_index = EXCLUDED.transaction_index,
                from_address = EXCLUDED.from_address,
                to_address = EXCLUDED.to_address,
                value = EXCLUDED.value,
                gas_price = EXCLUDED.gas_price,
                gas_limit = EXCLUDED.gas_limit,
                gas_used = EXCLUDED.gas_used,
                input = EXCLUDED.input,
                nonce = EXCLUDED.nonce,
                status = EXCLUDED.status,
                timestamp = EXCLUDED.timestamp,
                contract_address = EXCLUDED.contract_address
            "#,
        )
        .bind(t.hash.to_string())
        .bind(t.block_number as i64)
        .bind(t.transaction_index as i32)
        .bind(t.from.to_string())
        .bind(t.to.map(|a| a.to_string()))
        .bind(t.value.to_string())
        .bind(t.gas_price.to_string())
        .bind(t.gas_limit.to_string())
        .bind(t.gas_used.to_string())
        .bind(&t.input)
        .bind(t.nonce as i64)
        .bind(t.status)
        .bind(t.timestamp)
        .bind(t.contract_address.map(|a| a.to_string()))
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn bump_transaction_count(
        tx: &mut Transaction<'_, Postgres>,
        address: &str,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE contracts SET transaction_count = transaction_count + 1 WHERE address = $1",
        )
        .bind(address)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn upsert_contract_tx(
        tx: &mut Transaction<'_, Postgres>,
        c: &Contract,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO contracts
                (address, creator, creation_tx_hash, creation_block, contract_type, name, symbol, decimals, total_supply, verified)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (address) DO UPDATE SET
                -- §3 invariant: contract_type never regresses from a known
                -- standard back to UNKNOWN.
                contract_type = CASE
                    WHEN contracts.contract_type <> 'UNKNOWN' AND EXCLUDED.contract_type = 'UNKNOWN'
                        THEN contracts.contract_type
                    ELSE EXCLUDED.contract_type
                END,
                name = COALESCE(EXCLUDED.name, contracts.name),
                symbol = COALESCE(EXCLUDED.symbol, contracts.symbol),
                decimals = COALESCE(EXCLUDED.decimals, contracts.decimals),
                total_supply = COALESCE(EXCLUDED.total_supply, contracts.total_supply)
            "#,
        )
        .bind(c.address.to_string())
        .bind(c.creator.to_string())
        .bind(c.creation_tx_hash.to_string())
        .bind(c.creation_block as i64)
        .bind(c.contract_type.as_db_str())
        .bind(&c.name)
        .bind(&c.symbol)
        .bind(c.decimals.map(|d| d as i16))
        .bind(c.total_supply.map(|v| v.to_string()))
        .bind(c.verified)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Standalone upsert for use outside block ingestion (e.g. the
    /// classifier revisiting an address after the fact).
    pub async fn upsert_contract(&self, c: &Contract) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        Self::touch_account(&mut tx, &c.address.to_string(), Utc::now()).await?;
        Self::upsert_contract_tx(&mut tx, c).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn upsert_event_log(tx: &mut Transaction<'_, Postgres>, log: &EventLog) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO event_logs
                (transaction_hash, log_index, block_number, address, topic0, topic1, topic2, topic3, data, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (transaction_hash, log_index) DO UPDATE SET
                data = EXCLUDED.data
            "#,
        )
        .bind(log.transaction_hash.to_string())
        .bind(log.log_index as i32)
        .bind(log.block_number as i64)
        .bind(log.address.to_string())
        .bind(log.topic0.map(|t| t.to_string()))
        .bind(log.topic1.map(|t| t.to_string()))
        .bind(log.topic2.map(|t| t.to_string()))
        .bind(log.topic3.map(|t| t.to_string()))
        .bind(&log.data)
        .bind(log.timestamp)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn upsert_token_transfer(
        tx: &mut Transaction<'_, Postgres>,
        t: &TokenTransfer,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO token_transfers
                (transaction_hash, log_index, block_number, token_address, from_address, to_address, value, token_type, token_id, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (transaction_hash, token_address, from_address, to_address, COALESCE(token_id, '')) DO UPDATE SET
                value = EXCLUDED.value,
                token_type = EXCLUDED.token_type,
                timestamp = EXCLUDED.timestamp
            "#,
        )
        .bind(t.transaction_hash.to_string())
        .bind(t.log_index as i32)
        .bind(t.block_number as i64)
        .bind(t.token_address.to_string())
        .bind(t.from.to_string())
        .bind(t.to.to_string())
        .bind(t.value.to_string())
        .bind(t.token_type.as_db_str())
        .bind(&t.token_id)
        .bind(t.timestamp)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn update_nft_ownership(
        tx: &mut Transaction<'_, Postgres>,
        token_address: &str,
        token_id: &str,
        owner: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO nft_tokens (token_address, token_id, owner, last_updated)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (token_address, token_id) DO UPDATE SET
                owner = EXCLUDED.owner,
                last_updated = EXCLUDED.last_updated
            "#,
        )
        .bind(token_address)
        .bind(token_id)
        .bind(owner)
        .bind(at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn update_nft_metadata(&self, meta: &NftMetadata) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO nft_metadata (token_address, token_id, document, resolved_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (token_address, token_id) DO UPDATE SET
                document = EXCLUDED.document,
                resolved_at = EXCLUDED.resolved_at
            "#,
        )
        .bind(meta.token_address.to_string())
        .bind(&meta.token_id)
        .bind(&meta.document)
        .bind(meta.resolved_at)
        .execute(&self.pool)
        .await?;

        // The resolved fields also denormalize onto nft_tokens so readers
        // don't have to join for the common case (§3 NFTToken fields).
        let name = meta.document.get("name").and_then(|v| v.as_str());
        let description = meta.document.get("description").and_then(|v| v.as_str());
        let image = meta
            .document
            .get("image")
            .or_else(|| meta.document.get("image_url"))
            .and_then(|v| v.as_str());
        sqlx::query(
            r#"
            UPDATE nft_tokens SET
                name = COALESCE($3, name),
                description = COALESCE($4, description),
                image_url = COALESCE($5, image_url),
                last_updated = $6
            WHERE token_address = $1 AND token_id = $2
            "#,
        )
        .bind(meta.token_address.to_string())
        .bind(&meta.token_id)
        .bind(name)
        .bind(description)
        .bind(image)
        .bind(meta.resolved_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_nft_collection(&self, c: &NftCollection) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO nft_collections (token_address, name, symbol, total_supply, owner_count, last_updated)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (token_address) DO UPDATE SET
                name = EXCLUDED.name,
                symbol = EXCLUDED.symbol,
                total_supply = EXCLUDED.total_supply,
                owner_count = EXCLUDED.owner_count,
                last_updated = EXCLUDED.last_updated
            "#,
        )
        .bind(c.token_address.to_string())
        .bind(&c.name)
        .bind(&c.symbol)
        .bind(c.total_supply.map(|v| v.to_string()))
        .bind(c.owner_count.map(|v| v as i64))
        .bind(c.last_updated)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Atomically writes all source-verification fields, refusing a
    /// second write (§3 invariant: `verified` transitions only
    /// false→true, never back).
    pub async fn set_verified(
        &self,
        address: &str,
        fields: VerificationFields,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let already_verified: Option<bool> =
            sqlx::query_scalar("SELECT verified FROM contracts WHERE address = $1")
                .bind(address)
                .fetch_optional(&mut *tx)
                .await?;
        if already_verified == Some(true) {
            return Err(StoreError::AlreadyVerified {
                address: address.to_string(),
            });
        }
        sqlx::query(
            r#"
            UPDATE contracts SET
                verified = TRUE,
                source_code = $2,
                compiler_version = $3,
                optimization_used = $4,
                runs = $5,
                evm_version = $6,
                constructor_arguments = $7,
                libraries = $8,
                abi = $9,
                verified_at = $10
            WHERE address = $1
            "#,
        )
        .bind(address)
        .bind(&fields.source_code)
        .bind(&fields.compiler_version)
        .bind(fields.optimization_used)
        .bind(fields.runs as i32)
        .bind(&fields.evm_version)
        .bind(&fields.constructor_arguments)
        .bind(&fields.libraries)
        .bind(&fields.abi)
        .bind(fields.verified_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Rolls back all state at or above `from_height` (§4.2 Reorg).
    /// NFT ownership rows are deliberately left in place: the next
    /// observed transfer on the new branch will correct them, per §4.2.
    pub async fn reorg(&self, from_height: u64) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let from = from_height as i64;
        sqlx::query("DELETE FROM token_transfers WHERE block_number >= $1")
            .bind(from)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM event_logs WHERE block_number >= $1")
            .bind(from)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM transactions WHERE block_number >= $1")
            .bind(from)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM blocks WHERE number >= $1")
            .bind(from)
            .execute(&mut *tx)
            .await?;
        let rewound = from_height.saturating_sub(1) as i64;
        sqlx::query(
            "UPDATE indexer_cursor SET latest_processed = $1, latest_finalized = LEAST(latest_finalized, $1) WHERE id = 1",
        )
        .bind(rewound)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn advance_cursor(tx: &mut Transaction<'_, Postgres>, height: u64) -> StoreResult<()> {
        sqlx::query(
            "UPDATE indexer_cursor SET latest_processed = $1 WHERE id = 1 AND latest_processed < $1",
        )
        .bind(height as i64)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn set_latest_finalized(&self, height: u64) -> StoreResult<()> {
        sqlx::query("UPDATE indexer_cursor SET latest_finalized = $1 WHERE id = 1")
            .bind(height as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn cursor(&self) -> StoreResult<IndexerCursor> {
        let row: (i64, i64) =
            sqlx::query_as("SELECT latest_processed, latest_finalized FROM indexer_cursor WHERE id = 1")
                .fetch_one(&self.pool)
                .await?;
        Ok(IndexerCursor {
            latest_processed: row.0 as u64,
            latest_finalized: row.1 as u64,
        })
    }

    pub async fn upsert_native_balance(
        &self,
        address: &str,
        balance: &str,
        sampled_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO native_balances (address, balance, sampled_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (address) DO UPDATE SET balance = EXCLUDED.balance, sampled_at = EXCLUDED.sampled_at
            "#,
        )
        .bind(address)
        .bind(balance)
        .bind(sampled_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

}
