//! Store error taxonomy (§7).

/// Errors the store can return. `ParentHashMismatch` is the one expected,
/// recoverable case: callers are expected to catch it and trigger
/// `Store::reorg` (§4.2). Every other variant is the "systemic" class of
/// §7 — the caller logs it and lets the ingestor stop.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(
        "parent hash mismatch at block {height}: stored hash of block {parent_height} is {stored}, but the new block's parent_hash is {incoming}"
    )]
    ParentHashMismatch {
        height: u64,
        parent_height: u64,
        stored: String,
        incoming: String,
    },

    #[error("contract {address} is already verified")]
    AlreadyVerified { address: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type StoreResult<T> = Result<T, StoreError>;
