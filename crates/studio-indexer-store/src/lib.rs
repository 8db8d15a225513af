//! Transactional Postgres persistence layer for the Studio Blockchain
//! indexer (C2, §4.2 of the spec).
//!
//! [`Store`] is the only component that touches the database. Every write
//! is either a single-row idempotent upsert or the one multi-row
//! transaction `persist_block` that groups a whole block's derived state
//! (§4.2 "Transactional grouping"). Nothing here holds a reference to a
//! row past the end of a call — callers pass and receive plain value
//! objects from `studio_indexer_types`.

mod error;
mod reads;
mod store;

pub use error::{StoreError, StoreResult};
pub use reads::{AddressActivity, TokenTransferFilter};
pub use store::{BlockUnit, Store, VerificationFields};
