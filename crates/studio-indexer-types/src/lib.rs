//! Shared domain types for the Studio Blockchain indexer.
//!
//! This crate has no I/O: no database driver, no RPC client, no HTTP. It
//! holds the entities of §3 (`model`), the `U256`-as-decimal-string wire
//! codec (`amount`), lowercase-hex identifier newtypes (`hexid`), and the
//! pagination clamp shared between the store and the query facade
//! (`pagination`). Every other crate in the workspace depends on this one;
//! it depends on nothing in the workspace.

pub mod amount;
pub mod hexid;
pub mod model;
pub mod pagination;

pub use amount::Amount;
pub use hexid::{Addr, Hash32};
pub use model::*;
pub use pagination::Page;
