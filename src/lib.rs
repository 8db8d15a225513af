//! Studio Blockchain indexer: mirrors an EVM chain's blocks, transactions,
//! logs and token transfers into Postgres and serves them read-only.
//!
//! - [`rpc`] — C1, the failover RPC client pool and health prober.
//! - [`decoder`] — C3, stateless ERC-20/721/1155 transfer log decoding.
//! - [`classifier`] — C4, on-chain contract-standard classification.
//! - [`ingestor`] — C5, the block ingestor driver.
//! - [`nft`] — C6, the NFT metadata resolver.
//! - [`query`] — C8, the read-only query facade and its thin HTTP boundary.
//! - `studio_indexer_store` (separate crate) — C2, the Postgres store.
//! - `studio_indexer_verify` (separate crate) — C7, the verification engine.

pub mod classifier;
pub mod config;
pub mod decoder;
pub mod error;
pub mod ingestor;
pub mod nft;
pub mod query;
pub mod rpc;
pub mod util;
