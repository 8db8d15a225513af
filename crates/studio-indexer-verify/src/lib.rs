//! Solidity source verification engine (C7, §4.7 of the spec).
//!
//! Given a deployed address's on-chain bytecode and a submitted source
//! bundle, [`VerificationEngine::verify`] resolves the right solc binary,
//! compiles the source via standard-JSON, and compares the resulting
//! deployed bytecode against what's on chain. Nothing here talks to an RPC
//! endpoint or the store directly — callers fetch the deployed bytecode and
//! persist the outcome.

mod bytecode;
mod compiler;
mod engine;
mod error;
mod flatten;
mod input;

pub use bytecode::{Comparison, strip_metadata_hash};
pub use compiler::{CompilerRegistry, coerce_evm_version, parse_compiler_version};
pub use engine::{VerificationEngine, VerificationOutcome, VerificationRequest, VerificationSuccess};
pub use error::{BytecodeMismatchReason, VerificationError, VerificationResult};
pub use input::{CompileSettings, Sources, build_standard_json, cache_key, resolve_import};
