//! Failure taxonomy for the verification engine (§4.7, §7 "verification-negative").
//!
//! None of these are process-fatal. A verification attempt either succeeds
//! or comes back as one of these variants, which the caller persists /
//! reports as a structured result rather than propagating as an engine error.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum VerificationError {
    #[error("invalid input: {0}")]
    InvalidArguments(String),

    #[error("compiler unavailable: {0}")]
    CompilerUnavailable(String),

    #[error("compile error: {0}")]
    CompileError(String),

    #[error("contract {contract_name} not found in compiler output")]
    ContractNotFound { contract_name: String },

    #[error("bytecode mismatch ({reason})")]
    BytecodeMismatch { reason: BytecodeMismatchReason },
}

/// Distinguishes "close but not quite" from "completely unrelated", per §4.7's
/// bytecode-compare sub-codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BytecodeMismatchReason {
    /// Code matches byte-for-byte once both metadata hashes are stripped, but
    /// the stripped metadata hashes themselves differ — almost certainly the
    /// right source, compiled with different metadata settings (e.g. a
    /// different `bzzr`/`ipfs` hash source or a differing compiler build).
    MetadataHashDiffers,
    /// The code differs beyond the metadata trailer. Wrong source, wrong
    /// compiler version, or wrong optimizer settings.
    CodeDiffers,
}

impl std::fmt::Display for BytecodeMismatchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BytecodeMismatchReason::MetadataHashDiffers => {
                write!(f, "code matches, metadata hash differs")
            }
            BytecodeMismatchReason::CodeDiffers => write!(f, "code differs"),
        }
    }
}

pub type VerificationResult<T> = Result<T, VerificationError>;
