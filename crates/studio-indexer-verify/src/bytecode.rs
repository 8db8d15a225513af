//! Deployed-bytecode comparison (§4.7 "bytecode compare", §8 "bytecode-compare
//! symmetry").
//!
//! Solidity appends a CBOR-encoded metadata blob to every compiled contract's
//! runtime code, trailed by a 2-byte big-endian length of that blob. In
//! practice, for the compiler versions this engine targets, that trailer is a
//! fixed 43 bytes (86 hex characters) — the length the spec calls out
//! explicitly rather than parsing the CBOR structure.

use crate::error::BytecodeMismatchReason;

const METADATA_TRAILER_BYTES: usize = 43;

/// Strips the trailing metadata hash, if the code is long enough to carry
/// one. Short code (e.g. a stub or a precompile-adjacent contract) is
/// returned unchanged.
pub fn strip_metadata_hash(code: &[u8]) -> &[u8] {
    if code.len() > METADATA_TRAILER_BYTES {
        &code[..code.len() - METADATA_TRAILER_BYTES]
    } else {
        code
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// Byte-for-byte identical, metadata hash included.
    ExactMatch,
    /// Identical once metadata hashes are stripped, and the on-chain code's
    /// remaining suffix (after the compiled code) equals the supplied,
    /// normalized constructor arguments.
    ConstructorArgumentsMatch,
    Mismatch(BytecodeMismatchReason),
}

/// Compares on-chain deployed bytecode against a freshly compiled candidate.
///
/// `constructor_arguments` is the normalized (lowercase, no `0x`) hex the
/// caller supplied, decoded to bytes — `None` when the contract takes no
/// constructor arguments.
pub fn compare(onchain: &[u8], compiled: &[u8], constructor_arguments: Option<&[u8]>) -> Comparison {
    if onchain == compiled {
        return Comparison::ExactMatch;
    }

    let onchain_stripped = strip_metadata_hash(onchain);
    let compiled_stripped = strip_metadata_hash(compiled);

    if onchain_stripped == compiled_stripped {
        return Comparison::ExactMatch;
    }

    if let Some(args) = constructor_arguments {
        if onchain.len() >= compiled.len()
            && &onchain[..compiled.len()] == compiled
            && &onchain[compiled.len()..] == args
        {
            return Comparison::ConstructorArgumentsMatch;
        }
        // Constructor args appended after a metadata-stripped compiled body
        // is also a valid shape when the deployed code itself never carried
        // a metadata trailer (some optimizer configurations omit it).
        if onchain.len() >= compiled_stripped.len()
            && &onchain[..compiled_stripped.len()] == compiled_stripped
            && &onchain[compiled_stripped.len()..] == args
        {
            return Comparison::ConstructorArgumentsMatch;
        }
    }

    if onchain_stripped.len() == compiled_stripped.len()
        && onchain_stripped != compiled_stripped
        && onchain.len() == compiled.len()
    {
        Comparison::Mismatch(BytecodeMismatchReason::MetadataHashDiffers)
    } else {
        Comparison::Mismatch(BytecodeMismatchReason::CodeDiffers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(bytes: &[u8], trailer_byte: u8) -> Vec<u8> {
        let mut v = bytes.to_vec();
        v.extend(std::iter::repeat(trailer_byte).take(43));
        v
    }

    #[test]
    fn exact_match_ignores_differing_metadata_trailer() {
        let onchain = code(&[0x60, 0x80, 0x60, 0x40], 0xaa);
        let compiled = code(&[0x60, 0x80, 0x60, 0x40], 0xbb);
        assert_eq!(compare(&onchain, &compiled, None), Comparison::ExactMatch);
    }

    #[test]
    fn metadata_only_mismatch_flags_same_length_differing_trailer_without_full_match() {
        // Core code differs by one byte but lengths still line up: this is a
        // real code difference, not a metadata-only one.
        let onchain = code(&[0x60, 0x80, 0x60, 0x41], 0xaa);
        let compiled = code(&[0x60, 0x80, 0x60, 0x40], 0xaa);
        assert_eq!(
            compare(&onchain, &compiled, None),
            Comparison::Mismatch(BytecodeMismatchReason::CodeDiffers)
        );
    }

    #[test]
    fn constructor_arguments_appended_after_compiled_code() {
        let compiled = code(&[0x60, 0x80], 0xaa);
        let args = [0x00u8; 32];
        let mut onchain = compiled.clone();
        onchain.extend_from_slice(&args);
        assert_eq!(
            compare(&onchain, &compiled, Some(&args)),
            Comparison::ConstructorArgumentsMatch
        );
    }

    #[test]
    fn unrelated_code_is_a_full_mismatch() {
        let onchain = code(&[0x01, 0x02, 0x03], 0xaa);
        let compiled = code(&[0x60, 0x80, 0x60, 0x40, 0x60, 0x40], 0xaa);
        assert_eq!(
            compare(&onchain, &compiled, None),
            Comparison::Mismatch(BytecodeMismatchReason::CodeDiffers)
        );
    }
}
