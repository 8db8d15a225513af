//! Standard-JSON input construction and import resolution (§4.7).

use std::collections::BTreeMap;

use serde_json::{Value, json};
use sha2::{Digest, Sha256};

/// The full set of source files submitted for a verification attempt, keyed
/// by the path/name the submitter used when referencing them from `import`
/// statements.
pub type Sources = BTreeMap<String, String>;

/// Resolves an `import` target against the submitted source set, trying
/// (in order): an exact name match, the target with a leading `./`/`../`
/// stripped, the target with `.sol` appended, and finally a basename-only
/// match against every submitted file. Returns the resolved key, not the
/// content — callers look the content up themselves so the same resolution
/// can double as "does this import exist" before compiling.
pub fn resolve_import<'a>(target: &str, sources: &'a Sources) -> Option<&'a str> {
    if let Some((key, _)) = sources.get_key_value(target) {
        return Some(key.as_str());
    }

    let stripped = target.trim_start_matches("./").trim_start_matches("../");
    if let Some((key, _)) = sources.get_key_value(stripped) {
        return Some(key.as_str());
    }

    if !target.ends_with(".sol") {
        let with_suffix = format!("{target}.sol");
        if let Some((key, _)) = sources.get_key_value(with_suffix.as_str()) {
            return Some(key.as_str());
        }
    }

    let basename = target.rsplit('/').next().unwrap_or(target);
    sources
        .keys()
        .find(|k| k.rsplit('/').next() == Some(basename))
        .map(|k| k.as_str())
}

/// Compiler settings a single verification attempt needs, beyond the source
/// files themselves.
#[derive(Debug, Clone)]
pub struct CompileSettings {
    pub evm_version: &'static str,
    pub optimization_used: bool,
    pub runs: u32,
    /// `path.sol:LibraryName` -> deployed address, the standard-JSON shape
    /// for `settings.libraries`.
    pub libraries: BTreeMap<String, BTreeMap<String, String>>,
}

/// Builds a standard-JSON compiler input requesting exactly the outputs the
/// bytecode comparison needs: ABI, creation bytecode, deployed bytecode, and
/// metadata (the latter purely so the metadata hash length assumption in
/// [`crate::bytecode`] can be sanity-checked against what solc says it
/// embedded).
pub fn build_standard_json(sources: &Sources, settings: &CompileSettings) -> Value {
    let source_entries: BTreeMap<String, Value> = sources
        .iter()
        .map(|(name, content)| (name.clone(), json!({ "content": content })))
        .collect();

    json!({
        "language": "Solidity",
        "sources": source_entries,
        "settings": {
            "evmVersion": settings.evm_version,
            "optimizer": {
                "enabled": settings.optimization_used,
                "runs": settings.runs,
            },
            "libraries": settings.libraries,
            "outputSelection": {
                "*": {
                    "*": ["abi", "evm.bytecode.object", "evm.deployedBytecode.object", "metadata"]
                }
            }
        }
    })
}

/// SHA-256 of the canonicalized (key-sorted, via `serde_json::Value`'s `Map`
/// ordering under the `preserve_order` feature being absent — plain
/// `BTreeMap`/default `Map` both sort lexically) standard-JSON input, used as
/// the verification result cache key so identical resubmissions short-circuit
/// recompilation.
pub fn cache_key(input: &Value) -> String {
    let canonical = serde_json::to_string(input).expect("Value always serializes");
    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources() -> Sources {
        let mut s = Sources::new();
        s.insert("Token.sol".to_string(), "contract Token {}".to_string());
        s.insert("lib/Safe.sol".to_string(), "library Safe {}".to_string());
        s
    }

    #[test]
    fn exact_match_resolves_directly() {
        let s = sources();
        assert_eq!(resolve_import("Token.sol", &s), Some("Token.sol"));
    }

    #[test]
    fn relative_prefix_is_stripped() {
        let s = sources();
        assert_eq!(resolve_import("./Token.sol", &s), Some("Token.sol"));
        assert_eq!(resolve_import("../Token.sol", &s), Some("Token.sol"));
    }

    #[test]
    fn missing_suffix_is_appended() {
        let s = sources();
        assert_eq!(resolve_import("Token", &s), Some("Token.sol"));
    }

    #[test]
    fn basename_fallback_matches_nested_path() {
        let s = sources();
        assert_eq!(resolve_import("Safe.sol", &s), Some("lib/Safe.sol"));
    }

    #[test]
    fn unresolvable_import_returns_none() {
        let s = sources();
        assert_eq!(resolve_import("Nonexistent.sol", &s), None);
    }

    #[test]
    fn cache_key_is_stable_for_identical_input() {
        let s = sources();
        let settings = CompileSettings {
            evm_version: "paris",
            optimization_used: true,
            runs: 200,
            libraries: BTreeMap::new(),
        };
        let a = build_standard_json(&s, &settings);
        let b = build_standard_json(&s, &settings);
        assert_eq!(cache_key(&a), cache_key(&b));
    }
}
