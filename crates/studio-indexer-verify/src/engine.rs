//! Orchestrates a single verification attempt end to end (§4.7 pipeline):
//! validate -> cache lookup -> load compiler -> compile -> compare bytecode.

use std::collections::BTreeMap;

use dashmap::DashMap;
use studio_indexer_types::Addr;

use crate::bytecode::{self, Comparison};
use crate::compiler::{self, CompilerRegistry};
use crate::error::{BytecodeMismatchReason, VerificationError, VerificationResult};
use crate::flatten;
use crate::input::{self, CompileSettings, Sources};

/// One verification submission, already decoded from whatever wire shape the
/// HTTP layer accepted (§6.2 `POST /contracts/verify`).
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    pub address: Addr,
    pub contract_name: String,
    pub sources: Sources,
    pub entry_file: String,
    pub compiler_version: String,
    pub optimization_used: bool,
    pub runs: u32,
    /// Overrides the coerced default when the submitter is explicit about it.
    pub evm_version: Option<String>,
    pub libraries: BTreeMap<String, BTreeMap<String, String>>,
    /// Normalized (no `0x`) lowercase hex, already validated by the caller.
    pub constructor_arguments: Option<String>,
    pub auto_flatten: bool,
}

#[derive(Debug, Clone)]
pub struct VerificationSuccess {
    pub abi: serde_json::Value,
    pub metadata: Option<String>,
}

pub type VerificationOutcome = Result<VerificationSuccess, VerificationError>;

pub struct VerificationEngine {
    compilers: CompilerRegistry,
    /// Keyed by [`input::cache_key`] of the standard-JSON input; additive-only
    /// for the life of the process (§5 shared-resource policy).
    results: DashMap<String, VerificationOutcome>,
    max_source_bytes: usize,
}

impl VerificationEngine {
    pub fn new(compiler_cache_dir: impl Into<std::path::PathBuf>, max_source_bytes: usize) -> Self {
        VerificationEngine {
            compilers: CompilerRegistry::new(compiler_cache_dir),
            results: DashMap::new(),
            max_source_bytes,
        }
    }

    pub async fn verify(&self, req: &VerificationRequest, deployed_bytecode: &[u8]) -> VerificationOutcome {
        self.validate(req)?;

        let version = compiler::parse_compiler_version(&req.compiler_version)?;
        let evm_version = match req.evm_version.as_deref() {
            Some(requested) => validate_evm_version(requested)?,
            None => compiler::coerce_evm_version(&version),
        };

        let settings = CompileSettings {
            evm_version,
            optimization_used: req.optimization_used,
            runs: req.runs,
            libraries: req.libraries.clone(),
        };
        let standard_json = input::build_standard_json(&req.sources, &settings);
        let key = input::cache_key(&standard_json);
        if let Some(cached) = self.results.get(&key) {
            tracing::debug!(address = %req.address, %key, "verification cache hit");
            return cached.clone();
        }

        let outcome = self
            .compile_and_compare(req, &settings, deployed_bytecode, version)
            .await;
        self.results.insert(key, outcome.clone());
        outcome
    }

    fn validate(&self, req: &VerificationRequest) -> VerificationResult<()> {
        if req.sources.is_empty() {
            return Err(VerificationError::InvalidArguments("no source files submitted".into()));
        }
        let total_bytes: usize = req.sources.values().map(|s| s.len()).sum();
        if total_bytes > self.max_source_bytes {
            return Err(VerificationError::InvalidArguments(format!(
                "source size {total_bytes} exceeds limit of {}",
                self.max_source_bytes
            )));
        }
        if let Some(args) = &req.constructor_arguments {
            if !args.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(VerificationError::InvalidArguments(
                    "constructorArguments must be hex-encoded".into(),
                ));
            }
        }
        Ok(())
    }

    async fn compile_and_compare(
        &self,
        req: &VerificationRequest,
        settings: &CompileSettings,
        deployed_bytecode: &[u8],
        version: semver::Version,
    ) -> VerificationOutcome {
        let solc_path = self.compilers.resolve(&version).await?;

        let standard_json = input::build_standard_json(&req.sources, settings);
        let (abi, compiled_deployed, metadata) =
            match self.try_compile(&solc_path, &standard_json, &req.contract_name).await {
                Ok(result) => result,
                Err(e) if req.auto_flatten => {
                    tracing::warn!(address = %req.address, error = %e, "multi-file compile failed, retrying flattened");
                    let flattened = flatten::flatten(&req.sources, &req.entry_file)
                        .ok_or_else(|| VerificationError::CompileError("entry file not resolvable for flattening".into()))?;
                    let mut flat_sources = Sources::new();
                    flat_sources.insert(req.entry_file.clone(), flattened);
                    let flat_json = input::build_standard_json(&flat_sources, settings);
                    self.try_compile(&solc_path, &flat_json, &req.contract_name)
                        .await
                        .map_err(|_| e)?
                }
                Err(e) => return Err(e),
            };

        let constructor_args = match &req.constructor_arguments {
            Some(hex_str) => Some(hex::decode(hex_str).map_err(|e| {
                VerificationError::InvalidArguments(format!("constructorArguments hex decode: {e}"))
            })?),
            None => None,
        };

        match bytecode::compare(deployed_bytecode, &compiled_deployed, constructor_args.as_deref()) {
            Comparison::ExactMatch | Comparison::ConstructorArgumentsMatch => Ok(VerificationSuccess { abi, metadata }),
            Comparison::Mismatch(reason) => Err(VerificationError::BytecodeMismatch { reason }),
        }
    }

    async fn try_compile(
        &self,
        solc_path: &std::path::Path,
        standard_json: &serde_json::Value,
        contract_name: &str,
    ) -> VerificationResult<(serde_json::Value, Vec<u8>, Option<String>)> {
        let raw = compiler::run_standard_json(solc_path, &standard_json.to_string()).await?;
        let parsed: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| VerificationError::CompileError(format!("solc produced non-JSON output: {e}")))?;

        if let Some(errors) = parsed.get("errors").and_then(|e| e.as_array()) {
            let fatal: Vec<&str> = errors
                .iter()
                .filter(|e| e.get("severity").and_then(|s| s.as_str()) == Some("error"))
                .filter_map(|e| e.get("formattedMessage").and_then(|m| m.as_str()))
                .collect();
            if !fatal.is_empty() {
                return Err(VerificationError::CompileError(fatal.join("\n")));
            }
        }

        let contracts = parsed
            .get("contracts")
            .ok_or_else(|| VerificationError::CompileError("solc output missing contracts".into()))?;

        for (_file, file_contracts) in contracts
            .as_object()
            .ok_or_else(|| VerificationError::CompileError("malformed contracts object".into()))?
        {
            if let Some(contract) = file_contracts.get(contract_name) {
                let abi = contract.get("abi").cloned().unwrap_or(serde_json::Value::Array(vec![]));
                let deployed_hex = contract
                    .pointer("/evm/deployedBytecode/object")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| VerificationError::CompileError("missing deployed bytecode in solc output".into()))?;
                let deployed = hex::decode(deployed_hex)
                    .map_err(|e| VerificationError::CompileError(format!("invalid hex bytecode from solc: {e}")))?;
                let metadata = contract.get("metadata").and_then(|v| v.as_str()).map(str::to_string);
                return Ok((abi, deployed, metadata));
            }
        }

        Err(VerificationError::ContractNotFound {
            contract_name: contract_name.to_string(),
        })
    }
}

/// §6.2 `evmVersion` is caller-supplied; rejecting anything outside the
/// table solc actually understands avoids holding onto an arbitrary
/// attacker-controlled string anywhere (see `query::routes::proxy_call`'s
/// allowlist for the same discipline applied to RPC method names).
const ALLOWED_EVM_VERSIONS: &[&str] = &["byzantium", "istanbul", "paris", "shanghai", "cancun"];

fn validate_evm_version(requested: &str) -> VerificationResult<&'static str> {
    ALLOWED_EVM_VERSIONS
        .iter()
        .copied()
        .find(|&allowed| allowed == requested)
        .ok_or_else(|| VerificationError::InvalidArguments(format!("unsupported evmVersion {requested:?}")))
}
