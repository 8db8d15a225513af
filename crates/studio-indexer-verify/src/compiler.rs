//! Compiler resolution and memoized binary downloads (§4.7 "load compiler",
//! "EVM-version coercion table").

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use semver::Version;

use crate::error::VerificationError;

/// Where solc binaries matching `{version}` are published, mirroring the
/// layout `binaries.soliditylang.org` serves under `/linux-amd64/`.
const SOLC_BINARY_LIST_URL: &str = "https://binaries.soliditylang.org/linux-amd64/list.json";

/// Resolves a compiler version string (`0.8.21`, `v0.8.21+commit.d9974bed`,
/// bare `0.8.21`) down to the `x.y.z` semver core the binary list indexes by.
pub fn parse_compiler_version(version: &str) -> Result<Version, VerificationError> {
    let trimmed = version.trim_start_matches('v');
    let core = trimmed.split('+').next().unwrap_or(trimmed);
    Version::parse(core)
        .map_err(|e| VerificationError::InvalidArguments(format!("unparseable compiler version {version}: {e}")))
}

/// Coerces a compiler version to the EVM instruction-set target solc should
/// compile for, per §4.7's table. Unlisted (newer) versions default to the
/// most recent fork, `cancun`.
pub fn coerce_evm_version(version: &Version) -> &'static str {
    if version.major == 0 && version.minor == 4 {
        "byzantium"
    } else if version.major == 0 && version.minor == 8 && version.patch == 0 {
        "istanbul"
    } else if version.major == 0 && version.minor == 8 && version.patch < 10 {
        "istanbul"
    } else if version.major == 0 && version.minor == 8 && version.patch >= 10 {
        "paris"
    } else {
        "cancun"
    }
}

/// Memoizes downloaded compiler binaries for the life of the process. Every
/// entry is additive-only — once a version is fetched it is never evicted or
/// re-downloaded, per §5's "in-memory caches are additive-only" policy.
pub struct CompilerRegistry {
    http: reqwest::Client,
    cache_dir: PathBuf,
    binaries: DashMap<String, Arc<PathBuf>>,
}

impl CompilerRegistry {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        CompilerRegistry {
            http: reqwest::Client::new(),
            cache_dir: cache_dir.into(),
            binaries: DashMap::new(),
        }
    }

    /// Returns the path to a runnable solc binary for `version`, downloading
    /// and caching it on first use. Concurrent callers for the same version
    /// that race here each do their own download; the loser's result is
    /// discarded in favor of whichever `insert` wins, which is harmless since
    /// both downloads are byte-identical.
    pub async fn resolve(&self, version: &Version) -> Result<Arc<PathBuf>, VerificationError> {
        let key = version.to_string();
        if let Some(existing) = self.binaries.get(&key) {
            return Ok(Arc::clone(existing.value()));
        }

        let path = self.download(&key).await?;
        let path = Arc::new(path);
        self.binaries.insert(key, Arc::clone(&path));
        Ok(path)
    }

    async fn download(&self, version: &str) -> Result<PathBuf, VerificationError> {
        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|e| VerificationError::CompilerUnavailable(format!("cache dir: {e}")))?;

        let dest = self.cache_dir.join(format!("solc-{version}"));
        if tokio::fs::metadata(&dest).await.is_ok() {
            return Ok(dest);
        }

        let list: serde_json::Value = self
            .http
            .get(SOLC_BINARY_LIST_URL)
            .send()
            .await
            .map_err(|e| VerificationError::CompilerUnavailable(format!("binary list fetch: {e}")))?
            .json()
            .await
            .map_err(|e| VerificationError::CompilerUnavailable(format!("binary list parse: {e}")))?;

        let filename = list
            .get("releases")
            .and_then(|releases| releases.get(version))
            .and_then(|v| v.as_str())
            .ok_or_else(|| VerificationError::CompilerUnavailable(format!("no release listed for solc {version}")))?;

        let url = format!("https://binaries.soliditylang.org/linux-amd64/{filename}");
        let bytes = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| VerificationError::CompilerUnavailable(format!("binary fetch: {e}")))?
            .bytes()
            .await
            .map_err(|e| VerificationError::CompilerUnavailable(format!("binary read: {e}")))?;

        tokio::fs::write(&dest, &bytes)
            .await
            .map_err(|e| VerificationError::CompilerUnavailable(format!("binary write: {e}")))?;
        tracing::info!(version, filename, "downloaded solc binary");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = tokio::fs::metadata(&dest)
                .await
                .map_err(|e| VerificationError::CompilerUnavailable(format!("binary stat: {e}")))?
                .permissions();
            perms.set_mode(0o755);
            tokio::fs::set_permissions(&dest, perms)
                .await
                .map_err(|e| VerificationError::CompilerUnavailable(format!("binary chmod: {e}")))?;
        }

        Ok(dest)
    }
}

/// Runs `solc --standard-json` against an already-resolved binary, feeding
/// `input` on stdin and returning the raw stdout for the caller to parse.
pub async fn run_standard_json(solc_path: &Path, input: &str) -> Result<String, VerificationError> {
    use tokio::io::AsyncWriteExt;
    use tokio::process::Command;

    let mut child = Command::new(solc_path)
        .arg("--standard-json")
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .map_err(|e| VerificationError::CompilerUnavailable(format!("spawn solc: {e}")))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(input.as_bytes())
            .await
            .map_err(|e| VerificationError::CompileError(format!("write stdin: {e}")))?;
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| VerificationError::CompileError(format!("solc exited abnormally: {e}")))?;

    String::from_utf8(output.stdout).map_err(|e| VerificationError::CompileError(format!("non-utf8 solc output: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_0_8_10_coerces_to_istanbul() {
        let v = parse_compiler_version("0.8.4").unwrap();
        assert_eq!(coerce_evm_version(&v), "istanbul");
    }

    #[test]
    fn post_0_8_10_coerces_to_paris() {
        let v = parse_compiler_version("v0.8.19+commit.7dd6d404").unwrap();
        assert_eq!(coerce_evm_version(&v), "paris");
    }

    #[test]
    fn legacy_0_4_coerces_to_byzantium() {
        let v = parse_compiler_version("0.4.26").unwrap();
        assert_eq!(coerce_evm_version(&v), "byzantium");
    }

    #[test]
    fn future_major_defaults_to_cancun() {
        let v = parse_compiler_version("0.9.0").unwrap();
        assert_eq!(coerce_evm_version(&v), "cancun");
    }
}
