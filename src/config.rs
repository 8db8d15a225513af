//! Process configuration (§6.4, §10 ambient expansion).
//!
//! Mirrors the teacher's `src/config.rs`: a `clap::Parser` CLI picks the
//! config file path, the file itself is a JSON document deserialized with
//! `serde`, and any string field can reference an environment variable via
//! `LiteralOrEnv` (`$VAR` or `${VAR}`) instead of a literal — useful for
//! `db.password` in particular, which should never sit in a committed JSON
//! file as plain text.

use std::fs;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::Parser;
use serde::{Deserialize, Serialize};
use studio_indexer_types::Amount;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "studio-indexer")]
#[command(about = "EVM-compatible indexer for Studio Blockchain")]
struct CliArgs {
    /// Path to the JSON configuration file.
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    config: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub rpc: RpcConfig,
    #[serde(default)]
    pub indexer: IndexerConfig,
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    /// Ordered endpoint list for the C1 failover pool. Must be non-empty —
    /// checked by the pool constructor, not here, since an empty list is a
    /// wiring error rather than a malformed config value.
    pub urls: Vec<LiteralOrEnv<Url>>,
    pub chain_id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexerConfig {
    #[serde(default)]
    pub start_block: u64,
    #[serde(default = "indexer_defaults::confirmations")]
    pub confirmations: u64,
    #[serde(default = "indexer_defaults::batch_window")]
    pub batch_window: usize,
    #[serde(default = "indexer_defaults::poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Open Question 2: the validator block reward is configurable, not the
    /// hardcoded `0.1 ether` the original carried.
    #[serde(default)]
    pub block_reward: Amount,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        IndexerConfig {
            start_block: 0,
            confirmations: indexer_defaults::confirmations(),
            batch_window: indexer_defaults::batch_window(),
            poll_interval_secs: indexer_defaults::poll_interval_secs(),
            block_reward: Amount::ZERO,
        }
    }
}

mod indexer_defaults {
    pub fn confirmations() -> u64 {
        12
    }
    pub fn batch_window() -> usize {
        8
    }
    pub fn poll_interval_secs() -> u64 {
        2
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    pub host: LiteralOrEnv<String>,
    #[serde(default = "db_defaults::port")]
    pub port: u16,
    pub database: String,
    pub user: LiteralOrEnv<String>,
    pub password: LiteralOrEnv<String>,
}

mod db_defaults {
    pub fn port() -> u16 {
        5432
    }
}

impl DbConfig {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user.as_str(),
            self.password.as_str(),
            self.host.as_str(),
            self.port,
            self.database
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "server_defaults::port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: server_defaults::port(),
        }
    }
}

mod server_defaults {
    pub fn port() -> u16 {
        3000
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerificationConfig {
    #[serde(default = "verification_defaults::max_source_bytes")]
    pub max_source_bytes: usize,
    #[serde(default = "verification_defaults::worker_pool")]
    pub worker_pool: usize,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        VerificationConfig {
            max_source_bytes: verification_defaults::max_source_bytes(),
            worker_pool: verification_defaults::worker_pool(),
        }
    }
}

mod verification_defaults {
    pub fn max_source_bytes() -> usize {
        20 * 1024 * 1024
    }
    pub fn worker_pool() -> usize {
        2
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetadataConfig {
    #[serde(default = "metadata_defaults::worker_pool")]
    pub worker_pool: usize,
    #[serde(default = "metadata_defaults::queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        MetadataConfig {
            worker_pool: metadata_defaults::worker_pool(),
            queue_capacity: metadata_defaults::queue_capacity(),
        }
    }
}

mod metadata_defaults {
    pub fn worker_pool() -> usize {
        4
    }
    pub fn queue_capacity() -> usize {
        1024
    }
}

// ============================================================================
// Environment variable resolution
// ============================================================================

/// A transparent wrapper that resolves environment variables during
/// deserialization. Supports literal values (`"localhost"`), simple env var
/// references (`"$DB_HOST"`), and braced references (`"${DB_HOST}"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralOrEnv<T>(T);

impl<T> LiteralOrEnv<T> {
    pub fn inner(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }

    fn parse_env_var_syntax(s: &str) -> Option<String> {
        if let Some(braced) = s.strip_prefix("${") {
            braced.strip_suffix('}').map(str::to_string)
        } else if let Some(var_name) = s.strip_prefix('$') {
            if !var_name.is_empty() && var_name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                Some(var_name.to_string())
            } else {
                None
            }
        } else {
            None
        }
    }
}

impl LiteralOrEnv<String> {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<T> Deref for LiteralOrEnv<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> DerefMut for LiteralOrEnv<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<'de, T> Deserialize<'de> for LiteralOrEnv<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        let value = if let Some(var_name) = Self::parse_env_var_syntax(&s) {
            std::env::var(&var_name).map_err(|_| {
                serde::de::Error::custom(format!(
                    "environment variable '{var_name}' not found (referenced as '{s}')"
                ))
            })?
        } else {
            s
        };

        let parsed = value
            .parse::<T>()
            .map_err(|e| serde::de::Error::custom(format!("failed to parse value: {e}")))?;

        Ok(LiteralOrEnv(parsed))
    }
}

impl<T> Serialize for LiteralOrEnv<T>
where
    T: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl Config {
    /// Parses `--config`/`-c`/`CONFIG` to find the file, then reads and
    /// deserializes it. Any field not present in the file falls back to its
    /// `serde(default)` or errors if required and absent.
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        let config_path = Path::new(&cli_args.config)
            .canonicalize()
            .map_err(|e| ConfigError::FileRead(cli_args.config, e))?;
        Self::load_from_path(config_path)
    }

    fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::FileRead(path, e))?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_or_env_resolves_braced_env_var() {
        unsafe {
            std::env::set_var("STUDIO_INDEXER_TEST_VALUE", "42");
        }
        let parsed: LiteralOrEnv<u16> = serde_json::from_str("\"${STUDIO_INDEXER_TEST_VALUE}\"").unwrap();
        assert_eq!(*parsed, 42);
    }

    #[test]
    fn literal_or_env_resolves_bare_dollar_var() {
        unsafe {
            std::env::set_var("STUDIO_INDEXER_TEST_BARE", "localhost");
        }
        let parsed: LiteralOrEnv<String> = serde_json::from_str("\"$STUDIO_INDEXER_TEST_BARE\"").unwrap();
        assert_eq!(parsed.as_str(), "localhost");
    }

    #[test]
    fn literal_or_env_passes_through_plain_values() {
        let parsed: LiteralOrEnv<u16> = serde_json::from_str("\"7\"").unwrap();
        assert_eq!(*parsed, 7);
    }

    #[test]
    fn missing_env_var_errors() {
        let result: Result<LiteralOrEnv<String>, _> = serde_json::from_str("\"${STUDIO_INDEXER_TEST_MISSING}\"");
        assert!(result.is_err());
    }

    #[test]
    fn indexer_config_defaults_match_spec() {
        let indexer = IndexerConfig::default();
        assert_eq!(indexer.confirmations, 12);
        assert_eq!(indexer.batch_window, 8);
        assert_eq!(indexer.poll_interval_secs, 2);
    }
}
