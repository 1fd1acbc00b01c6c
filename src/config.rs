//! Configuration surface, loaded from a TOML file.
//!
//! Every tunable the monitors need lives here: feed endpoints, TTLs, the
//! blacklist threshold, program addresses and store paths. Components never
//! read the environment themselves; they are handed their slice of this
//! struct at construction.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub tracking: TrackingConfig,
    pub programs: ProgramConfig,
    pub paths: PathConfig,
}

/// Upstream endpoints: the gRPC feed pair and the RPC node used by gate checks.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub grpc_url: String,
    pub backup_grpc_url: String,
    /// Optional x-token for authenticated feed endpoints.
    pub x_token: Option<String>,
    pub rpc_url: String,
    /// Shared wallet-registry store; empty disables it.
    pub redis_url: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            grpc_url: "http://127.0.0.1:10000".to_string(),
            backup_grpc_url: "http://127.0.0.1:10001".to_string(),
            x_token: None,
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            redis_url: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Minutes a launched token stays tracked absent a migration.
    pub token_ttl_min: u64,
    /// Minutes a "migrated" verdict is remembered by the detector.
    pub migration_ttl_min: u64,
    /// Interval of the registry and emission sweeps.
    pub sweep_interval_secs: u64,
    /// Distinct key-account relations required to blacklist a wallet.
    pub blacklist_threshold: u32,
    /// Minutes a gate-check verdict stays cached.
    pub gate_cache_ttl_min: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            token_ttl_min: 30,
            migration_ttl_min: 60,
            sweep_interval_secs: 1,
            blacklist_threshold: 3,
            gate_cache_ttl_min: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProgramConfig {
    /// Launchpad program whose transactions announce new mints.
    pub launch_program: String,
    /// Migration authority watched by the migration detector.
    pub migration_program: String,
}

impl Default for ProgramConfig {
    fn default() -> Self {
        Self {
            launch_program: "TSLvdd1pWpHVjahSpsvCXUbgwsL3JAcvokwaKt1eokM".to_string(),
            migration_program: "39azUYFWPz3VHgKCf3VChUwbpURdCHRxjWVowf5jUJjg".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    pub blacklist_file: String,
    pub whitelist_file: String,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            blacklist_file: "data/blacklist-wallets.jsonl".to_string(),
            whitelist_file: "data/whitelist-wallets.txt".to_string(),
        }
    }
}

impl Config {
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("reading config file {}", path.as_ref().display()))?;
        toml::from_str(&raw).context("parsing config file")
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.tracking.token_ttl_min * 60)
    }

    pub fn migration_ttl(&self) -> Duration {
        Duration::from_secs(self.tracking.migration_ttl_min * 60)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.tracking.sweep_interval_secs.max(1))
    }

    pub fn gate_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.tracking.gate_cache_ttl_min * 60)
    }

    /// Slice of the config the feed clients carry around.
    pub fn feed(&self) -> FeedConfig {
        FeedConfig {
            endpoint: self.source.grpc_url.clone(),
            backup_endpoint: self.source.backup_grpc_url.clone(),
            x_token: self.source.x_token.clone(),
        }
    }
}

/// Endpoint pair handed to every [`crate::feed::FeedClient`].
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub endpoint: String,
    pub backup_endpoint: String,
    pub x_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.tracking.blacklist_threshold, 3);
        assert_eq!(config.tracking.sweep_interval_secs, 1);
        assert!(config.source.redis_url.is_empty());
        assert_eq!(config.sweep_interval(), Duration::from_secs(1));
    }

    #[test]
    fn parses_partial_toml() {
        let parsed: Config = toml::from_str(
            r#"
            [source]
            grpc_url = "http://feed.example:10000"
            backup_grpc_url = "http://feed-backup.example:10000"

            [tracking]
            token_ttl_min = 5
            "#,
        )
        .unwrap();
        assert_eq!(parsed.source.grpc_url, "http://feed.example:10000");
        assert_eq!(parsed.token_ttl(), Duration::from_secs(300));
        // untouched sections keep their defaults
        assert_eq!(parsed.tracking.blacklist_threshold, 3);
        assert!(!parsed.programs.migration_program.is_empty());
    }

    #[test]
    fn sweep_interval_never_zero() {
        let parsed: Config = toml::from_str("[tracking]\nsweep_interval_secs = 0\n").unwrap();
        assert_eq!(parsed.sweep_interval(), Duration::from_secs(1));
    }
}
