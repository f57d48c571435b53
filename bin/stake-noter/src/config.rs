//! Noter configuration loaded from TOML.

use noter_chain_client::{ConnectorConfig, DEFAULT_PALLET};
use noter_reconciler::SweepConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Noter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoterConfig {
    /// RPC endpoints of the three chains.
    pub chains: ChainsConfig,

    #[serde(default)]
    pub destination: DestinationConfig,

    #[serde(default)]
    pub sweep: SweepSection,

    #[serde(default)]
    pub submission: SubmissionConfig,

    pub credentials: CredentialsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainsConfig {
    /// Relay chain carrying legacy direct staking.
    pub relay_rpc_url: String,

    /// Asset hub carrying direct staking and nomination pools.
    pub asset_hub_rpc_url: String,

    /// Chain holding the staking cache.
    pub destination_rpc_url: String,

    /// Limit on each connection attempt (default: 30)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Limit on waiting for a lost connection to recover (default: 120)
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Pallet exposing `receive_staking_details` and the cache storage.
    #[serde(default = "default_pallet")]
    pub pallet: String,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            pallet: default_pallet(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepSection {
    /// Seconds between full sweeps (default: 3600)
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Accounts per submitted batch (default: 10)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between batches in milliseconds (default: 1000)
    #[serde(default = "default_batch_pause")]
    pub batch_pause_ms: u64,
}

impl Default for SweepSection {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            batch_size: default_batch_size(),
            batch_pause_ms: default_batch_pause(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionConfig {
    /// Seconds to wait for inclusion (default: 120)
    #[serde(default = "default_submit_timeout")]
    pub timeout_secs: u64,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_submit_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// JSON secret file holding `secret_uri`.
    pub secret_path: PathBuf,

    /// Read the secret URI from `env_var` when the file is missing.
    /// Development only.
    #[serde(default)]
    pub allow_env_fallback: bool,

    #[serde(default = "default_env_var")]
    pub env_var: String,
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_ready_timeout() -> u64 {
    120
}

fn default_pallet() -> String {
    DEFAULT_PALLET.to_string()
}

fn default_interval() -> u64 {
    3600
}

fn default_batch_size() -> usize {
    10
}

fn default_batch_pause() -> u64 {
    1000
}

fn default_submit_timeout() -> u64 {
    120
}

fn default_env_var() -> String {
    "NOTER_SECRET_URI".to_string()
}

impl NoterConfig {
    /// Load and validate configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: NoterConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("relay_rpc_url", &self.chains.relay_rpc_url),
            ("asset_hub_rpc_url", &self.chains.asset_hub_rpc_url),
            ("destination_rpc_url", &self.chains.destination_rpc_url),
        ] {
            if !url.starts_with("ws://") && !url.starts_with("wss://") {
                return Err(ConfigError::Invalid(format!(
                    "{name} must start with ws:// or wss://, got {url:?}"
                )));
            }
        }

        if self.chains.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid("connect_timeout_secs must be > 0".to_string()));
        }

        if self.destination.pallet.is_empty() {
            return Err(ConfigError::Invalid("destination pallet cannot be empty".to_string()));
        }

        if self.sweep.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be >= 1".to_string()));
        }

        if self.sweep.interval_secs == 0 {
            return Err(ConfigError::Invalid("interval_secs must be >= 1".to_string()));
        }

        if self.submission.timeout_secs == 0 {
            return Err(ConfigError::Invalid("submission timeout_secs must be > 0".to_string()));
        }

        if self.credentials.allow_env_fallback && self.credentials.env_var.is_empty() {
            return Err(ConfigError::Invalid(
                "env_var cannot be empty when allow_env_fallback is set".to_string(),
            ));
        }

        Ok(())
    }

    pub fn connector(&self) -> ConnectorConfig {
        ConnectorConfig {
            connect_timeout: Duration::from_secs(self.chains.connect_timeout_secs),
            ready_timeout: Duration::from_secs(self.chains.ready_timeout_secs),
            ..ConnectorConfig::default()
        }
    }

    pub fn sweep(&self) -> SweepConfig {
        SweepConfig {
            interval: Duration::from_secs(self.sweep.interval_secs),
            batch_size: self.sweep.batch_size,
            batch_pause: Duration::from_millis(self.sweep.batch_pause_ms),
        }
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submission.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const MINIMAL: &str = r#"
[chains]
relay_rpc_url = "wss://relay.example:443"
asset_hub_rpc_url = "wss://asset-hub.example:443"
destination_rpc_url = "ws://127.0.0.1:9944"

[credentials]
secret_path = "/run/secrets/noter.json"
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: NoterConfig = toml::from_str(MINIMAL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.destination.pallet, "StakingScores");
        assert_eq!(config.sweep.interval_secs, 3600);
        assert_eq!(config.sweep.batch_size, 10);
        assert_eq!(config.sweep.batch_pause_ms, 1000);
        assert_eq!(config.submission.timeout_secs, 120);
        assert_eq!(config.chains.connect_timeout_secs, 30);
        assert!(!config.credentials.allow_env_fallback);
        assert_eq!(config.credentials.env_var, "NOTER_SECRET_URI");

        let sweep = config.sweep();
        assert_eq!(sweep.interval, Duration::from_secs(3600));
        assert_eq!(sweep.batch_pause, Duration::from_millis(1000));
    }

    #[test]
    fn test_from_file_reads_overrides() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("noter.toml");
        std::fs::write(
            &path,
            format!("{MINIMAL}\n[sweep]\ninterval_secs = 60\nbatch_size = 3\n"),
        )
        .unwrap();

        let config = NoterConfig::from_file(&path).unwrap();
        assert_eq!(config.sweep.interval_secs, 60);
        assert_eq!(config.sweep.batch_size, 3);
        assert_eq!(config.sweep.batch_pause_ms, 1000);
    }

    #[test]
    fn test_http_endpoint_rejected() {
        let mut config: NoterConfig = toml::from_str(MINIMAL).unwrap();
        config.chains.relay_rpc_url = "https://relay.example".to_string();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("relay_rpc_url"));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config: NoterConfig = toml::from_str(MINIMAL).unwrap();
        config.sweep.batch_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config: NoterConfig = toml::from_str(MINIMAL).unwrap();
        config.sweep.interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = NoterConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let config: NoterConfig = toml::from_str(include_str!("../config/noter.toml")).unwrap();
        config.validate().unwrap();
    }
}
