//! Noter signing key loading.
//!
//! Security considerations:
//! - The secret file must be 0600 or stricter (Unix)
//! - The environment fallback is opt-in and meant for development
//! - Secret material is never logged; `Debug` is redacted

use crate::config::CredentialsConfig;
use serde::Deserialize;
use sp_core::crypto::{AccountId32, Ss58Codec};
use sp_core::{sr25519, Pair};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Credential loading errors. Never carries secret material.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("secret file not found at {} and environment fallback is disabled", .0.display())]
    Missing(PathBuf),

    #[error("insecure permissions {mode:o} on {}, expected 0600 or stricter", path.display())]
    InsecurePermissions { path: PathBuf, mode: u32 },

    #[error("failed to read secret file {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    #[error("environment variable {0} is not set")]
    EnvUnset(String),

    #[error("secret URI from {0} is not a valid sr25519 key")]
    InvalidSecret(String),
}

/// Secret file layout.
#[derive(Deserialize)]
struct SecretFile {
    secret_uri: String,
}

/// Where the signing key came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialOrigin {
    File(PathBuf),
    Env(String),
}

/// The noter's signing key.
pub struct Signer {
    pair: sr25519::Pair,
    origin: CredentialOrigin,
}

impl Signer {
    pub fn into_pair(self) -> sr25519::Pair {
        self.pair
    }

    pub fn origin(&self) -> &CredentialOrigin {
        &self.origin
    }

    pub fn account(&self) -> AccountId32 {
        AccountId32::from(self.pair.public())
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("account", &self.account().to_ss58check())
            .field("origin", &self.origin)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Load the noter signing key.
///
/// The secret file is preferred. The environment variable is read only when the
/// file is absent and `allow_env_fallback` is set.
pub fn load_signer(config: &CredentialsConfig) -> Result<Signer, CredentialError> {
    if config.secret_path.exists() {
        let uri = read_secret_file(&config.secret_path)?;
        let origin = CredentialOrigin::File(config.secret_path.clone());
        return signer_from_uri(&uri, origin);
    }

    if !config.allow_env_fallback {
        return Err(CredentialError::Missing(config.secret_path.clone()));
    }

    warn!(
        env_var = %config.env_var,
        "Secret file missing, reading signing key from environment (development only)"
    );
    let uri = std::env::var(&config.env_var)
        .map_err(|_| CredentialError::EnvUnset(config.env_var.clone()))?;
    signer_from_uri(&uri, CredentialOrigin::Env(config.env_var.clone()))
}

fn read_secret_file(path: &Path) -> Result<String, CredentialError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = fs::metadata(path).map_err(|e| CredentialError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let mode = metadata.permissions().mode() & 0o777;
        if mode & 0o077 != 0 {
            return Err(CredentialError::InsecurePermissions {
                path: path.to_path_buf(),
                mode,
            });
        }
    }

    let content = fs::read_to_string(path).map_err(|e| CredentialError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    // serde_json errors may quote the input; report the position only.
    let secret: SecretFile = serde_json::from_str(&content).map_err(|e| CredentialError::Read {
        path: path.to_path_buf(),
        reason: format!("invalid JSON at line {} column {}", e.line(), e.column()),
    })?;
    Ok(secret.secret_uri)
}

fn signer_from_uri(uri: &str, origin: CredentialOrigin) -> Result<Signer, CredentialError> {
    let describe = match &origin {
        CredentialOrigin::File(path) => path.display().to_string(),
        CredentialOrigin::Env(var) => var.clone(),
    };
    let pair = sr25519::Pair::from_string(uri, None)
        .map_err(|_| CredentialError::InvalidSecret(describe))?;

    let signer = Signer { pair, origin };
    info!(account = %signer.account().to_ss58check(), "Loaded noter signing key");
    Ok(signer)
}
