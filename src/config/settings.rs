use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crypto::kdf::{KdfParams, DEFAULT_PBKDF2_ITERATIONS};
use crate::errors::{FinVaultError, Result};

/// Which password-based KDF new keys are derived with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum KdfAlgorithm {
    #[default]
    #[serde(rename = "pbkdf2-sha256")]
    Pbkdf2Sha256,
    #[serde(rename = "argon2id")]
    Argon2id,
}

/// Project-level configuration, loaded from `.finvault.toml`.
///
/// Every field has a default so FinVault works without any config file.
/// The KDF settings only apply to keys derived from now on; existing
/// profiles keep the parameters recorded in them until the password is
/// changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// User id to act as when `--user` is not given.
    #[serde(default = "default_user")]
    pub default_user: String,

    /// Directory (relative to project root) holding profiles, record
    /// stores and the audit database.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default)]
    pub kdf_algorithm: KdfAlgorithm,

    /// PBKDF2-SHA256 iteration count (default: 100,000).
    #[serde(default = "default_pbkdf2_iterations")]
    pub pbkdf2_iterations: u32,

    /// Argon2 memory cost in KiB (default: 64 MB).
    #[serde(default = "default_argon2_memory_kib")]
    pub argon2_memory_kib: u32,

    /// Argon2 iteration count (default: 3).
    #[serde(default = "default_argon2_iterations")]
    pub argon2_iterations: u32,

    /// Argon2 parallelism degree (default: 4).
    #[serde(default = "default_argon2_parallelism")]
    pub argon2_parallelism: u32,

    /// Lock the session after this many idle minutes; 0 disables.
    #[serde(default = "default_auto_lock_minutes")]
    pub auto_lock_minutes: u64,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_user() -> String {
    "default".to_string()
}

fn default_data_dir() -> String {
    ".finvault".to_string()
}

fn default_pbkdf2_iterations() -> u32 {
    DEFAULT_PBKDF2_ITERATIONS
}

fn default_argon2_memory_kib() -> u32 {
    65_536 // 64 MB
}

fn default_argon2_iterations() -> u32 {
    3
}

fn default_argon2_parallelism() -> u32 {
    4
}

fn default_auto_lock_minutes() -> u64 {
    15
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_user: default_user(),
            data_dir: default_data_dir(),
            kdf_algorithm: KdfAlgorithm::default(),
            pbkdf2_iterations: default_pbkdf2_iterations(),
            argon2_memory_kib: default_argon2_memory_kib(),
            argon2_iterations: default_argon2_iterations(),
            argon2_parallelism: default_argon2_parallelism(),
            auto_lock_minutes: default_auto_lock_minutes(),
        }
    }
}

impl Settings {
    /// Name of the config file we look for in the project root.
    pub const FILE_NAME: &'static str = ".finvault.toml";

    /// Load settings from `<project_dir>/.finvault.toml`.
    ///
    /// If the file does not exist, defaults are returned.
    /// If the file exists but cannot be parsed, an error is returned.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let config_path = project_dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;

        let settings: Settings = toml::from_str(&contents).map_err(|e| {
            FinVaultError::ConfigError(format!("Failed to parse {}: {e}", config_path.display()))
        })?;

        settings.kdf_params().validate().map_err(|e| {
            FinVaultError::ConfigError(format!("{}: {e}", config_path.display()))
        })?;

        Ok(settings)
    }

    /// Full path to the data directory.
    ///
    /// Example: `project_dir/.finvault`
    pub fn data_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.data_dir)
    }

    /// The configured KDF as crypto-layer params.
    pub fn kdf_params(&self) -> KdfParams {
        match self.kdf_algorithm {
            KdfAlgorithm::Pbkdf2Sha256 => KdfParams::Pbkdf2Sha256 {
                iterations: self.pbkdf2_iterations,
            },
            KdfAlgorithm::Argon2id => KdfParams::Argon2id {
                memory_kib: self.argon2_memory_kib,
                iterations: self.argon2_iterations,
                parallelism: self.argon2_parallelism,
            },
        }
    }

    /// Idle timeout for the session, or `None` when disabled.
    pub fn auto_lock(&self) -> Option<Duration> {
        (self.auto_lock_minutes > 0).then(|| Duration::from_secs(self.auto_lock_minutes.saturating_mul(60)))
    }
}

// ── Tests ────────────────────────────────────────────────────────────
