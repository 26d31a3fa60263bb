//! CLI module: Clap argument parser, shared command context, output
//! helpers, and command implementations.

pub mod commands;
pub mod output;

use std::path::{Path, PathBuf};

use clap::Parser;
use serde_json::{Map, Value};
use tracing::warn;
use zeroize::Zeroizing;

use crate::config::Settings;
use crate::errors::{FinVaultError, Result};
use crate::profile::{self, validate_user_id, ProfileStore, UserProfile};
use crate::records::{RecordKind, RecordStore};
use crate::session::SessionKeyManager;

/// Minimum password length for new passwords.
const MIN_PASSWORD_LEN: usize = 8;

/// Environment variable consulted before prompting for the password.
pub const PASSWORD_ENV: &str = "FINVAULT_PASSWORD";

/// Environment variable consulted for the new password in `change-password`.
pub const NEW_PASSWORD_ENV: &str = "FINVAULT_NEW_PASSWORD";

/// FinVault CLI: encrypted personal-finance records.
#[derive(Parser)]
#[command(
    name = "finvault",
    about = "Encrypted personal-finance records with client-side field encryption",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// User profile to act as (default: `default_user` from .finvault.toml)
    #[arg(short, long, global = true)]
    pub user: Option<String>,

    /// Data directory (default: `data_dir` from .finvault.toml)
    #[arg(long, global = true)]
    pub data_dir: Option<String>,
}

/// All available subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Create a user profile and an empty record store
    Init,

    /// Seal a new record
    Add {
        /// Record kind: account, transaction, budget, goal, investment
        kind: String,

        /// Sensitive field as name=value (omit `=value` for a hidden prompt)
        #[arg(short, long = "secret")]
        secrets: Vec<String>,

        /// Clear field as name=value (numbers, booleans and JSON are parsed)
        #[arg(short, long = "field")]
        fields: Vec<String>,
    },

    /// List records (undecryptable ones are flagged, not skipped)
    List {
        /// Only show records of this kind
        #[arg(short, long)]
        kind: Option<String>,
    },

    /// Show one record, decrypted, as JSON
    Show {
        /// Record id
        id: String,
    },

    /// Update a record's sensitive or clear fields
    Edit {
        /// Record id
        id: String,

        /// Sensitive field as name=value; an empty value removes it
        #[arg(short, long = "secret")]
        secrets: Vec<String>,

        /// Clear field as name=value; an empty value removes it
        #[arg(short, long = "field")]
        fields: Vec<String>,
    },

    /// Delete a record
    Delete {
        /// Record id
        id: String,
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Change the password and re-encrypt every record
    ChangePassword,

    /// View the audit log
    Audit {
        /// Number of entries to show (default: 50)
        #[arg(long, default_value = "50")]
        last: usize,
        /// Show entries since a duration ago (e.g. 7d, 24h, 30m)
        #[arg(long)]
        since: Option<String>,
        /// Include entries for every user, not just the current one
        #[arg(long)]
        all_users: bool,
    },
}

// ---------------------------------------------------------------------------
// Command context
// ---------------------------------------------------------------------------

/// Everything a command needs: resolved settings, paths, user and session.
pub struct Context {
    pub settings: Settings,
    pub data_dir: PathBuf,
    pub user_id: String,
    pub session: SessionKeyManager,
}

impl Context {
    /// Resolve settings from the current directory and CLI overrides.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let cwd = std::env::current_dir()?;
        Self::resolve(cli, &cwd)
    }

    fn resolve(cli: &Cli, project_dir: &Path) -> Result<Self> {
        let settings = Settings::load(project_dir)?;

        let data_dir = match &cli.data_dir {
            Some(dir) => project_dir.join(dir),
            None => settings.data_path(project_dir),
        };

        let user_id = cli
            .user
            .clone()
            .unwrap_or_else(|| settings.default_user.clone());
        validate_user_id(&user_id)?;

        let session = match settings.auto_lock() {
            Some(idle) => SessionKeyManager::with_auto_lock(idle),
            None => SessionKeyManager::new(),
        };

        Ok(Self {
            settings,
            data_dir,
            user_id,
            session,
        })
    }

    pub fn profiles(&self) -> ProfileStore {
        ProfileStore::new(&self.data_dir)
    }

    pub fn records_path(&self) -> PathBuf {
        self.profiles().records_path_for(&self.user_id)
    }

    /// Load the user's profile and unlock the session with their password.
    pub fn unlock(&self) -> Result<UserProfile> {
        let profile = self.unlock_profile()?;

        if profile.kdf_is_outdated(&self.settings.kdf_params()) {
            warn!(user_id = %self.user_id, "profile key derivation is weaker than configured");
            output::warning(
                "This profile's key derivation is weaker than configured. \
                 Run `finvault change-password` to upgrade it.",
            );
        }

        Ok(profile)
    }

    /// Load, prompt and unlock, finishing any interrupted password change.
    pub(crate) fn unlock_profile(&self) -> Result<UserProfile> {
        let profiles = self.profiles();
        let mut profile = profiles.load(&self.user_id).map_err(|e| {
            if matches!(e, FinVaultError::ProfileNotFound(_)) {
                output::tip("Run `finvault init` to create a profile.");
            }
            e
        })?;

        let password = prompt_password()?;
        let slot = profile::unlock(&profile, &password, &self.session)?;

        if profile.has_pending_rekey() {
            profile::resolve_pending(
                &profiles,
                &mut profile,
                slot,
                &self.records_path(),
                &self.session,
            )?;
            output::info("Resolved an interrupted password change.");
        }

        Ok(profile)
    }

    /// Unlock and open the user's record store.
    ///
    /// A store that fails its integrity check still opens read-only.
    pub fn open_records(&self) -> Result<(UserProfile, RecordStore)> {
        let profile = self.unlock()?;
        let store = RecordStore::open(&self.records_path(), &self.session)?;
        if !store.integrity_ok() {
            output::warning(
                "The record store failed its integrity check. Records that still \
                 decrypt are shown; changes are refused until the file is restored.",
            );
        }
        Ok((profile, store))
    }

    /// Log an audit event for the current user.  Never fails.
    pub fn audit(&self, operation: &str, record_id: Option<&str>, details: Option<&str>) {
        #[cfg(feature = "audit-log")]
        crate::audit::log_audit(&self.data_dir, &self.user_id, operation, record_id, details);

        #[cfg(not(feature = "audit-log"))]
        let _ = (operation, record_id, details);
    }
}

// ---------------------------------------------------------------------------
// Passwords
// ---------------------------------------------------------------------------

/// Get the profile password from `FINVAULT_PASSWORD` or an interactive
/// prompt.
///
/// Returns `Zeroizing<String>` so the password is wiped from memory on drop.
pub fn prompt_password() -> Result<Zeroizing<String>> {
    if let Some(pw) = password_from_env(PASSWORD_ENV) {
        return Ok(pw);
    }

    let pw = dialoguer::Password::new()
        .with_prompt("Enter password")
        .interact()
        .map_err(|e| FinVaultError::CommandFailed(format!("password prompt: {e}")))?;
    Ok(Zeroizing::new(pw))
}

/// Prompt for a new password with confirmation.
///
/// `env_var` is checked first for scripted use.  Enforces a minimum length.
pub fn prompt_new_password(env_var: &str) -> Result<Zeroizing<String>> {
    if let Some(pw) = password_from_env(env_var) {
        if pw.len() < MIN_PASSWORD_LEN {
            return Err(FinVaultError::CommandFailed(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        return Ok(pw);
    }

    loop {
        let password = dialoguer::Password::new()
            .with_prompt("Choose password")
            .with_confirmation("Confirm password", "Passwords do not match, try again")
            .interact()
            .map_err(|e| FinVaultError::CommandFailed(format!("password prompt: {e}")))?;

        if password.len() < MIN_PASSWORD_LEN {
            output::warning(&format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters. Try again."
            ));
            continue;
        }

        return Ok(Zeroizing::new(password));
    }
}

fn password_from_env(var: &str) -> Option<Zeroizing<String>> {
    std::env::var(var)
        .ok()
        .filter(|pw| !pw.is_empty())
        .map(Zeroizing::new)
}

// ---------------------------------------------------------------------------
// Field assignments
// ---------------------------------------------------------------------------

/// Parse `--secret name=value` arguments for `kind`.
///
/// Names must belong to the kind's sensitive partition.  List fields
/// (transaction tags) split on commas.  An empty value becomes `null`,
/// which removes the field on edit.  A bare `name` asks for the value
/// with a hidden prompt so it stays out of shell history.
pub fn parse_secret_assignments(kind: RecordKind, args: &[String]) -> Result<Map<String, Value>> {
    let mut map = Map::new();
    for arg in args {
        let (name, raw) = match arg.split_once('=') {
            Some((name, value)) => (name.trim(), Zeroizing::new(value.to_string())),
            None => (arg.trim(), prompt_field_value(arg.trim())?),
        };

        if !kind.sensitive_fields().contains(&name) {
            return Err(FinVaultError::InvalidPatch(format!(
                "'{name}' is not a sensitive {kind} field (expected one of: {})",
                kind.sensitive_fields().join(", ")
            )));
        }

        let value = if raw.is_empty() {
            Value::Null
        } else if kind.list_fields().contains(&name) {
            Value::Array(
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| Value::String(s.to_string()))
                    .collect(),
            )
        } else {
            Value::String(raw.as_str().to_string())
        };
        map.insert(name.to_string(), value);
    }
    Ok(map)
}

/// Parse `--field name=value` arguments.
///
/// Values that parse as JSON (numbers, booleans, quoted strings, arrays)
/// keep their type; anything else is stored as a string.  An empty value
/// becomes `null`.
pub fn parse_field_assignments(args: &[String]) -> Result<Map<String, Value>> {
    let mut map = Map::new();
    for arg in args {
        let (name, raw) = arg.split_once('=').ok_or_else(|| {
            FinVaultError::CommandFailed(format!("expected name=value, got '{arg}'"))
        })?;
        let name = name.trim();
        if name.is_empty() {
            return Err(FinVaultError::CommandFailed(format!(
                "missing field name in '{arg}'"
            )));
        }

        let value = if raw.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
        };
        map.insert(name.to_string(), value);
    }
    Ok(map)
}

fn prompt_field_value(name: &str) -> Result<Zeroizing<String>> {
    let value = dialoguer::Password::new()
        .with_prompt(format!("Enter value for {name}"))
        .allow_empty_password(true)
        .interact()
        .map_err(|e| FinVaultError::CommandFailed(format!("input prompt: {e}")))?;
    Ok(Zeroizing::new(value))
}
