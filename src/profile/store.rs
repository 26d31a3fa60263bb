//! On-disk persistence for user profiles.
//!
//! One JSON file per user at `<data_dir>/<user_id>.profile.json`.  The
//! profile holds no secrets (salt, KDF params, key-check token) but it is
//! still written owner-only, since losing or swapping it locks the user out.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::UserProfile;
use crate::errors::{FinVaultError, Result};

const PROFILE_SUFFIX: &str = ".profile.json";
const RECORDS_SUFFIX: &str = ".records";

/// Maximum length of a user id.
pub const MAX_USER_ID_LEN: usize = 64;

/// Reads and writes profiles under one data directory.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    data_dir: PathBuf,
}

impl ProfileStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of a user's profile file.
    pub fn path_for(&self, user_id: &str) -> PathBuf {
        self.data_dir.join(format!("{user_id}{PROFILE_SUFFIX}"))
    }

    /// Path of a user's record store.
    pub fn records_path_for(&self, user_id: &str) -> PathBuf {
        self.data_dir.join(format!("{user_id}{RECORDS_SUFFIX}"))
    }

    pub fn exists(&self, user_id: &str) -> bool {
        self.path_for(user_id).exists()
    }

    /// Load a profile, checking that it belongs to `user_id`.
    pub fn load(&self, user_id: &str) -> Result<UserProfile> {
        validate_user_id(user_id)?;

        let path = self.path_for(user_id);
        if !path.exists() {
            return Err(FinVaultError::ProfileNotFound(user_id.to_string()));
        }

        let contents = fs::read_to_string(&path)?;
        let profile: UserProfile = serde_json::from_str(&contents).map_err(|e| {
            FinVaultError::InvalidProfile(format!("failed to parse {}: {e}", path.display()))
        })?;

        if profile.user_id != user_id {
            return Err(FinVaultError::InvalidProfile(format!(
                "{} belongs to '{}', not '{user_id}'",
                path.display(),
                profile.user_id
            )));
        }

        // Catches hand-edited files before a derivation runs on them.
        profile.kdf.validate()?;
        if let Some(pending) = &profile.pending {
            pending.kdf.validate()?;
        }

        Ok(profile)
    }

    /// Write a profile atomically (temp file + rename), owner-only.
    pub fn save(&self, profile: &UserProfile) -> Result<()> {
        validate_user_id(&profile.user_id)?;

        let json = serde_json::to_string_pretty(profile)
            .map_err(|e| FinVaultError::SerializationError(format!("profile: {e}")))?;

        fs::create_dir_all(&self.data_dir)?;

        let path = self.path_for(&profile.user_id);
        let tmp_path = self
            .data_dir
            .join(format!(".{}{PROFILE_SUFFIX}.tmp", profile.user_id));

        fs::write(&tmp_path, json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&tmp_path, &path)?;
        debug!(user_id = %profile.user_id, "profile saved");
        Ok(())
    }

    /// Remove a profile file.
    pub fn delete(&self, user_id: &str) -> Result<()> {
        validate_user_id(user_id)?;

        let path = self.path_for(user_id);
        if !path.exists() {
            return Err(FinVaultError::ProfileNotFound(user_id.to_string()));
        }
        fs::remove_file(path)?;
        Ok(())
    }
}

/// Check that a user id is safe to use as a file name.
///
/// Allowed: ASCII letters, digits, `_`, `-` and `.`; 1 to 64 characters;
/// must not start with `.`.
pub fn validate_user_id(user_id: &str) -> Result<()> {
    if user_id.is_empty() || user_id.len() > MAX_USER_ID_LEN {
        return Err(FinVaultError::InvalidProfile(format!(
            "user id must be 1 to {MAX_USER_ID_LEN} characters"
        )));
    }

    if user_id.starts_with('.') {
        return Err(FinVaultError::InvalidProfile(format!(
            "user id '{user_id}' must not start with '.'"
        )));
    }

    if let Some(bad) = user_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(FinVaultError::InvalidProfile(format!(
            "user id '{user_id}' contains invalid character '{bad}'"
        )));
    }

    Ok(())
}
