//! User profiles and the unlock flow.
//!
//! A profile is everything needed to turn a password back into the
//! session key: the salt, the KDF parameters it was derived with, and a
//! key-check token (a fixed marker encrypted under the key).  The token
//! lets `unlock` tell a wrong password apart from a corrupted record,
//! which the codec alone cannot do.
//!
//! A password change is written in three steps: the profile gains a
//! `pending` block holding the new salt, then the records are re-sealed
//! under the new key, then the pending block replaces the current one.
//! Whatever step fails, the salt for the key the records are under is
//! on disk, and `resolve_pending` finishes or rolls back on next unlock.

pub mod store;

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::crypto::{self, CiphertextBlob, DerivedKey, KdfParams};
use crate::errors::{FinVaultError, Result};
use crate::records::RecordStore;
use crate::session::SessionKeyManager;

pub use store::{validate_user_id, ProfileStore};

/// Plaintext sealed into every profile's key-check token.
pub const KEY_CHECK_MARKER: &str = "finvault-key-check-v1";

/// Per-user key derivation inputs, persisted as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,

    /// Base64 of 16 random bytes.  Changes only on password change.
    pub salt: String,

    /// Parameters the current key was derived with.
    pub kdf: KdfParams,

    /// `KEY_CHECK_MARKER` encrypted under the derived key.
    pub key_check: CiphertextBlob,

    /// Key for a password change that has not finished yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingRekey>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Salt, KDF params and key-check token of a password change in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRekey {
    pub salt: String,
    pub kdf: KdfParams,
    pub key_check: CiphertextBlob,
    pub started_at: DateTime<Utc>,
}

/// Which of a profile's keys a password unlocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySlot {
    Current,
    Pending,
}

impl UserProfile {
    /// Whether the recorded KDF params are weaker than `configured`.
    pub fn kdf_is_outdated(&self, configured: &KdfParams) -> bool {
        self.kdf.is_weaker_than(configured)
    }

    /// Derive the current key for `password` and check it against the token.
    pub fn verify_password(&self, password: &str) -> Result<DerivedKey> {
        let key = crypto::derive_key_with_params(password, &self.salt, &self.kdf)?;
        verify_key(&self.key_check, &key)?;
        Ok(key)
    }

    /// Like `verify_password`, but also tries the pending key.
    pub fn match_password(&self, password: &str) -> Result<(DerivedKey, KeySlot)> {
        match self.verify_password(password) {
            Err(FinVaultError::WrongPassword) => {}
            other => return other.map(|key| (key, KeySlot::Current)),
        }

        let Some(pending) = &self.pending else {
            return Err(FinVaultError::WrongPassword);
        };
        let key = crypto::derive_key_with_params(password, &pending.salt, &pending.kdf)?;
        verify_key(&pending.key_check, &key)?;
        Ok((key, KeySlot::Pending))
    }

    /// Whether a password change was started and never finished.
    pub fn has_pending_rekey(&self) -> bool {
        self.pending.is_some()
    }

    fn promote_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.salt = pending.salt;
            self.kdf = pending.kdf;
            self.key_check = pending.key_check;
            self.updated_at = Utc::now();
        }
    }
}

/// Create a profile for `user_id`, persist it and unlock the session.
pub fn register(
    profiles: &ProfileStore,
    user_id: &str,
    password: &str,
    params: &KdfParams,
    session: &SessionKeyManager,
) -> Result<UserProfile> {
    validate_user_id(user_id)?;
    if profiles.exists(user_id) {
        return Err(FinVaultError::ProfileAlreadyExists(user_id.to_string()));
    }

    let salt = crypto::generate_salt();
    let key = crypto::derive_key_with_params(password, &salt, params)?;
    let key_check = crypto::encrypt(KEY_CHECK_MARKER, &key)?;

    let now = Utc::now();
    let profile = UserProfile {
        user_id: user_id.to_string(),
        salt,
        kdf: *params,
        key_check,
        pending: None,
        created_at: now,
        updated_at: now,
    };

    profiles.save(&profile)?;
    session.set_key(key);
    info!(user_id, kdf = params.algorithm(), "profile registered");
    Ok(profile)
}

/// Derive the key from `password` and install it in the session.
///
/// A key that fails the key-check token yields `WrongPassword` and
/// leaves the session as it was.  If the profile has a pending password
/// change, the pending key is tried too; call `resolve_pending` next.
pub fn unlock(profile: &UserProfile, password: &str, session: &SessionKeyManager) -> Result<KeySlot> {
    match profile.match_password(password) {
        Ok((key, slot)) => {
            session.set_key(key);
            debug!(user_id = %profile.user_id, ?slot, "profile unlocked");
            Ok(slot)
        }
        Err(FinVaultError::WrongPassword) => {
            warn!(user_id = %profile.user_id, "unlock failed: wrong password");
            Err(FinVaultError::WrongPassword)
        }
        Err(e) => Err(e),
    }
}

/// Finish or roll back an interrupted password change.
///
/// Call after `unlock` with the slot it returned.  The records file
/// decides: if it is sealed under the unlocked key, the profile keeps
/// that key alone and is saved.  Otherwise the records are still under
/// the other password, so the session is locked again and
/// `RekeyInterrupted` names the password to use.
pub fn resolve_pending(
    profiles: &ProfileStore,
    profile: &mut UserProfile,
    slot: KeySlot,
    records_path: &Path,
    session: &SessionKeyManager,
) -> Result<()> {
    if !profile.has_pending_rekey() {
        return Ok(());
    }

    let key = session.current_key()?;
    let sealed_with_key = match RecordStore::is_sealed_with(records_path, &key) {
        Ok(sealed) => sealed,
        Err(FinVaultError::StoreNotFound(_)) => true,
        Err(e) => return Err(e),
    };

    if !sealed_with_key {
        session.clear_key();
        warn!(user_id = %profile.user_id, ?slot, "records are sealed under the other key of an interrupted password change");
        return Err(FinVaultError::RekeyInterrupted(match slot {
            KeySlot::Current => "new",
            KeySlot::Pending => "previous",
        }));
    }

    match slot {
        KeySlot::Current => {
            profile.pending = None;
            profile.updated_at = Utc::now();
        }
        KeySlot::Pending => profile.promote_pending(),
    }
    profiles.save(profile)?;
    info!(user_id = %profile.user_id, ?slot, "resolved interrupted password change");
    Ok(())
}

/// Drop the session key.  Returns `true` if a key was held.
pub fn lock(session: &SessionKeyManager) -> bool {
    session.clear_key()
}

/// Check a derived key against a key-check token.
pub fn verify_key(key_check: &CiphertextBlob, key: &DerivedKey) -> Result<()> {
    match crypto::decrypt::<String>(key_check, key) {
        Ok(marker) if marker == KEY_CHECK_MARKER => Ok(()),
        Ok(_) => Err(FinVaultError::InvalidProfile(
            "key-check token holds an unexpected marker".into(),
        )),
        Err(FinVaultError::DecryptionFailed) => Err(FinVaultError::WrongPassword),
        Err(e) => Err(e),
    }
}

/// Re-key an unlocked user: fresh salt, `params`, every record blob
/// re-encrypted.
///
/// The session must hold the profile's current key.  On success the
/// session holds the new key.  Returns the number of records re-encrypted.
pub fn change_password(
    profile: &mut UserProfile,
    new_password: &str,
    params: &KdfParams,
    profiles: &ProfileStore,
    records: &mut RecordStore,
    session: &SessionKeyManager,
) -> Result<usize> {
    let old_key = session.current_key()?;
    verify_key(&profile.key_check, &old_key)?;

    let (staged, new_key) = stage_rekey(profile, new_password, params)?;

    // 1. The new salt reaches disk before any record changes.
    profiles.save(&staged)?;

    // 2. Records under the new key.  On failure the file still holds the
    //    old blobs, so drop the pending block again.
    let sealed = match records.reencrypt_all(&old_key, &new_key) {
        Ok(count) => records
            .save_with_key(&new_key)
            .map(|()| count)
            .map_err(|e| (e, true)),
        Err(e) => Err((e, false)),
    };
    let count = match sealed {
        Ok(count) => count,
        Err((e, reencrypted)) => {
            if reencrypted && records.reencrypt_all(&new_key, &old_key).is_err() {
                warn!(user_id = %profile.user_id, "in-memory records left under the new key; reopen the store");
            }
            if let Err(undo) = profiles.save(profile) {
                warn!(user_id = %profile.user_id, error = %undo, "pending password change left in profile");
                *profile = staged;
            }
            return Err(e);
        }
    };
    session.set_key(new_key);

    // 3. Promote.  If this save fails the profile on disk still carries
    //    the pending block, which the next unlock resolves.
    let mut promoted = staged.clone();
    promoted.promote_pending();
    if let Err(e) = profiles.save(&promoted) {
        *profile = staged;
        warn!(user_id = %profile.user_id, error = %e, "password change not finalized in profile");
        return Err(e);
    }
    *profile = promoted;

    info!(user_id = %profile.user_id, records = count, "password changed");
    Ok(count)
}

/// Derive the new key and return a copy of `profile` carrying it as pending.
fn stage_rekey(
    profile: &UserProfile,
    new_password: &str,
    params: &KdfParams,
) -> Result<(UserProfile, DerivedKey)> {
    let salt = crypto::generate_salt();
    let key = crypto::derive_key_with_params(new_password, &salt, params)?;
    let key_check = crypto::encrypt(KEY_CHECK_MARKER, &key)?;

    let mut staged = profile.clone();
    staged.pending = Some(PendingRekey {
        salt,
        kdf: *params,
        key_check,
        started_at: Utc::now(),
    });
    Ok((staged, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{AccountSecrets, OpenedRecord};
    use serde_json::Map;
    use tempfile::TempDir;

    fn params() -> KdfParams {
        KdfParams::default()
    }

    #[test]
    fn register_persists_and_unlocks() {
        let dir = TempDir::new().unwrap();
        let profiles = ProfileStore::new(dir.path());
        let session = SessionKeyManager::new();

        let profile = register(&profiles, "asha", "pw", &params(), &session).unwrap();
        assert!(session.is_unlocked());
        assert_eq!(profiles.load("asha").unwrap(), profile);
        assert_eq!(crypto::decode_salt(&profile.salt).unwrap().len(), 16);
    }

    #[test]
    fn register_twice_fails() {
        let dir = TempDir::new().unwrap();
        let profiles = ProfileStore::new(dir.path());
        let session = SessionKeyManager::new();

        register(&profiles, "asha", "pw", &params(), &session).unwrap();
        assert!(matches!(
            register(&profiles, "asha", "pw", &params(), &session),
            Err(FinVaultError::ProfileAlreadyExists(_))
        ));
    }

    #[test]
    fn unlock_with_wrong_password_keeps_session_locked() {
        let dir = TempDir::new().unwrap();
        let profiles = ProfileStore::new(dir.path());
        let session = SessionKeyManager::new();
        let profile = register(&profiles, "asha", "right", &params(), &session).unwrap();
        lock(&session);

        assert!(matches!(
            unlock(&profile, "wrong", &session),
            Err(FinVaultError::WrongPassword)
        ));
        assert!(!session.is_unlocked());

        unlock(&profile, "right", &session).unwrap();
        assert!(session.is_unlocked());
    }

    /// Register `asha` with one account record saved to disk.
    fn user_with_record(
        profiles: &ProfileStore,
        session: &SessionKeyManager,
    ) -> (UserProfile, RecordStore, String) {
        let profile = register(profiles, "asha", "old", &params(), session).unwrap();
        let mut records =
            RecordStore::create(&profiles.records_path_for("asha"), "asha", session).unwrap();
        let id = records.insert(&hdfc(), Map::new(), session).unwrap();
        records.save(session).unwrap();
        (profile, records, id)
    }

    fn hdfc() -> AccountSecrets {
        AccountSecrets {
            account_name: "HDFC Savings".into(),
            bank_name: None,
            account_number: Some("1234567890".into()),
        }
    }

    #[test]
    fn change_password_rekeys_records() {
        let dir = TempDir::new().unwrap();
        let profiles = ProfileStore::new(dir.path());
        let session = SessionKeyManager::new();
        let (mut profile, mut records, id) = user_with_record(&profiles, &session);
        let old_salt = profile.salt.clone();

        let count = change_password(
            &mut profile,
            "new",
            &params(),
            &profiles,
            &mut records,
            &session,
        )
        .unwrap();
        assert_eq!(count, 1);
        assert_ne!(profile.salt, old_salt);
        assert!(!profile.has_pending_rekey());

        // The stored profile and store open under the new password only.
        let stored = profiles.load("asha").unwrap();
        assert!(!stored.has_pending_rekey());
        assert!(matches!(
            stored.verify_password("old"),
            Err(FinVaultError::WrongPassword)
        ));

        let fresh = SessionKeyManager::new();
        assert_eq!(unlock(&stored, "new", &fresh).unwrap(), KeySlot::Current);
        let reopened = RecordStore::open(records.path(), &fresh).unwrap();
        assert!(reopened.integrity_ok());
        let opened: OpenedRecord<AccountSecrets> = reopened.get(&id, &fresh).unwrap();
        assert_eq!(opened.secrets, hdfc());
    }

    #[test]
    fn change_password_requires_the_profiles_key() {
        let dir = TempDir::new().unwrap();
        let profiles = ProfileStore::new(dir.path());
        let session = SessionKeyManager::new();
        let (mut profile, mut records, _) = user_with_record(&profiles, &session);
        let before = profile.clone();

        let foreign = SessionKeyManager::new();
        foreign.set_key(DerivedKey::from_bytes([9; 32]));
        let result = change_password(&mut profile, "new", &params(), &profiles, &mut records, &foreign);
        assert!(matches!(result, Err(FinVaultError::WrongPassword)));

        let locked = SessionKeyManager::new();
        let result = change_password(&mut profile, "new", &params(), &profiles, &mut records, &locked);
        assert!(matches!(result, Err(FinVaultError::SessionLocked)));

        assert_eq!(profile, before);
        assert_eq!(profiles.load("asha").unwrap(), before);
    }

    #[test]
    fn interrupted_after_records_write_finishes_on_unlock() {
        let dir = TempDir::new().unwrap();
        let profiles = ProfileStore::new(dir.path());
        let session = SessionKeyManager::new();
        let (profile, mut records, id) = user_with_record(&profiles, &session);
        let records_path = profiles.records_path_for("asha");

        // Steps 1 and 2 ran, the promote never did.
        let old_key = session.current_key().unwrap();
        let (staged, new_key) = stage_rekey(&profile, "new", &params()).unwrap();
        profiles.save(&staged).unwrap();
        records.reencrypt_all(&old_key, &new_key).unwrap();
        records.save_with_key(&new_key).unwrap();

        // The old password unlocks the profile but not the records.
        let mut loaded = profiles.load("asha").unwrap();
        let fresh = SessionKeyManager::new();
        let slot = unlock(&loaded, "old", &fresh).unwrap();
        assert_eq!(slot, KeySlot::Current);
        assert!(matches!(
            resolve_pending(&profiles, &mut loaded, slot, &records_path, &fresh),
            Err(FinVaultError::RekeyInterrupted("new"))
        ));
        assert!(!fresh.is_unlocked());

        // The new password finishes the change.
        let slot = unlock(&loaded, "new", &fresh).unwrap();
        assert_eq!(slot, KeySlot::Pending);
        resolve_pending(&profiles, &mut loaded, slot, &records_path, &fresh).unwrap();

        let stored = profiles.load("asha").unwrap();
        assert!(!stored.has_pending_rekey());
        assert_eq!(stored, loaded);
        stored.verify_password("new").unwrap();

        let reopened = RecordStore::open(&records_path, &fresh).unwrap();
        let opened: OpenedRecord<AccountSecrets> = reopened.get(&id, &fresh).unwrap();
        assert_eq!(opened.secrets, hdfc());
    }

    #[test]
    fn interrupted_before_records_write_rolls_back_on_unlock() {
        let dir = TempDir::new().unwrap();
        let profiles = ProfileStore::new(dir.path());
        let session = SessionKeyManager::new();
        let (profile, _records, id) = user_with_record(&profiles, &session);
        let records_path = profiles.records_path_for("asha");

        // Only step 1 ran.
        let (staged, _new_key) = stage_rekey(&profile, "new", &params()).unwrap();
        profiles.save(&staged).unwrap();

        let mut loaded = profiles.load("asha").unwrap();
        let fresh = SessionKeyManager::new();
        let slot = unlock(&loaded, "new", &fresh).unwrap();
        assert_eq!(slot, KeySlot::Pending);
        assert!(matches!(
            resolve_pending(&profiles, &mut loaded, slot, &records_path, &fresh),
            Err(FinVaultError::RekeyInterrupted("previous"))
        ));

        let slot = unlock(&loaded, "old", &fresh).unwrap();
        resolve_pending(&profiles, &mut loaded, slot, &records_path, &fresh).unwrap();

        let stored = profiles.load("asha").unwrap();
        assert!(!stored.has_pending_rekey());
        assert_eq!(stored.salt, profile.salt);

        let reopened = RecordStore::open(&records_path, &fresh).unwrap();
        assert!(reopened.integrity_ok());
        assert!(reopened.get::<AccountSecrets>(&id, &fresh).is_ok());
    }

    #[test]
    fn wrong_password_matches_neither_slot() {
        let dir = TempDir::new().unwrap();
        let profiles = ProfileStore::new(dir.path());
        let session = SessionKeyManager::new();
        let profile = register(&profiles, "asha", "old", &params(), &session).unwrap();
        let (staged, _) = stage_rekey(&profile, "new", &params()).unwrap();

        assert!(matches!(
            staged.match_password("neither"),
            Err(FinVaultError::WrongPassword)
        ));
    }

    #[test]
    fn outdated_kdf_is_flagged() {
        let dir = TempDir::new().unwrap();
        let profiles = ProfileStore::new(dir.path());
        let session = SessionKeyManager::new();
        let profile = register(&profiles, "asha", "pw", &params(), &session).unwrap();

        assert!(!profile.kdf_is_outdated(&params()));
        assert!(profile.kdf_is_outdated(&KdfParams::Pbkdf2Sha256 {
            iterations: 600_000
        }));
    }
}
