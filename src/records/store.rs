//! High-level record operations used by CLI commands.
//!
//! `RecordStore` keeps sealed records in memory and persists them through
//! the binary format layer.  It never holds a key itself: every operation
//! that needs one asks the `SessionKeyManager`, so locking the session
//! immediately stops reads and writes with `SessionLocked`.
//!
//! Updates to sensitive fields always decrypt the whole blob, apply the
//! change to the typed struct and re-encrypt everything under a fresh
//! nonce.  Fields are never encrypted one by one.
//!
//! A store whose file HMAC does not verify still opens, so the records
//! that decrypt can be read and the rest come back as placeholders.  Such
//! a store is read-only: saving it would re-sign the damaged contents.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use super::envelope::{OpenedRecord, RecordSummary, RecordView, SealedRecord};
use super::format::{self, StoreHeader, CURRENT_VERSION};
use super::kinds::{RecordKind, SensitiveFields};
use crate::crypto::codec::{self, decrypt, encrypt};
use crate::crypto::keys::DerivedKey;
use crate::errors::{FinVaultError, Result};
use crate::session::SessionKeyManager;

/// Handle to one user's record store.
pub struct RecordStore {
    /// Path to the `.records` file on disk.
    path: PathBuf,

    header: StoreHeader,

    /// id -> sealed record.
    records: HashMap<String, SealedRecord>,

    /// False when the file HMAC did not verify on open.
    integrity_ok: bool,
}

impl RecordStore {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Create an empty store at `path` and write it to disk.
    ///
    /// The session must be unlocked: the file HMAC is keyed from it.
    pub fn create(path: &Path, owner: &str, session: &SessionKeyManager) -> Result<Self> {
        if path.exists() {
            return Err(FinVaultError::StoreAlreadyExists(path.to_path_buf()));
        }

        let store = Self {
            path: path.to_path_buf(),
            header: StoreHeader {
                version: CURRENT_VERSION,
                owner: owner.to_string(),
                created_at: Utc::now(),
            },
            records: HashMap::new(),
            integrity_ok: true,
        };

        store.save(session)?;
        Ok(store)
    }

    /// Open an existing store, verifying its HMAC with the session key.
    ///
    /// An HMAC mismatch does not fail the open; the store comes back with
    /// `integrity_ok() == false` and refuses to save.
    pub fn open(path: &Path, session: &SessionKeyManager) -> Result<Self> {
        let raw = format::read_store(path)?;

        let key = session.current_key()?;
        let hmac_key = key.derive_store_mac_key()?;
        let integrity_ok = match format::verify_hmac(
            hmac_key.as_slice(),
            &raw.header_bytes,
            &raw.records_bytes,
            &raw.stored_hmac,
        ) {
            Ok(()) => true,
            Err(FinVaultError::HmacMismatch) => {
                warn!(path = %path.display(), "record store failed its integrity check, opened read-only");
                false
            }
            Err(e) => return Err(e),
        };

        let records = raw
            .records
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();

        Ok(Self {
            path: path.to_path_buf(),
            header: raw.header,
            records,
            integrity_ok,
        })
    }

    /// Whether the store at `path` was written under `key`.
    ///
    /// True when the file HMAC verifies, or when it does not but at least
    /// one blob still decrypts under `key` (a damaged store that is ours).
    pub fn is_sealed_with(path: &Path, key: &DerivedKey) -> Result<bool> {
        let raw = format::read_store(path)?;
        let hmac_key = key.derive_store_mac_key()?;
        match format::verify_hmac(
            hmac_key.as_slice(),
            &raw.header_bytes,
            &raw.records_bytes,
            &raw.stored_hmac,
        ) {
            Ok(()) => return Ok(true),
            Err(FinVaultError::HmacMismatch) => {}
            Err(e) => return Err(e),
        }

        Ok(raw
            .records
            .iter()
            .any(|r| codec::decrypt_value(&r.blob, key).is_ok()))
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Seal a new record and return its id.
    pub fn insert<T: SensitiveFields>(
        &mut self,
        secrets: &T,
        fields: Map<String, Value>,
        session: &SessionKeyManager,
    ) -> Result<String> {
        T::KIND.check_clear_fields(&fields)?;
        let key = session.current_key()?;
        let blob = encrypt(secrets, &key)?;
        Ok(self.insert_sealed(T::KIND, blob, fields))
    }

    /// Seal a new record from an untyped payload.
    ///
    /// The payload is validated against the kind's sensitive-field struct
    /// first, so only known fields ever reach the blob.
    pub fn insert_value(
        &mut self,
        kind: RecordKind,
        secrets: Value,
        fields: Map<String, Value>,
        session: &SessionKeyManager,
    ) -> Result<String> {
        kind.check_clear_fields(&fields)?;
        let secrets = kind.normalize_secrets(secrets)?;
        let key = session.current_key()?;
        let blob = encrypt(&secrets, &key)?;
        Ok(self.insert_sealed(kind, blob, fields))
    }

    fn insert_sealed(
        &mut self,
        kind: RecordKind,
        blob: codec::CiphertextBlob,
        fields: Map<String, Value>,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let record = SealedRecord {
            id: id.clone(),
            kind,
            blob,
            fields,
            created_at: now,
            updated_at: now,
        };
        self.records.insert(id.clone(), record);
        debug!(record_id = %id, kind = %kind, "sealed new record");
        id
    }

    /// Decrypt a record's sensitive fields, let `update` change them, and
    /// re-encrypt the whole set.
    pub fn update_sensitive<T, F>(
        &mut self,
        id: &str,
        session: &SessionKeyManager,
        update: F,
    ) -> Result<()>
    where
        T: SensitiveFields,
        F: FnOnce(&mut T),
    {
        let key = session.current_key()?;
        let record = self.record_of_kind_mut(id, T::KIND)?;

        let mut secrets: T = decrypt(&record.blob, &key)?;
        update(&mut secrets);

        record.blob = encrypt(&secrets, &key)?;
        record.updated_at = Utc::now();
        debug!(record_id = %id, "re-sealed record after update");
        Ok(())
    }

    /// Merge a partial set of sensitive fields into a record.
    ///
    /// Keys in `patch` replace the stored values; a `null` value removes an
    /// optional field.  The merged result must still fit the kind's struct.
    pub fn apply_patch(
        &mut self,
        id: &str,
        patch: &Map<String, Value>,
        session: &SessionKeyManager,
    ) -> Result<()> {
        let key = session.current_key()?;
        let record = self.record_mut(id)?;
        let kind = record.kind;

        let current = codec::decrypt_value(&record.blob, &key)?;
        let Value::Object(mut merged) = current else {
            return Err(FinVaultError::InvalidPatch(format!(
                "record '{id}' does not hold an object payload"
            )));
        };

        for (name, value) in patch {
            if value.is_null() {
                merged.remove(name);
            } else {
                merged.insert(name.clone(), value.clone());
            }
        }

        let normalized = kind.normalize_secrets(Value::Object(merged))?;
        record.blob = encrypt(&normalized, &key)?;
        record.updated_at = Utc::now();
        debug!(record_id = %id, fields = patch.len(), "re-sealed record after patch");
        Ok(())
    }

    /// Merge clear fields into a record.  A `null` value removes a field.
    pub fn update_fields(&mut self, id: &str, patch: Map<String, Value>) -> Result<()> {
        let record = self.record_mut(id)?;
        record.kind.check_clear_fields(&patch)?;

        for (name, value) in patch {
            if value.is_null() {
                record.fields.remove(&name);
            } else {
                record.fields.insert(name, value);
            }
        }
        record.updated_at = Utc::now();
        Ok(())
    }

    /// Remove a record and its blob.
    pub fn delete(&mut self, id: &str) -> Result<SealedRecord> {
        self.records
            .remove(id)
            .ok_or_else(|| FinVaultError::RecordNotFound(id.to_string()))
    }

    /// Move every blob from `old_key` to `new_key`.
    ///
    /// All new blobs are computed before any record is touched, so a
    /// failure leaves the store unchanged.  Returns the number of records
    /// re-encrypted.
    pub fn reencrypt_all(&mut self, old_key: &DerivedKey, new_key: &DerivedKey) -> Result<usize> {
        let mut moved = Vec::with_capacity(self.records.len());
        for (id, record) in &self.records {
            moved.push((id.clone(), codec::reencrypt(&record.blob, old_key, new_key)?));
        }

        let count = moved.len();
        for (id, blob) in moved {
            if let Some(record) = self.records.get_mut(&id) {
                record.blob = blob;
            }
        }
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Decrypt one record of a known kind.
    pub fn get<T: SensitiveFields>(
        &self,
        id: &str,
        session: &SessionKeyManager,
    ) -> Result<OpenedRecord<T>> {
        let record = self.record_of_kind(id, T::KIND)?;
        let key = session.current_key()?;
        open_record(record, &key)
    }

    /// Decrypt one record of any kind into untyped JSON.
    pub fn get_value(&self, id: &str, session: &SessionKeyManager) -> Result<OpenedRecord<Value>> {
        let record = self.record(id)?;
        let key = session.current_key()?;
        open_record(record, &key)
    }

    /// Decrypt every record of `T`'s kind, oldest first.
    ///
    /// A record that fails to decrypt does not abort the read; it comes
    /// back as `RecordView::Undecryptable`.  Only a locked session fails
    /// the whole call.
    pub fn read_all<T: SensitiveFields>(&self, session: &SessionKeyManager) -> Result<Vec<RecordView<T>>> {
        self.read_matching(Some(T::KIND), session)
    }

    /// Decrypt every record (optionally of one kind) into untyped JSON.
    pub fn read_all_values(
        &self,
        kind: Option<RecordKind>,
        session: &SessionKeyManager,
    ) -> Result<Vec<RecordView<Value>>> {
        self.read_matching(kind, session)
    }

    fn read_matching<T: DeserializeOwned>(
        &self,
        kind: Option<RecordKind>,
        session: &SessionKeyManager,
    ) -> Result<Vec<RecordView<T>>> {
        let key = session.current_key()?;

        let views = self
            .sorted_records(kind)
            .into_iter()
            .map(|record| match open_record(record, &key) {
                Ok(opened) => RecordView::Opened(opened),
                Err(error) => {
                    warn!(record_id = %record.id, kind = %record.kind, %error, "record could not be decrypted");
                    RecordView::Undecryptable {
                        summary: RecordSummary::from(record),
                        error,
                    }
                }
            })
            .collect();

        Ok(views)
    }

    /// Clear fields of every record (optionally of one kind), oldest first.
    /// Does not need the key.
    pub fn summaries(&self, kind: Option<RecordKind>) -> Vec<RecordSummary> {
        self.sorted_records(kind)
            .into_iter()
            .map(RecordSummary::from)
            .collect()
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Write the store to disk, HMAC-keyed from the session key.
    pub fn save(&self, session: &SessionKeyManager) -> Result<()> {
        let key = session.current_key()?;
        self.save_with_key(&key)
    }

    /// Write the store to disk, HMAC-keyed from an explicit key.
    ///
    /// Used while changing the password, before the new key is installed
    /// in the session.  Fails with `HmacMismatch` if the store was opened
    /// from a file that failed its integrity check.
    pub fn save_with_key(&self, key: &DerivedKey) -> Result<()> {
        if !self.integrity_ok {
            return Err(FinVaultError::HmacMismatch);
        }

        let mut list: Vec<SealedRecord> = self.records.values().cloned().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));

        let hmac_key = key.derive_store_mac_key()?;
        format::write_store(&self.path, &self.header, &list, hmac_key.as_slice())
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// User id the store belongs to.
    pub fn owner(&self) -> &str {
        &self.header.owner
    }

    pub fn created_at(&self) -> chrono::DateTime<Utc> {
        self.header.created_at
    }

    /// False if the file HMAC did not verify when the store was opened.
    pub fn integrity_ok(&self) -> bool {
        self.integrity_ok
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Kind of a record, without decrypting it.
    pub fn kind_of(&self, id: &str) -> Result<RecordKind> {
        self.record(id).map(|r| r.kind)
    }

    /// The raw sealed record, e.g. for export or inspection.
    pub fn sealed(&self, id: &str) -> Result<&SealedRecord> {
        self.record(id)
    }

    // ------------------------------------------------------------------
    // Lookup helpers
    // ------------------------------------------------------------------

    fn record(&self, id: &str) -> Result<&SealedRecord> {
        self.records
            .get(id)
            .ok_or_else(|| FinVaultError::RecordNotFound(id.to_string()))
    }

    fn record_mut(&mut self, id: &str) -> Result<&mut SealedRecord> {
        self.records
            .get_mut(id)
            .ok_or_else(|| FinVaultError::RecordNotFound(id.to_string()))
    }

    fn record_of_kind(&self, id: &str, kind: RecordKind) -> Result<&SealedRecord> {
        let record = self.record(id)?;
        ensure_kind(record, kind)?;
        Ok(record)
    }

    fn record_of_kind_mut(&mut self, id: &str, kind: RecordKind) -> Result<&mut SealedRecord> {
        let record = self.record_mut(id)?;
        ensure_kind(record, kind)?;
        Ok(record)
    }

    fn sorted_records(&self, kind: Option<RecordKind>) -> Vec<&SealedRecord> {
        let mut list: Vec<&SealedRecord> = self
            .records
            .values()
            .filter(|r| kind.map_or(true, |k| r.kind == k))
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        list
    }
}

#[cfg(test)]
impl RecordStore {
    /// Mutable access to a sealed record, for tamper tests.
    pub(crate) fn sealed_mut(&mut self, id: &str) -> Option<&mut SealedRecord> {
        self.records.get_mut(id)
    }
}

fn ensure_kind(record: &SealedRecord, expected: RecordKind) -> Result<()> {
    if record.kind != expected {
        return Err(FinVaultError::RecordKindMismatch {
            id: record.id.clone(),
            expected: expected.to_string(),
            actual: record.kind.to_string(),
        });
    }
    Ok(())
}

fn open_record<T: DeserializeOwned>(record: &SealedRecord, key: &DerivedKey) -> Result<OpenedRecord<T>> {
    let secrets = decrypt(&record.blob, key)?;
    Ok(OpenedRecord {
        id: record.id.clone(),
        kind: record.kind,
        secrets,
        fields: record.fields.clone(),
        created_at: record.created_at,
        updated_at: record.updated_at,
    })
}
