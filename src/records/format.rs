//! Binary record store format and HMAC integrity verification.
//!
//! A `.records` file has this layout:
//!
//! ```text
//! [FVRS: 4 bytes][version: 1 byte][header_len: 4 bytes LE][header JSON][records JSON][HMAC-SHA256: 32 bytes]
//! ```
//!
//! - **Magic** (`FVRS`): identifies the file as a FinVault record store.
//! - **Version**: format version (currently `1`).
//! - **Header length**: little-endian u32 telling us where the header
//!   JSON ends and the records JSON begins.
//! - **Header JSON**: serialized `StoreHeader`.
//! - **Records JSON**: serialized `Vec<SealedRecord>`.
//! - **HMAC-SHA256**: 32-byte tag over header + records bytes, keyed with
//!   a sub-key of the session key.  Each blob already authenticates its own
//!   sensitive fields; the HMAC also covers the clear fields and the set
//!   of records.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::envelope::SealedRecord;
use crate::errors::{FinVaultError, Result};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic bytes at the start of every record store.
const MAGIC: &[u8; 4] = b"FVRS";

/// Current binary format version.
pub const CURRENT_VERSION: u8 = 1;

/// Size of the HMAC tag appended to the file (SHA-256 = 32 bytes).
const HMAC_LEN: usize = 32;

/// Fixed-size prefix: 4 (magic) + 1 (version) + 4 (header_len).
const PREFIX_LEN: usize = 9;

// ---------------------------------------------------------------------------
// StoreHeader
// ---------------------------------------------------------------------------

/// Metadata stored at the beginning of a record store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreHeader {
    /// Format version.
    pub version: u8,

    /// User id of the profile whose key seals this store.
    pub owner: String,

    /// When this store was first created.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Write a record store to disk **atomically**.
///
/// 1. Serialize header and records to JSON.
/// 2. Compute HMAC over header + records bytes.
/// 3. Write to a temp file in the same directory.
/// 4. Rename temp file over the target path.
pub fn write_store(
    path: &Path,
    header: &StoreHeader,
    records: &[SealedRecord],
    hmac_key: &[u8],
) -> Result<()> {
    let header_bytes = serde_json::to_vec(header)
        .map_err(|e| FinVaultError::SerializationError(format!("header: {e}")))?;
    let records_bytes = serde_json::to_vec(records)
        .map_err(|e| FinVaultError::SerializationError(format!("records: {e}")))?;

    let hmac_tag = compute_hmac(hmac_key, &header_bytes, &records_bytes)?;

    let header_len = u32::try_from(header_bytes.len()).map_err(|_| {
        FinVaultError::SerializationError(format!(
            "header length {} exceeds u32::MAX",
            header_bytes.len()
        ))
    })?;
    let total = PREFIX_LEN + header_bytes.len() + records_bytes.len() + HMAC_LEN;
    let mut buf = Vec::with_capacity(total);

    buf.extend_from_slice(MAGIC);
    buf.push(CURRENT_VERSION);
    buf.extend_from_slice(&header_len.to_le_bytes());
    buf.extend_from_slice(&header_bytes);
    buf.extend_from_slice(&records_bytes);
    buf.extend_from_slice(&hmac_tag);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let parent = path.parent().unwrap_or(Path::new("."));
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ));

    fs::write(&tmp_path, &buf)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
    }

    fs::rename(&tmp_path, path)?;

    Ok(())
}

/// Raw data read from a record store on disk.
///
/// Keeps the original bytes so the HMAC can be verified over the exact
/// bytes that were written.
pub struct RawStore {
    pub header: StoreHeader,
    pub records: Vec<SealedRecord>,
    pub header_bytes: Vec<u8>,
    pub records_bytes: Vec<u8>,
    pub stored_hmac: Vec<u8>,
}

/// Read a record store from disk and return its parts **with raw bytes**.
///
/// The caller must verify the HMAC before trusting the records.
pub fn read_store(path: &Path) -> Result<RawStore> {
    if !path.exists() {
        return Err(FinVaultError::StoreNotFound(path.to_path_buf()));
    }

    let data = fs::read(path)?;

    if data.len() < PREFIX_LEN + HMAC_LEN {
        return Err(FinVaultError::InvalidStoreFormat(
            "file too small to be a valid record store".into(),
        ));
    }

    if &data[0..4] != MAGIC {
        return Err(FinVaultError::InvalidStoreFormat(
            "missing FVRS magic bytes".into(),
        ));
    }

    let version = data[4];
    if version != CURRENT_VERSION {
        return Err(FinVaultError::InvalidStoreFormat(format!(
            "unsupported version {version}, expected {CURRENT_VERSION}"
        )));
    }

    let header_len_u32 = u32::from_le_bytes(
        data[5..9]
            .try_into()
            .map_err(|_| FinVaultError::InvalidStoreFormat("bad header length".into()))?,
    );
    let header_len = usize::try_from(header_len_u32).map_err(|_| {
        FinVaultError::InvalidStoreFormat(format!(
            "header length {header_len_u32} exceeds platform address space"
        ))
    })?;

    let header_end = PREFIX_LEN + header_len;
    if header_end + HMAC_LEN > data.len() {
        return Err(FinVaultError::InvalidStoreFormat(
            "header length exceeds file size".into(),
        ));
    }

    let header_bytes = data[PREFIX_LEN..header_end].to_vec();
    let records_end = data.len() - HMAC_LEN;
    let records_bytes = data[header_end..records_end].to_vec();
    let stored_hmac = data[records_end..].to_vec();

    let header: StoreHeader = serde_json::from_slice(&header_bytes)
        .map_err(|e| FinVaultError::InvalidStoreFormat(format!("header JSON: {e}")))?;

    let records: Vec<SealedRecord> = serde_json::from_slice(&records_bytes)
        .map_err(|e| FinVaultError::InvalidStoreFormat(format!("records JSON: {e}")))?;

    Ok(RawStore {
        header,
        records,
        header_bytes,
        records_bytes,
        stored_hmac,
    })
}

/// Compute HMAC-SHA256 over header + records bytes.
pub fn compute_hmac(hmac_key: &[u8], header_bytes: &[u8], records_bytes: &[u8]) -> Result<Vec<u8>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(hmac_key)
        .map_err(|e| FinVaultError::HmacError(format!("invalid HMAC key: {e}")))?;

    mac.update(header_bytes);
    mac.update(records_bytes);

    Ok(mac.finalize().into_bytes().to_vec())
}

/// Verify the stored HMAC in constant time.
pub fn verify_hmac(
    hmac_key: &[u8],
    header_bytes: &[u8],
    records_bytes: &[u8],
    expected_hmac: &[u8],
) -> Result<()> {
    let mut mac = Hmac::<Sha256>::new_from_slice(hmac_key)
        .map_err(|e| FinVaultError::HmacError(format!("invalid HMAC key: {e}")))?;

    mac.update(header_bytes);
    mac.update(records_bytes);

    mac.verify_slice(expected_hmac)
        .map_err(|_| FinVaultError::HmacMismatch)
}
