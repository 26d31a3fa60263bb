//! AES-256-GCM record codec.
//!
//! `encrypt` serializes any `Serialize` payload to JSON, seals it under a
//! fresh random 12-byte nonce and returns a base64 `CiphertextBlob`.
//! `decrypt` reverses the process and fails with `DecryptionFailed` on any
//! authentication error, so a wrong key, a flipped bit or a truncated blob
//! never yields plaintext.
//!
//! Blob layouts (before base64):
//!
//! ```text
//! V1:     [0x01][ 12-byte nonce | ciphertext + 16-byte auth tag ]
//! Legacy:       [ 12-byte nonce | ciphertext + 16-byte auth tag ]
//! ```
//!
//! New blobs are written as V1.  Legacy blobs (no version byte) are still
//! accepted on read.

use std::fmt;

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::keys::DerivedKey;
use crate::errors::{FinVaultError, Result};

/// Size of the AES-256-GCM nonce in bytes.
pub const NONCE_LEN: usize = 12;

/// Size of the AES-256-GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Version byte prefixed to V1 blobs.
pub const BLOB_VERSION_1: u8 = 0x01;

/// Which byte layout to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlobFormat {
    /// Version byte, then nonce and ciphertext.
    #[default]
    V1,
    /// Nonce and ciphertext only.
    Legacy,
}

/// A base64-encoded, self-contained ciphertext.
///
/// Serializes as a plain JSON string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CiphertextBlob(String);

impl CiphertextBlob {
    /// Wrap blob text read from storage.  No validation happens until
    /// `decrypt` is called.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Guess the layout without a key.
    ///
    /// Returns `None` if the text is not base64 or is too short to hold a
    /// nonce and tag.  A legacy blob whose random nonce happens to start
    /// with `0x01` is reported as `V1`; `decrypt` handles that case.
    pub fn format_hint(&self) -> Option<BlobFormat> {
        let raw = BASE64.decode(&self.0).ok()?;
        if raw.len() < NONCE_LEN + TAG_LEN {
            return None;
        }
        if raw[0] == BLOB_VERSION_1 && raw.len() > NONCE_LEN + TAG_LEN {
            Some(BlobFormat::V1)
        } else {
            Some(BlobFormat::Legacy)
        }
    }
}

impl fmt::Display for CiphertextBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// JSON payloads
// ---------------------------------------------------------------------------

/// Encrypt a JSON-serializable payload into a V1 blob.
pub fn encrypt<T: Serialize + ?Sized>(payload: &T, key: &DerivedKey) -> Result<CiphertextBlob> {
    encrypt_with_format(payload, key, BlobFormat::V1)
}

/// Encrypt a JSON-serializable payload with an explicit blob layout.
pub fn encrypt_with_format<T: Serialize + ?Sized>(
    payload: &T,
    key: &DerivedKey,
    format: BlobFormat,
) -> Result<CiphertextBlob> {
    let plaintext = Zeroizing::new(
        serde_json::to_vec(payload)
            .map_err(|e| FinVaultError::SerializationError(format!("payload: {e}")))?,
    );

    seal_to_blob(key, &plaintext, format)
}

/// Decrypt a blob and deserialize the payload into `T`.
///
/// Authentication failures of any kind surface as `DecryptionFailed`.
/// If the plaintext authenticates but does not fit `T`, a
/// `SerializationError` is returned that names the position, never the
/// offending value.
pub fn decrypt<T: DeserializeOwned>(blob: &CiphertextBlob, key: &DerivedKey) -> Result<T> {
    let plaintext = open_blob(blob, key)?;

    serde_json::from_slice(&plaintext).map_err(|e| {
        FinVaultError::SerializationError(format!(
            "decrypted payload does not match the expected shape ({:?} error at line {} column {})",
            e.classify(),
            e.line(),
            e.column()
        ))
    })
}

/// Decrypt a blob into an untyped JSON value.
pub fn decrypt_value(blob: &CiphertextBlob, key: &DerivedKey) -> Result<serde_json::Value> {
    decrypt(blob, key)
}

/// Move a blob from one key to another without parsing its payload.
///
/// The result is always written as V1.
pub fn reencrypt(blob: &CiphertextBlob, old_key: &DerivedKey, new_key: &DerivedKey) -> Result<CiphertextBlob> {
    let plaintext = open_blob(blob, old_key)?;
    seal_to_blob(new_key, &plaintext, BlobFormat::V1)
}

// ---------------------------------------------------------------------------
// Raw bytes
// ---------------------------------------------------------------------------

/// Encrypt `plaintext` under `key`.
///
/// Returns the nonce prepended to the ciphertext (nonce || ciphertext).
pub fn seal(key: &DerivedKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| FinVaultError::EncryptionFailed(format!("invalid key length: {e}")))?;

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| FinVaultError::EncryptionFailed(format!("encryption error: {e}")))?;

    let mut output = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    output.extend_from_slice(&nonce);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

/// Decrypt data that was produced by `seal`.
pub fn open(key: &DerivedKey, sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(FinVaultError::DecryptionFailed);
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher =
        Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| FinVaultError::DecryptionFailed)?;

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| FinVaultError::DecryptionFailed)?;

    Ok(Zeroizing::new(plaintext))
}

fn seal_to_blob(key: &DerivedKey, plaintext: &[u8], format: BlobFormat) -> Result<CiphertextBlob> {
    let sealed = seal(key, plaintext)?;

    let encoded = match format {
        BlobFormat::V1 => {
            let mut raw = Vec::with_capacity(1 + sealed.len());
            raw.push(BLOB_VERSION_1);
            raw.extend_from_slice(&sealed);
            BASE64.encode(raw)
        }
        BlobFormat::Legacy => BASE64.encode(&sealed),
    };

    Ok(CiphertextBlob(encoded))
}

/// Decode and authenticate a blob of either layout.
fn open_blob(blob: &CiphertextBlob, key: &DerivedKey) -> Result<Zeroizing<Vec<u8>>> {
    let raw = BASE64
        .decode(blob.as_str())
        .map_err(|_| FinVaultError::DecryptionFailed)?;

    if let Some((&BLOB_VERSION_1, rest)) = raw.split_first() {
        if let Ok(plaintext) = open(key, rest) {
            return Ok(plaintext);
        }
    }

    // Either no version byte, or a legacy nonce that starts with 0x01.
    open(key, &raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(byte: u8) -> DerivedKey {
        DerivedKey::from_bytes([byte; 32])
    }

    #[test]
    fn v1_blob_has_version_byte_nonce_and_tag() {
        let blob = encrypt(&json!("x"), &key(1)).unwrap();
        let raw = BASE64.decode(blob.as_str()).unwrap();
        // version + nonce + `"x"` + tag
        assert_eq!(raw.len(), 1 + NONCE_LEN + 3 + TAG_LEN);
        assert_eq!(raw[0], BLOB_VERSION_1);
        assert_eq!(blob.format_hint(), Some(BlobFormat::V1));
    }

    #[test]
    fn legacy_blob_has_no_version_byte() {
        let blob = encrypt_with_format(&json!("x"), &key(1), BlobFormat::Legacy).unwrap();
        let raw = BASE64.decode(blob.as_str()).unwrap();
        assert_eq!(raw.len(), NONCE_LEN + 3 + TAG_LEN);
        assert_eq!(decrypt_value(&blob, &key(1)).unwrap(), json!("x"));
    }

    #[test]
    fn legacy_blob_starting_with_version_byte_still_decrypts() {
        // Force a legacy nonce whose first byte collides with the V1 marker.
        let k = key(3);
        let plaintext = serde_json::to_vec(&json!({"notes": "rent"})).unwrap();
        let cipher = Aes256Gcm::new_from_slice(k.as_bytes()).unwrap();
        let mut nonce_bytes = [0x55u8; NONCE_LEN];
        nonce_bytes[0] = BLOB_VERSION_1;
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ct = cipher.encrypt(nonce, plaintext.as_slice()).unwrap();

        let mut raw = nonce_bytes.to_vec();
        raw.extend_from_slice(&ct);
        let blob = CiphertextBlob::from_text(BASE64.encode(raw));

        assert_eq!(decrypt_value(&blob, &k).unwrap(), json!({"notes": "rent"}));
    }

    #[test]
    fn non_base64_blob_is_decryption_failure() {
        let blob = CiphertextBlob::from_text("@@not-base64@@");
        assert!(matches!(
            decrypt_value(&blob, &key(1)),
            Err(FinVaultError::DecryptionFailed)
        ));
        assert_eq!(blob.format_hint(), None);
    }

    #[test]
    fn empty_blob_is_decryption_failure() {
        let blob = CiphertextBlob::from_text("");
        assert!(matches!(
            decrypt_value(&blob, &key(1)),
            Err(FinVaultError::DecryptionFailed)
        ));
    }

    #[test]
    fn shape_mismatch_does_not_leak_plaintext() {
        let blob = encrypt(&json!({"accountNumber": "9876543210"}), &key(4)).unwrap();
        let err = decrypt::<u64>(&blob, &key(4)).unwrap_err();
        assert!(matches!(err, FinVaultError::SerializationError(_)));
        assert!(!err.to_string().contains("9876543210"));
    }

    #[test]
    fn reencrypt_moves_blob_to_new_key() {
        let old = key(5);
        let new = key(6);
        let blob = encrypt_with_format(&json!([1, 2, 3]), &old, BlobFormat::Legacy).unwrap();

        let moved = reencrypt(&blob, &old, &new).unwrap();
        assert_eq!(moved.format_hint(), Some(BlobFormat::V1));
        assert_eq!(decrypt_value(&moved, &new).unwrap(), json!([1, 2, 3]));
        assert!(decrypt_value(&moved, &old).is_err());
    }

    #[test]
    fn reencrypt_with_wrong_old_key_fails() {
        let blob = encrypt(&json!(1), &key(7)).unwrap();
        assert!(matches!(
            reencrypt(&blob, &key(8), &key(9)),
            Err(FinVaultError::DecryptionFailed)
        ));
    }

    #[test]
    fn blob_serializes_as_plain_string() {
        let blob = CiphertextBlob::from_text("AAAA");
        assert_eq!(serde_json::to_string(&blob).unwrap(), "\"AAAA\"");
    }
}
