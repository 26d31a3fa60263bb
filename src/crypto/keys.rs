//! In-memory key material.
//!
//! `DerivedKey` is the only type that ever holds the 256-bit key produced
//! by the KDF.  It zeroes its bytes on drop, redacts itself in `Debug`
//! output, and implements no serde traits, so it cannot end up on disk
//! or in a log line by accident.
//!
//! The record store's integrity key is derived from it with HKDF-SHA256
//! (RFC 5869) so that one password-derived key can serve both purposes
//! without reuse.

use std::fmt;

use hkdf::Hkdf;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, Zeroizing};

use crate::errors::{FinVaultError, Result};

/// Length of a derived key in bytes (256 bits, for AES-256-GCM).
pub const KEY_LEN: usize = 32;

/// HKDF `info` for the record store HMAC key.
const STORE_MAC_INFO: &[u8] = b"finvault-store-hmac";

/// A 32-byte symmetric key that zeroes its memory when dropped.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct DerivedKey {
    bytes: [u8; KEY_LEN],
}

impl DerivedKey {
    /// Wrap raw key bytes.
    ///
    /// The caller still owns (and should zeroize) its own copy.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Access the raw key bytes (e.g. to build a cipher).
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    /// Derive the key used to HMAC the on-disk record store.
    pub fn derive_store_mac_key(&self) -> Result<Zeroizing<[u8; KEY_LEN]>> {
        self.derive_subkey(STORE_MAC_INFO)
    }

    /// Run HKDF-SHA256 expand with the given `info`.
    ///
    /// No extract salt: the input already came out of a password KDF.
    fn derive_subkey(&self, info: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
        let hk = Hkdf::<Sha256>::new(None, &self.bytes);

        let mut okm = Zeroizing::new([0u8; KEY_LEN]);
        hk.expand(info, &mut okm[..])
            .map_err(|e| FinVaultError::KeyDerivationFailed(format!("HKDF expand failed: {e}")))?;

        Ok(okm)
    }
}

impl PartialEq for DerivedKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes.ct_eq(&other.bytes).into()
    }
}

impl Eq for DerivedKey {}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey(<redacted>)")
    }
}
