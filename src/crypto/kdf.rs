//! Salt generation and password-based key derivation.
//!
//! The default KDF is PBKDF2-HMAC-SHA256 with at least 100 000
//! iterations.  Argon2id is available as a memory-hard alternative.
//! Whichever parameters were used at registration are recorded in the
//! user's profile (`KdfParams` is serializable) so that raising the
//! configured cost later never locks anyone out of their existing data.

use std::time::Instant;

use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;
use zeroize::Zeroize;

use super::keys::{DerivedKey, KEY_LEN};
use crate::errors::{FinVaultError, Result};

/// Length of the raw salt in bytes (128 bits).
pub const SALT_LEN: usize = 16;

/// Lowest PBKDF2 iteration count we will derive with.
pub const MIN_PBKDF2_ITERATIONS: u32 = 100_000;

/// PBKDF2 iteration count used when nothing else is configured.
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 100_000;

/// Minimum safe Argon2 memory cost in KiB (8 MB).
const MIN_ARGON2_MEMORY_KIB: u32 = 8_192;

/// KDF algorithm plus its cost parameters.
///
/// Stored in the user profile as e.g.
/// `{"algorithm":"pbkdf2-sha256","iterations":100000}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "algorithm")]
pub enum KdfParams {
    #[serde(rename = "pbkdf2-sha256")]
    Pbkdf2Sha256 { iterations: u32 },

    #[serde(rename = "argon2id")]
    Argon2id {
        /// Memory cost in KiB.
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
    },
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::Pbkdf2Sha256 {
            iterations: DEFAULT_PBKDF2_ITERATIONS,
        }
    }
}

impl KdfParams {
    /// Short algorithm name, matching the serialized tag.
    pub fn algorithm(&self) -> &'static str {
        match self {
            Self::Pbkdf2Sha256 { .. } => "pbkdf2-sha256",
            Self::Argon2id { .. } => "argon2id",
        }
    }

    /// Reject parameters below the minimum safe cost.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Pbkdf2Sha256 { iterations } => {
                if iterations < MIN_PBKDF2_ITERATIONS {
                    return Err(FinVaultError::WeakKdfParams(format!(
                        "PBKDF2 iterations must be at least {MIN_PBKDF2_ITERATIONS} (got {iterations})"
                    )));
                }
            }
            Self::Argon2id {
                memory_kib,
                iterations,
                parallelism,
            } => {
                if memory_kib < MIN_ARGON2_MEMORY_KIB {
                    return Err(FinVaultError::WeakKdfParams(format!(
                        "Argon2 memory_kib must be at least {MIN_ARGON2_MEMORY_KIB} (got {memory_kib})"
                    )));
                }
                if iterations < 1 {
                    return Err(FinVaultError::WeakKdfParams(
                        "Argon2 iterations must be at least 1".into(),
                    ));
                }
                if parallelism < 1 {
                    return Err(FinVaultError::WeakKdfParams(
                        "Argon2 parallelism must be at least 1".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Returns `true` if `self` costs less than `target`.
    ///
    /// A different algorithm always counts as weaker, so switching the
    /// configured algorithm flags every existing profile for migration.
    pub fn is_weaker_than(&self, target: &KdfParams) -> bool {
        match (*self, *target) {
            (Self::Pbkdf2Sha256 { iterations: ours }, Self::Pbkdf2Sha256 { iterations: theirs }) => {
                ours < theirs
            }
            (
                Self::Argon2id {
                    memory_kib: m1,
                    iterations: t1,
                    parallelism: p1,
                },
                Self::Argon2id {
                    memory_kib: m2,
                    iterations: t2,
                    parallelism: p2,
                },
            ) => m1 < m2 || t1 < t2 || p1 < p2,
            _ => true,
        }
    }
}

/// Generate a fresh random salt, base64-encoded for storage.
pub fn generate_salt() -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    BASE64.encode(salt)
}

/// Decode a stored salt back to its raw bytes.
///
/// Fails with `InvalidSaltFormat` if the text is not base64 or does not
/// decode to exactly `SALT_LEN` bytes.
pub fn decode_salt(salt: &str) -> Result<[u8; SALT_LEN]> {
    let bytes = BASE64
        .decode(salt)
        .map_err(|e| FinVaultError::InvalidSaltFormat(format!("not valid base64: {e}")))?;

    bytes.as_slice().try_into().map_err(|_| {
        FinVaultError::InvalidSaltFormat(format!(
            "expected {SALT_LEN} bytes, got {}",
            bytes.len()
        ))
    })
}

/// Derive a 32-byte key from a password and a stored salt using the
/// default parameters (PBKDF2-HMAC-SHA256, 100 000 iterations).
///
/// Only fails if the salt cannot be decoded.
pub fn derive_key(password: &str, salt: &str) -> Result<DerivedKey> {
    derive_key_with_params(password, salt, &KdfParams::default())
}

/// Derive a 32-byte key with explicit KDF parameters.
///
/// The same password + salt + params always produce the same key.
pub fn derive_key_with_params(password: &str, salt: &str, params: &KdfParams) -> Result<DerivedKey> {
    let salt_bytes = decode_salt(salt)?;
    params.validate()?;

    let started = Instant::now();
    let mut key = [0u8; KEY_LEN];

    match *params {
        KdfParams::Pbkdf2Sha256 { iterations } => {
            pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt_bytes, iterations, &mut key);
        }
        KdfParams::Argon2id {
            memory_kib,
            iterations,
            parallelism,
        } => {
            let argon_params = Params::new(memory_kib, iterations, parallelism, Some(KEY_LEN))
                .map_err(|e| {
                    FinVaultError::KeyDerivationFailed(format!("invalid Argon2 params: {e}"))
                })?;
            let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);
            argon2
                .hash_password_into(password.as_bytes(), &salt_bytes, &mut key)
                .map_err(|e| {
                    FinVaultError::KeyDerivationFailed(format!("Argon2id hashing failed: {e}"))
                })?;
        }
    }

    let derived = DerivedKey::from_bytes(key);
    key.zeroize();

    debug!(
        algorithm = params.algorithm(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "derived session key"
    );

    Ok(derived)
}
