//! Cryptographic primitives for FinVault.
//!
//! This module provides:
//! - Salt generation and password-based key derivation (`kdf`)
//! - The zeroizing `DerivedKey` wrapper and HKDF sub-keys (`keys`)
//! - The AES-256-GCM record codec that turns JSON payloads into
//!   self-contained ciphertext blobs and back (`codec`)

pub mod codec;
pub mod kdf;
pub mod keys;

// Re-export the most commonly used items so callers can write:
//   use crate::crypto::{generate_salt, derive_key, encrypt, decrypt};
pub use codec::{decrypt, decrypt_value, encrypt, encrypt_with_format, BlobFormat, CiphertextBlob};
pub use kdf::{decode_salt, derive_key, derive_key_with_params, generate_salt, KdfParams};
pub use keys::{DerivedKey, KEY_LEN};
