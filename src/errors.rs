use std::path::PathBuf;
use thiserror::Error;

/// All errors that can occur in FinVault.
///
/// None of the variants carry plaintext payloads or key material, so any
/// of them can be printed or logged as-is.
#[derive(Debug, Error)]
pub enum FinVaultError {
    // --- Crypto errors ---
    #[error("Invalid salt format: {0}")]
    InvalidSaltFormat(String),

    #[error("Decryption failed — wrong key or corrupted data")]
    DecryptionFailed,

    #[error("Session is locked — unlock with your password first")]
    SessionLocked,

    #[error("Wrong password")]
    WrongPassword,

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("KDF parameters too weak: {0}")]
    WeakKdfParams(String),

    // --- Profile errors ---
    #[error("No profile found for user '{0}'")]
    ProfileNotFound(String),

    #[error("A profile for user '{0}' already exists")]
    ProfileAlreadyExists(String),

    #[error("Invalid profile: {0}")]
    InvalidProfile(String),

    #[error("A password change was interrupted — records are sealed under your {0} password; unlock with that one")]
    RekeyInterrupted(&'static str),

    // --- Record store errors ---
    #[error("Record store not found at {0}")]
    StoreNotFound(PathBuf),

    #[error("Record store already exists at {0}")]
    StoreAlreadyExists(PathBuf),

    #[error("Invalid record store format: {0}")]
    InvalidStoreFormat(String),

    #[error("HMAC verification failed — record store may be tampered")]
    HmacMismatch,

    #[error("HMAC error: {0}")]
    HmacError(String),

    #[error("Record '{0}' not found")]
    RecordNotFound(String),

    #[error("Record '{id}' is a {actual}, not a {expected}")]
    RecordKindMismatch {
        id: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid patch: {0}")]
    InvalidPatch(String),

    // --- Config errors ---
    #[error("Config file error: {0}")]
    ConfigError(String),

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // --- Serialization errors ---
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // --- CLI errors ---
    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("User cancelled operation")]
    UserCancelled,

    #[error("Audit error: {0}")]
    AuditError(String),
}

/// Convenience type alias for FinVault results.
pub type Result<T> = std::result::Result<T, FinVaultError>;
