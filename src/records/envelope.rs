//! Sensitive record envelopes.
//!
//! A `SealedRecord` pairs one ciphertext blob (all sensitive fields of the
//! record) with the record's clear fields.  `OpenedRecord` is the same
//! record after decryption, and `RecordView` is what a list read returns
//! per record: either the opened record or a placeholder saying it could
//! not be decrypted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::kinds::RecordKind;
use crate::crypto::CiphertextBlob;
use crate::errors::FinVaultError;

/// A record as stored: blob + clear fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedRecord {
    /// Random UUID assigned at insert.
    pub id: String,

    pub kind: RecordKind,

    /// All sensitive fields, encrypted together.
    pub blob: CiphertextBlob,

    /// Non-sensitive fields (amounts, dates, enums, foreign keys).
    #[serde(default)]
    pub fields: Map<String, Value>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// A decrypted record.
#[derive(Debug, Clone)]
pub struct OpenedRecord<T> {
    pub id: String,
    pub kind: RecordKind,
    pub secrets: T,
    pub fields: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Clear-only view of a record.  Building one never touches the key.
#[derive(Debug, Clone)]
pub struct RecordSummary {
    pub id: String,
    pub kind: RecordKind,
    pub fields: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&SealedRecord> for RecordSummary {
    fn from(record: &SealedRecord) -> Self {
        Self {
            id: record.id.clone(),
            kind: record.kind,
            fields: record.fields.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Outcome of reading one record during a bulk read.
#[derive(Debug)]
pub enum RecordView<T> {
    Opened(OpenedRecord<T>),
    /// The blob did not decrypt (or did not fit `T`).  The clear fields are
    /// still available so the caller can render a placeholder row.
    Undecryptable {
        summary: RecordSummary,
        error: FinVaultError,
    },
}

impl<T> RecordView<T> {
    pub fn id(&self) -> &str {
        match self {
            Self::Opened(record) => &record.id,
            Self::Undecryptable { summary, .. } => &summary.id,
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Opened(record) => record.kind,
            Self::Undecryptable { summary, .. } => summary.kind,
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        match self {
            Self::Opened(record) => &record.fields,
            Self::Undecryptable { summary, .. } => &summary.fields,
        }
    }

    pub fn is_opened(&self) -> bool {
        matches!(self, Self::Opened(_))
    }

    /// The opened record, if decryption succeeded.
    pub fn opened(&self) -> Option<&OpenedRecord<T>> {
        match self {
            Self::Opened(record) => Some(record),
            Self::Undecryptable { .. } => None,
        }
    }
}
