//! Record kinds and their fixed sensitive-field partitions.
//!
//! Each kind has exactly one struct describing what goes inside its
//! ciphertext blob.  Everything else about a record (amounts, dates,
//! enums, foreign keys) is stored in the clear so it can be filtered and
//! sorted without the key.  Changing one of these structs changes what
//! old blobs decode to, so fields may be added as optional but never
//! renamed or removed.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::errors::{FinVaultError, Result};

/// The kinds of record that carry encrypted fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Account,
    Transaction,
    Budget,
    Goal,
    Investment,
}

impl RecordKind {
    pub const ALL: [RecordKind; 5] = [
        RecordKind::Account,
        RecordKind::Transaction,
        RecordKind::Budget,
        RecordKind::Goal,
        RecordKind::Investment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Transaction => "transaction",
            Self::Budget => "budget",
            Self::Goal => "goal",
            Self::Investment => "investment",
        }
    }

    /// JSON names of the fields that live inside the blob for this kind.
    pub fn sensitive_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Account => &["accountName", "bankName", "accountNumber"],
            Self::Transaction => &["description", "merchant", "notes", "tags"],
            Self::Budget => &["name", "notes"],
            Self::Goal => &["name", "notes"],
            Self::Investment => &["name", "broker", "folioNumber", "notes"],
        }
    }

    /// Sensitive fields that hold a list of strings rather than one.
    pub fn list_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Transaction => &["tags"],
            _ => &[],
        }
    }

    /// The field shown as a record's label in listings.
    pub fn label_field(&self) -> &'static str {
        match self {
            Self::Account => "accountName",
            Self::Transaction => "description",
            Self::Budget | Self::Goal | Self::Investment => "name",
        }
    }

    /// Check a JSON payload against this kind's typed struct and return it
    /// in canonical form.
    ///
    /// Unknown fields, missing required fields and wrong types are all
    /// rejected with `InvalidPatch`.
    pub fn normalize_secrets(&self, value: Value) -> Result<Value> {
        match self {
            Self::Account => normalize_as::<AccountSecrets>(value),
            Self::Transaction => normalize_as::<TransactionSecrets>(value),
            Self::Budget => normalize_as::<BudgetSecrets>(value),
            Self::Goal => normalize_as::<GoalSecrets>(value),
            Self::Investment => normalize_as::<InvestmentSecrets>(value),
        }
    }

    /// Reject clear fields that belong in the blob.
    pub fn check_clear_fields(&self, fields: &serde_json::Map<String, Value>) -> Result<()> {
        if let Some(name) = fields
            .keys()
            .find(|k| self.sensitive_fields().contains(&k.as_str()))
        {
            return Err(FinVaultError::InvalidPatch(format!(
                "'{name}' is a sensitive {self} field and cannot be stored in the clear"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = FinVaultError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == lower)
            .ok_or_else(|| {
                FinVaultError::CommandFailed(format!(
                    "unknown record kind '{s}'; expected one of: account, transaction, budget, goal, investment"
                ))
            })
    }
}

/// Ties a sensitive-field struct to its record kind.
pub trait SensitiveFields: Serialize + DeserializeOwned {
    const KIND: RecordKind;
}

/// Sensitive part of a bank or card account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AccountSecrets {
    pub account_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
}

impl SensitiveFields for AccountSecrets {
    const KIND: RecordKind = RecordKind::Account;
}

/// Sensitive part of a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TransactionSecrets {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl SensitiveFields for TransactionSecrets {
    const KIND: RecordKind = RecordKind::Transaction;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BudgetSecrets {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl SensitiveFields for BudgetSecrets {
    const KIND: RecordKind = RecordKind::Budget;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GoalSecrets {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl SensitiveFields for GoalSecrets {
    const KIND: RecordKind = RecordKind::Goal;
}

/// Sensitive part of a holding (fund, stock, deposit).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InvestmentSecrets {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folio_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl SensitiveFields for InvestmentSecrets {
    const KIND: RecordKind = RecordKind::Investment;
}

fn normalize_as<T: Serialize + DeserializeOwned>(value: Value) -> Result<Value> {
    let typed: T = serde_json::from_value(value).map_err(|e| describe_shape_error(&e))?;
    serde_json::to_value(&typed)
        .map_err(|e| FinVaultError::SerializationError(format!("sensitive fields: {e}")))
}

/// Turn a serde error into a message that never repeats a field value.
///
/// Unknown/missing field errors only mention field names, so they are
/// kept; anything else (which may quote the offending value) is replaced.
pub(crate) fn describe_shape_error(e: &serde_json::Error) -> FinVaultError {
    let msg = e.to_string();
    if msg.starts_with("unknown field") || msg.starts_with("missing field") {
        FinVaultError::InvalidPatch(msg)
    } else {
        FinVaultError::InvalidPatch("a sensitive field has the wrong type".into())
    }
}
