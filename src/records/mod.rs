//! Records module: sealed financial records.
//!
//! This module provides:
//! - Record kinds and their sensitive-field structs (`kinds`)
//! - Sealed/opened record envelopes and bulk-read views (`envelope`)
//! - Binary record store format with HMAC integrity (`format`)
//! - High-level `RecordStore` for sealing, reading and updating records (`store`)

pub mod envelope;
pub mod format;
pub mod kinds;
pub mod store;

pub use envelope::{OpenedRecord, RecordSummary, RecordView, SealedRecord};
pub use format::StoreHeader;
pub use kinds::{
    AccountSecrets, BudgetSecrets, GoalSecrets, InvestmentSecrets, RecordKind, SensitiveFields,
    TransactionSecrets,
};
pub use store::RecordStore;
