//! Audit log: SQLite-based operation history.
//!
//! Stores one row per record or profile operation (init, add, edit,
//! delete, change-password, ...) in a local SQLite database at
//! `<data_dir>/audit.db`.  Rows carry the user id and record id only;
//! sensitive field values, passwords and keys never reach this table.
//!
//! Designed for graceful degradation: if the database can't be opened or
//! written to, operations continue without logging.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::debug;

use crate::errors::{FinVaultError, Result};

const DB_FILE: &str = "audit.db";

/// A single audit log entry.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub user_id: String,
    pub record_id: Option<String>,
    pub details: Option<String>,
}

/// SQLite-backed audit log.
pub struct AuditLog {
    conn: Connection,
}

impl AuditLog {
    /// Open (or create) the audit database at `<data_dir>/audit.db`.
    ///
    /// Returns `None` if the database can't be opened; callers treat this
    /// as "audit logging unavailable" and continue normally.
    pub fn open(data_dir: &Path) -> Option<Self> {
        let db_path = Self::db_path(data_dir);
        let conn = match Connection::open(&db_path) {
            Ok(conn) => conn,
            Err(e) => {
                debug!(path = %db_path.display(), error = %e, "audit log unavailable");
                return None;
            }
        };

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&db_path, perms);
        }

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS audit_log (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                operation TEXT NOT NULL,
                user_id   TEXT NOT NULL,
                record_id TEXT,
                details   TEXT
            );",
        )
        .ok()?;

        Some(Self { conn })
    }

    /// Record an operation.  Errors are ignored.
    pub fn log(
        &self,
        operation: &str,
        user_id: &str,
        record_id: Option<&str>,
        details: Option<&str>,
    ) {
        let now = Utc::now().to_rfc3339();
        if let Err(e) = self.conn.execute(
            "INSERT INTO audit_log (timestamp, operation, user_id, record_id, details)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![now, operation, user_id, record_id, details],
        ) {
            debug!(operation, error = %e, "audit insert failed");
        }
    }

    /// Query recent audit entries, most recent first.
    ///
    /// - `limit`: maximum number of entries to return.
    /// - `since`: only entries at or after this timestamp.
    /// - `user_id`: only entries for this user.
    pub fn query(
        &self,
        limit: usize,
        since: Option<DateTime<Utc>>,
        user_id: Option<&str>,
    ) -> Result<Vec<AuditEntry>> {
        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);

        let mut clauses = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        if let Some(ts) = since {
            params.push(Box::new(ts.to_rfc3339()));
            clauses.push(format!("timestamp >= ?{}", params.len()));
        }
        if let Some(user) = user_id {
            params.push(Box::new(user.to_string()));
            clauses.push(format!("user_id = ?{}", params.len()));
        }
        params.push(Box::new(limit_i64));
        let limit_idx = params.len();

        let filter = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT id, timestamp, operation, user_id, record_id, details
             FROM audit_log
             {filter}
             ORDER BY id DESC
             LIMIT ?{limit_idx}"
        );

        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| FinVaultError::AuditError(format!("query prepare: {e}")))?;

        let params_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| &**p).collect();

        let rows = stmt
            .query_map(params_refs.as_slice(), |row| {
                let ts_str: String = row.get(1)?;
                let timestamp = DateTime::parse_from_rfc3339(&ts_str)
                    .map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc));

                Ok(AuditEntry {
                    id: row.get(0)?,
                    timestamp,
                    operation: row.get(2)?,
                    user_id: row.get(3)?,
                    record_id: row.get(4)?,
                    details: row.get(5)?,
                })
            })
            .map_err(|e| FinVaultError::AuditError(format!("query exec: {e}")))?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(|e| FinVaultError::AuditError(format!("row parse: {e}")))?);
        }

        Ok(entries)
    }

    /// Path to the audit database inside a data directory.
    pub fn db_path(data_dir: &Path) -> PathBuf {
        data_dir.join(DB_FILE)
    }
}

/// Open the audit database, log one event and ignore any failure.
///
/// Safe to call from any command: it never fails the parent operation.
pub fn log_audit(
    data_dir: &Path,
    user_id: &str,
    operation: &str,
    record_id: Option<&str>,
    details: Option<&str>,
) {
    if let Some(audit) = AuditLog::open(data_dir) {
        audit.log(operation, user_id, record_id, details);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_creates_database() {
        let dir = TempDir::new().unwrap();
        assert!(AuditLog::open(dir.path()).is_some());
        assert!(dir.path().join("audit.db").exists());
    }

    #[test]
    fn log_and_query_most_recent_first() {
        let dir = TempDir::new().unwrap();
        let audit = AuditLog::open(dir.path()).unwrap();

        audit.log("add", "asha", Some("r1"), Some("account"));
        audit.log("edit", "asha", Some("r1"), Some("sensitive"));
        audit.log("delete", "asha", Some("r1"), None);

        let entries = audit.query(10, None, None).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].operation, "delete");
        assert_eq!(entries[2].operation, "add");
        assert_eq!(entries[2].details.as_deref(), Some("account"));
    }

    #[test]
    fn query_with_limit() {
        let dir = TempDir::new().unwrap();
        let audit = AuditLog::open(dir.path()).unwrap();

        for i in 0..10 {
            audit.log("add", "asha", Some(&format!("r{i}")), None);
        }

        assert_eq!(audit.query(3, None, None).unwrap().len(), 3);
    }

    #[test]
    fn query_with_since_filter() {
        let dir = TempDir::new().unwrap();
        let audit = AuditLog::open(dir.path()).unwrap();

        audit.log("init", "asha", None, None);

        let past = Utc::now() - chrono::Duration::hours(1);
        assert_eq!(audit.query(10, Some(past), None).unwrap().len(), 1);

        let future = Utc::now() + chrono::Duration::hours(1);
        assert!(audit.query(10, Some(future), None).unwrap().is_empty());
    }

    #[test]
    fn query_filters_by_user() {
        let dir = TempDir::new().unwrap();
        let audit = AuditLog::open(dir.path()).unwrap();

        audit.log("init", "asha", None, None);
        audit.log("init", "ravi", None, None);
        audit.log("add", "ravi", Some("r1"), None);

        let past = Utc::now() - chrono::Duration::hours(1);
        let ravi = audit.query(10, Some(past), Some("ravi")).unwrap();
        assert_eq!(ravi.len(), 2);
        assert!(ravi.iter().all(|e| e.user_id == "ravi"));
        assert_eq!(ravi[0].record_id.as_deref(), Some("r1"));
    }

    #[test]
    fn open_returns_none_on_bad_path() {
        let result = AuditLog::open(Path::new("/nonexistent/path/that/does/not/exist"));
        assert!(result.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn audit_db_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let _audit = AuditLog::open(dir.path()).unwrap();

        let perms = std::fs::metadata(dir.path().join("audit.db"))
            .unwrap()
            .permissions();
        assert_eq!(perms.mode() & 0o777, 0o600);
    }
}
