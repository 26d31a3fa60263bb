//! `finvault audit` — display the audit log.
//!
//! Usage:
//!   finvault audit               # last 50 entries for the current user
//!   finvault audit --last 20     # last 20
//!   finvault audit --since 7d    # entries from the last 7 days
//!   finvault audit --all-users   # every user in the data directory

use chrono::Utc;

use crate::audit::{AuditEntry, AuditLog};
use crate::cli::output;
use crate::cli::Context;
use crate::errors::{FinVaultError, Result};

/// Execute the `audit` command.
pub fn execute(ctx: &Context, last: usize, since: Option<&str>, all_users: bool) -> Result<()> {
    let audit = AuditLog::open(&ctx.data_dir)
        .ok_or_else(|| FinVaultError::AuditError("failed to open audit database".into()))?;

    let since_dt = since.map(parse_duration).transpose()?;
    let user = (!all_users).then_some(ctx.user_id.as_str());

    let entries = audit.query(last, since_dt, user)?;

    if entries.is_empty() {
        output::info("No audit entries found.");
        return Ok(());
    }

    print_audit_table(&entries);

    Ok(())
}

/// Parse a human-friendly duration string like "7d", "24h", "30m" into
/// the point in time that far in the past.
fn parse_duration(input: &str) -> Result<chrono::DateTime<Utc>> {
    let input = input.trim();

    let (num_str, unit) = if let Some(s) = input.strip_suffix('d') {
        (s, 'd')
    } else if let Some(s) = input.strip_suffix('h') {
        (s, 'h')
    } else if let Some(s) = input.strip_suffix('m') {
        (s, 'm')
    } else {
        return Err(FinVaultError::CommandFailed(format!(
            "invalid duration '{input}'; use a format like 7d, 24h, or 30m"
        )));
    };

    let num: i64 = num_str.parse().map_err(|_| {
        FinVaultError::CommandFailed(format!(
            "invalid duration '{input}'; the number part is not valid"
        ))
    })?;

    let duration = match unit {
        'd' => chrono::Duration::days(num),
        'h' => chrono::Duration::hours(num),
        _ => chrono::Duration::minutes(num),
    };

    Ok(Utc::now() - duration)
}

/// Print audit entries in a formatted table.
pub fn print_audit_table(entries: &[AuditEntry]) {
    use comfy_table::{ContentArrangement, Table};
    use console::style;

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Time", "Operation", "User", "Record", "Details"]);

    for entry in entries {
        table.add_row(vec![
            entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            colorize_operation(&entry.operation),
            entry.user_id.clone(),
            entry.record_id.as_deref().unwrap_or("-").to_string(),
            entry.details.as_deref().unwrap_or("-").to_string(),
        ]);
    }

    println!(
        "{}",
        style(format!("{} audit entries:", entries.len())).bold()
    );
    println!("{table}");
}

/// Colorize operation names for display.
fn colorize_operation(op: &str) -> String {
    use console::style;

    match op {
        "init" | "add" => style(op).green().to_string(),
        "edit" => style(op).blue().to_string(),
        "delete" => style(op).red().to_string(),
        "change-password" => style(op).yellow().to_string(),
        "show" => style(op).cyan().to_string(),
        _ => op.to_string(),
    }
}
