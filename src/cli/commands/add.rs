//! `finvault add` — seal a new record.

use crate::cli::output;
use crate::cli::{parse_field_assignments, parse_secret_assignments, Context};
use crate::errors::{FinVaultError, Result};
use crate::records::RecordKind;

/// Execute the `add` command.
pub fn execute(ctx: &Context, kind: &str, secrets: &[String], fields: &[String]) -> Result<()> {
    let kind: RecordKind = kind.parse()?;

    if secrets.is_empty() {
        return Err(FinVaultError::CommandFailed(format!(
            "a {kind} needs at least --secret {}=<value>",
            kind.label_field()
        )));
    }

    // Parse before unlocking so typos don't cost a key derivation.
    let secret_map = parse_secret_assignments(kind, secrets)?;
    let field_map = parse_field_assignments(fields)?;

    let (_profile, mut store) = ctx.open_records()?;

    let id = store.insert_value(
        kind,
        serde_json::Value::Object(secret_map),
        field_map,
        &ctx.session,
    )?;
    store.save(&ctx.session)?;

    ctx.audit("add", Some(&id), Some(kind.as_str()));

    output::success(&format!(
        "Added {kind} {id} ({} records total)",
        store.len()
    ));

    Ok(())
}
