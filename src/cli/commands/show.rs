//! `finvault show` — print one decrypted record as JSON.

use serde_json::json;

use crate::cli::Context;
use crate::errors::{FinVaultError, Result};

/// Execute the `show` command.
pub fn execute(ctx: &Context, id: &str) -> Result<()> {
    let (_profile, store) = ctx.open_records()?;
    let record = store.get_value(id, &ctx.session)?;

    let doc = json!({
        "id": record.id,
        "kind": record.kind,
        "secrets": record.secrets,
        "fields": record.fields,
        "createdAt": record.created_at,
        "updatedAt": record.updated_at,
    });

    let rendered = serde_json::to_string_pretty(&doc)
        .map_err(|e| FinVaultError::SerializationError(format!("record: {e}")))?;
    println!("{rendered}");

    ctx.audit("show", Some(id), None);
    Ok(())
}
