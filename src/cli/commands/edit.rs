//! `finvault edit` — update a record's fields.
//!
//! Sensitive changes decrypt the record, merge the given fields into the
//! full set and re-encrypt the whole set under a fresh nonce.  Clear field
//! changes never touch the blob.

use crate::cli::output;
use crate::cli::{parse_field_assignments, parse_secret_assignments, Context};
use crate::errors::{FinVaultError, Result};

/// Execute the `edit` command.
pub fn execute(ctx: &Context, id: &str, secrets: &[String], fields: &[String]) -> Result<()> {
    if secrets.is_empty() && fields.is_empty() {
        return Err(FinVaultError::CommandFailed(
            "nothing to change; pass --secret and/or --field".into(),
        ));
    }

    let field_map = parse_field_assignments(fields)?;

    let (_profile, mut store) = ctx.open_records()?;
    let kind = store.kind_of(id)?;
    let secret_map = parse_secret_assignments(kind, secrets)?;

    if !secret_map.is_empty() {
        store.apply_patch(id, &secret_map, &ctx.session)?;
    }
    if !field_map.is_empty() {
        store.update_fields(id, field_map.clone())?;
    }
    store.save(&ctx.session)?;

    let mut changed: Vec<&str> = secret_map.keys().map(String::as_str).collect();
    changed.extend(field_map.keys().map(String::as_str));
    ctx.audit("edit", Some(id), Some(&changed.join(",")));

    output::success(&format!("Updated {kind} {id} ({} field(s))", changed.len()));
    Ok(())
}
