//! `finvault delete` — remove a record and its blob.

use dialoguer::Confirm;

use crate::cli::output;
use crate::cli::Context;
use crate::errors::{FinVaultError, Result};

/// Execute the `delete` command.
pub fn execute(ctx: &Context, id: &str, force: bool) -> Result<()> {
    // Unless --force is set, ask for confirmation before deleting.
    if !force {
        let confirmed = Confirm::new()
            .with_prompt(format!("Delete record '{id}'?"))
            .default(false)
            .interact()
            .map_err(|e| FinVaultError::CommandFailed(format!("confirm prompt: {e}")))?;

        if !confirmed {
            output::info("Cancelled.");
            return Ok(());
        }
    }

    let (_profile, mut store) = ctx.open_records()?;

    let removed = store.delete(id)?;
    store.save(&ctx.session)?;

    ctx.audit("delete", Some(id), Some(removed.kind.as_str()));
    output::success(&format!("Deleted {} {id}", removed.kind));

    Ok(())
}
