//! `finvault init` — create a user profile and an empty record store.

use std::fs;

use crate::cli::output;
use crate::cli::{prompt_new_password, Context, PASSWORD_ENV};
use crate::errors::{FinVaultError, Result};
use crate::profile;
use crate::records::RecordStore;

/// Execute the `init` command.
pub fn execute(ctx: &Context) -> Result<()> {
    let profiles = ctx.profiles();

    // 1. Create the data directory if it doesn't exist.
    if !ctx.data_dir.exists() {
        fs::create_dir_all(&ctx.data_dir)?;
        output::info(&format!(
            "Created data directory: {}",
            ctx.data_dir.display()
        ));
    }

    // 2. Refuse to overwrite an existing profile or store.
    if profiles.exists(&ctx.user_id) {
        output::tip("Use `finvault add` to add records to the existing profile.");
        return Err(FinVaultError::ProfileAlreadyExists(ctx.user_id.clone()));
    }
    let records_path = ctx.records_path();
    if records_path.exists() {
        return Err(FinVaultError::StoreAlreadyExists(records_path));
    }

    // 3. Choose a password and register (derives the key, unlocks).
    let password = prompt_new_password(PASSWORD_ENV)?;
    let params = ctx.settings.kdf_params();
    let profile = profile::register(&profiles, &ctx.user_id, &password, &params, &ctx.session)?;

    // 4. Create the empty record store under the new key.
    RecordStore::create(&records_path, &profile.user_id, &ctx.session)?;

    ctx.audit("init", None, Some(params.algorithm()));

    output::success(&format!(
        "Profile '{}' created ({}) at {}",
        profile.user_id,
        params.algorithm(),
        ctx.data_dir.display()
    ));
    output::tip("Run `finvault add account --secret accountName=<name>` to add a record.");
    output::tip("Run `finvault list` to see your records.");

    profile::lock(&ctx.session);
    Ok(())
}
