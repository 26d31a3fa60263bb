//! `finvault change-password` — re-key a profile.
//!
//! Verifies the current password, derives a new key under a fresh salt
//! with the configured KDF parameters, re-encrypts every record blob and
//! replaces the key-check token.  This is also how a profile moves to
//! stronger KDF parameters.

use crate::cli::output;
use crate::cli::{prompt_new_password, Context, NEW_PASSWORD_ENV};
use crate::errors::Result;
use crate::profile;
use crate::records::RecordStore;

/// Execute the `change-password` command.
pub fn execute(ctx: &Context) -> Result<()> {
    // 1. Unlock with the current password and open the store.
    output::info("Enter your current password.");
    let mut profile = ctx.unlock_profile()?;
    let old_kdf = profile.kdf;
    let mut store = RecordStore::open(&ctx.records_path(), &ctx.session)?;

    // 2. Choose the new password.
    output::info("Choose your new password.");
    let new_password = prompt_new_password(NEW_PASSWORD_ENV)?;

    // 3. Re-key the profile and every record under the unlocked key.
    let params = ctx.settings.kdf_params();
    let count = profile::change_password(
        &mut profile,
        &new_password,
        &params,
        &ctx.profiles(),
        &mut store,
        &ctx.session,
    )?;

    let details = format!(
        "{count} records re-encrypted ({} -> {})",
        old_kdf.algorithm(),
        params.algorithm()
    );
    ctx.audit("change-password", None, Some(&details));

    output::success(&format!(
        "Password changed for '{}' ({count} records re-encrypted)",
        profile.user_id
    ));

    profile::lock(&ctx.session);
    Ok(())
}
