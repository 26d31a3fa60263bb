//! `finvault list` — display records in a table.

use crate::cli::output;
use crate::cli::Context;
use crate::errors::Result;
use crate::records::RecordKind;

/// Execute the `list` command.
pub fn execute(ctx: &Context, kind: Option<&str>) -> Result<()> {
    let kind = kind.map(str::parse::<RecordKind>).transpose()?;

    let (_profile, store) = ctx.open_records()?;
    let views = store.read_all_values(kind, &ctx.session)?;

    let failed = views.iter().filter(|v| !v.is_opened()).count();

    output::info(&format!("{}: {} record(s)", ctx.user_id, views.len()));
    output::print_records_table(&views);

    if failed > 0 {
        output::warning(&format!(
            "{failed} record(s) could not be decrypted and are shown without their sensitive fields."
        ));
    }

    Ok(())
}
