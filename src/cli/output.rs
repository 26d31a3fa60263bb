//! Colored terminal output helpers.
//!
//! All user-facing output goes through these functions so we get
//! consistent styling across every command.

use comfy_table::{ContentArrangement, Table};
use console::style;
use serde_json::{Map, Value};

use crate::records::{RecordKind, RecordView};

/// Label shown in place of a record's sensitive fields when its blob
/// does not decrypt.
pub const UNDECRYPTABLE_LABEL: &str = "<unable to decrypt>";

/// Print a green success message: "check_mark {msg}"
pub fn success(msg: &str) {
    println!("{} {}", style("\u{2713}").green().bold(), msg);
}

/// Print a red error message: "x_mark {msg}"
pub fn error(msg: &str) {
    eprintln!("{} {}", style("\u{2717}").red().bold(), msg);
}

/// Print a yellow warning: "warning_sign {msg}"
pub fn warning(msg: &str) {
    eprintln!("{} {}", style("\u{26a0}").yellow().bold(), msg);
}

/// Print a blue info message: "info_sign {msg}"
pub fn info(msg: &str) {
    println!("{} {}", style("\u{2139}").blue().bold(), msg);
}

/// Print a dim tip/hint: "arrow {msg}"
pub fn tip(msg: &str) {
    println!("{} {}", style("\u{2192}").dim(), style(msg).dim());
}

/// Print a table of records (Id, Kind, Label, Fields, Updated).
///
/// Records that failed to decrypt still get a row, with the clear fields
/// and a placeholder label.
pub fn print_records_table(views: &[RecordView<Value>]) {
    if views.is_empty() {
        info("No records yet.");
        tip("Run `finvault add <kind> --secret name=value` to add one.");
        return;
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Id", "Kind", "Label", "Fields", "Updated"]);

    for view in views {
        let (label, updated) = match view {
            RecordView::Opened(record) => (
                record_label(record.kind, &record.secrets),
                record.updated_at,
            ),
            RecordView::Undecryptable { summary, .. } => (
                style(UNDECRYPTABLE_LABEL).red().to_string(),
                summary.updated_at,
            ),
        };

        table.add_row(vec![
            view.id().to_string(),
            view.kind().to_string(),
            label,
            format_fields(view.fields()),
            updated.format("%Y-%m-%d %H:%M:%S").to_string(),
        ]);
    }

    println!("{table}");
}

/// The label field of a decrypted payload, or `-`.
pub fn record_label(kind: RecordKind, secrets: &Value) -> String {
    secrets
        .get(kind.label_field())
        .and_then(Value::as_str)
        .unwrap_or("-")
        .to_string()
}

/// Render clear fields as `name=value` pairs in key order.
pub fn format_fields(fields: &Map<String, Value>) -> String {
    if fields.is_empty() {
        return "-".to_string();
    }
    fields
        .iter()
        .map(|(name, value)| match value {
            Value::String(s) => format!("{name}={s}"),
            other => format!("{name}={other}"),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
