//! CSV encoding shared by archives and on-demand exports.
//!
//! Every field is quoted, so the output never depends on field content.

use crate::audit::AuditRecordView;
use crate::export_schema::ExportSchema;

/// UTF-8 byte-order marker written before the header row.
pub const UTF8_BOM: &str = "\u{feff}";

/// Wraps one field in double quotes and doubles any embedded quote.
#[must_use]
pub fn escape_field(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('"');
    for character in value.chars() {
        if character == '"' {
            escaped.push('"');
        }
        escaped.push(character);
    }
    escaped.push('"');
    escaped
}

/// Encodes one row of already-extracted cells, terminated by `\n`.
#[must_use]
pub fn encode_row<S: AsRef<str>>(cells: &[S]) -> String {
    let mut line = cells
        .iter()
        .map(|cell| escape_field(cell.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    line.push('\n');
    line
}

/// Encodes the header row of a schema.
#[must_use]
pub fn encode_header(schema: &ExportSchema) -> String {
    encode_row(&schema.column_names())
}

/// Encodes one audit record as a data row of a schema.
#[must_use]
pub fn encode_record(schema: &ExportSchema, view: &AuditRecordView) -> String {
    encode_row(&schema.row(view))
}
