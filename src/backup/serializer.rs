//! Flat-file rendering of heterogeneous records.
//!
//! Every collection is rendered as CSV with one column per field name seen
//! in any record, so records missing optional fields still line up.

use super::error::BackupError;
use crate::record_store::{FieldValue, Record};
use std::collections::BTreeSet;

/// Written instead of a header when a collection has no records, so every
/// export file has readable content.
pub const EMPTY_COLLECTION_PLACEHOLDER: &str = "No records found in this collection.";

const LIST_SEPARATOR: &str = "; ";

/// Serializes records into CSV text.
///
/// The header is the sorted union of all keys. Quoting is applied only when
/// a cell contains a comma, a double quote or a line break.
pub fn serialize(records: &[Record]) -> Result<String, BackupError> {
    if records.is_empty() {
        return Ok(EMPTY_COLLECTION_PLACEHOLDER.to_string());
    }

    let header: Vec<&String> = header_union(records).into_iter().collect();

    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Necessary)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(header.iter().map(|h| h.as_str()))?;
    for record in records {
        writer.write_record(header.iter().map(|key| render_cell(record.get(key))))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| BackupError::Csv(e.into_error().into()))?;
    Ok(String::from_utf8(bytes)?)
}

fn header_union(records: &[Record]) -> BTreeSet<&String> {
    records.iter().flat_map(|r| r.keys()).collect()
}

fn render_cell(value: Option<&FieldValue>) -> String {
    match value {
        None | Some(FieldValue::Null) => String::new(),
        Some(FieldValue::Object(_)) => json_text(value),
        Some(FieldValue::List(items)) => items
            .iter()
            .map(|item| match item {
                FieldValue::Object(_) | FieldValue::List(_) => json_text(Some(item)),
                scalar => render_scalar(scalar),
            })
            .collect::<Vec<_>>()
            .join(LIST_SEPARATOR),
        Some(scalar) => render_scalar(scalar),
    }
}

fn render_scalar(value: &FieldValue) -> String {
    match value {
        FieldValue::Bool(b) => b.to_string(),
        FieldValue::Integer(i) => i.to_string(),
        FieldValue::Float(f) => f.to_string(),
        FieldValue::Text(s) => s.clone(),
        FieldValue::Null => String::new(),
        FieldValue::Object(_) | FieldValue::List(_) => json_text(Some(value)),
    }
}

fn json_text(value: Option<&FieldValue>) -> String {
    value
        .map(|v| v.to_json().to_string())
        .unwrap_or_default()
}
