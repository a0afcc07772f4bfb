//! Field lookup across the column-name variants found in survey tables.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;

use crate::models::Record;

pub const TITLE_FIELDS: &[&str] = &["cod_cam", "ca_id", "codigo", "id"];
pub const PHOTO_FIELDS: &[&str] = &["foto_cam_d", "foto cam d", "foto_camd", "foto", "imagen", "url_foto"];
pub const PHOTO_TOKENS: &[&str] = &["foto", "img"];
pub const ACCESSIBILITY_FIELDS: &[&str] = &["accesibili", "accesibilidad"];
pub const DETAIL_FIELDS: &[&str] = &[
    "tipo_ca",
    "tipo de ca",
    "tipo",
    "estado_ca",
    "estado de",
    "estado",
    "accesibili",
    "accesibilidad",
    "observaciones",
    "notas",
];

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DetailRow {
    pub label: String,
    pub value: String,
}

/// Text shown for a value, or `None` when there is nothing to show.
pub fn display_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// First alias holding a displayable value.
pub fn resolve(record: &Record, aliases: &[&str]) -> Option<String> {
    aliases
        .iter()
        .find_map(|alias| record.get(alias).and_then(display_value))
}

/// Like [`resolve`], then scans every column whose name contains one of
/// `tokens`. Exact aliases always win.
pub fn resolve_with_fallback(record: &Record, aliases: &[&str], tokens: &[&str]) -> Option<String> {
    resolve(record, aliases).or_else(|| {
        record.fields().find_map(|(name, value)| {
            let name = name.to_lowercase();
            if tokens.iter().any(|t| name.contains(t)) {
                display_value(value)
            } else {
                None
            }
        })
    })
}

/// Marker title, falling back to the 1-based position in the result set.
pub fn title(record: &Record, index: usize) -> String {
    resolve(record, TITLE_FIELDS).unwrap_or_else(|| format!("Point {}", index + 1))
}

pub fn photo(record: &Record) -> Option<String> {
    resolve_with_fallback(record, PHOTO_FIELDS, PHOTO_TOKENS)
}

pub fn accessibility(record: &Record) -> Option<String> {
    resolve(record, ACCESSIBILITY_FIELDS)
}

/// Label/value rows for the popup, one per distinct normalised field name.
pub fn detail_rows(record: &Record) -> Vec<DetailRow> {
    let mut seen = HashSet::new();
    let mut rows = Vec::new();
    for field in DETAIL_FIELDS {
        let Some(value) = record.get(field).and_then(display_value) else {
            continue;
        };
        if seen.insert(normalize(field)) {
            rows.push(DetailRow {
                label: label(field),
                value,
            });
        }
    }
    rows
}

fn normalize(field: &str) -> String {
    field
        .to_lowercase()
        .chars()
        .filter(|c| *c != '_' && !c.is_whitespace())
        .collect()
}

/// `estado_ca` -> `Estado Ca`
pub fn label(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut word_start = true;
    for c in field.replace('_', " ").chars() {
        if word_start && c.is_alphanumeric() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        word_start = !c.is_alphanumeric();
    }
    out
}
