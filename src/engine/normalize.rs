//! Conversion of backend result shapes into binding rows.

use serde_json::Value;

use super::{BindingStream, Solution};
use crate::term::{BindingRow, Term};

/// Rows from typed solutions, one per solution, entries in arrival order.
pub fn solutions_to_rows(solutions: Vec<Solution>) -> BindingStream {
    BindingStream::new(
        solutions
            .into_iter()
            .map(|solution| Ok(solution.entries.into_iter().collect::<BindingRow>())),
    )
}

/// Rows from loosely typed records.
///
/// An array yields one row per element and an object one row per value.
/// String fields become plain literals; numbers, booleans and nested values
/// become named nodes carrying their JSON text; nulls are dropped. This is a
/// best-effort mapping: datatypes and language tags are not recovered.
pub fn records_to_rows(records: Value) -> BindingStream {
    let entries: Vec<Value> = match records {
        Value::Array(items) => items,
        Value::Object(map) => map.into_iter().map(|(_, value)| value).collect(),
        Value::Null => Vec::new(),
        other => {
            tracing::warn!(kind = json_kind(&other), "record output is neither array nor object");
            Vec::new()
        }
    };
    BindingStream::new(entries.into_iter().filter_map(|entry| match entry {
        Value::Object(fields) => Some(Ok(fields
            .into_iter()
            .filter_map(|(key, value)| record_term(value).map(|term| (key, term)))
            .collect::<BindingRow>())),
        other => {
            tracing::warn!(kind = json_kind(&other), "skipping non-object record");
            None
        }
    }))
}

fn record_term(value: Value) -> Option<Term> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(Term::literal(text)),
        other => Some(Term::named(other.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
