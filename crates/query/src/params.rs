//! Selection descriptor -> flat transport parameters.

use serde_json::Value;

use crate::formula::value_text;
use crate::SelectionDescriptor;

/// Flat, ordered transport parameters (`filterByFormula`, `maxRecords`, `fields[]`, `sort[i][..]`).
pub type QueryParams = serde_json::Map<String, Value>;

pub fn build_params(selection: &SelectionDescriptor) -> QueryParams {
    let mut params = QueryParams::new();
    if let Some(formula) = selection.filter_formula.as_deref().filter(|f| !f.is_empty()) {
        params.insert("filterByFormula".into(), Value::String(formula.to_string()));
    }
    if let Some(max) = selection.max_records.filter(|m| *m > 0) {
        params.insert("maxRecords".into(), Value::from(max));
    }
    if let Some(fields) = &selection.fields {
        params.insert(
            "fields[]".into(),
            Value::Array(fields.iter().cloned().map(Value::String).collect()),
        );
    }
    if let Some(sort) = &selection.sort {
        for (i, entry) in sort.iter().enumerate() {
            params.insert(format!("sort[{i}][field]"), Value::String(entry.field.clone()));
            params.insert(format!("sort[{i}][direction]"), Value::String(entry.direction.as_str().to_string()));
        }
    }
    params
}

/// Flatten parameters into URL query pairs; list values repeat their key.
pub fn to_query_pairs(params: &QueryParams) -> Vec<(String, String)> {
    let mut out = Vec::with_capacity(params.len());
    for (k, v) in params.iter() {
        match v {
            Value::Array(items) => {
                for item in items {
                    out.push((k.clone(), value_text(item)));
                }
            }
            other => out.push((k.clone(), value_text(other))),
        }
    }
    out
}
