//! Split pagination/shape directives from filter predicates.

use serde_json::Value;
use smallvec::SmallVec;
use tabula_core::{Direction, SortEntry};
use tracing::debug;

use crate::formula::{compile_formula, value_text};
use crate::{Query, QueryResult, SelectionDescriptor};

/// Keys that control pagination and shape; never compiled into the formula.
pub const DIRECTIVE_KEYS: [&str; 4] = ["$limit", "$sort", "$select", "$skip"];

/// Result of [`normalize`]: what to ask the backend for, and how many leading
/// records to drop client-side afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    pub selection: SelectionDescriptor,
    pub skip: usize,
}

/// Normalize a structured query into a selection descriptor plus skip count.
///
/// The backend has no offset, only a record ceiling, so a `$skip` widens
/// `max_records` to `limit + skip` and the caller truncates the head.
pub fn normalize(query: &Query) -> QueryResult<Normalized> {
    let mut out = Normalized::default();
    if query.is_empty() {
        return Ok(out);
    }

    let rest: Query = query
        .iter()
        .filter(|(k, _)| !DIRECTIVE_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let formula = compile_formula(&rest)?;
    if !formula.is_empty() {
        out.selection.filter_formula = Some(formula);
    }

    if let Some(Value::Object(sort)) = query.get("$sort") {
        let entries: SmallVec<[SortEntry; 4]> = sort
            .iter()
            .filter(|(field, _)| field.as_str() != "id")
            .map(|(field, dir)| SortEntry { field: field.clone(), direction: direction(dir) })
            .collect();
        out.selection.sort = Some(entries);
    }

    out.selection.fields = match query.get("$select") {
        Some(Value::Array(items)) => Some(items.iter().map(value_text).collect()),
        Some(Value::String(s)) => Some(vec![s.clone()]),
        _ => None,
    };

    out.selection.max_records = query.get("$limit").and_then(parse_count);

    if let Some(skip) = query.get("$skip").and_then(parse_count) {
        out.skip = skip as usize;
        out.selection.max_records = Some(out.selection.max_records.unwrap_or(0).saturating_add(skip));
    }

    debug!(
        formula = ?out.selection.filter_formula,
        max_records = ?out.selection.max_records,
        skip = out.skip,
        "query normalized"
    );
    Ok(out)
}

/// Positive magnitude sorts ascending; anything else descending.
fn direction(v: &Value) -> Direction {
    let magnitude = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    match magnitude {
        Some(m) if m > 0.0 => Direction::Asc,
        _ => Direction::Desc,
    }
}

/// Parse a count directive. Strings contribute their leading integer
/// (`"10abc"` -> 10). Zero, negative and unparseable values count as absent.
fn parse_count(v: &Value) -> Option<u64> {
    let n = match v {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 1.0).map(|f| f.trunc() as u64)),
        Value::String(s) => {
            let s = s.trim_start();
            let s = s.strip_prefix('+').unwrap_or(s);
            let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse::<u64>().ok()
        }
        _ => None,
    };
    n.filter(|n| *n > 0)
}
