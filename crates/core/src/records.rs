//! Mapping between the backend `{id, fields}` shape and flat application objects.
//!
//! Both directions copy; backend records are never mutated in place.

use serde_json::Value;

use crate::{AppRecord, BackendRecord, Fields};

/// Flatten a backend record into `{id, ...fields}`.
///
/// `id` is written first, so a field literally named `id` overwrites it.
pub fn to_application(record: &BackendRecord) -> AppRecord {
    let mut out = AppRecord::new();
    if let Some(id) = &record.id {
        out.insert("id".to_string(), Value::String(id.clone()));
    }
    for (k, v) in record.fields.iter() {
        out.insert(k.clone(), v.clone());
    }
    out
}

/// Wrap application data as `{fields: {...data}}`.
///
/// Every key is copied into `fields`, `id` included; the record-level id stays
/// unset and must be attached by the caller when one is needed.
pub fn to_backend(data: &AppRecord) -> BackendRecord {
    let fields: Fields = data.clone();
    BackendRecord { id: None, fields }
}

pub fn to_application_batch(records: &[BackendRecord]) -> Vec<AppRecord> {
    records.iter().map(to_application).collect()
}

pub fn to_backend_batch(items: &[AppRecord]) -> Vec<BackendRecord> {
    items.iter().map(to_backend).collect()
}
