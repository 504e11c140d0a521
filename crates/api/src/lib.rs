//! Tabula public API façade.
//!
//! [`RecordService`] is the CRUD surface callers depend on; [`TableService`]
//! implements it for one backend table over any [`Transport`]. Every call is
//! independent: nothing is cached or retried, and transport errors surface
//! exactly as the transport raised them.

#![forbid(unsafe_code)]

use std::future::Future;
use std::time::Instant;

use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use tabula_core::{to_application, to_application_batch, to_backend, to_backend_batch, BackendRecord, Fields};
use tabula_query::{build_params, normalize, QueryError};
use tabula_transport::{RecordsPayload, RecordsResponse, Transport, TransportError};

pub use tabula_core::{AppRecord, OneOrMany, Query};

/// API errors. Both variants are passed through from the layer that raised them.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Body returned for a confirmed deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deleted {
    pub id: String,
    pub deleted: bool,
}

/// Outcome of deleting one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Removal {
    /// Backend confirmed with `deleted: true`.
    Deleted(Deleted),
    /// Anything else the backend answered, unchanged.
    Passthrough(Value),
}

/// CRUD surface over one table, in application-record shape.
#[async_trait::async_trait]
pub trait RecordService: Send + Sync {
    /// List records matching a structured query (`$limit`, `$sort`, `$select`, `$skip` honoured).
    async fn find(&self, query: &Query) -> ServiceResult<Vec<AppRecord>>;

    async fn get(&self, id: &str) -> ServiceResult<AppRecord>;

    /// Create one record, or each record of a batch sequentially in input order.
    async fn create(&self, data: OneOrMany<AppRecord>) -> ServiceResult<OneOrMany<AppRecord>>;

    /// Partial update. See [`patch_records`] for how `(id, data)` becomes a payload.
    async fn patch(&self, id: Option<&str>, data: OneOrMany<AppRecord>) -> ServiceResult<OneOrMany<AppRecord>>;

    /// Full replace; answers with the first updated record.
    async fn update(&self, id: Option<&str>, data: AppRecord) -> ServiceResult<AppRecord>;

    /// Delete by id, or every record matching `query` when no id is given.
    async fn remove(&self, id: Option<&str>, query: &Query) -> ServiceResult<OneOrMany<Removal>>;
}

/// [`RecordService`] for the table a transport is bound to.
pub struct TableService<T> {
    transport: T,
}

impl<T: Transport> TableService<T> {
    pub fn new(transport: T) -> Self { Self { transport } }

    pub fn transport(&self) -> &T { &self.transport }

    async fn find_records(&self, query: &Query) -> ServiceResult<Vec<AppRecord>> {
        let normalized = normalize(query)?;
        let params = build_params(&normalized.selection);
        let list = self.transport.query(&params).await?;
        let mut records = to_application_batch(&list.records);
        if normalized.skip > 0 {
            records = records.into_iter().skip(normalized.skip).collect();
        }
        Ok(records)
    }

    async fn get_record(&self, id: &str) -> ServiceResult<AppRecord> {
        let rec = self.transport.fetch(id).await?;
        Ok(to_application(&rec))
    }

    async fn create_one(&self, data: &AppRecord) -> ServiceResult<AppRecord> {
        let payload = RecordsPayload::new(vec![to_backend(data)]);
        let resp = self.transport.post(&payload).await?;
        Ok(to_application(&first_record(resp)?))
    }

    async fn create_records(&self, data: OneOrMany<AppRecord>) -> ServiceResult<OneOrMany<AppRecord>> {
        match data {
            OneOrMany::Single(d) => Ok(OneOrMany::Single(self.create_one(&d).await?)),
            OneOrMany::Batch(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items.iter() {
                    out.push(self.create_one(item).await?);
                }
                Ok(OneOrMany::Batch(out))
            }
        }
    }

    async fn apply_patch(&self, id: Option<&str>, data: OneOrMany<AppRecord>) -> ServiceResult<OneOrMany<AppRecord>> {
        let payload = RecordsPayload::new(patch_records(id, data));
        let resp = self.transport.patch(&payload).await?;
        Ok(match resp {
            OneOrMany::Batch(records) => OneOrMany::Batch(to_application_batch(&records)),
            OneOrMany::Single(rec) => OneOrMany::Single(to_application(&rec)),
        })
    }

    async fn update_record(&self, id: Option<&str>, mut data: AppRecord) -> ServiceResult<AppRecord> {
        if let Some(id) = non_empty(id) {
            data.insert("id".to_string(), Value::String(id.to_string()));
        }
        let payload = RecordsPayload::new(vec![to_backend(&data)]);
        let resp = self.transport.put(&payload).await?;
        Ok(to_application(&first_record(resp)?))
    }

    async fn remove_one(&self, id: &str) -> ServiceResult<Removal> {
        let resp = self.transport.delete(id).await?;
        if resp.get("deleted").map(is_truthy).unwrap_or(false) {
            Ok(Removal::Deleted(Deleted { id: id.to_string(), deleted: true }))
        } else {
            Ok(Removal::Passthrough(resp))
        }
    }

    async fn remove_records(&self, id: Option<&str>, query: &Query) -> ServiceResult<OneOrMany<Removal>> {
        if let Some(id) = non_empty(id) {
            return Ok(OneOrMany::Single(self.remove_one(id).await?));
        }
        let matched = self.find_records(query).await?;
        let ids = matched
            .iter()
            .map(|r| {
                r.get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| TransportError::Decode("listed record has no string id".into()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        info!(count = ids.len(), "api: removing all matched records");
        let removed = futures::future::try_join_all(ids.iter().map(|id| self.remove_one(id))).await?;
        Ok(OneOrMany::Batch(removed))
    }
}

#[async_trait::async_trait]
impl<T: Transport> RecordService for TableService<T> {
    async fn find(&self, query: &Query) -> ServiceResult<Vec<AppRecord>> {
        instrumented("find", self.find_records(query)).await
    }

    async fn get(&self, id: &str) -> ServiceResult<AppRecord> {
        instrumented("get", self.get_record(id)).await
    }

    async fn create(&self, data: OneOrMany<AppRecord>) -> ServiceResult<OneOrMany<AppRecord>> {
        instrumented("create", self.create_records(data)).await
    }

    async fn patch(&self, id: Option<&str>, data: OneOrMany<AppRecord>) -> ServiceResult<OneOrMany<AppRecord>> {
        instrumented("patch", self.apply_patch(id, data)).await
    }

    async fn update(&self, id: Option<&str>, data: AppRecord) -> ServiceResult<AppRecord> {
        instrumented("update", self.update_record(id, data)).await
    }

    async fn remove(&self, id: Option<&str>, query: &Query) -> ServiceResult<OneOrMany<Removal>> {
        instrumented("remove", self.remove_records(id, query)).await
    }
}

/// Build the patch payload records for `(id, data)`:
///
/// - id + single: `[{id, fields: data}]`
/// - id + batch: `[{id, fields: {"0": item0, "1": item1, ..}}]`
/// - no id + batch: each item via [`to_backend`], ids stay inside `fields`
/// - no id + single: `[{fields: {}}]`, carrying an empty-string id as given
pub fn patch_records(id: Option<&str>, data: OneOrMany<AppRecord>) -> Vec<BackendRecord> {
    match (non_empty(id), data) {
        (Some(id), OneOrMany::Single(d)) => vec![BackendRecord::with_id(id, to_backend(&d).fields)],
        (Some(id), OneOrMany::Batch(items)) => {
            let fields: Fields = items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (i.to_string(), Value::Object(item)))
                .collect();
            vec![BackendRecord::with_id(id, fields)]
        }
        (None, OneOrMany::Batch(items)) => to_backend_batch(&items),
        (None, OneOrMany::Single(_)) => vec![BackendRecord { id: id.map(str::to_string), fields: Fields::new() }],
    }
}

fn first_record(resp: RecordsResponse) -> Result<BackendRecord, TransportError> {
    match resp {
        OneOrMany::Single(rec) => Ok(rec),
        OneOrMany::Batch(records) => records
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::Decode("response contained no records".into())),
    }
}

/// Empty ids count as absent.
fn non_empty(id: Option<&str>) -> Option<&str> {
    id.filter(|s| !s.is_empty())
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

async fn instrumented<T, F>(op: &'static str, fut: F) -> ServiceResult<T>
where
    F: Future<Output = ServiceResult<T>>,
{
    let t0 = Instant::now();
    counter!("tabula_requests", 1u64, "op" => op);
    let res = fut.await;
    histogram!("tabula_request_ms", t0.elapsed().as_secs_f64() * 1000.0, "op" => op);
    match &res {
        Ok(_) => debug!(op, took_ms = %t0.elapsed().as_millis(), "api: ok"),
        Err(e) => {
            counter!("tabula_request_errors", 1u64, "op" => op);
            warn!(op, error = %e, "api: failed");
        }
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> AppRecord {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn patch_with_id_single() {
        let recs = patch_records(Some("rec1"), OneOrMany::Single(obj(json!({ "a": 1 }))));
        assert_eq!(recs, vec![BackendRecord::with_id("rec1", obj(json!({ "a": 1 })))]);
    }

    #[test]
    fn patch_batch_without_id_keeps_ids_in_fields() {
        let recs = patch_records(None, OneOrMany::Batch(vec![obj(json!({ "id": "r1", "a": 1 })), obj(json!({ "a": 2 }))]));
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].id, None);
        assert_eq!(recs[0].fields["id"], json!("r1"));
        assert_eq!(recs[1].fields, obj(json!({ "a": 2 })));
    }

    #[test]
    fn patch_single_without_id_degenerates_to_empty_fields() {
        let recs = patch_records(None, OneOrMany::Single(obj(json!({ "a": 1 }))));
        assert_eq!(serde_json::to_value(&recs).unwrap(), json!([{ "fields": {} }]));
        let recs = patch_records(Some(""), OneOrMany::Single(obj(json!({ "a": 1 }))));
        assert_eq!(serde_json::to_value(&recs).unwrap(), json!([{ "id": "", "fields": {} }]));
    }

    #[test]
    fn patch_batch_with_id_spreads_positionally() {
        let recs = patch_records(Some("rec1"), OneOrMany::Batch(vec![obj(json!({ "a": 1 }))]));
        assert_eq!(serde_json::to_value(&recs).unwrap(), json!([{ "id": "rec1", "fields": { "0": { "a": 1 } } }]));
    }

    #[test]
    fn removal_serializes_like_backend_ack() {
        let r = Removal::Deleted(Deleted { id: "rec1".into(), deleted: true });
        assert_eq!(serde_json::to_value(&r).unwrap(), json!({ "id": "rec1", "deleted": true }));
    }

    #[test]
    fn truthiness() {
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(1)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!(null)));
    }
}
