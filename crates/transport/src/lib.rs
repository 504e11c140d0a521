//! Tabula transport: the capability the CRUD façade talks to.
//!
//! One transport addresses one backend table. Implementations:
//! - [`HttpTransport`]: REST over `reqwest`
//! - [`MockTransport`]: in-memory table with a call log, for tests

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use tabula_core::{BackendRecord, OneOrMany};

mod config;
mod http;
mod mock;

pub use config::TransportConfig;
pub use http::HttpTransport;
pub use mock::{Call, MockOp, MockTransport};
pub use tabula_query::QueryParams;

/// Errors raised by a transport. The façade passes these through untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request: {0}")]
    Request(String),
    #[error("decode: {0}")]
    Decode(String),
    #[error("config: {0}")]
    Config(String),
    #[error("internal: {0}")]
    Internal(String),
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Response of a list request. A missing or null `records` key decodes as empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordList {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub records: Vec<BackendRecord>,
}

fn null_as_empty<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(d)?.unwrap_or_default())
}

/// Body of batch create/patch/replace requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordsPayload {
    pub records: Vec<BackendRecord>,
}

impl RecordsPayload {
    pub fn new(records: Vec<BackendRecord>) -> Self { Self { records } }
}

/// Write responses carry either one record or a batch under `records`.
pub type RecordsResponse = OneOrMany<BackendRecord>;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RecordsEnvelope {
    pub records: RecordsResponse,
}

/// Backend capability for a single table.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// List records matching the given flat parameters.
    async fn query(&self, params: &QueryParams) -> TransportResult<RecordList>;

    /// Fetch one record by id.
    async fn fetch(&self, id: &str) -> TransportResult<BackendRecord>;

    /// Delete one record by id; returns the backend's raw response body.
    async fn delete(&self, id: &str) -> TransportResult<serde_json::Value>;

    /// Batch create.
    async fn post(&self, payload: &RecordsPayload) -> TransportResult<RecordsResponse>;

    /// Batch partial update.
    async fn patch(&self, payload: &RecordsPayload) -> TransportResult<RecordsResponse>;

    /// Batch full replace.
    async fn put(&self, payload: &RecordsPayload) -> TransportResult<RecordsResponse>;
}

#[async_trait::async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn query(&self, params: &QueryParams) -> TransportResult<RecordList> { (**self).query(params).await }
    async fn fetch(&self, id: &str) -> TransportResult<BackendRecord> { (**self).fetch(id).await }
    async fn delete(&self, id: &str) -> TransportResult<serde_json::Value> { (**self).delete(id).await }
    async fn post(&self, payload: &RecordsPayload) -> TransportResult<RecordsResponse> { (**self).post(payload).await }
    async fn patch(&self, payload: &RecordsPayload) -> TransportResult<RecordsResponse> { (**self).patch(payload).await }
    async fn put(&self, payload: &RecordsPayload) -> TransportResult<RecordsResponse> { (**self).put(payload).await }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_decodes_batch_and_single() {
        let batch: RecordsEnvelope = serde_json::from_value(json!({
            "records": [{ "id": "r1", "fields": { "a": 1 } }]
        })).unwrap();
        assert!(matches!(batch.records, OneOrMany::Batch(ref v) if v.len() == 1));

        let single: RecordsEnvelope = serde_json::from_value(json!({
            "records": { "id": "r1", "fields": {} }
        })).unwrap();
        assert!(matches!(single.records, OneOrMany::Single(ref r) if r.id.as_deref() == Some("r1")));
    }

    #[test]
    fn list_without_records_is_empty() {
        let list: RecordList = serde_json::from_value(json!({})).unwrap();
        assert!(list.records.is_empty());
    }

    #[test]
    fn list_with_null_records_is_empty() {
        let list: RecordList = serde_json::from_value(json!({ "records": null })).unwrap();
        assert!(list.records.is_empty());
    }
}
