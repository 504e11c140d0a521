//! In-memory table standing in for the REST backend in tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde_json::json;
use tabula_core::{BackendRecord, OneOrMany};

use crate::{QueryParams, RecordList, RecordsPayload, RecordsResponse, Transport, TransportError, TransportResult};

/// Transport operation, used to inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Query,
    Fetch,
    Delete,
    Post,
    Patch,
    Put,
}

/// A request as the mock received it.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Query(QueryParams),
    Fetch(String),
    Delete(String),
    Post(RecordsPayload),
    Patch(RecordsPayload),
    Put(RecordsPayload),
}

/// Fake table: stores records in insertion order, honours `maxRecords`, and
/// logs every call. Filters and sort params are recorded, not evaluated.
#[derive(Default)]
pub struct MockTransport {
    records: Mutex<Vec<BackendRecord>>,
    calls: Mutex<Vec<Call>>,
    failures: Mutex<HashMap<MockOp, TransportError>>,
    single_responses: Mutex<bool>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl MockTransport {
    pub fn new() -> Self { Self::default() }

    /// Seed with existing records (ids kept as given).
    pub fn with_records(records: Vec<BackendRecord>) -> Self {
        Self { records: Mutex::new(records), ..Self::default() }
    }

    /// Delay every call, so overlapping requests become observable.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail every call of `op` with `err` until cleared.
    pub fn fail(&self, op: MockOp, err: TransportError) {
        guard(&self.failures).insert(op, err);
    }

    pub fn clear_failures(&self) { guard(&self.failures).clear(); }

    /// Answer writes with `{records: {...}}` (first record only) instead of a list.
    pub fn respond_single(&self, on: bool) { *guard(&self.single_responses) = on; }

    pub fn calls(&self) -> Vec<Call> { guard(&self.calls).clone() }

    pub fn records(&self) -> Vec<BackendRecord> { guard(&self.records).clone() }

    /// Highest number of calls observed in progress at once.
    pub fn max_in_flight(&self) -> usize { self.max_in_flight.load(Ordering::SeqCst) }

    async fn enter(&self, op: MockOp, call: Call) -> TransportResult<()> {
        guard(&self.calls).push(call);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(d) = self.latency {
            tokio::time::sleep(d).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match guard(&self.failures).get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn shape(&self, mut out: Vec<BackendRecord>) -> RecordsResponse {
        if *guard(&self.single_responses) && !out.is_empty() {
            OneOrMany::Single(out.remove(0))
        } else {
            OneOrMany::Batch(out)
        }
    }

    /// Record id from the top level, falling back to an `id` string inside `fields`.
    fn target_id(rec: &BackendRecord) -> TransportResult<String> {
        rec.id
            .clone()
            .or_else(|| rec.fields.get("id").and_then(|v| v.as_str()).map(str::to_string))
            .ok_or_else(|| TransportError::Status { status: 422, body: "record id required".into() })
    }

    fn write(&self, payload: &RecordsPayload, replace: bool) -> TransportResult<RecordsResponse> {
        let mut table = guard(&self.records);
        let mut out = Vec::with_capacity(payload.records.len());
        for rec in payload.records.iter() {
            let id = Self::target_id(rec)?;
            let stored = table
                .iter_mut()
                .find(|r| r.id.as_deref() == Some(id.as_str()))
                .ok_or_else(|| TransportError::NotFound(id.clone()))?;
            if replace {
                stored.fields = rec.fields.clone();
            } else {
                for (k, v) in rec.fields.iter() {
                    stored.fields.insert(k.clone(), v.clone());
                }
            }
            out.push(stored.clone());
        }
        Ok(self.shape(out))
    }
}

fn new_record_id() -> String {
    let raw = uuid::Uuid::new_v4().simple().to_string();
    format!("rec{}", &raw[..14])
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn query(&self, params: &QueryParams) -> TransportResult<RecordList> {
        self.enter(MockOp::Query, Call::Query(params.clone())).await?;
        let mut records = self.records();
        if let Some(max) = params.get("maxRecords").and_then(|v| v.as_u64()) {
            records.truncate(max as usize);
        }
        Ok(RecordList { records })
    }

    async fn fetch(&self, id: &str) -> TransportResult<BackendRecord> {
        self.enter(MockOp::Fetch, Call::Fetch(id.to_string())).await?;
        guard(&self.records)
            .iter()
            .find(|r| r.id.as_deref() == Some(id))
            .cloned()
            .ok_or_else(|| TransportError::NotFound(id.to_string()))
    }

    async fn delete(&self, id: &str) -> TransportResult<serde_json::Value> {
        self.enter(MockOp::Delete, Call::Delete(id.to_string())).await?;
        let mut table = guard(&self.records);
        let before = table.len();
        table.retain(|r| r.id.as_deref() != Some(id));
        if table.len() == before {
            return Err(TransportError::NotFound(id.to_string()));
        }
        Ok(json!({ "id": id, "deleted": true }))
    }

    async fn post(&self, payload: &RecordsPayload) -> TransportResult<RecordsResponse> {
        self.enter(MockOp::Post, Call::Post(payload.clone())).await?;
        let created: Vec<BackendRecord> = payload
            .records
            .iter()
            .map(|r| BackendRecord::with_id(new_record_id(), r.fields.clone()))
            .collect();
        guard(&self.records).extend(created.iter().cloned());
        Ok(self.shape(created))
    }

    async fn patch(&self, payload: &RecordsPayload) -> TransportResult<RecordsResponse> {
        self.enter(MockOp::Patch, Call::Patch(payload.clone())).await?;
        self.write(payload, false)
    }

    async fn put(&self, payload: &RecordsPayload) -> TransportResult<RecordsResponse> {
        self.enter(MockOp::Put, Call::Put(payload.clone())).await?;
        self.write(payload, true)
    }
}
