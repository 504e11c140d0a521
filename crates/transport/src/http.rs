use std::time::Instant;

use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use tabula_core::BackendRecord;
use tabula_query::to_query_pairs;
use tracing::{debug, warn};

use crate::{
    QueryParams, RecordList, RecordsEnvelope, RecordsPayload, RecordsResponse, Transport, TransportConfig,
    TransportError, TransportResult,
};

/// REST client for one table.
pub struct HttpTransport {
    client: Client,
    table_url: Url,
    cfg: TransportConfig,
}

impl HttpTransport {
    pub fn new(cfg: TransportConfig) -> TransportResult<Self> {
        let table_url = cfg.table_url()?;
        let mut builder = Client::builder();
        if let Some(t) = cfg.timeout {
            builder = builder.timeout(t);
        }
        let client = builder.build().map_err(|e| TransportError::Internal(e.to_string()))?;
        Ok(Self { client, table_url, cfg })
    }

    pub fn config(&self) -> &TransportConfig { &self.cfg }

    fn record_url(&self, id: &str) -> TransportResult<Url> {
        let mut url = self.table_url.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::Internal("table url cannot be a base".into()))?
            .push(id);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let req = self.client.request(method, url);
        match &self.cfg.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder, what: &str) -> TransportResult<T> {
        let t0 = Instant::now();
        let resp = req.send().await.map_err(|e| TransportError::Request(e.to_string()))?;
        let status = resp.status();
        debug!(op = what, status = status.as_u16(), took_ms = %t0.elapsed().as_millis(), "transport: response");
        if status == StatusCode::NOT_FOUND {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::NotFound(body));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(op = what, status = status.as_u16(), "transport: request rejected");
            return Err(TransportError::Status { status: status.as_u16(), body });
        }
        resp.json::<T>().await.map_err(|e| TransportError::Decode(e.to_string()))
    }

    async fn send_records(&self, method: Method, payload: &RecordsPayload, what: &str) -> TransportResult<RecordsResponse> {
        let req = self.request(method, self.table_url.clone()).json(payload);
        let env: RecordsEnvelope = self.send(req, what).await?;
        Ok(env.records)
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn query(&self, params: &QueryParams) -> TransportResult<RecordList> {
        let pairs = to_query_pairs(params);
        let req = self.request(Method::GET, self.table_url.clone()).query(&pairs);
        self.send(req, "query").await
    }

    async fn fetch(&self, id: &str) -> TransportResult<BackendRecord> {
        let req = self.request(Method::GET, self.record_url(id)?);
        self.send(req, "fetch").await
    }

    async fn delete(&self, id: &str) -> TransportResult<serde_json::Value> {
        let req = self.request(Method::DELETE, self.record_url(id)?);
        self.send(req, "delete").await
    }

    async fn post(&self, payload: &RecordsPayload) -> TransportResult<RecordsResponse> {
        self.send_records(Method::POST, payload, "post").await
    }

    async fn patch(&self, payload: &RecordsPayload) -> TransportResult<RecordsResponse> {
        self.send_records(Method::PATCH, payload, "patch").await
    }

    async fn put(&self, payload: &RecordsPayload) -> TransportResult<RecordsResponse> {
        self.send_records(Method::PUT, payload, "put").await
    }
}
