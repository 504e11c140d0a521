use std::time::Duration;

use crate::{TransportError, TransportResult};

pub const DEFAULT_API_ROOT: &str = "https://api.airtable.com/v0";

/// Where a table lives and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub api_root: String,
    pub base_id: String,
    pub table: String,
    /// Sent as a static bearer token when present.
    pub api_key: Option<String>,
    pub timeout: Option<Duration>,
}

impl TransportConfig {
    pub fn new(base_id: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            api_root: DEFAULT_API_ROOT.to_string(),
            base_id: base_id.into(),
            table: table.into(),
            api_key: None,
            timeout: None,
        }
    }

    /// Read `TABULA_API_ROOT`, `TABULA_BASE_ID`, `TABULA_TABLE`, `TABULA_API_KEY`
    /// and `TABULA_TIMEOUT_SECS`.
    pub fn from_env() -> TransportResult<Self> {
        let base_id = std::env::var("TABULA_BASE_ID")
            .map_err(|_| TransportError::Config("TABULA_BASE_ID is not set".into()))?;
        let table = std::env::var("TABULA_TABLE")
            .map_err(|_| TransportError::Config("TABULA_TABLE is not set".into()))?;
        let mut cfg = Self::new(base_id, table);
        if let Ok(root) = std::env::var("TABULA_API_ROOT") {
            cfg.api_root = root;
        }
        cfg.api_key = std::env::var("TABULA_API_KEY").ok().filter(|s| !s.is_empty());
        cfg.timeout = std::env::var("TABULA_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs);
        Ok(cfg)
    }

    /// Table endpoint: `{api_root}/{base_id}/{table}`, segments percent-encoded.
    pub fn table_url(&self) -> TransportResult<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.api_root)
            .map_err(|e| TransportError::Config(format!("invalid api root {}: {}", self.api_root, e)))?;
        url.path_segments_mut()
            .map_err(|_| TransportError::Config(format!("api root cannot be a base: {}", self.api_root)))?
            .pop_if_empty()
            .push(&self.base_id)
            .push(&self.table);
        Ok(url)
    }
}
