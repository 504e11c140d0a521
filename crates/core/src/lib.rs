//! Tabula core types: backend/application record shapes and the per-request
//! selection descriptor shared by the query and api crates.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

pub mod records;

pub use records::{to_application, to_application_batch, to_backend, to_backend_batch};

/// Field bag of a backend record, and the flattened application object.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Flat `{id, ...fields}` object handed to and returned from callers.
pub type AppRecord = serde_json::Map<String, serde_json::Value>;

/// Structured query: field -> literal or operator-object, plus `$`-prefixed directives.
pub type Query = serde_json::Map<String, serde_json::Value>;

/// Record as the backend stores it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendRecord {
    /// Absent on create payloads; always present on backend responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub fields: Fields,
}

impl BackendRecord {
    pub fn with_id(id: impl Into<String>, fields: Fields) -> Self {
        Self { id: Some(id.into()), fields }
    }
}

/// Either a single item or an ordered batch of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Batch(Vec<T>),
    Single(T),
}

impl<T> OneOrMany<T> {
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Batch(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> OneOrMany<U> {
        match self {
            Self::Single(t) => OneOrMany::Single(f(t)),
            Self::Batch(v) => OneOrMany::Batch(v.into_iter().map(f).collect()),
        }
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::Single(t) => vec![t],
            Self::Batch(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortEntry {
    pub field: String,
    pub direction: Direction,
}

/// Filter/sort/projection/limit for a single list request. Built per call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionDescriptor {
    pub filter_formula: Option<String>,
    pub sort: Option<SmallVec<[SortEntry; 4]>>,
    /// Field projection (`$select`), passed through verbatim.
    pub fields: Option<Vec<String>>,
    pub max_records: Option<u64>,
}

impl SelectionDescriptor {
    pub fn is_empty(&self) -> bool {
        self.filter_formula.is_none() && self.sort.is_none() && self.fields.is_none() && self.max_records.is_none()
    }
}

pub mod prelude {
    pub use super::{AppRecord, BackendRecord, Direction, Fields, OneOrMany, Query, SelectionDescriptor, SortEntry};
}
