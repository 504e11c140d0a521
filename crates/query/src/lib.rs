//! Tabula query translator.
//!
//! Turns a structured query (`{field: literal | {$op: operand}, $or: [...], $limit, ...}`)
//! into a single backend formula plus flat transport parameters:
//!
//! - [`compile_formula`]: filter predicates -> formula string
//! - [`normalize`]: split directives (`$limit`, `$sort`, `$select`, `$skip`) from predicates
//! - [`build_params`]: selection descriptor -> `filterByFormula`, `maxRecords`, `fields[]`, `sort[i][..]`

#![forbid(unsafe_code)]

mod formula;
mod normalize;
mod params;

pub use formula::{compile_formula, escape_operand, Operator};
pub use normalize::{normalize, Normalized, DIRECTIVE_KEYS};
pub use params::{build_params, to_query_pairs, QueryParams};

pub use tabula_core::{Query, SelectionDescriptor};

/// Errors raised while translating a query. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("invalid operator {operator} for field {field}")]
    InvalidOperator { operator: String, field: String },
}

pub type QueryResult<T> = Result<T, QueryError>;
