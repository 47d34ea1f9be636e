//! Row-oriented data store contract.
//!
//! Rows are JSON objects keyed by column name. Queries are conjunctions of
//! simple column filters; anything richer belongs in a database view.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{BackendError, BackendResult};

pub type Row = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Neq(String, Value),
    In(String, Vec<Value>),
}

impl Filter {
    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(column, _) | Filter::Neq(column, _) | Filter::In(column, _) => column,
        }
    }

    /// Evaluate against a row. A missing column reads as `null`.
    pub fn matches(&self, row: &Row) -> bool {
        let actual = row.get(self.column()).unwrap_or(&Value::Null);
        match self {
            Filter::Eq(_, expected) => actual == expected,
            Filter::Neq(_, expected) => actual != expected,
            Filter::In(_, options) => options.iter().any(|option| option == actual),
        }
    }

    /// PostgREST rendering, e.g. `("role", "in.(faculty,hod)")`.
    pub fn to_query_pair(&self) -> (String, String) {
        let rendered = match self {
            Filter::Eq(_, Value::Null) => "is.null".to_string(),
            Filter::Neq(_, Value::Null) => "not.is.null".to_string(),
            Filter::Eq(_, value) => format!("eq.{}", render_scalar(value)),
            Filter::Neq(_, value) => format!("neq.{}", render_scalar(value)),
            Filter::In(_, values) => {
                let items: Vec<String> = values.iter().map(render_list_item).collect();
                format!("in.({})", items.join(","))
            }
        };
        (self.column().to_string(), rendered)
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render_list_item(value: &Value) -> String {
    match value {
        Value::String(s) if s.contains([',', '(', ')', '"', ' ']) => {
            format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
        }
        other => render_scalar(other),
    }
}

/// Conjunction of filters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    filters: Vec<Filter>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(column.into(), value.into()));
        self
    }

    pub fn neq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Neq(column.into(), value.into()));
        self
    }

    pub fn is_in<I, V>(mut self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.filters
            .push(Filter::In(column.into(), values.into_iter().map(Into::into).collect()));
        self
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }

    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        self.filters.iter().map(Filter::to_query_pair).collect()
    }
}

#[async_trait]
pub trait DataStore: Send + Sync {
    async fn fetch_rows(&self, table: &str, query: &Query) -> BackendResult<Vec<Row>>;

    /// Exactly one row; `NotFound` when nothing matches.
    async fn fetch_row(&self, table: &str, query: &Query) -> BackendResult<Row> {
        let mut rows = self.fetch_rows(table, query).await?;
        match rows.len() {
            0 => Err(BackendError::NotFound),
            1 => Ok(rows.remove(0)),
            n => Err(BackendError::Conflict(format!("expected one row in {table}, found {n}"))),
        }
    }

    /// Insert and return the stored row (with server-assigned columns).
    async fn insert_row(&self, table: &str, row: Row) -> BackendResult<Row>;

    /// Insert, or merge into the row whose `on_conflict` column matches.
    async fn upsert_row(&self, table: &str, row: Row, on_conflict: &str) -> BackendResult<Row>;

    /// Apply `patch` to every matching row; returns the updated rows.
    async fn update_rows(&self, table: &str, query: &Query, patch: Row) -> BackendResult<Vec<Row>>;

    /// Delete every matching row; returns the deleted rows.
    async fn delete_rows(&self, table: &str, query: &Query) -> BackendResult<Vec<Row>>;
}

pub fn decode_row<T: DeserializeOwned>(row: Row) -> BackendResult<T> {
    Ok(serde_json::from_value(Value::Object(row))?)
}

pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Row>) -> BackendResult<Vec<T>> {
    rows.into_iter().map(decode_row).collect()
}

/// Serialize a record into a row. Records must serialize as JSON objects.
pub fn encode_row<T: Serialize>(value: &T) -> BackendResult<Row> {
    match serde_json::to_value(value)? {
        Value::Object(row) => Ok(row),
        other => Err(BackendError::Decode(format!("expected an object, got {other}"))),
    }
}
