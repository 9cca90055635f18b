//! Core data types for the xquery engine
//!
//! These types are the boundary between driver adapters and the
//! scatter-gather coordinator: drivers produce `Cell`s, executors wrap them
//! in `RowEvent`s, the coordinator renders them as text records.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::error::EngineError;
use crate::observability::Sensitive;

/// Unique identifier for one gateway request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Scalar value supplied for a named parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Named parameters of a request
pub type Params = HashMap<String, ParamValue>;

/// One logical query to fan out, as accepted at the boundary
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub sql: String,
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub host_match: String,
    #[serde(default)]
    pub auth_key: Sensitive<String>,
    /// Global deadline in seconds
    #[serde(default)]
    pub timeout: Option<f64>,
}

impl QueryRequest {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            ..Self::default()
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    pub fn with_host_match(mut self, pattern: impl Into<String>) -> Self {
        self.host_match = pattern.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: f64) -> Self {
        self.timeout = Some(secs);
        self
    }
}

/// A decoded column value.
///
/// Drivers own the typed decoding; the core only distinguishes SQL NULL from
/// a textual rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cell {
    Null,
    Text(String),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Output form of the cell. NULL renders as the empty string.
    pub fn as_str(&self) -> &str {
        match self {
            Cell::Null => "",
            Cell::Text(s) => s,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }
}

impl<T: Into<String>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map(|v| Cell::Text(v.into())).unwrap_or(Cell::Null)
    }
}

/// Column names of one host's result set, shared by all rows of that host
pub type Columns = Arc<[String]>;

/// Event published by a per-host executor.
///
/// Every host produces zero or more `Data` events followed by exactly one
/// terminal event (`Done` or `Failed`).
#[derive(Debug, Clone)]
pub enum RowEvent {
    Data {
        host: Arc<str>,
        columns: Columns,
        values: Vec<Cell>,
    },
    Done {
        host: Arc<str>,
    },
    Failed {
        host: Arc<str>,
        error: EngineError,
    },
}

impl RowEvent {
    pub fn host(&self) -> &str {
        match self {
            RowEvent::Data { host, .. } | RowEvent::Done { host } | RowEvent::Failed { host, .. } => {
                host
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RowEvent::Data { .. })
    }
}

/// A host that ended in failure, in the order failures were observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostFailure {
    pub host: String,
    pub error: EngineError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_deserialize_scalars() {
        let json = r#"{"id": 5, "ratio": 0.5, "name": "bob", "active": true, "gone": null}"#;
        let params: Params = serde_json::from_str(json).expect("should parse");

        assert_eq!(params["id"], ParamValue::Int(5));
        assert_eq!(params["ratio"], ParamValue::Float(0.5));
        assert_eq!(params["name"], ParamValue::Text("bob".to_string()));
        assert_eq!(params["active"], ParamValue::Bool(true));
        assert_eq!(params["gone"], ParamValue::Null);
    }

    #[test]
    fn params_reject_nested_values() {
        assert!(serde_json::from_str::<Params>(r#"{"ids": [1, 2]}"#).is_err());
        assert!(serde_json::from_str::<Params>(r#"{"obj": {"a": 1}}"#).is_err());
    }

    #[test]
    fn request_uses_camel_case_and_defaults() {
        let json = r#"{"sql": "SELECT :id", "params": {"id": 5}, "authKey": "k", "hostMatch": "^eu"}"#;
        let request: QueryRequest = serde_json::from_str(json).expect("should parse");

        assert_eq!(request.sql, "SELECT :id");
        assert_eq!(request.params["id"], ParamValue::Int(5));
        assert_eq!(request.auth_key.expose(), "k");
        assert_eq!(request.host_match, "^eu");
        assert_eq!(request.timeout, None);
        assert!(!format!("{request:?}").contains("\"k\""));

        let minimal: QueryRequest = serde_json::from_str(r#"{"sql": "SELECT 1", "timeout": 2.5}"#).unwrap();
        assert!(minimal.params.is_empty());
        assert_eq!(minimal.host_match, "");
        assert_eq!(minimal.timeout, Some(2.5));
    }

    #[test]
    fn null_cell_renders_empty() {
        assert_eq!(Cell::Null.as_str(), "");
        assert_eq!(Cell::text("null").as_str(), "null");
        assert_eq!(Cell::from(None::<String>), Cell::Null);
        assert_eq!(Cell::from(Some("x")), Cell::text("x"));
    }

    #[test]
    fn terminal_events() {
        let host: Arc<str> = Arc::from("a");
        let done = RowEvent::Done { host: host.clone() };
        let data = RowEvent::Data {
            host,
            columns: Arc::from(vec!["id".to_string()]),
            values: vec![Cell::text("1")],
        };
        assert!(done.is_terminal());
        assert!(!data.is_terminal());
        assert_eq!(data.host(), "a");
    }
}
