// SPDX-License-Identifier: Apache-2.0

//! Normalized error types for the xquery engine
//!
//! Two families live here. `RequestError` rejects a whole request before any
//! host is contacted. `EngineError` is confined to one host: it is collected
//! by the coordinator and rendered in the trailing error section, never
//! raised to the caller.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::binder::BindingError;

/// Failure of a single host's execution.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum EngineError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Query failed: {message}")]
    QueryFailed { message: String },

    #[error("Schema error: {message}")]
    SchemaError { message: String },

    #[error("Decode error: {message}")]
    DecodeError { message: String },
}

impl EngineError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed { message: msg.into() }
    }

    pub fn query_failed(msg: impl Into<String>) -> Self {
        Self::QueryFailed { message: msg.into() }
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::SchemaError { message: msg.into() }
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::DecodeError { message: msg.into() }
    }

    /// Short machine-friendly tag, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionFailed { .. } => "connection",
            Self::QueryFailed { .. } => "query",
            Self::SchemaError { .. } => "schema",
            Self::DecodeError { .. } => "decode",
        }
    }
}

/// Result type alias for per-host operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Request-level rejection. No host is contacted when one of these is returned.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Malformed request: {0}")]
    Malformed(String),

    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("Invalid host filter '{pattern}': {source}")]
    InvalidHostFilter {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Parameter binding failed: {0}")]
    Binding(#[from] BindingError),

    #[error("Only read-only statements are accepted: {0}")]
    NotReadOnly(String),

    #[error("Unauthorized")]
    Unauthorized,
}

impl RequestError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    pub fn not_read_only(msg: impl Into<String>) -> Self {
        Self::NotReadOnly(msg.into())
    }

    /// True for auth rejections; every other variant is a client input error.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}
