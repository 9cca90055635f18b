// SPDX-License-Identifier: Apache-2.0

//! PostgreSQL Driver
//!
//! Implements the HostDriver trait for PostgreSQL using SQLx. Sessions are
//! opened with `default_transaction_read_only=on`.

use std::str::FromStr;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sqlx::postgres::{PgArguments, PgConnectOptions, PgConnection, PgRow, Postgres};
use sqlx::query::Query;
use sqlx::{Column, ConnectOptions, Connection, Row, TypeInfo, ValueRef};
use tracing::debug;

use crate::engine::binder::{BoundQuery, PlaceholderStyle};
use crate::engine::drivers::{datetime_cell, pump, time_cell, unsupported_type};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::{HostDriver, RowSender};
use crate::engine::types::{Cell, ParamValue};

/// PostgreSQL driver implementation
#[derive(Debug, Default)]
pub struct PostgresDriver;

impl PostgresDriver {
    pub fn new() -> Self {
        Self
    }

    fn connect_options(descriptor: &str) -> EngineResult<PgConnectOptions> {
        let options = PgConnectOptions::from_str(descriptor).map_err(|e| {
            EngineError::connection_failed(format!("invalid connection descriptor: {e}"))
        })?;
        Ok(options.options([("default_transaction_read_only", "on")]))
    }

    /// Helper to bind a ParamValue to a PostgreSQL query
    fn bind_param<'q>(
        query: Query<'q, Postgres, PgArguments>,
        value: &'q ParamValue,
    ) -> Query<'q, Postgres, PgArguments> {
        match value {
            ParamValue::Null => query.bind(Option::<String>::None),
            ParamValue::Bool(b) => query.bind(*b),
            ParamValue::Int(i) => query.bind(*i),
            ParamValue::Float(f) => query.bind(*f),
            ParamValue::Text(s) => query.bind(s.as_str()),
        }
    }

    fn column_names(row: &PgRow) -> Vec<String> {
        row.columns().iter().map(|c| c.name().to_string()).collect()
    }

    fn decode_row(row: &PgRow) -> EngineResult<Vec<Cell>> {
        (0..row.columns().len())
            .map(|idx| Self::decode_value(row, idx))
            .collect()
    }

    /// Renders the value at `idx` as text
    fn decode_value(row: &PgRow, idx: usize) -> EngineResult<Cell> {
        let raw = row
            .try_get_raw(idx)
            .map_err(|e| EngineError::decode(e.to_string()))?;
        if raw.is_null() {
            return Ok(Cell::Null);
        }

        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return Ok(Cell::text(v.to_string()));
        }
        if let Ok(v) = row.try_get::<i32, _>(idx) {
            return Ok(Cell::text(v.to_string()));
        }
        if let Ok(v) = row.try_get::<i16, _>(idx) {
            return Ok(Cell::text(v.to_string()));
        }
        if let Ok(v) = row.try_get::<rust_decimal::Decimal, _>(idx) {
            return Ok(Cell::text(v.to_string()));
        }
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return Ok(Cell::text(v.to_string()));
        }
        if let Ok(v) = row.try_get::<f32, _>(idx) {
            return Ok(Cell::text(v.to_string()));
        }
        if let Ok(v) = row.try_get::<bool, _>(idx) {
            return Ok(Cell::text(v.to_string()));
        }
        if let Ok(v) = row.try_get::<String, _>(idx) {
            return Ok(Cell::Text(v));
        }
        if let Ok(v) = row.try_get::<uuid::Uuid, _>(idx) {
            return Ok(Cell::text(v.hyphenated().to_string()));
        }
        if let Ok(v) = row.try_get::<chrono::DateTime<chrono::Utc>, _>(idx) {
            return Ok(Cell::text(v.to_rfc3339()));
        }
        if let Ok(v) = row.try_get::<chrono::NaiveDateTime, _>(idx) {
            return Ok(datetime_cell(v));
        }
        if let Ok(v) = row.try_get::<chrono::NaiveDate, _>(idx) {
            return Ok(Cell::text(v.format("%Y-%m-%d").to_string()));
        }
        if let Ok(v) = row.try_get::<chrono::NaiveTime, _>(idx) {
            return Ok(time_cell(v));
        }
        if let Ok(v) = row.try_get::<serde_json::Value, _>(idx) {
            return Ok(Cell::text(v.to_string()));
        }
        // bytea is opaque binary, always base64
        if let Ok(v) = row.try_get::<Vec<u8>, _>(idx) {
            return Ok(Cell::text(STANDARD.encode(v)));
        }

        let column = &row.columns()[idx];
        Err(unsupported_type(column.name(), column.type_info().name()))
    }

    async fn run_query(
        conn: &mut PgConnection,
        query: &BoundQuery,
        rows: &mut RowSender,
    ) -> EngineResult<()> {
        let mut q = sqlx::query(&query.sql);
        for arg in &query.args {
            q = Self::bind_param(q, arg);
        }

        let stream = q.fetch(&mut *conn);
        pump(stream, rows, Self::column_names, Self::decode_row).await
    }
}

#[async_trait]
impl HostDriver for PostgresDriver {
    fn driver_id(&self) -> &'static str {
        "postgres"
    }

    fn driver_name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn schemes(&self) -> &'static [&'static str] {
        &["postgres", "postgresql"]
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Dollar
    }

    async fn stream(
        &self,
        descriptor: &str,
        query: &BoundQuery,
        rows: &mut RowSender,
    ) -> EngineResult<()> {
        let options = Self::connect_options(descriptor)?;

        let mut conn = options
            .connect()
            .await
            .map_err(|e| EngineError::connection_failed(e.to_string()))?;

        let result = Self::run_query(&mut conn, query, rows).await;

        if let Err(e) = conn.close().await {
            debug!(host = rows.host(), error = %e, "closing postgres connection failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_metadata() {
        let driver = PostgresDriver::new();
        assert_eq!(driver.driver_id(), "postgres");
        assert_eq!(driver.placeholder_style(), PlaceholderStyle::Dollar);
        assert!(driver.schemes().contains(&"postgresql"));
    }

    #[test]
    fn descriptor_parse_failure_is_connection_error() {
        let err = PostgresDriver::connect_options("postgres://user@host:notaport/db").unwrap_err();
        assert_eq!(err.kind(), "connection");
        assert!(err.to_string().contains("invalid connection descriptor"));
    }

    #[test]
    fn valid_descriptor_parses() {
        assert!(PostgresDriver::connect_options("postgres://reader:pw@10.0.0.2:5432/app").is_ok());
    }
}
