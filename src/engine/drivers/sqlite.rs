// SPDX-License-Identifier: Apache-2.0

//! SQLite Driver
//!
//! Implements the HostDriver trait for SQLite databases using SQLx.
//!
//! ## SQLite Specifics
//!
//! - The descriptor is a sqlx SQLite URL (`sqlite:///abs/path.db`,
//!   `sqlite://rel.db`, `sqlite::memory:`)
//! - Files are opened read-only and never created
//! - Values are typed by storage class, so decoding follows the runtime type

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::query::Query;
use sqlx::{Column, ConnectOptions, Connection, Row, TypeInfo, ValueRef};
use tracing::debug;

use crate::engine::binder::{BoundQuery, PlaceholderStyle};
use crate::engine::drivers::{bytes_to_cell, pump, unsupported_type};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::{HostDriver, RowSender};
use crate::engine::types::{Cell, ParamValue};

/// SQLite driver implementation
#[derive(Debug, Default)]
pub struct SqliteDriver;

impl SqliteDriver {
    pub fn new() -> Self {
        Self
    }

    fn connect_options(descriptor: &str) -> EngineResult<SqliteConnectOptions> {
        let options = SqliteConnectOptions::from_str(descriptor).map_err(|e| {
            EngineError::connection_failed(format!("invalid connection descriptor: {e}"))
        })?;
        Ok(options
            .read_only(true)
            .create_if_missing(false)
            .busy_timeout(Duration::from_secs(30)))
    }

    /// Helper to bind a ParamValue to a SQLite query
    fn bind_param<'q>(
        query: Query<'q, Sqlite, SqliteArguments<'q>>,
        value: &'q ParamValue,
    ) -> Query<'q, Sqlite, SqliteArguments<'q>> {
        match value {
            ParamValue::Null => query.bind(Option::<String>::None),
            ParamValue::Bool(b) => query.bind(*b),
            ParamValue::Int(i) => query.bind(*i),
            ParamValue::Float(f) => query.bind(*f),
            ParamValue::Text(s) => query.bind(s.as_str()),
        }
    }

    fn column_names(row: &SqliteRow) -> Vec<String> {
        row.columns().iter().map(|c| c.name().to_string()).collect()
    }

    fn decode_row(row: &SqliteRow) -> EngineResult<Vec<Cell>> {
        (0..row.columns().len())
            .map(|idx| Self::decode_value(row, idx))
            .collect()
    }

    /// Renders the value at `idx` as text
    fn decode_value(row: &SqliteRow, idx: usize) -> EngineResult<Cell> {
        let raw = row
            .try_get_raw(idx)
            .map_err(|e| EngineError::decode(e.to_string()))?;
        if raw.is_null() {
            return Ok(Cell::Null);
        }

        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return Ok(Cell::text(v.to_string()));
        }
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return Ok(Cell::text(v.to_string()));
        }
        if let Ok(v) = row.try_get::<String, _>(idx) {
            return Ok(Cell::Text(v));
        }
        if let Ok(v) = row.try_get::<Vec<u8>, _>(idx) {
            return Ok(bytes_to_cell(v));
        }

        let column = &row.columns()[idx];
        Err(unsupported_type(column.name(), column.type_info().name()))
    }

    async fn run_query(
        conn: &mut SqliteConnection,
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
impl HostDriver for SqliteDriver {
    fn driver_id(&self) -> &'static str {
        "sqlite"
    }

    fn driver_name(&self) -> &'static str {
        "SQLite"
    }

    fn schemes(&self) -> &'static [&'static str] {
        &["sqlite"]
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Question
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
            debug!(host = rows.host(), error = %e, "closing sqlite connection failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use super::*;
    use crate::engine::types::RowEvent;

    async fn seed(path: &std::path::Path) {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let mut conn = options.connect().await.unwrap();
        sqlx::query("CREATE TABLE t (id INTEGER, name TEXT, score REAL, blob BLOB)")
            .execute(&mut conn)
            .await
            .unwrap();
        sqlx::query("INSERT INTO t VALUES (1, 'ann', 1.5, x'616263'), (2, NULL, NULL, NULL)")
            .execute(&mut conn)
            .await
            .unwrap();
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn streams_rows_as_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.db");
        seed(&path).await;

        let (tx, mut rx) = mpsc::channel(16);
        let mut rows = RowSender::new(Arc::from("a"), tx);
        let query = BoundQuery {
            sql: "SELECT id, name, score, blob FROM t WHERE id >= ? ORDER BY id".to_string(),
            args: vec![ParamValue::Int(1)],
        };
        let descriptor = format!("sqlite://{}", path.display());

        SqliteDriver::new()
            .stream(&descriptor, &query, &mut rows)
            .await
            .unwrap();
        assert_eq!(rows.rows_sent(), 2);
        drop(rows);

        let mut received = Vec::new();
        while let Some(RowEvent::Data { columns, values, .. }) = rx.recv().await {
            assert_eq!(columns.len(), 4);
            received.push(values);
        }
        assert_eq!(
            received,
            vec![
                vec![Cell::text("1"), Cell::text("ann"), Cell::text("1.5"), Cell::text("abc")],
                vec![Cell::text("2"), Cell::Null, Cell::Null, Cell::Null],
            ]
        );
    }

    #[tokio::test]
    async fn missing_file_is_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = format!("sqlite://{}", dir.path().join("absent.db").display());

        let (tx, _rx) = mpsc::channel(1);
        let mut rows = RowSender::new(Arc::from("a"), tx);
        let query = BoundQuery {
            sql: "SELECT 1".to_string(),
            args: vec![],
        };

        let err = SqliteDriver::new()
            .stream(&descriptor, &query, &mut rows)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "connection");
    }

    #[tokio::test]
    async fn bad_sql_is_query_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.db");
        seed(&path).await;

        let (tx, _rx) = mpsc::channel(1);
        let mut rows = RowSender::new(Arc::from("a"), tx);
        let query = BoundQuery {
            sql: "SELECT nope FROM missing_table".to_string(),
            args: vec![],
        };

        let err = SqliteDriver::new()
            .stream(&format!("sqlite://{}", path.display()), &query, &mut rows)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "query");
    }
}
