// SPDX-License-Identifier: Apache-2.0

//! MySQL Driver
//!
//! Implements the HostDriver trait for MySQL/MariaDB databases using SQLx.
//! One connection is opened per request and closed once the rows are
//! drained.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::mysql::{MySql, MySqlArguments, MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, ConnectOptions, Connection, Row, TypeInfo, ValueRef};
use tracing::debug;

use crate::engine::binder::{BoundQuery, PlaceholderStyle};
use crate::engine::drivers::{bytes_to_cell, datetime_cell, pump, time_cell, unsupported_type};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::{HostDriver, RowSender};
use crate::engine::types::{Cell, ParamValue};

/// MySQL driver implementation
#[derive(Debug, Default)]
pub struct MySqlDriver;

impl MySqlDriver {
    pub fn new() -> Self {
        Self
    }

    /// Helper to bind a ParamValue to a MySQL query
    fn bind_param<'q>(
        query: Query<'q, MySql, MySqlArguments>,
        value: &'q ParamValue,
    ) -> Query<'q, MySql, MySqlArguments> {
        match value {
            ParamValue::Null => query.bind(Option::<String>::None),
            ParamValue::Bool(b) => query.bind(*b),
            ParamValue::Int(i) => query.bind(*i),
            ParamValue::Float(f) => query.bind(*f),
            ParamValue::Text(s) => query.bind(s.as_str()),
        }
    }

    fn column_names(row: &MySqlRow) -> Vec<String> {
        row.columns().iter().map(|c| c.name().to_string()).collect()
    }

    fn decode_row(row: &MySqlRow) -> EngineResult<Vec<Cell>> {
        (0..row.columns().len())
            .map(|idx| Self::decode_value(row, idx))
            .collect()
    }

    /// Renders the value at `idx` as text
    fn decode_value(row: &MySqlRow, idx: usize) -> EngineResult<Cell> {
        let raw = row
            .try_get_raw(idx)
            .map_err(|e| EngineError::decode(e.to_string()))?;
        if raw.is_null() {
            return Ok(Cell::Null);
        }

        // Try u64 first for BIGINT UNSIGNED columns
        if let Ok(v) = row.try_get::<u64, _>(idx) {
            return Ok(Cell::text(v.to_string()));
        }
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return Ok(Cell::text(v.to_string()));
        }
        if let Ok(v) = row.try_get::<i32, _>(idx) {
            return Ok(Cell::text(v.to_string()));
        }
        if let Ok(v) = row.try_get::<u32, _>(idx) {
            return Ok(Cell::text(v.to_string()));
        }
        if let Ok(v) = row.try_get::<i16, _>(idx) {
            return Ok(Cell::text(v.to_string()));
        }
        if let Ok(v) = row.try_get::<u16, _>(idx) {
            return Ok(Cell::text(v.to_string()));
        }
        if let Ok(v) = row.try_get::<i8, _>(idx) {
            return Ok(Cell::text(v.to_string()));
        }
        if let Ok(v) = row.try_get::<u8, _>(idx) {
            return Ok(Cell::text(v.to_string()));
        }
        if let Ok(v) = row.try_get::<bool, _>(idx) {
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
        if let Ok(v) = row.try_get::<String, _>(idx) {
            return Ok(Cell::Text(v));
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
        if let Ok(v) = row.try_get::<Vec<u8>, _>(idx) {
            return Ok(bytes_to_cell(v));
        }

        let column = &row.columns()[idx];
        Err(unsupported_type(column.name(), column.type_info().name()))
    }

    async fn run_query(
        conn: &mut MySqlConnection,
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
impl HostDriver for MySqlDriver {
    fn driver_id(&self) -> &'static str {
        "mysql"
    }

    fn driver_name(&self) -> &'static str {
        "MySQL / MariaDB"
    }

    fn schemes(&self) -> &'static [&'static str] {
        &["mysql", "mariadb"]
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
        // sqlx only knows the mysql:// scheme
        let descriptor = match descriptor.strip_prefix("mariadb:") {
            Some(rest) => format!("mysql:{rest}"),
            None => descriptor.to_string(),
        };
        let options = MySqlConnectOptions::from_str(&descriptor).map_err(|e| {
            EngineError::connection_failed(format!("invalid connection descriptor: {e}"))
        })?;

        let mut conn = options
            .connect()
            .await
            .map_err(|e| EngineError::connection_failed(e.to_string()))?;

        let result = Self::run_query(&mut conn, query, rows).await;

        if let Err(e) = conn.close().await {
            debug!(host = rows.host(), error = %e, "closing mysql connection failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_metadata() {
        let driver = MySqlDriver::new();
        assert_eq!(driver.driver_id(), "mysql");
        assert_eq!(driver.schemes(), &["mysql", "mariadb"]);
        assert_eq!(driver.placeholder_style(), PlaceholderStyle::Question);
    }
}
