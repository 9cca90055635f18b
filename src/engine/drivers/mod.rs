// SPDX-License-Identifier: Apache-2.0

// Database drivers module

pub mod mysql;
pub mod postgres;
pub mod sqlite;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::{Stream, StreamExt};

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::{Flow, RowSender};
use crate::engine::types::Cell;

/// Drains a driver row stream into `rows`.
///
/// An error before the first row is the execution failing; later errors are
/// the driver failing mid-fetch. Both are query errors. Decode errors come
/// from `decode` itself.
pub(crate) async fn pump<R, S>(
    mut stream: S,
    rows: &mut RowSender,
    column_names: fn(&R) -> Vec<String>,
    decode: fn(&R) -> EngineResult<Vec<Cell>>,
) -> EngineResult<()>
where
    S: Stream<Item = Result<R, sqlx::Error>> + Unpin,
{
    while let Some(item) = stream.next().await {
        let row = item.map_err(|e| EngineError::query_failed(e.to_string()))?;

        if !rows.has_columns() {
            rows.set_columns(column_names(&row));
        }

        let values = decode(&row)?;
        if rows.send(values).await? == Flow::Stop {
            break;
        }
    }
    Ok(())
}

/// Text for binary column data: UTF-8 as-is, anything else base64.
pub(crate) fn bytes_to_cell(bytes: Vec<u8>) -> Cell {
    match String::from_utf8(bytes) {
        Ok(text) => Cell::Text(text),
        Err(e) => Cell::Text(STANDARD.encode(e.as_bytes())),
    }
}

/// `YYYY-MM-DD HH:MM:SS`, with fractional seconds only when present
pub(crate) fn datetime_cell(value: chrono::NaiveDateTime) -> Cell {
    Cell::text(value.format("%Y-%m-%d %H:%M:%S%.f").to_string())
}

pub(crate) fn time_cell(value: chrono::NaiveTime) -> Cell {
    Cell::text(value.format("%H:%M:%S%.f").to_string())
}

pub(crate) fn unsupported_type(column: &str, type_name: &str) -> EngineError {
    EngineError::decode(format!(
        "unsupported type {type_name} for column '{column}'"
    ))
}
