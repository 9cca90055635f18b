//! HostDriver trait definition
//!
//! A driver adapts one database protocol to the engine: it opens a single
//! connection from a connection descriptor, runs a positional query and
//! pushes decoded rows into a [`RowSender`]. Drivers never emit terminal
//! events; the executor does that once the driver returns.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::engine::binder::{BoundQuery, PlaceholderStyle};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::types::{Cell, Columns, RowEvent};

/// Sending half of the coordinator's event channel
pub type EventSender = mpsc::Sender<RowEvent>;

/// Whether the consumer still wants rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Core trait that all database drivers must implement
#[async_trait]
pub trait HostDriver: Send + Sync {
    /// Returns the unique identifier for this driver (e.g., "postgres", "mysql")
    fn driver_id(&self) -> &'static str;

    /// Returns a human-readable name for this driver
    fn driver_name(&self) -> &'static str;

    /// Connection descriptor URL schemes handled by this driver
    fn schemes(&self) -> &'static [&'static str];

    /// Positional placeholder syntax the driver expects
    fn placeholder_style(&self) -> PlaceholderStyle;

    /// Opens one connection, executes `query` and streams its rows.
    ///
    /// The connection must be released before this returns, on every path.
    /// Return early with `Ok(())` when `rows.send` reports [`Flow::Stop`].
    async fn stream(
        &self,
        descriptor: &str,
        query: &BoundQuery,
        rows: &mut RowSender,
    ) -> EngineResult<()>;
}

/// Host-tagged row publisher handed to a driver.
///
/// Column names are fixed by the first row; every later row must have the
/// same width.
#[derive(Debug)]
pub struct RowSender {
    host: Arc<str>,
    sender: EventSender,
    columns: Option<Columns>,
    rows_sent: u64,
}

impl RowSender {
    pub fn new(host: Arc<str>, sender: EventSender) -> Self {
        Self {
            host,
            sender,
            columns: None,
            rows_sent: 0,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn has_columns(&self) -> bool {
        self.columns.is_some()
    }

    pub fn set_columns(&mut self, names: Vec<String>) {
        self.columns = Some(Arc::from(names));
    }

    pub fn rows_sent(&self) -> u64 {
        self.rows_sent
    }

    /// Publishes one row. Fails with a schema error when its width does not
    /// match the column names.
    pub async fn send(&mut self, values: Vec<Cell>) -> EngineResult<Flow> {
        let columns = self
            .columns
            .clone()
            .ok_or_else(|| EngineError::schema("row received before column names"))?;

        if values.len() != columns.len() {
            return Err(EngineError::schema(format!(
                "row has {} values but the result has {} columns",
                values.len(),
                columns.len()
            )));
        }

        let event = RowEvent::Data {
            host: Arc::clone(&self.host),
            columns,
            values,
        };

        if self.sender.send(event).await.is_err() {
            return Ok(Flow::Stop);
        }
        self.rows_sent += 1;
        Ok(Flow::Continue)
    }

    /// Publishes the host's terminal event. Returns false if nobody listens.
    pub async fn finish(self, outcome: EngineResult<()>) -> bool {
        let event = match outcome {
            Ok(()) => RowEvent::Done { host: self.host },
            Err(error) => RowEvent::Failed {
                host: self.host,
                error,
            },
        };
        self.sender.send(event).await.is_ok()
    }
}
