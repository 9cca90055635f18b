// SPDX-License-Identifier: Apache-2.0

//! Tabular sinks for the merged result stream
//!
//! The coordinator writes records of text fields; a sink decides how they
//! are encoded. Records may differ in width (the error section is narrower
//! than the data rows).

use async_trait::async_trait;
use thiserror::Error;

pub mod buffer;
pub mod csv;

pub use buffer::RecordBuffer;
pub use self::csv::CsvSink;

/// Consumer-side failure. Ends the fan-out early.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("output closed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode record: {0}")]
    Encode(#[from] ::csv::Error),
}

impl SinkError {
    /// True when the reader went away rather than the encoding failing
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            SinkError::Io(e) if matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            )
        )
    }
}

#[async_trait]
pub trait TabularSink: Send {
    async fn write_record(&mut self, record: &[&str]) -> Result<(), SinkError>;
    async fn flush(&mut self) -> Result<(), SinkError>;
}
