use async_trait::async_trait;

use crate::export::{SinkError, TabularSink};

/// Keeps every record in memory. Used by library callers and tests.
#[derive(Debug, Default, Clone)]
pub struct RecordBuffer {
    records: Vec<Vec<String>>,
    flushes: usize,
}

impl RecordBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[Vec<String>] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Vec<String>> {
        self.records
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// Records before the error section
    pub fn data_records(&self) -> &[Vec<String>] {
        let end = self
            .records
            .iter()
            .position(|r| r.len() == 1 && r[0].is_empty())
            .unwrap_or(self.records.len());
        &self.records[..end]
    }
}

#[async_trait]
impl TabularSink for RecordBuffer {
    async fn write_record(&mut self, record: &[&str]) -> Result<(), SinkError> {
        self.records
            .push(record.iter().map(|field| field.to_string()).collect());
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.flushes += 1;
        Ok(())
    }
}
