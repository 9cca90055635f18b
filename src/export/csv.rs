// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use csv::WriterBuilder;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::export::{SinkError, TabularSink};

/// Writes records as CSV to any async writer.
///
/// Each record is encoded into a scratch buffer by the `csv` crate and then
/// written through, so rows reach the reader as soon as they are produced.
pub struct CsvSink<W> {
    writer: W,
    builder: WriterBuilder,
    scratch: Vec<u8>,
    records_written: u64,
    bytes_written: u64,
}

impl<W: AsyncWrite + Unpin + Send> CsvSink<W> {
    pub fn new(writer: W) -> Self {
        let mut builder = WriterBuilder::new();
        builder.flexible(true).has_headers(false);
        Self {
            writer,
            builder,
            scratch: Vec::with_capacity(256),
            records_written: 0,
            bytes_written: 0,
        }
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn encode(&mut self, record: &[&str]) -> Result<(), SinkError> {
        self.scratch.clear();
        let mut encoder = self.builder.from_writer(&mut self.scratch);
        encoder.write_record(record)?;
        encoder.flush()?;
        Ok(())
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> TabularSink for CsvSink<W> {
    async fn write_record(&mut self, record: &[&str]) -> Result<(), SinkError> {
        self.encode(record)?;
        self.writer.write_all(&self.scratch).await?;
        self.records_written += 1;
        self.bytes_written += self.scratch.len() as u64;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(bytes: &[u8]) -> Vec<Vec<String>> {
        csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes)
            .records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect()
    }

    #[tokio::test]
    async fn writes_flexible_width_records() {
        let mut sink = CsvSink::new(Vec::new());
        sink.write_record(&["host", "id", "name"]).await.unwrap();
        sink.write_record(&["a", "1", "x,y"]).await.unwrap();
        sink.write_record(&[""]).await.unwrap();
        sink.write_record(&["", "DATA ENDS! ERRORS FOLLOW:"]).await.unwrap();
        sink.flush().await.unwrap();
        assert_eq!(sink.records_written(), 4);

        let bytes = sink.into_inner();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with("host,id,name\na,1,\"x,y\"\n"));

        assert_eq!(
            parse(&bytes),
            vec![
                vec!["host", "id", "name"],
                vec!["a", "1", "x,y"],
                vec![""],
                vec!["", "DATA ENDS! ERRORS FOLLOW:"],
            ]
        );
    }

    #[tokio::test]
    async fn quotes_embedded_quotes_and_newlines() {
        let mut sink = CsvSink::new(Vec::new());
        sink.write_record(&["a", "say \"hi\"\nbye"]).await.unwrap();
        let bytes = sink.into_inner();
        assert_eq!(parse(&bytes), vec![vec!["a", "say \"hi\"\nbye"]]);
    }

    #[tokio::test]
    async fn closed_reader_is_disconnect() {
        let (writer, reader) = tokio::io::duplex(64);
        drop(reader);
        let mut sink = CsvSink::new(writer);
        let err = sink.write_record(&["a", "1"]).await.unwrap_err();
        assert!(err.is_disconnect());
    }
}
