// SPDX-License-Identifier: Apache-2.0

//! Scatter-gather coordinator
//!
//! One executor task per selected host publishes into a shared bounded
//! channel. The coordinator is the only consumer: it merges events into the
//! sink as they arrive, tracks which hosts are still outstanding and stops
//! at the global deadline. Failures are collected and written after the
//! data, so partial results are never retracted.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::engine::binder::{NamedQuery, PlaceholderStyle};
use crate::engine::error::{EngineError, RequestError};
use crate::engine::executor::{self, HostQuery};
use crate::engine::host_filter::HostFilter;
use crate::engine::hosts::{HostEntry, HostRegistry};
use crate::engine::read_only;
use crate::engine::registry::DriverRegistry;
use crate::engine::types::{Cell, Columns, HostFailure, QueryRequest, RequestId, RowEvent};
use crate::export::{SinkError, TabularSink};
use crate::metrics;

/// First column of every data row and of the header
pub const HOST_COLUMN: &str = "host";

/// Marker row separating data from the error section
pub const ERROR_MARKER: &str = "DATA ENDS! ERRORS FOLLOW:";

/// Stand-in deadline when the timeout does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365);

/// Tunables of a gateway, usually taken from the `[server]` config table
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    pub default_timeout: Duration,
    pub max_timeout: Duration,
    pub read_only_guard: bool,
    /// Capacity of the executor → coordinator channel
    pub channel_capacity: usize,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(10),
            max_timeout: Duration::from_secs(300),
            read_only_guard: true,
            channel_capacity: 256,
        }
    }
}

/// Either half of [`Gateway::execute`] failing
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// A validated request, ready to fan out
#[derive(Debug)]
pub struct PreparedQuery {
    request_id: RequestId,
    hosts: Vec<HostEntry>,
    query: Arc<HostQuery>,
    timeout: Duration,
}

impl PreparedQuery {
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn host_names(&self) -> Vec<&str> {
        self.hosts.iter().map(|h| &*h.name).collect()
    }
}

/// Outcome of one fan-out. Logged and returned, never rendered.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionSummary {
    pub request_id: RequestId,
    pub hosts_selected: usize,
    pub hosts_completed: usize,
    pub failures: Vec<HostFailure>,
    /// Hosts that had not finished when the deadline fired or the sink closed
    pub pending: Vec<String>,
    pub rows_written: u64,
    pub timed_out: bool,
    pub elapsed_ms: u64,
}

impl ExecutionSummary {
    pub fn hosts_failed(&self) -> usize {
        self.failures.len()
    }
}

/// Entry point of the engine: host registry, driver registry and options
pub struct Gateway {
    hosts: Arc<HostRegistry>,
    drivers: Arc<DriverRegistry>,
    options: GatewayOptions,
}

impl Gateway {
    pub fn new(hosts: HostRegistry, drivers: DriverRegistry, options: GatewayOptions) -> Self {
        Self {
            hosts: Arc::new(hosts),
            drivers: Arc::new(drivers),
            options,
        }
    }

    pub fn hosts(&self) -> &HostRegistry {
        &self.hosts
    }

    pub fn options(&self) -> &GatewayOptions {
        &self.options
    }

    /// Validates a request without touching any host.
    pub fn prepare(&self, request: &QueryRequest) -> Result<PreparedQuery, RequestError> {
        let timeout = self.resolve_timeout(request.timeout)?;

        if request.sql.trim().is_empty() {
            return Err(RequestError::malformed("sql must not be empty"));
        }
        let template = NamedQuery::parse(&request.sql)?;

        if self.options.read_only_guard {
            // Placeholders are rewritten first so the parser sees plain SQL.
            let positional = template.bind(&request.params, PlaceholderStyle::Question);
            read_only::check(&positional.sql)?;
        }

        let filter = HostFilter::new(&request.host_match)?;
        let hosts: Vec<HostEntry> = filter.select(&self.hosts).into_iter().cloned().collect();

        let missing = template.missing_names(&request.params);
        if !missing.is_empty() {
            debug!(?missing, "unbound parameters will be NULL");
        }

        Ok(PreparedQuery {
            request_id: RequestId::new(),
            hosts,
            query: Arc::new(HostQuery {
                template,
                params: request.params.clone(),
            }),
            timeout,
        })
    }

    /// Fans the prepared query out and streams the merged result into `sink`.
    ///
    /// Returns once every host is terminal or the deadline fires, including
    /// while blocked on a slow sink. A sink failure ends the fan-out early;
    /// unfinished executors are abandoned.
    #[instrument(
        skip_all,
        fields(request_id = %prepared.request_id, hosts = prepared.hosts.len())
    )]
    pub async fn run(
        &self,
        prepared: PreparedQuery,
        sink: &mut dyn TabularSink,
    ) -> Result<ExecutionSummary, SinkError> {
        let started = Instant::now();
        let deadline = started
            .checked_add(prepared.timeout)
            .unwrap_or_else(|| started + FAR_FUTURE);
        let timeout_ms = prepared.timeout.as_millis() as u64;
        let PreparedQuery {
            request_id,
            hosts,
            query,
            ..
        } = prepared;

        let mut state = AggregationState::new(hosts.iter().map(|h| Arc::clone(&h.name)));
        let (tx, mut rx) = mpsc::channel(self.options.channel_capacity.max(1));

        for host in hosts {
            tokio::spawn(executor::run(
                host,
                Arc::clone(&query),
                Arc::clone(&self.drivers),
                tx.clone(),
            ));
        }
        // Only executors hold senders now, so `None` means they all exited.
        drop(tx);

        let mut timed_out = false;
        let mut output_stalled = false;
        let mut sink_result = Ok(());

        while state.outstanding() > 0 {
            let event = match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(event)) => event,
                Ok(None) => {
                    warn!(pending = ?state.pending_names(), "executors exited without a terminal event");
                    break;
                }
                Err(_) => {
                    timed_out = true;
                    warn!(
                        pending = ?state.pending_names(),
                        timeout_ms,
                        "deadline elapsed, abandoning pending hosts"
                    );
                    break;
                }
            };

            // A reader that stops consuming must not hold the fan-out past the deadline.
            match tokio::time::timeout_at(deadline, state.dispatch(event, sink)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(error = %e, "output closed, abandoning pending hosts");
                    sink_result = Err(e);
                    break;
                }
                Err(_) => {
                    timed_out = true;
                    output_stalled = true;
                    warn!(
                        pending = ?state.pending_names(),
                        timeout_ms,
                        "deadline elapsed while writing output, abandoning pending hosts"
                    );
                    break;
                }
            }
        }

        // Executors still running see a closed channel and stop.
        drop(rx);

        if sink_result.is_ok() && !output_stalled {
            match tokio::time::timeout_at(deadline, state.finish(sink)).await {
                Ok(result) => sink_result = result,
                Err(_) => {
                    timed_out = true;
                    warn!(timeout_ms, "deadline elapsed while finishing output");
                }
            }
        }

        let summary = ExecutionSummary {
            request_id,
            hosts_selected: state.selected,
            hosts_completed: state.completed,
            pending: state.pending_names(),
            failures: state.failures,
            rows_written: state.rows_written,
            timed_out,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        metrics::record_fanout(&summary);

        info!(
            selected = summary.hosts_selected,
            completed = summary.hosts_completed,
            failed = summary.hosts_failed(),
            pending = summary.pending.len(),
            rows = summary.rows_written,
            timed_out = summary.timed_out,
            elapsed_ms = summary.elapsed_ms,
            "fan-out finished"
        );

        sink_result.map(|()| summary)
    }

    /// `prepare` then `run`.
    pub async fn execute(
        &self,
        request: &QueryRequest,
        sink: &mut dyn TabularSink,
    ) -> Result<ExecutionSummary, GatewayError> {
        let prepared = self.prepare(request)?;
        Ok(self.run(prepared, sink).await?)
    }

    fn resolve_timeout(&self, requested: Option<f64>) -> Result<Duration, RequestError> {
        let Some(secs) = requested else {
            return Ok(self.options.default_timeout.min(self.options.max_timeout));
        };
        if !secs.is_finite() || secs <= 0.0 {
            return Err(RequestError::InvalidTimeout(format!(
                "timeout must be a positive number of seconds, got {secs}"
            )));
        }
        let max = self.options.max_timeout.as_secs_f64();
        Ok(Duration::from_secs_f64(secs.min(max)))
    }
}

/// Bookkeeping of one fan-out
struct AggregationState {
    selected: usize,
    pending: HashSet<Arc<str>>,
    header: Option<Columns>,
    failures: Vec<HostFailure>,
    completed: usize,
    rows_written: u64,
}

impl AggregationState {
    fn new(hosts: impl Iterator<Item = Arc<str>>) -> Self {
        let pending: HashSet<Arc<str>> = hosts.collect();
        Self {
            selected: pending.len(),
            pending,
            header: None,
            failures: Vec::new(),
            completed: 0,
            rows_written: 0,
        }
    }

    fn outstanding(&self) -> usize {
        self.pending.len()
    }

    fn pending_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pending.iter().map(|h| h.to_string()).collect();
        names.sort_unstable();
        names
    }

    /// Marks `host` terminal. False if it already was (or never took part).
    fn settle(&mut self, host: &str) -> bool {
        self.pending.remove(host)
    }

    fn fail(&mut self, host: &str, error: EngineError) {
        if self.settle(host) {
            self.failures.push(HostFailure {
                host: host.to_string(),
                error,
            });
        }
    }

    async fn dispatch(&mut self, event: RowEvent, sink: &mut dyn TabularSink) -> Result<(), SinkError> {
        match event {
            RowEvent::Data {
                host,
                columns,
                values,
            } => {
                if !self.pending.contains(&host) {
                    return Ok(());
                }
                let header = match &self.header {
                    Some(header) => Arc::clone(header),
                    None => {
                        {
                            let mut record = Vec::with_capacity(columns.len() + 1);
                            record.push(HOST_COLUMN);
                            record.extend(columns.iter().map(String::as_str));
                            sink.write_record(&record).await?;
                        }
                        self.header = Some(Arc::clone(&columns));
                        columns
                    }
                };
                if values.len() != header.len() {
                    self.fail(
                        &host,
                        EngineError::schema(format!(
                            "host returned {} columns but the result has {}",
                            values.len(),
                            header.len()
                        )),
                    );
                    return Ok(());
                }
                let mut record = Vec::with_capacity(values.len() + 1);
                record.push(&*host);
                record.extend(values.iter().map(Cell::as_str));
                sink.write_record(&record).await?;
                self.rows_written += 1;
            }
            RowEvent::Done { host } => {
                if self.settle(&host) {
                    self.completed += 1;
                }
            }
            RowEvent::Failed { host, error } => self.fail(&host, error),
        }
        Ok(())
    }

    /// Error section, then flush.
    async fn finish(&self, sink: &mut dyn TabularSink) -> Result<(), SinkError> {
        self.write_error_section(sink).await?;
        sink.flush().await
    }

    async fn write_error_section(&self, sink: &mut dyn TabularSink) -> Result<(), SinkError> {
        if self.failures.is_empty() {
            return Ok(());
        }
        sink.write_record(&[""]).await?;
        sink.write_record(&["", ERROR_MARKER]).await?;
        for failure in &self.failures {
            let message = failure.error.to_string();
            sink.write_record(&[failure.host.as_str(), message.as_str()])
                .await?;
        }
        Ok(())
    }
}
