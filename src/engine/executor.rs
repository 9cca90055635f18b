// SPDX-License-Identifier: Apache-2.0

//! Per-host executor
//!
//! Runs one query against one host: resolve the driver, bind parameters in
//! the driver's placeholder style, stream rows, then publish exactly one
//! terminal event. When the coordinator stops listening the driver future
//! is dropped, which releases its connection.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, instrument, warn};

use crate::engine::binder::NamedQuery;
use crate::engine::error::EngineResult;
use crate::engine::hosts::HostEntry;
use crate::engine::registry::DriverRegistry;
use crate::engine::traits::{EventSender, RowSender};
use crate::engine::types::Params;

/// How a host's execution ended, from the executor's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOutcome {
    Done,
    Failed,
    /// The coordinator went away (deadline or closed output) before the host finished
    Abandoned,
}

/// Shared, immutable inputs of one request's fan-out
#[derive(Debug)]
pub struct HostQuery {
    pub template: NamedQuery,
    pub params: Params,
}

#[instrument(
    skip_all,
    fields(host = %host.name, descriptor = %host.descriptor.loggable_descriptor())
)]
pub async fn run(
    host: HostEntry,
    query: Arc<HostQuery>,
    drivers: Arc<DriverRegistry>,
    sender: EventSender,
) -> HostOutcome {
    let start = Instant::now();
    let consumer = sender.clone();
    let mut rows = RowSender::new(Arc::clone(&host.name), sender);

    let result = tokio::select! {
        result = execute(&host, &query, &drivers, &mut rows) => result,
        _ = consumer.closed() => {
            debug!(rows = rows.rows_sent(), "consumer gone, abandoning host");
            return HostOutcome::Abandoned;
        }
    };

    let elapsed_ms = start.elapsed().as_millis() as u64;
    let outcome = match &result {
        Ok(()) => {
            debug!(rows = rows.rows_sent(), elapsed_ms, "host completed");
            HostOutcome::Done
        }
        Err(e) => {
            warn!(kind = e.kind(), error = %e, rows = rows.rows_sent(), elapsed_ms, "host failed");
            HostOutcome::Failed
        }
    };

    if rows.finish(result).await {
        outcome
    } else {
        HostOutcome::Abandoned
    }
}

async fn execute(
    host: &HostEntry,
    query: &HostQuery,
    drivers: &DriverRegistry,
    rows: &mut RowSender,
) -> EngineResult<()> {
    let descriptor = host.descriptor.expose();
    let driver = drivers.resolve(descriptor)?;
    let bound = query.template.bind(&query.params, driver.placeholder_style());

    debug!(driver = driver.driver_id(), args = bound.args.len(), "executing");
    driver.stream(descriptor, &bound, rows).await
}
