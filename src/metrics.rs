//! Lightweight in-memory process counters, exposed at `GET /metrics`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use serde::Serialize;

use crate::engine::ExecutionSummary;

#[derive(Default)]
struct GatewayMetrics {
    requests: AtomicU64,
    rejected: AtomicU64,
    host_successes: AtomicU64,
    host_failures: AtomicU64,
    hosts_abandoned: AtomicU64,
    timeouts: AtomicU64,
    rows: AtomicU64,
    duration_total_ms: AtomicU64,
    duration_max_ms: AtomicU64,
}

static GATEWAY_METRICS: OnceLock<GatewayMetrics> = OnceLock::new();

fn metrics() -> &'static GatewayMetrics {
    GATEWAY_METRICS.get_or_init(GatewayMetrics::default)
}

/// A request refused before any host was contacted (auth, validation).
pub fn record_rejected() {
    metrics().rejected.fetch_add(1, Ordering::Relaxed);
}

/// One completed fan-out.
pub fn record_fanout(summary: &ExecutionSummary) {
    let metrics = metrics();
    metrics.requests.fetch_add(1, Ordering::Relaxed);
    metrics
        .host_successes
        .fetch_add(summary.hosts_completed as u64, Ordering::Relaxed);
    metrics
        .host_failures
        .fetch_add(summary.hosts_failed() as u64, Ordering::Relaxed);
    metrics
        .hosts_abandoned
        .fetch_add(summary.pending.len() as u64, Ordering::Relaxed);
    if summary.timed_out {
        metrics.timeouts.fetch_add(1, Ordering::Relaxed);
    }
    metrics
        .rows
        .fetch_add(summary.rows_written, Ordering::Relaxed);
    metrics
        .duration_total_ms
        .fetch_add(summary.elapsed_ms, Ordering::Relaxed);

    let mut current = metrics.duration_max_ms.load(Ordering::Relaxed);
    while summary.elapsed_ms > current {
        match metrics.duration_max_ms.compare_exchange(
            current,
            summary.elapsed_ms,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(next) => current = next,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub rejected: u64,
    pub host_successes: u64,
    pub host_failures: u64,
    pub hosts_abandoned: u64,
    pub timeouts: u64,
    pub rows: u64,
    pub avg_ms: Option<f64>,
    pub max_ms: Option<u64>,
}

pub fn snapshot() -> MetricsSnapshot {
    let metrics = metrics();
    let requests = metrics.requests.load(Ordering::Relaxed);
    let duration_total = metrics.duration_total_ms.load(Ordering::Relaxed);
    let max_ms = metrics.duration_max_ms.load(Ordering::Relaxed);

    let avg_ms = if requests > 0 {
        Some(duration_total as f64 / requests as f64)
    } else {
        None
    };

    MetricsSnapshot {
        requests,
        rejected: metrics.rejected.load(Ordering::Relaxed),
        host_successes: metrics.host_successes.load(Ordering::Relaxed),
        host_failures: metrics.host_failures.load(Ordering::Relaxed),
        hosts_abandoned: metrics.hosts_abandoned.load(Ordering::Relaxed),
        timeouts: metrics.timeouts.load(Ordering::Relaxed),
        rows: metrics.rows.load(Ordering::Relaxed),
        avg_ms,
        max_ms: if max_ms > 0 { Some(max_ms) } else { None },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineError, HostFailure, RequestId};

    fn summary(elapsed_ms: u64, timed_out: bool) -> ExecutionSummary {
        ExecutionSummary {
            request_id: RequestId::new(),
            hosts_selected: 3,
            hosts_completed: 1,
            failures: vec![HostFailure {
                host: "b".into(),
                error: EngineError::connection_failed("refused"),
            }],
            pending: vec!["c".into()],
            rows_written: 4,
            timed_out,
            elapsed_ms,
        }
    }

    #[test]
    fn test_metrics_flow() {
        // Other tests record concurrently, so only compare deltas.
        let initial = snapshot();

        record_fanout(&summary(120, false));
        let s1 = snapshot();
        assert!(s1.requests >= initial.requests + 1);
        assert!(s1.host_successes >= initial.host_successes + 1);
        assert!(s1.host_failures >= initial.host_failures + 1);
        assert!(s1.hosts_abandoned >= initial.hosts_abandoned + 1);
        assert!(s1.rows >= initial.rows + 4);

        record_fanout(&summary(99_999, true));
        let s2 = snapshot();
        assert!(s2.timeouts >= s1.timeouts + 1);
        assert!(s2.max_ms.unwrap() >= 99_999);
        assert!(s2.avg_ms.is_some());

        record_rejected();
        assert!(snapshot().rejected >= initial.rejected + 1);
    }
}
