//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Queue (enqueue attempts, fetch/commit failures)
//! - Consume loop (jobs, durations, redeliveries, dead letters)
//! - Reconciliation sweep

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Queue Metrics
// =============================================================================

/// Enqueue calls by result.
pub static ENQUEUE_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("imgqueue_enqueue_total", "Total enqueue calls"),
        &["result"], // "success", "failed"
    )
    .unwrap()
});

/// Individual retry-policy attempts by operation and result.
pub static QUEUE_OP_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "imgqueue_queue_op_attempts_total",
            "Queue operation attempts, including retries",
        ),
        &["op", "result"], // op: "send", "fetch", "commit", "dead_letter"
    )
    .unwrap()
});

// =============================================================================
// Consume Loop Metrics
// =============================================================================

/// Jobs handled by result.
pub static JOBS_PROCESSED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("imgqueue_jobs_processed_total", "Total jobs handled"),
        &["result"], // "success", "transient", "permanent"
    )
    .unwrap()
});

/// Job handling duration in seconds.
pub static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("imgqueue_job_duration_seconds", "Duration of job handling")
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 120.0]),
        &["result"],
    )
    .unwrap()
});

/// Messages rewound for another delivery.
pub static REDELIVERIES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "imgqueue_redeliveries_total",
        "Total messages rewound after a transient failure",
    )
    .unwrap()
});

/// Messages moved to the dead-letter table.
pub static DEAD_LETTERS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("imgqueue_dead_letters_total", "Total dead-lettered messages").unwrap()
});

/// Fetches that exhausted the retry policy.
pub static FETCH_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "imgqueue_fetch_failures_total",
        "Fetches that failed after all retries",
    )
    .unwrap()
});

// =============================================================================
// Service Metrics
// =============================================================================

/// Pending originals re-enqueued by the reconciliation sweep.
pub static RECONCILED_JOBS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "imgqueue_reconciled_jobs_total",
        "Pending originals re-enqueued by the reconciler",
    )
    .unwrap()
});

/// Uploads by result.
pub static UPLOADS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("imgqueue_uploads_total", "Total uploads"),
        &["action", "result"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Queue
        Box::new(ENQUEUE_TOTAL.clone()),
        Box::new(QUEUE_OP_ATTEMPTS.clone()),
        // Consume loop
        Box::new(JOBS_PROCESSED.clone()),
        Box::new(JOB_DURATION.clone()),
        Box::new(REDELIVERIES.clone()),
        Box::new(DEAD_LETTERS.clone()),
        Box::new(FETCH_FAILURES.clone()),
        // Service
        Box::new(RECONCILED_JOBS.clone()),
        Box::new(UPLOADS_TOTAL.clone()),
    ]
}
