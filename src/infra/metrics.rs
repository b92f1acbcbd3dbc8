//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally; these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

/// Submission latency bucket boundaries (milliseconds)
/// Buckets: ≤50, ≤100, ≤250, ≤500, ≤1000, ≤2500, ≤5000, ≤10000, ≤30000, >30000
pub const SUBMIT_BUCKET_BOUNDS: [u64; 9] = [50, 100, 250, 500, 1000, 2500, 5000, 10000, 30000];
pub const SUBMIT_NUM_BUCKETS: usize = 10;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_ms: u64) -> usize {
    SUBMIT_BUCKET_BOUNDS.partition_point(|&bound| bound < latency_ms)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Load all bucket values without resetting
#[inline]
fn load_buckets(buckets: &[AtomicU64; SUBMIT_NUM_BUCKETS]) -> [u64; SUBMIT_NUM_BUCKETS] {
    let mut result = [0u64; SUBMIT_NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.load(Ordering::Relaxed);
    }
    result
}

/// Lock-free metrics collector
pub struct Metrics {
    scans_valid: AtomicU64,
    scans_invalid: AtomicU64,
    sessions_started: AtomicU64,
    sessions_ended: AtomicU64,
    /// Total ticks emitted by the timer process (monotonic)
    ticks_total: AtomicU64,
    /// Ticks since last report (reset on report)
    ticks_since_report: AtomicU64,
    /// Ticks not delivered to an observer because its buffer was full
    observer_ticks_dropped: AtomicU64,
    /// Cross-process broadcasts dropped because the channel was full
    broadcasts_dropped: AtomicU64,
    submissions_succeeded: AtomicU64,
    submissions_failed: AtomicU64,
    submit_latency_buckets: [AtomicU64; SUBMIT_NUM_BUCKETS],
    submit_latency_max_ms: AtomicU64,
    submit_latency_sum_ms: AtomicU64,
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            scans_valid: AtomicU64::new(0),
            scans_invalid: AtomicU64::new(0),
            sessions_started: AtomicU64::new(0),
            sessions_ended: AtomicU64::new(0),
            ticks_total: AtomicU64::new(0),
            ticks_since_report: AtomicU64::new(0),
            observer_ticks_dropped: AtomicU64::new(0),
            broadcasts_dropped: AtomicU64::new(0),
            submissions_succeeded: AtomicU64::new(0),
            submissions_failed: AtomicU64::new(0),
            submit_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            submit_latency_max_ms: AtomicU64::new(0),
            submit_latency_sum_ms: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_scan(&self, valid: bool) {
        if valid {
            self.scans_valid.fetch_add(1, Ordering::Relaxed);
        } else {
            self.scans_invalid.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_session_ended(&self) {
        self.sessions_ended.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_tick(&self) {
        self.ticks_total.fetch_add(1, Ordering::Relaxed);
        self.ticks_since_report.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_observer_tick_dropped(&self) {
        self.observer_ticks_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_broadcast_dropped(&self) {
        self.broadcasts_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_submission(&self, succeeded: bool, latency_ms: u64) {
        if succeeded {
            self.submissions_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.submissions_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.submit_latency_buckets[bucket_index(latency_ms)].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.submit_latency_max_ms, latency_ms);
        self.submit_latency_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
    }

    #[inline]
    pub fn ticks_total(&self) -> u64 {
        self.ticks_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn observer_ticks_dropped(&self) -> u64 {
        self.observer_ticks_dropped.load(Ordering::Relaxed)
    }

    /// Snapshot monotonic counters; resets the per-report tick rate window
    pub fn report(&self) -> MetricsSummary {
        let ticks_count = self.ticks_since_report.swap(0, Ordering::Relaxed);
        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };
        self.summary(rate(ticks_count, elapsed))
    }

    /// Snapshot without touching the reporting window (for scrapes)
    pub fn snapshot(&self) -> MetricsSummary {
        let ticks_count = self.ticks_since_report.load(Ordering::Relaxed);
        let elapsed = self.last_report_time.lock().elapsed();
        self.summary(rate(ticks_count, elapsed))
    }

    fn summary(&self, ticks_per_sec: f64) -> MetricsSummary {
        MetricsSummary {
            scans_valid: self.scans_valid.load(Ordering::Relaxed),
            scans_invalid: self.scans_invalid.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_ended: self.sessions_ended.load(Ordering::Relaxed),
            ticks_total: self.ticks_total.load(Ordering::Relaxed),
            ticks_per_sec,
            observer_ticks_dropped: self.observer_ticks_dropped.load(Ordering::Relaxed),
            broadcasts_dropped: self.broadcasts_dropped.load(Ordering::Relaxed),
            submissions_succeeded: self.submissions_succeeded.load(Ordering::Relaxed),
            submissions_failed: self.submissions_failed.load(Ordering::Relaxed),
            submit_lat_buckets: load_buckets(&self.submit_latency_buckets),
            submit_lat_max_ms: self.submit_latency_max_ms.load(Ordering::Relaxed),
            submit_lat_sum_ms: self.submit_latency_sum_ms.load(Ordering::Relaxed),
        }
    }
}

fn rate(count: u64, elapsed: Duration) -> f64 {
    if elapsed.as_secs_f64() > 0.0 {
        count as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    }
}

/// Point-in-time view of all counters
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub scans_valid: u64,
    pub scans_invalid: u64,
    pub sessions_started: u64,
    pub sessions_ended: u64,
    pub ticks_total: u64,
    pub ticks_per_sec: f64,
    pub observer_ticks_dropped: u64,
    pub broadcasts_dropped: u64,
    pub submissions_succeeded: u64,
    pub submissions_failed: u64,
    pub submit_lat_buckets: [u64; SUBMIT_NUM_BUCKETS],
    pub submit_lat_max_ms: u64,
    pub submit_lat_sum_ms: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            scans_valid = %self.scans_valid,
            scans_invalid = %self.scans_invalid,
            sessions_started = %self.sessions_started,
            sessions_ended = %self.sessions_ended,
            ticks_total = %self.ticks_total,
            ticks_per_sec = format!("{:.1}", self.ticks_per_sec),
            observer_drops = %self.observer_ticks_dropped,
            submissions_ok = %self.submissions_succeeded,
            submissions_failed = %self.submissions_failed,
            submit_max_ms = %self.submit_lat_max_ms,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.ticks_total(), 0);
        assert_eq!(metrics.observer_ticks_dropped(), 0);
    }

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(50), 0);
        assert_eq!(bucket_index(51), 1);
        assert_eq!(bucket_index(30_000), 8);
        assert_eq!(bucket_index(30_001), 9);
    }

    #[test]
    fn test_report_counts() {
        let metrics = Metrics::new();
        metrics.record_scan(true);
        metrics.record_scan(false);
        metrics.record_scan(false);
        metrics.record_session_started();
        metrics.record_tick();
        metrics.record_tick();
        metrics.record_submission(true, 120);
        metrics.record_submission(false, 40);

        let summary = metrics.report();
        assert_eq!(summary.scans_valid, 1);
        assert_eq!(summary.scans_invalid, 2);
        assert_eq!(summary.sessions_started, 1);
        assert_eq!(summary.ticks_total, 2);
        assert_eq!(summary.submissions_succeeded, 1);
        assert_eq!(summary.submissions_failed, 1);
        assert_eq!(summary.submit_lat_buckets[0], 1);
        assert_eq!(summary.submit_lat_buckets[2], 1);
        assert_eq!(summary.submit_lat_max_ms, 120);
    }

    #[test]
    fn test_report_keeps_monotonic_totals() {
        let metrics = Metrics::new();
        metrics.record_tick();
        let _ = metrics.report();
        metrics.record_tick();
        let summary = metrics.report();
        assert_eq!(summary.ticks_total, 2);
    }

    #[test]
    fn test_snapshot_leaves_report_window_alone() {
        let metrics = Metrics::new();
        metrics.record_tick();
        metrics.record_tick();
        let window_start = *metrics.last_report_time.lock();

        let scraped = metrics.snapshot();
        let _ = metrics.snapshot();
        assert_eq!(scraped.ticks_total, 2);
        assert_eq!(metrics.ticks_since_report.load(Ordering::Relaxed), 2);
        assert_eq!(*metrics.last_report_time.lock(), window_start);

        let _ = metrics.report();
        assert_eq!(metrics.ticks_since_report.load(Ordering::Relaxed), 0);
    }
}
