//! Lock-free service metrics
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//!
//! NOTE: All atomics use Relaxed ordering intentionally—these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
pub const METRICS_BUCKET_BOUNDS: [u64; 10] =
    [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
pub const METRICS_NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    METRICS_BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
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

/// Lock-free metrics collector shared by all request tasks
#[derive(Default)]
pub struct Metrics {
    /// HTTP requests received (monotonic)
    requests_total: AtomicU64,
    /// Predictions served and logged (monotonic)
    predictions_total: AtomicU64,
    /// Predictions with survived = 1 (monotonic)
    predicted_survived_total: AtomicU64,
    /// Predictions that failed in inference (monotonic)
    inference_failures_total: AtomicU64,
    /// Predictions or log reads that failed in the store (monotonic)
    store_failures_total: AtomicU64,
    /// GET /logs served (monotonic)
    log_queries_total: AtomicU64,
    /// Inference latency histogram
    inference_latency_buckets: [AtomicU64; METRICS_NUM_BUCKETS],
    inference_latency_sum_us: AtomicU64,
    inference_latency_max_us: AtomicU64,
}

/// Point-in-time copy of all counters
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub predictions_total: u64,
    pub predicted_survived_total: u64,
    pub inference_failures_total: u64,
    pub store_failures_total: u64,
    pub log_queries_total: u64,
    pub inference_latency_buckets: [u64; METRICS_NUM_BUCKETS],
    pub inference_latency_sum_us: u64,
    pub inference_latency_max_us: u64,
}

impl MetricsSnapshot {
    /// Number of inference latency samples
    pub fn inference_count(&self) -> u64 {
        self.inference_latency_buckets.iter().sum()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_prediction(&self, label: i64) {
        self.predictions_total.fetch_add(1, Ordering::Relaxed);
        if label == 1 {
            self.predicted_survived_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_inference_latency(&self, latency_us: u64) {
        self.inference_latency_buckets[bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
        self.inference_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.inference_latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_inference_failure(&self) {
        self.inference_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_store_failure(&self) {
        self.store_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_log_query(&self) {
        self.log_queries_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Read all counters without resetting them
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut buckets = [0u64; METRICS_NUM_BUCKETS];
        for (i, bucket) in self.inference_latency_buckets.iter().enumerate() {
            buckets[i] = bucket.load(Ordering::Relaxed);
        }

        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            predictions_total: self.predictions_total.load(Ordering::Relaxed),
            predicted_survived_total: self.predicted_survived_total.load(Ordering::Relaxed),
            inference_failures_total: self.inference_failures_total.load(Ordering::Relaxed),
            store_failures_total: self.store_failures_total.load(Ordering::Relaxed),
            log_queries_total: self.log_queries_total.load(Ordering::Relaxed),
            inference_latency_buckets: buckets,
            inference_latency_sum_us: self.inference_latency_sum_us.load(Ordering::Relaxed),
            inference_latency_max_us: self.inference_latency_max_us.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(100), 0);
        assert_eq!(bucket_index(101), 1);
        assert_eq!(bucket_index(51200), 9);
        assert_eq!(bucket_index(51201), 10);
    }

    #[test]
    fn test_record_prediction_counts_survivors() {
        let metrics = Metrics::new();
        metrics.record_prediction(1);
        metrics.record_prediction(0);
        metrics.record_prediction(1);

        let snap = metrics.snapshot();
        assert_eq!(snap.predictions_total, 3);
        assert_eq!(snap.predicted_survived_total, 2);
    }

    #[test]
    fn test_inference_latency_histogram() {
        let metrics = Metrics::new();
        metrics.record_inference_latency(50);
        metrics.record_inference_latency(150);
        metrics.record_inference_latency(90_000);

        let snap = metrics.snapshot();
        assert_eq!(snap.inference_count(), 3);
        assert_eq!(snap.inference_latency_buckets[0], 1);
        assert_eq!(snap.inference_latency_buckets[1], 1);
        assert_eq!(snap.inference_latency_buckets[10], 1);
        assert_eq!(snap.inference_latency_sum_us, 90_200);
        assert_eq!(snap.inference_latency_max_us, 90_000);
    }

    #[test]
    fn test_failure_counters() {
        let metrics = Metrics::new();
        metrics.record_request();
        metrics.record_inference_failure();
        metrics.record_store_failure();
        metrics.record_store_failure();
        metrics.record_log_query();

        let snap = metrics.snapshot();
        assert_eq!(snap.requests_total, 1);
        assert_eq!(snap.inference_failures_total, 1);
        assert_eq!(snap.store_failures_total, 2);
        assert_eq!(snap.log_queries_total, 1);
    }
}
