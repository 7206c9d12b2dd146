//! Prometheus text exposition for the service metrics
//!
//! Served at GET /metrics by the HTTP transport when enabled.

use crate::infra::metrics::{Metrics, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use std::fmt::Write;

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge)
fn write_metric(output: &mut String, name: &str, help: &str, typ: MetricType, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name} {val}");
}

/// Write a histogram metric with cumulative buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    bounds: &[u64; 10],
    sum: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, bound) in bounds.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{le=\"+Inf\"}} {cumulative}");
    let _ = writeln!(output, "{name}_sum {sum}");
    let _ = writeln!(output, "{name}_count {cumulative}");
}

/// Render all metrics in Prometheus text format
pub fn format_prometheus_metrics(metrics: &Metrics) -> String {
    let snap = metrics.snapshot();
    let mut output = String::with_capacity(2048);

    write_metric(
        &mut output,
        "titanic_http_requests_total",
        "HTTP requests received",
        MetricType::Counter,
        snap.requests_total,
    );
    write_metric(
        &mut output,
        "titanic_predictions_total",
        "Predictions served and logged",
        MetricType::Counter,
        snap.predictions_total,
    );
    write_metric(
        &mut output,
        "titanic_predicted_survived_total",
        "Predictions with survived = 1",
        MetricType::Counter,
        snap.predicted_survived_total,
    );
    write_metric(
        &mut output,
        "titanic_inference_failures_total",
        "Predictions rejected by the model",
        MetricType::Counter,
        snap.inference_failures_total,
    );
    write_metric(
        &mut output,
        "titanic_store_failures_total",
        "Prediction log store operations that failed",
        MetricType::Counter,
        snap.store_failures_total,
    );
    write_metric(
        &mut output,
        "titanic_log_queries_total",
        "Recent log queries served",
        MetricType::Counter,
        snap.log_queries_total,
    );
    write_histogram(
        &mut output,
        "titanic_inference_latency_us",
        "Model inference latency in microseconds",
        &snap.inference_latency_buckets,
        &METRICS_BUCKET_BOUNDS,
        snap.inference_latency_sum_us,
    );
    write_metric(
        &mut output,
        "titanic_inference_latency_max_us",
        "Maximum model inference latency",
        MetricType::Gauge,
        snap.inference_latency_max_us,
    );

    output
}
