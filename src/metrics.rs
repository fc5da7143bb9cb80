//! Upstream request metrics
//!
//! Tracks latency percentiles and success rates for the requests issued by
//! one component (the snapshot tracker or the detail cache).

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::RwLock;

/// Maximum number of samples to keep for percentile calculation
const MAX_SAMPLES: usize = 100;

/// Request metrics for one component
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderMetrics {
    /// Component the requests belong to
    pub component: String,
    /// 50th percentile latency of successful requests in milliseconds
    pub latency_p50_ms: f64,
    /// 99th percentile latency of successful requests in milliseconds
    pub latency_p99_ms: f64,
    /// Success rate (0.0 to 1.0)
    pub success_rate: f64,
    /// Total number of requests tracked
    pub total_requests: u64,
    /// Number of failed requests
    pub failed_requests: u64,
}

impl ProviderMetrics {
    /// Creates metrics with no data
    pub fn empty(component: &str) -> Self {
        Self {
            component: component.to_string(),
            latency_p50_ms: 0.0,
            latency_p99_ms: 0.0,
            success_rate: 1.0,
            total_requests: 0,
            failed_requests: 0,
        }
    }
}

#[derive(Debug, Default)]
struct Samples {
    window: VecDeque<(f64, bool)>,
    total: u64,
    failed: u64,
}

/// Collects request samples and computes `ProviderMetrics`
#[derive(Debug)]
pub struct MetricsCollector {
    component: String,
    samples: RwLock<Samples>,
}

impl MetricsCollector {
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            samples: RwLock::new(Samples::default()),
        }
    }

    /// Records a request with its duration and success status
    pub async fn record_request(&self, duration: Duration, success: bool) {
        let duration_ms = duration.as_micros() as f64 / 1000.0;
        let mut samples = self.samples.write().await;

        samples.total += 1;
        if !success {
            samples.failed += 1;
        }
        if samples.window.len() >= MAX_SAMPLES {
            samples.window.pop_front();
        }
        samples.window.push_back((duration_ms, success));
    }

    /// Computes current metrics from collected samples
    pub async fn get_metrics(&self) -> ProviderMetrics {
        let samples = self.samples.read().await;
        if samples.total == 0 {
            return ProviderMetrics::empty(&self.component);
        }

        let mut latencies: Vec<f64> = samples
            .window
            .iter()
            .filter(|(_, success)| *success)
            .map(|(ms, _)| *ms)
            .collect();
        latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        ProviderMetrics {
            component: self.component.clone(),
            latency_p50_ms: percentile(&latencies, 50.0),
            latency_p99_ms: percentile(&latencies, 99.0),
            success_rate: (samples.total - samples.failed) as f64 / samples.total as f64,
            total_requests: samples.total,
            failed_requests: samples.failed,
        }
    }
}

/// Calculate percentile from sorted values
fn percentile(sorted_values: &[f64], p: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }

    let idx = (p / 100.0 * (sorted_values.len() - 1) as f64).round() as usize;
    sorted_values[idx.min(sorted_values.len() - 1)]
}
