//! Request counters and timing for the proxy

use hyper::StatusCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Metrics collector shared by the request-metrics middleware
#[derive(Clone, Debug)]
pub struct ProxyMetrics {
    /// Total number of requests processed
    pub total_requests: Arc<AtomicU64>,
    /// Requests answered with a 1xx, 2xx or 3xx status
    pub successful_requests: Arc<AtomicU64>,
    /// Requests answered with a 4xx status
    pub client_errors: Arc<AtomicU64>,
    /// Requests answered with a 5xx status
    pub server_errors: Arc<AtomicU64>,
    /// Response bytes with a known length
    pub bytes_sent: Arc<AtomicU64>,
    /// Total processing time in microseconds
    pub total_processing_time_us: Arc<AtomicU64>,
}

impl Default for ProxyMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxyMetrics {
    pub fn new() -> Self {
        Self {
            total_requests: Arc::new(AtomicU64::new(0)),
            successful_requests: Arc::new(AtomicU64::new(0)),
            client_errors: Arc::new(AtomicU64::new(0)),
            server_errors: Arc::new(AtomicU64::new(0)),
            bytes_sent: Arc::new(AtomicU64::new(0)),
            total_processing_time_us: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record a completed request
    pub fn record_request(&self, status: StatusCode, bytes_sent: u64, duration: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if status.is_server_error() {
            self.server_errors.fetch_add(1, Ordering::Relaxed);
        } else if status.is_client_error() {
            self.client_errors.fetch_add(1, Ordering::Relaxed);
        } else {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        }
        self.bytes_sent.fetch_add(bytes_sent, Ordering::Relaxed);
        self.total_processing_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let total = self.total_requests.load(Ordering::Relaxed);
        let successful = self.successful_requests.load(Ordering::Relaxed);
        let total_time_us = self.total_processing_time_us.load(Ordering::Relaxed);

        MetricsSnapshot {
            total_requests: total,
            successful_requests: successful,
            client_errors: self.client_errors.load(Ordering::Relaxed),
            server_errors: self.server_errors.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            average_processing_time_ms: if total > 0 {
                (total_time_us as f64 / total as f64) / 1000.0
            } else {
                0.0
            },
            success_rate: if total > 0 {
                (successful as f64 / total as f64) * 100.0
            } else {
                0.0
            },
        }
    }
}

/// Snapshot of current metrics
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub client_errors: u64,
    pub server_errors: u64,
    pub bytes_sent: u64,
    pub average_processing_time_ms: f64,
    pub success_rate: f64,
}

/// Helper for timing operations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
