// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Process telemetry.
//!
//! [`Telemetry`] holds the request and upload counters. It is created once in `main` and passed
//! explicitly to the tracker and to the [`TelemetryNotifier`] given to the upload logger.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{error, info};
use upload_logger::{UploadError, UploadNotifier, UploadReceipt};

/// Upper bounds of the latency buckets, in microseconds. The last bucket is unbounded.
const LATENCY_BOUNDS_US: [u64; 16] = [
    50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 25_000, 50_000, 100_000, 250_000, 500_000,
    1_000_000, 2_500_000, 5_000_000,
];
const QUANTILES: [f64; 3] = [0.50, 0.90, 0.99];

/// Lock-free latency histogram with fixed buckets.
#[derive(Debug, Default)]
pub struct LatencyHistogram {
    buckets: [AtomicU64; LATENCY_BOUNDS_US.len() + 1],
    count: AtomicU64,
    sum_us: AtomicU64,
}

impl LatencyHistogram {
    pub fn observe(&self, elapsed: Duration) {
        let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        let idx = LATENCY_BOUNDS_US
            .iter()
            .position(|bound| us <= *bound)
            .unwrap_or(LATENCY_BOUNDS_US.len());
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_us.fetch_add(us, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LatencySnapshot {
        let counts: Vec<u64> = self
            .buckets
            .iter()
            .map(|b| b.load(Ordering::Relaxed))
            .collect();
        let total: u64 = counts.iter().sum();
        let [p50, p90, p99] = QUANTILES.map(|q| quantile_upper_bound(&counts, total, q));
        LatencySnapshot {
            count: self.count.load(Ordering::Relaxed),
            sum_us: self.sum_us.load(Ordering::Relaxed),
            p50_us: p50,
            p90_us: p90,
            p99_us: p99,
        }
    }
}

/// Upper bound of the bucket holding the `q` quantile. Values in the unbounded bucket report
/// the largest finite bound.
fn quantile_upper_bound(counts: &[u64], total: u64, q: f64) -> u64 {
    if total == 0 {
        return 0;
    }
    let rank = ((total as f64) * q).ceil().max(1.0) as u64;
    let mut seen = 0;
    for (idx, count) in counts.iter().enumerate() {
        seen += count;
        if seen >= rank {
            return LATENCY_BOUNDS_US
                .get(idx)
                .copied()
                .unwrap_or(LATENCY_BOUNDS_US[LATENCY_BOUNDS_US.len() - 1]);
        }
    }
    LATENCY_BOUNDS_US[LATENCY_BOUNDS_US.len() - 1]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LatencySnapshot {
    pub count: u64,
    pub sum_us: u64,
    pub p50_us: u64,
    pub p90_us: u64,
    pub p99_us: u64,
}

/// Counters shared by the request handlers and the upload notifier.
#[derive(Debug, Default)]
pub struct Telemetry {
    request_count: AtomicU64,
    response_time: LatencyHistogram,
    uploads: AtomicU64,
    upload_errors: AtomicU64,
    last_upload_key: Mutex<Option<String>>,
    last_upload_error: Mutex<Option<String>>,
}

impl Telemetry {
    pub fn record_request(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_response_time(&self, elapsed: Duration) {
        self.response_time.observe(elapsed);
    }

    pub fn record_upload(&self, key_name: &str) {
        self.uploads.fetch_add(1, Ordering::Relaxed);
        *self
            .last_upload_key
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(key_name.to_string());
    }

    pub fn record_upload_error(&self, message: String) {
        self.upload_errors.fetch_add(1, Ordering::Relaxed);
        *self
            .last_upload_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(message);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            request_count: self.request_count.load(Ordering::Relaxed),
            response_time: self.response_time.snapshot(),
            uploads: self.uploads.load(Ordering::Relaxed),
            upload_errors: self.upload_errors.load(Ordering::Relaxed),
            last_upload_key: self
                .last_upload_key
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            last_upload_error: self
                .last_upload_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}

/// Plain data representation of [`Telemetry`], served on the local metrics endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TelemetrySnapshot {
    pub request_count: u64,
    pub response_time: LatencySnapshot,
    pub uploads: u64,
    pub upload_errors: u64,
    pub last_upload_key: Option<String>,
    pub last_upload_error: Option<String>,
}

impl fmt::Display for TelemetrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "request_count={}, p99_us={}, uploads={}, upload_errors={}",
            self.request_count, self.response_time.p99_us, self.uploads, self.upload_errors
        )
    }
}

/// [`UploadNotifier`] that feeds upload outcomes into [`Telemetry`].
#[derive(Debug, Clone)]
pub struct TelemetryNotifier {
    telemetry: Arc<Telemetry>,
}

impl TelemetryNotifier {
    pub fn new(telemetry: Arc<Telemetry>) -> Self {
        Self { telemetry }
    }
}

impl UploadNotifier for TelemetryNotifier {
    fn on_upload_success(&self, receipt: &UploadReceipt) {
        info!("Uploaded to key {}", receipt.key_name);
        self.telemetry.record_upload(&receipt.key_name);
    }

    fn on_upload_failure(&self, error: &UploadError) {
        error!("Error uploading logs: {error}");
        self.telemetry.record_upload_error(error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_histogram_quantiles() {
        let histogram = LatencyHistogram::default();
        for _ in 0..90 {
            histogram.observe(Duration::from_micros(80));
        }
        for _ in 0..9 {
            histogram.observe(Duration::from_millis(3));
        }
        histogram.observe(Duration::from_secs(60));

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.count, 100);
        assert_eq!(snapshot.p50_us, 100);
        assert_eq!(snapshot.p90_us, 100);
        assert_eq!(snapshot.p99_us, 5_000);
    }

    #[test]
    fn test_empty_histogram() {
        let snapshot = LatencyHistogram::default().snapshot();
        assert_eq!(snapshot.count, 0);
        assert_eq!(snapshot.p50_us, 0);
    }

    #[test]
    fn test_notifier_updates_counters() {
        let telemetry = Arc::new(Telemetry::default());
        let notifier = TelemetryNotifier::new(telemetry.clone());

        notifier.on_upload_success(&UploadReceipt {
            path: PathBuf::from("/tmp/svc.1.0.log"),
            key_name: "2024-01-01/1.node.00.log.gz".to_string(),
        });
        notifier.on_upload_failure(&UploadError::Store {
            key: "k".to_string(),
            message: "denied".to_string(),
        });

        let snapshot = telemetry.snapshot();
        assert_eq!(snapshot.uploads, 1);
        assert_eq!(snapshot.upload_errors, 1);
        assert_eq!(
            snapshot.last_upload_key.as_deref(),
            Some("2024-01-01/1.node.00.log.gz")
        );
        assert_eq!(
            snapshot.last_upload_error.as_deref(),
            Some("Failed to upload k: denied")
        );
    }

    #[test]
    fn test_concurrent_request_counting() {
        let telemetry = Arc::new(Telemetry::default());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let telemetry = telemetry.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        telemetry.record_request();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(telemetry.snapshot().request_count, 8000);
    }
}
