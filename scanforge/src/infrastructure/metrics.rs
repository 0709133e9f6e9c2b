// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Metrics
//!
//! Prometheus-backed counters/gauges/histograms for the engine's own
//! observability surface: pool utilization, buffer pool hit rate,
//! backpressure events, and scan throughput. Mirrors the teacher's
//! `infrastructure::metrics::MetricsService` shape (one `Registry`, typed
//! metric fields built through `Opts`/`HistogramOpts`), scoped to this
//! core's own concerns rather than pipeline-stage execution metrics.

use prometheus::{Gauge, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry};
use scanforge_domain::error::CoreError;

/// Owns this crate's `prometheus::Registry` and every metric handle the
/// engine updates. Cheap to clone (internal `Arc`s via `prometheus`'s own
/// metric types), so infrastructure components hold a clone each.
#[derive(Clone)]
pub struct ScannerMetrics {
    registry: Registry,

    pub files_scanned_total: IntCounter,
    pub bytes_scanned_total: IntCounter,
    pub scan_errors_total: IntCounter,
    pub scan_duration_seconds: Histogram,
    pub scan_throughput_mbps: Gauge,

    pub buffer_pool_hits_total: IntCounter,
    pub buffer_pool_misses_total: IntCounter,

    pub backpressure_events_total: IntCounter,
    pub active_thread_pool_workers: IntGauge,

    pub watch_events_total: IntCounter,
    pub watch_overflow_total: IntCounter,
}

impl ScannerMetrics {
    pub fn new() -> Result<Self, CoreError> {
        let registry = Registry::new();

        let files_scanned_total = IntCounter::with_opts(
            Opts::new("scanforge_files_scanned_total", "Total files visited by the scanner").namespace("scanforge"),
        )
        .map_err(metrics_error)?;
        let bytes_scanned_total = IntCounter::with_opts(
            Opts::new("scanforge_bytes_scanned_total", "Total bytes of scanned file content").namespace("scanforge"),
        )
        .map_err(metrics_error)?;
        let scan_errors_total = IntCounter::with_opts(
            Opts::new("scanforge_scan_errors_total", "Total per-entry scan errors").namespace("scanforge"),
        )
        .map_err(metrics_error)?;
        let scan_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("scanforge_scan_duration_seconds", "Wall-clock duration of a full scan")
                .namespace("scanforge")
                .buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]),
        )
        .map_err(metrics_error)?;
        let scan_throughput_mbps = Gauge::with_opts(
            Opts::new("scanforge_scan_throughput_mbps", "Current scan throughput in MB/s").namespace("scanforge"),
        )
        .map_err(metrics_error)?;

        let buffer_pool_hits_total = IntCounter::with_opts(
            Opts::new("scanforge_buffer_pool_hits_total", "Buffer pool acquisitions served from a free list")
                .namespace("scanforge"),
        )
        .map_err(metrics_error)?;
        let buffer_pool_misses_total = IntCounter::with_opts(
            Opts::new(
                "scanforge_buffer_pool_misses_total",
                "Buffer pool acquisitions that allocated a new buffer",
            )
            .namespace("scanforge"),
        )
        .map_err(metrics_error)?;

        let backpressure_events_total = IntCounter::with_opts(
            Opts::new("scanforge_backpressure_events_total", "Times the backpressure controller rejected or delayed work")
                .namespace("scanforge"),
        )
        .map_err(metrics_error)?;
        let active_thread_pool_workers = IntGauge::with_opts(
            Opts::new("scanforge_active_thread_pool_workers", "Sum of active workers across all pools")
                .namespace("scanforge"),
        )
        .map_err(metrics_error)?;

        let watch_events_total = IntCounter::with_opts(
            Opts::new("scanforge_watch_events_total", "Coalesced filesystem change events delivered").namespace("scanforge"),
        )
        .map_err(metrics_error)?;
        let watch_overflow_total = IntCounter::with_opts(
            Opts::new("scanforge_watch_overflow_total", "Watch debouncer overflow/error batches").namespace("scanforge"),
        )
        .map_err(metrics_error)?;

        for metric in [
            Box::new(files_scanned_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(bytes_scanned_total.clone()),
            Box::new(scan_errors_total.clone()),
            Box::new(scan_duration_seconds.clone()),
            Box::new(scan_throughput_mbps.clone()),
            Box::new(buffer_pool_hits_total.clone()),
            Box::new(buffer_pool_misses_total.clone()),
            Box::new(backpressure_events_total.clone()),
            Box::new(active_thread_pool_workers.clone()),
            Box::new(watch_events_total.clone()),
            Box::new(watch_overflow_total.clone()),
        ] {
            registry.register(metric).map_err(metrics_error)?;
        }

        Ok(Self {
            registry,
            files_scanned_total,
            bytes_scanned_total,
            scan_errors_total,
            scan_duration_seconds,
            scan_throughput_mbps,
            buffer_pool_hits_total,
            buffer_pool_misses_total,
            backpressure_events_total,
            active_thread_pool_workers,
            watch_events_total,
            watch_overflow_total,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Renders all registered metrics in the Prometheus text exposition
    /// format, for an embedder's own `/metrics` endpoint.
    pub fn encode(&self) -> Result<String, CoreError> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(|e| CoreError::invalid_argument(format!("metrics encoding produced invalid utf8: {e}")))
    }
}

fn metrics_error(e: impl std::fmt::Display) -> CoreError {
    CoreError::invalid_argument(format!("failed to initialize metrics: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_without_duplicate_metric_names() {
        let metrics = ScannerMetrics::new().unwrap();
        assert!(!metrics.registry().gather().is_empty());
    }

    #[test]
    fn counters_increment_and_show_up_in_the_encoded_output() {
        let metrics = ScannerMetrics::new().unwrap();
        metrics.files_scanned_total.inc_by(3);
        let encoded = metrics.encode().unwrap();
        assert!(encoded.contains("scanforge_files_scanned_total"));
        assert!(encoded.contains('3'));
    }
}
