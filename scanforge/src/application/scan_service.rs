// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Scan Service
//!
//! Top-level use case wiring together every infrastructure component spec
//! §4 describes into the single entry point an embedding program calls.
//! Grounded on the teacher's use-case shape
//! (`application::use_cases::process_file::ProcessFileUseCase`): a struct
//! holding `Arc<Service>` collaborators built once at startup, constructed
//! via `new`, with one orchestrating method per use case.

use std::path::PathBuf;
use std::sync::Arc;

use scanforge_bootstrap::{CancellationToken, ShutdownCoordinator};
use scanforge_domain::error::CoreError;
use scanforge_domain::ports::{FileVisitor, Hasher, ProgressListener};
use scanforge_domain::value_objects::{
    BatchOperation, BatchResult, ChunkResult, ScanOptions, ScanResult, WatchConfigSnapshot,
};
use uuid::Uuid;

use crate::infrastructure::batch_processor::{BatchExecutor, BatchProcessor, BatchProcessorConfig};
use crate::infrastructure::buffer_pool::{BufferPool, BufferPoolConfig, PooledBuffer};
use crate::infrastructure::backpressure::BackpressureController;
use crate::infrastructure::chunk_pipeline::{ChunkPipeline, ChunkPipelinePorts};
use crate::infrastructure::config::pool_configs_for;
use crate::infrastructure::metrics::ScannerMetrics;
use crate::infrastructure::scanner::Scanner;
use crate::infrastructure::thread_pools::{PoolKind, ThreadPoolManager};
use crate::infrastructure::watch::{EventHandler, RescanHandler, WatchManager};

/// Everything a single call to [`ScanService::scan`] needs beyond the
/// root path: the directory visitor, an optional progress sink, and the
/// cancellation token that both the caller and an internal timeout can
/// trip.
pub struct ScanRequest {
    pub root: PathBuf,
    pub options: Arc<ScanOptions>,
    pub visitor: Arc<dyn FileVisitor>,
    pub progress: Option<Arc<dyn ProgressListener>>,
    pub cancel: CancellationToken,
}

/// Owns the long-lived collaborators (spec §5: these outlive any single
/// scan) and exposes one orchestrating method per spec §4 capability.
pub struct ScanService {
    pools: Arc<ThreadPoolManager>,
    backpressure: Arc<BackpressureController>,
    buffer_pool: Arc<BufferPool>,
    chunk_pipeline: Arc<ChunkPipeline>,
    batch_processor: Arc<BatchProcessor>,
    watch_manager: Arc<WatchManager>,
    metrics: Arc<ScannerMetrics>,
}

impl ScanService {
    /// Builds every collaborator from `options`' resolved parallelism
    /// (spec §4.2's pool table scaled by `Profile`), the supplied
    /// [`Hasher`], and a [`BatchExecutor`] the embedder provides for its
    /// own `BatchKind` execution logic (spec §4.5).
    pub fn new(options: &ScanOptions, hasher: Arc<dyn Hasher>, batch_executor: Arc<dyn BatchExecutor>) -> Result<Self, CoreError> {
        Self::build(options, hasher, batch_executor, None)
    }

    /// Same as [`ScanService::new`], additionally wiring `ports` into the
    /// chunk pipeline's CompletionHandler dispatch (spec §4.4 step 2, §6).
    pub fn with_ports(
        options: &ScanOptions,
        hasher: Arc<dyn Hasher>,
        batch_executor: Arc<dyn BatchExecutor>,
        ports: ChunkPipelinePorts,
    ) -> Result<Self, CoreError> {
        Self::build(options, hasher, batch_executor, Some(ports))
    }

    fn build(
        options: &ScanOptions,
        hasher: Arc<dyn Hasher>,
        batch_executor: Arc<dyn BatchExecutor>,
        ports: Option<ChunkPipelinePorts>,
    ) -> Result<Self, CoreError> {
        let pools = Arc::new(ThreadPoolManager::with_configs(pool_configs_for(options)));
        let backpressure = Arc::new(BackpressureController::new());
        let metrics = Arc::new(ScannerMetrics::new()?);
        let buffer_pool = Arc::new(BufferPool::new_with_metrics(BufferPoolConfig::default(), Some(metrics.clone())));
        let mut chunk_pipeline = ChunkPipeline::new(
            pools.pool(PoolKind::Io),
            pools.pool(PoolKind::Cpu),
            pools.pool(PoolKind::CompletionHandler),
            buffer_pool.clone(),
            hasher,
            backpressure.clone(),
        );
        if let Some(ports) = ports {
            chunk_pipeline = chunk_pipeline.with_ports(ports);
        }
        let chunk_pipeline = Arc::new(chunk_pipeline);
        let batch_processor = BatchProcessor::new(BatchProcessorConfig::default(), pools.pool(PoolKind::BatchProcessing), batch_executor);
        let watch_manager = Arc::new(WatchManager::with_metrics(metrics.clone()));

        Ok(Self {
            pools,
            backpressure,
            buffer_pool,
            chunk_pipeline,
            batch_processor,
            watch_manager,
            metrics,
        })
    }

    /// Runs one full directory traversal (spec §4.6) and returns the
    /// accumulated [`ScanResult`]. Updates `scan_duration_seconds` and
    /// `scan_throughput_mbps` from the wall-clock and byte totals.
    pub async fn scan(&self, request: ScanRequest) -> Result<ScanResult, CoreError> {
        let scanner = Scanner::new(self.pools.pool(PoolKind::Io), self.backpressure.clone());
        let started = std::time::Instant::now();
        let result = scanner
            .scan(request.root, request.options, request.visitor, request.progress, request.cancel)
            .await?;

        let elapsed = started.elapsed();
        self.metrics.files_scanned_total.inc_by(result.file_count() as u64);
        self.metrics.scan_errors_total.inc_by(result.errors().len() as u64);
        self.metrics.scan_duration_seconds.observe(elapsed.as_secs_f64());
        let total_bytes: u64 = result.files().iter().map(|f| f.size_bytes).sum();
        self.metrics.bytes_scanned_total.inc_by(total_bytes);
        if elapsed.as_secs_f64() > 0.0 {
            let mbps = (total_bytes as f64 / (1024.0 * 1024.0)) / elapsed.as_secs_f64();
            self.metrics.scan_throughput_mbps.set(mbps);
        }
        Ok(result)
    }

    /// Splits one file into content-addressed, hashed chunks (spec §4.4).
    pub async fn process_file(&self, file_id: Uuid, path: PathBuf, chunk_size: usize) -> Result<Vec<ChunkResult>, CoreError> {
        self.chunk_pipeline.process_file(file_id, path, chunk_size).await
    }

    /// Submits one unit of work to the priority-ordered batch processor
    /// (spec §4.5).
    pub async fn submit_batch_operation(&self, operation: BatchOperation) -> Result<BatchResult, CoreError> {
        self.batch_processor.submit(operation).await
    }

    /// Registers a recursive or flat filesystem watch (spec §4.7). On a
    /// debouncer overflow/error batch, schedules a full rescan of
    /// `directory` with `rescan_options`/`rescan_visitor` (spec §4.7
    /// "overflow recovery") — skipped if no tokio runtime is reachable from
    /// the calling thread.
    pub fn watch(
        &self,
        directory: PathBuf,
        recursive: bool,
        config: WatchConfigSnapshot,
        rescan_options: Arc<ScanOptions>,
        rescan_visitor: Arc<dyn FileVisitor>,
        on_event: EventHandler,
    ) -> Result<Uuid, CoreError> {
        let on_overflow: Option<RescanHandler> = tokio::runtime::Handle::try_current().ok().map(|handle| {
            let pools = self.pools.clone();
            let backpressure = self.backpressure.clone();
            let directory = directory.clone();
            let options = rescan_options.clone();
            let visitor = rescan_visitor.clone();
            Arc::new(move || {
                let scanner = Scanner::new(pools.pool(PoolKind::Io), backpressure.clone());
                let directory = directory.clone();
                let options = options.clone();
                let visitor = visitor.clone();
                let cancel = ShutdownCoordinator::new(std::time::Duration::from_secs(30)).token();
                handle.spawn(async move {
                    let _ = scanner.scan(directory, options, visitor, None, cancel).await;
                });
            }) as RescanHandler
        });

        let registration = self.watch_manager.register(directory, recursive, config, on_event, on_overflow)?;
        Ok(registration.id())
    }

    pub fn unwatch(&self, registration_id: Uuid) -> bool {
        self.watch_manager.deactivate(registration_id)
    }

    /// Acquires a pooled buffer for streaming I/O (spec §4.1).
    pub fn acquire_buffer(&self, size: usize) -> Result<PooledBuffer, CoreError> {
        self.buffer_pool.acquire(size)
    }

    pub fn backpressure(&self) -> &BackpressureController {
        &self.backpressure
    }

    pub fn metrics(&self) -> &ScannerMetrics {
        &self.metrics
    }

    /// Runs one adaptive-resizing tick across all pools and propagates
    /// the current backpressure level into each (spec §9 Open Question
    /// 1: global pressure gates submission, per-pool sizing governs
    /// thread count).
    pub fn tick(&self) {
        self.pools.run_adaptive_tick_all();
        if self.backpressure.applied() {
            self.metrics.backpressure_events_total.inc();
            self.pools.apply_backpressure_all(self.backpressure.current());
        } else {
            self.pools.release_backpressure_all();
        }
        self.metrics.active_thread_pool_workers.set(self.pools.total_active_workers());
    }

    /// Drains the chunk pipeline and shuts down every thread pool
    /// (spec §4.2/§4.4's graceful-shutdown requirements).
    pub async fn shutdown(self: Arc<Self>) {
        self.chunk_pipeline.close().await;
        self.pools.clone().shutdown_async().await;
    }
}
