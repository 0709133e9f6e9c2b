// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Directory Scanner (spec §4.6)
//!
//! Parallel directory traversal: each directory listing is its own unit of
//! work fanned out onto the I/O pool, with a shared job tracker to know
//! when the whole tree has been walked.
//!
//! Grounded on `thicclatka-nefaxer/src/pipeline/walk.rs`'s thread-per-walk,
//! channel-fed loop (`WalkOutcome`, `run_walk_loop`) for the
//! outcome-then-filter shape; generalized from a single walker thread into
//! one fanned-out task per directory submitted to the hand-rolled I/O pool,
//! since spec §4.6 requires bounded-by-pool-capacity concurrency rather
//! than one dedicated walk thread.

pub mod filters;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use scanforge_bootstrap::CancellationToken;
use scanforge_domain::error::{CoreError, CoreErrorKind};
use scanforge_domain::ports::{FileVisitor, ProgressListener, VisitResult};
use scanforge_domain::value_objects::{
    ScanError, ScanResult, ScanResultBuilder, ScanOptions, ScannedFile, SymlinkPolicy,
};
use tracing::debug;

use crate::infrastructure::backpressure::BackpressureController;
use crate::infrastructure::thread_pools::ThreadPool;

struct ScanShared {
    builder: Mutex<ScanResultBuilder>,
    options: Arc<ScanOptions>,
    visitor: Arc<dyn FileVisitor>,
    progress: Option<Arc<dyn ProgressListener>>,
    cancel: CancellationToken,
    visited_real_dirs: Mutex<std::collections::HashSet<PathBuf>>,
    pending_tasks: AtomicUsize,
    files_processed: AtomicUsize,
    done: tokio::sync::Notify,
}

/// Fans directory listings out onto an I/O-class [`ThreadPool`].
pub struct Scanner {
    io_pool: Arc<ThreadPool>,
    backpressure: Arc<BackpressureController>,
}

impl Scanner {
    pub fn new(io_pool: Arc<ThreadPool>, backpressure: Arc<BackpressureController>) -> Self {
        Self { io_pool, backpressure }
    }

    /// Walks `root`, applying `options`'s filters, calling `visitor` for
    /// every directory and file, and `progress` periodically. Blocks the
    /// calling async task until the whole tree (or cancellation) is
    /// resolved — callers typically `tokio::task::spawn` this.
    pub async fn scan(
        &self,
        root: PathBuf,
        options: Arc<ScanOptions>,
        visitor: Arc<dyn FileVisitor>,
        progress: Option<Arc<dyn ProgressListener>>,
        cancel: CancellationToken,
    ) -> Result<ScanResult, CoreError> {
        let shared = Arc::new(ScanShared {
            builder: Mutex::new(ScanResultBuilder::new(root.clone())),
            options,
            visitor,
            progress,
            cancel,
            visited_real_dirs: Mutex::new(std::collections::HashSet::new()),
            pending_tasks: AtomicUsize::new(0),
            files_processed: AtomicUsize::new(0),
            done: tokio::sync::Notify::new(),
        });

        self.submit_directory(shared.clone(), root, 0);

        loop {
            let notified = shared.done.notified();
            if shared.pending_tasks.load(Ordering::Acquire) == 0 {
                break;
            }
            notified.await;
        }

        let was_cancelled = shared.cancel.is_cancelled();
        let mut builder = Arc::try_unwrap(shared)
            .unwrap_or_else(|shared| {
                // Another clone is still alive only if a background task is
                // lagging behind the zero-pending observation; wait it out.
                while Arc::strong_count(&shared) > 1 {
                    std::thread::yield_now();
                }
                Arc::try_unwrap(shared).unwrap_or_else(|_| unreachable!())
            })
            .builder
            .into_inner();
        if was_cancelled {
            builder.mark_cancelled();
        }
        for _ in 0..self.backpressure.total_events() {
            builder.note_backpressure_event();
        }
        Ok(builder.finish(self.io_pool.stats().active_workers.max(1), 0))
    }

    fn submit_directory(&self, shared: Arc<ScanShared>, dir: PathBuf, depth: u32) {
        shared.pending_tasks.fetch_add(1, Ordering::AcqRel);
        let _ = self.io_pool.submit({
            let io_pool_clone = self.io_pool.clone();
            move || {
                visit_directory(&io_pool_clone, &shared, &dir, depth);
                if shared.pending_tasks.fetch_sub(1, Ordering::AcqRel) == 1 {
                    shared.done.notify_waiters();
                }
            }
        });
    }
}

fn visit_directory(io_pool: &Arc<ThreadPool>, shared: &Arc<ScanShared>, dir: &Path, depth: u32) {
    if shared.cancel.is_cancelled() {
        return;
    }

    match shared.visitor.visit_directory(dir) {
        VisitResult::Terminate => {
            shared.cancel.cancel();
            return;
        }
        VisitResult::SkipSubtree | VisitResult::Skip => return,
        VisitResult::Continue => {}
    }

    shared.builder.lock().note_directory();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            shared.builder.lock().push_error(ScanError::new(
                Some(dir.to_path_buf()),
                CoreErrorKind::from(&CoreError::io_failure(Some(dir.to_path_buf()), e.to_string())),
                e.to_string(),
            ));
            return;
        }
    };

    for entry in entries {
        if shared.cancel.is_cancelled() {
            return;
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                shared
                    .builder
                    .lock()
                    .push_error(ScanError::new(None, CoreErrorKind::from(&CoreError::io_failure(None, e.to_string())), e.to_string()));
                continue;
            }
        };
        let path = entry.path();

        let symlink_metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                shared.builder.lock().push_error(ScanError::new(
                    Some(path.clone()),
                    CoreErrorKind::from(&CoreError::io_failure(Some(path.clone()), e.to_string())),
                    e.to_string(),
                ));
                continue;
            }
        };

        let is_symlink = symlink_metadata.file_type().is_symlink();

        if !filters::passes_hidden_filter(&path, &shared.options) {
            continue;
        }

        if is_symlink {
            match shared.options.symlink_policy() {
                SymlinkPolicy::Skip => continue,
                SymlinkPolicy::ReportOnly => {
                    record_symlink_file(shared, &path, &symlink_metadata);
                    continue;
                }
                SymlinkPolicy::Follow => {
                    if !follow_symlink(io_pool, shared, &path, depth) {
                        continue;
                    }
                    continue;
                }
            }
        }

        if symlink_metadata.is_dir() {
            if filters::passes_depth_filter(depth + 1, &shared.options) {
                let new_depth = depth + 1;
                let shared_clone = shared.clone();
                let io_pool_clone = io_pool.clone();
                let dir_path = path.clone();
                shared_clone.pending_tasks.fetch_add(1, Ordering::AcqRel);
                let _ = io_pool.submit(move || {
                    visit_directory(&io_pool_clone, &shared_clone, &dir_path, new_depth);
                    if shared_clone.pending_tasks.fetch_sub(1, Ordering::AcqRel) == 1 {
                        shared_clone.done.notify_waiters();
                    }
                });
            }
            continue;
        }

        visit_plain_file(shared, &path, &symlink_metadata);
    }
}

fn follow_symlink(io_pool: &Arc<ThreadPool>, shared: &Arc<ScanShared>, path: &Path, depth: u32) -> bool {
    let target = match std::fs::canonicalize(path) {
        Ok(target) => target,
        Err(e) => {
            shared.builder.lock().push_error(ScanError::new(
                Some(path.to_path_buf()),
                CoreErrorKind::from(&CoreError::io_failure(Some(path.to_path_buf()), e.to_string())),
                e.to_string(),
            ));
            return false;
        }
    };

    let first_visit = shared.visited_real_dirs.lock().insert(target.clone());
    if !first_visit {
        shared.builder.lock().push_error(ScanError::new(
            Some(path.to_path_buf()),
            CoreErrorKind::from(&CoreError::SymlinkCycle(path.to_path_buf())),
            "symlink cycle detected".into(),
        ));
        return false;
    }

    match std::fs::metadata(&target) {
        Ok(metadata) if metadata.is_dir() => {
            if filters::passes_depth_filter(depth + 1, &shared.options) {
                let new_depth = depth + 1;
                let shared_clone = shared.clone();
                let io_pool_clone = io_pool.clone();
                shared_clone.pending_tasks.fetch_add(1, Ordering::AcqRel);
                let _ = io_pool.submit(move || {
                    visit_directory(&io_pool_clone, &shared_clone, &target, new_depth);
                    if shared_clone.pending_tasks.fetch_sub(1, Ordering::AcqRel) == 1 {
                        shared_clone.done.notify_waiters();
                    }
                });
            }
            true
        }
        Ok(metadata) => {
            let mut file = ScannedFile::new(path.to_path_buf(), metadata.len(), modified_or_now(&metadata));
            file = file.with_symlink(target);
            record_scanned_file(shared, file);
            true
        }
        Err(e) => {
            shared.builder.lock().push_error(ScanError::new(
                Some(path.to_path_buf()),
                CoreErrorKind::from(&CoreError::io_failure(Some(path.to_path_buf()), e.to_string())),
                e.to_string(),
            ));
            false
        }
    }
}

fn record_symlink_file(shared: &Arc<ScanShared>, path: &Path, metadata: &std::fs::Metadata) {
    let target = std::fs::read_link(path).unwrap_or_else(|_| path.to_path_buf());
    let file = ScannedFile::new(path.to_path_buf(), metadata.len(), modified_or_now(metadata)).with_symlink(target);
    record_scanned_file(shared, file);
}

fn visit_plain_file(shared: &Arc<ScanShared>, path: &Path, metadata: &std::fs::Metadata) {
    if !filters::passes_glob_filters(path, &shared.options) {
        return;
    }
    if !filters::passes_size_filter(metadata.len(), &shared.options) {
        return;
    }
    let mut file = ScannedFile::new(path.to_path_buf(), metadata.len(), modified_or_now(metadata));
    if shared.options.detect_sparse_files() && filters::is_sparse(metadata) {
        file = file.with_sparse(true);
    }
    record_scanned_file(shared, file);
}

fn record_scanned_file(shared: &Arc<ScanShared>, file: ScannedFile) {
    match shared.visitor.visit_file(&file) {
        VisitResult::Terminate => {
            shared.cancel.cancel();
            return;
        }
        VisitResult::Skip => return,
        VisitResult::SkipSubtree | VisitResult::Continue => {}
    }

    shared.builder.lock().push_file(file.clone());

    let processed = shared.files_processed.fetch_add(1, Ordering::Relaxed) + 1;
    if let Some(progress) = &shared.progress {
        if processed % 100 == 0 {
            progress.on_progress(&file.path, processed as u64, -1);
        }
    }
    debug!(path = %file.path.display(), "scanned file");
}

fn modified_or_now(metadata: &std::fs::Metadata) -> SystemTime {
    metadata.modified().unwrap_or_else(|_| SystemTime::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::thread_pools::{PoolKind, PoolPriority, ThreadPoolConfig};
    use scanforge_bootstrap::ShutdownCoordinator;
    use scanforge_domain::value_objects::ScanOptionsBuilder;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;
    use std::time::Duration;
    use tempfile::tempdir;

    fn test_cancel_token() -> CancellationToken {
        ShutdownCoordinator::new(Duration::from_secs(30)).token()
    }

    struct AcceptAllVisitor;
    impl FileVisitor for AcceptAllVisitor {
        fn visit_file(&self, _file: &ScannedFile) -> VisitResult {
            VisitResult::Continue
        }
    }

    fn test_pool() -> Arc<ThreadPool> {
        ThreadPool::new(ThreadPoolConfig {
            kind: PoolKind::Io,
            core: 4,
            max: 8,
            queue_capacity: 500,
            priority: PoolPriority::Normal,
            core_timeout: true,
            grow_factor: 1.2,
            shrink_factor: 0.85,
        })
    }

    #[tokio::test]
    async fn scans_a_flat_directory() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"world").unwrap();

        let scanner = Scanner::new(test_pool(), Arc::new(BackpressureController::new()));
        let options = Arc::new(ScanOptionsBuilder::default().build().unwrap());
        let result = scanner
            .scan(
                dir.path().to_path_buf(),
                options,
                Arc::new(AcceptAllVisitor),
                None,
                test_cancel_token(),
            )
            .await
            .unwrap();

        assert_eq!(result.file_count(), 2);
        assert_eq!(result.directories_scanned(), 1);
    }

    #[tokio::test]
    async fn recurses_into_subdirectories() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("c.txt"), b"nested").unwrap();

        let scanner = Scanner::new(test_pool(), Arc::new(BackpressureController::new()));
        let options = Arc::new(ScanOptionsBuilder::default().build().unwrap());
        let result = scanner
            .scan(
                dir.path().to_path_buf(),
                options,
                Arc::new(AcceptAllVisitor),
                None,
                test_cancel_token(),
            )
            .await
            .unwrap();

        assert_eq!(result.file_count(), 1);
        assert_eq!(result.directories_scanned(), 2);
    }

    #[tokio::test]
    async fn hidden_files_are_skipped_by_default() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(".hidden"), b"x").unwrap();
        std::fs::write(dir.path().join("visible.txt"), b"x").unwrap();

        let scanner = Scanner::new(test_pool(), Arc::new(BackpressureController::new()));
        let options = Arc::new(ScanOptionsBuilder::default().build().unwrap());
        let result = scanner
            .scan(
                dir.path().to_path_buf(),
                options,
                Arc::new(AcceptAllVisitor),
                None,
                test_cancel_token(),
            )
            .await
            .unwrap();

        assert_eq!(result.file_count(), 1);
    }

    #[tokio::test]
    async fn progress_listener_is_notified() {
        struct CountingProgress(Arc<StdAtomicUsize>);
        impl ProgressListener for CountingProgress {
            fn on_progress(&self, _path: &Path, _processed: u64, _total: i64) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let dir = tempdir().unwrap();
        for i in 0..150 {
            std::fs::write(dir.path().join(format!("f{i}.txt")), b"x").unwrap();
        }

        let scanner = Scanner::new(test_pool(), Arc::new(BackpressureController::new()));
        let options = Arc::new(ScanOptionsBuilder::default().build().unwrap());
        let calls = Arc::new(StdAtomicUsize::new(0));
        let result = scanner
            .scan(
                dir.path().to_path_buf(),
                options,
                Arc::new(AcceptAllVisitor),
                Some(Arc::new(CountingProgress(calls.clone()))),
                test_cancel_token(),
            )
            .await
            .unwrap();

        assert_eq!(result.file_count(), 150);
        assert!(calls.load(Ordering::SeqCst) >= 1);
    }
}
