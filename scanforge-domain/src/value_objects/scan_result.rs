// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Scan result and its constituent records (spec §3).

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreErrorKind;

/// One successfully visited file. Created once per visit; never mutated
/// afterward (matches the "never mutated" invariant in spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub last_modified: SystemTime,
    pub is_symlink: bool,
    pub is_sparse: bool,
    pub link_target: Option<PathBuf>,
}

impl ScannedFile {
    pub fn new(path: PathBuf, size_bytes: u64, last_modified: SystemTime) -> Self {
        Self {
            path,
            size_bytes,
            last_modified,
            is_symlink: false,
            is_sparse: false,
            link_target: None,
        }
    }

    pub fn with_symlink(mut self, link_target: PathBuf) -> Self {
        self.is_symlink = true;
        self.link_target = Some(link_target);
        self
    }

    pub fn with_sparse(mut self, is_sparse: bool) -> Self {
        self.is_sparse = is_sparse;
        self
    }
}

/// An append-only error record. `path` is `None` for non-path errors (e.g. a
/// pool-level `Shutdown`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanError {
    pub path: Option<PathBuf>,
    pub kind: CoreErrorKind,
    pub message: String,
}

impl ScanError {
    pub fn new(path: Option<PathBuf>, kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            path,
            kind,
            message: message.into(),
        }
    }
}

/// The outcome of one `scan(root, options)` call.
///
/// `files` and `errors` are owned, ordered lists; callers receive defensive
/// snapshots via [`ScanResult::files`]/[`ScanResult::errors`] rather than a
/// mutable reference, matching the "ScanResult owns its file and error
/// lists; callers receive defensive snapshots" ownership rule in spec §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    scan_id: Uuid,
    root: PathBuf,
    files: Vec<ScannedFile>,
    errors: Vec<ScanError>,
    start_time: SystemTime,
    end_time: SystemTime,
    metadata: HashMap<String, String>,

    thread_count: usize,
    throughput_files_per_sec: f64,
    peak_memory_bytes: u64,
    directories_scanned: u64,
    symlinks_encountered: u64,
    sparse_files_detected: u64,
    backpressure_events: u64,
    was_cancelled: bool,
}

/// Mutable accumulator a single scan writes into; converted into an
/// immutable [`ScanResult`] by [`ScanResultBuilder::finish`].
///
/// Kept separate from `ScanResult` itself so the public result type can stay
/// append-only from the caller's point of view, mirroring `ScanResult`'s own
/// "owns its lists, callers get snapshots" rule: the accumulator is the
/// engine's private write-side, `ScanResult` is the public read-side.
#[derive(Debug)]
pub struct ScanResultBuilder {
    scan_id: Uuid,
    root: PathBuf,
    files: Vec<ScannedFile>,
    errors: Vec<ScanError>,
    start_time: SystemTime,
    metadata: HashMap<String, String>,
    directories_scanned: u64,
    symlinks_encountered: u64,
    sparse_files_detected: u64,
    backpressure_events: u64,
    was_cancelled: bool,
}

impl ScanResultBuilder {
    pub fn new(root: PathBuf) -> Self {
        Self {
            scan_id: Uuid::new_v4(),
            root,
            files: Vec::new(),
            errors: Vec::new(),
            start_time: SystemTime::now(),
            metadata: HashMap::new(),
            directories_scanned: 0,
            symlinks_encountered: 0,
            sparse_files_detected: 0,
            backpressure_events: 0,
            was_cancelled: false,
        }
    }

    pub fn scan_id(&self) -> Uuid {
        self.scan_id
    }

    pub fn push_file(&mut self, file: ScannedFile) {
        if file.is_symlink {
            self.symlinks_encountered += 1;
        }
        if file.is_sparse {
            self.sparse_files_detected += 1;
        }
        self.files.push(file);
    }

    pub fn push_error(&mut self, error: ScanError) {
        self.errors.push(error);
    }

    pub fn note_directory(&mut self) {
        self.directories_scanned += 1;
    }

    pub fn note_backpressure_event(&mut self) {
        self.backpressure_events += 1;
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn mark_cancelled(&mut self) {
        self.was_cancelled = true;
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Finalizes the accumulator into an immutable [`ScanResult`].
    ///
    /// `thread_count` and `peak_memory_bytes` are supplied by the caller
    /// because they are read from the thread-pool manager / buffer pool at
    /// the moment the scan ends, not tracked redundantly here.
    pub fn finish(self, thread_count: usize, peak_memory_bytes: u64) -> ScanResult {
        let end_time = SystemTime::now();
        let duration_secs = end_time
            .duration_since(self.start_time)
            .unwrap_or_default()
            .as_secs_f64()
            .max(f64::EPSILON);
        let throughput_files_per_sec = self.files.len() as f64 / duration_secs;

        ScanResult {
            scan_id: self.scan_id,
            root: self.root,
            files: self.files,
            errors: self.errors,
            start_time: self.start_time,
            end_time,
            metadata: self.metadata,
            thread_count,
            throughput_files_per_sec,
            peak_memory_bytes,
            directories_scanned: self.directories_scanned,
            symlinks_encountered: self.symlinks_encountered,
            sparse_files_detected: self.sparse_files_detected,
            backpressure_events: self.backpressure_events,
            was_cancelled: self.was_cancelled,
        }
    }
}

impl ScanResult {
    pub fn scan_id(&self) -> Uuid {
        self.scan_id
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// Defensive snapshot — a clone of the owned list, never a mutable view.
    pub fn files(&self) -> Vec<ScannedFile> {
        self.files.clone()
    }

    pub fn errors(&self) -> Vec<ScanError> {
        self.errors.clone()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn start_time(&self) -> SystemTime {
        self.start_time
    }

    pub fn end_time(&self) -> SystemTime {
        self.end_time
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    pub fn throughput_files_per_sec(&self) -> f64 {
        self.throughput_files_per_sec
    }

    pub fn peak_memory_bytes(&self) -> u64 {
        self.peak_memory_bytes
    }

    pub fn directories_scanned(&self) -> u64 {
        self.directories_scanned
    }

    pub fn symlinks_encountered(&self) -> u64 {
        self.symlinks_encountered
    }

    pub fn sparse_files_detected(&self) -> u64 {
        self.sparse_files_detected
    }

    pub fn backpressure_events(&self) -> u64 {
        self.backpressure_events
    }

    pub fn was_cancelled(&self) -> bool {
        self.was_cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn end_time_is_never_before_start_time() {
        let builder = ScanResultBuilder::new(PathBuf::from("/tmp"));
        let result = builder.finish(1, 0);
        assert!(result.end_time() >= result.start_time());
    }

    #[test]
    fn pushing_a_symlink_file_increments_the_counter() {
        let mut builder = ScanResultBuilder::new(PathBuf::from("/tmp"));
        let file = ScannedFile::new(PathBuf::from("/tmp/a"), 0, SystemTime::now())
            .with_symlink(PathBuf::from("/tmp/b"));
        builder.push_file(file);
        let result = builder.finish(1, 0);
        assert_eq!(result.symlinks_encountered(), 1);
        assert_eq!(result.file_count(), 1);
    }

    #[test]
    fn defensive_snapshot_does_not_alias_the_original() {
        let mut builder = ScanResultBuilder::new(PathBuf::from("/tmp"));
        builder.push_file(ScannedFile::new(PathBuf::from("/tmp/a"), 10, SystemTime::now()));
        let result = builder.finish(1, 0);
        let mut snapshot = result.files();
        snapshot.clear();
        assert_eq!(result.file_count(), 1);
    }

    #[test]
    fn cancelled_scan_is_reflected_in_result() {
        let mut builder = ScanResultBuilder::new(PathBuf::from("/tmp"));
        builder.mark_cancelled();
        let result = builder.finish(1, 0);
        assert!(result.was_cancelled());
    }

    #[test]
    fn throughput_is_non_negative_and_finite() {
        let builder = ScanResultBuilder::new(PathBuf::from("/tmp"));
        std::thread::sleep(Duration::from_millis(5));
        let result = builder.finish(2, 0);
        assert!(result.throughput_files_per_sec().is_finite());
        assert!(result.throughput_files_per_sec() >= 0.0);
    }
}
