// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # External collaborator ports (spec §6)
//!
//! These traits are the seams between the scanner core and its external
//! collaborators (hasher, content store, metadata/error sinks) and between
//! the core and its embedding program (visitor, progress listener).
//!
//! Following the teacher's split: `Hasher` is CPU-bound business logic and
//! stays **sync**, the same way `ChecksumService` does; execution off the
//! async runtime is an infrastructure adapter's job
//! (`scanforge::infrastructure::hashing::AsyncHasherAdapter`), not the
//! trait's. `ContentStore`/`MetadataSink`/`ErrorSink` are I/O-bound ports —
//! they stay **async**, the same way `FileIOService` does, and each gets the
//! `Arc<dyn Trait>` blanket impl the teacher provides so a shared trait
//! object can be handed to every pipeline instance.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CoreError;
use crate::value_objects::ScannedFile;

/// Pure, stateless hash function. May be invoked concurrently; the core
/// makes no assumption about internal caching or state.
///
/// The core passes 32-byte BLAKE3 digests as lowercase hex, but the trait
/// itself is algorithm-agnostic — swapping `Blake3Hasher` for another
/// implementation does not require touching the pipeline.
pub trait Hasher: Send + Sync {
    fn hash(&self, bytes: &[u8]) -> Result<String, CoreError>;
}

/// File-level metadata forwarded to the [`MetadataSink`] once all of a
/// file's chunks have been stored.
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub file: ScannedFile,
    pub chunk_hashes: Vec<String>,
}

/// Receives released chunks after hashing succeeds. Called from the
/// CompletionHandler pool (spec §6).
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn store(&self, chunk_hash: &str, bytes: &[u8]) -> Result<(), CoreError>;
}

#[async_trait]
impl ContentStore for Arc<dyn ContentStore> {
    async fn store(&self, chunk_hash: &str, bytes: &[u8]) -> Result<(), CoreError> {
        self.as_ref().store(chunk_hash, bytes).await
    }
}

/// Receives file-level metadata once per completed file.
#[async_trait]
pub trait MetadataSink: Send + Sync {
    async fn on_file_complete(&self, metadata: FileMetadata) -> Result<(), CoreError>;
}

#[async_trait]
impl MetadataSink for Arc<dyn MetadataSink> {
    async fn on_file_complete(&self, metadata: FileMetadata) -> Result<(), CoreError> {
        self.as_ref().on_file_complete(metadata).await
    }
}

/// Receives one notification per file-level failure. The core still records
/// the same failure as a [`crate::value_objects::ScanError`] in the
/// `ScanResult`; the sink is for collaborators that want a push
/// notification rather than polling the result (spec §6: "internally
/// de-duplicated with ScanError recording").
#[async_trait]
pub trait ErrorSink: Send + Sync {
    async fn on_error(&self, path: Option<PathBuf>, error: CoreError) -> Result<(), CoreError>;
}

#[async_trait]
impl ErrorSink for Arc<dyn ErrorSink> {
    async fn on_error(&self, path: Option<PathBuf>, error: CoreError) -> Result<(), CoreError> {
        self.as_ref().on_error(path, error).await
    }
}

/// A traversal continuation directive returned by [`FileVisitor`] callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitResult {
    /// Proceed normally.
    Continue,
    /// Skip this entry only.
    Skip,
    /// Do not descend into the current directory.
    SkipSubtree,
    /// Set cancellation and drain (spec §4.6).
    Terminate,
}

/// Receives each file/directory during traversal (spec §4.6).
///
/// Sync and cheap by design: the scanner calls this on the I/O pool worker
/// thread handling the directory, so a slow visitor throttles that worker's
/// throughput directly — callers that need async work should hand entries
/// off to their own queue rather than block here.
pub trait FileVisitor: Send + Sync {
    fn visit_directory(&self, path: &Path) -> VisitResult {
        let _ = path;
        VisitResult::Continue
    }

    fn visit_file(&self, file: &ScannedFile) -> VisitResult;
}

/// Receives periodic progress updates during a scan (spec §4.6).
///
/// `total_files_estimate` is `-1` until traversal has drained one tier of
/// the work queue, after which it becomes a lower bound on remaining work.
pub trait ProgressListener: Send + Sync {
    fn on_progress(&self, path: &Path, files_processed_so_far: u64, total_files_estimate: i64);
}
