// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Core Error Taxonomy
//!
//! `CoreError` is the single error type propagated out of the scanner core.
//! It follows the domain's result-type discipline: every fallible operation
//! returns `Result<T, CoreError>` rather than panicking or relying on a
//! generic boxed error.
//!
//! Cancellation is represented as its own variant (`Interrupted`), not
//! conflated with failure: a cancelled scan still returns a `ScanResult`,
//! it does not propagate `CoreError::Interrupted` to the caller of `scan`.

use std::path::PathBuf;

use thiserror::Error;

/// The error kinds a scanner operation can fail with.
///
/// Variant names are the "kind" vocabulary from the design: callers match on
/// the kind rather than parsing messages.
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// Input outside its declared domain (null path, non-positive size,
    /// threshold outside `[0, 1]`, …).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation attempted after the owning pool, handler, or registration
    /// was closed.
    #[error("operation attempted after shutdown: {0}")]
    Shutdown(String),

    /// Cooperative cancellation observed while waiting on a permit, buffer,
    /// or queue.
    #[error("interrupted: {0}")]
    Interrupted(String),

    /// An OS read, stat, or readdir call returned an error.
    #[error("I/O failure at {path:?}: {message}")]
    IOFailure { path: Option<PathBuf>, message: String },

    /// The OS reported insufficient access for a path.
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// A path vanished between discovery and access.
    #[error("not found: {0}")]
    NotFound(PathBuf),

    /// Traversal detected a cycle while following symlinks.
    #[error("symlink cycle detected at {0}")]
    SymlinkCycle(PathBuf),

    /// The hasher failed for a chunk.
    #[error("hash error at chunk {chunk_index} of {path:?}: {cause}")]
    HashError {
        chunk_index: usize,
        path: PathBuf,
        cause: String,
    },

    /// Allocation failed even after the memory-pressure response ran.
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// A bounded wait elapsed without progress.
    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// A batch-level gating or execution error; wraps a cause.
    #[error("batch failure: {0}")]
    BatchFailure(String),
}

impl CoreError {
    /// Short, stable category name for metrics labels and log fields.
    ///
    /// Mirrors the teacher's `PipelineError::category` — a cheap,
    /// `match`-based classification distinct from the `Display` message.
    pub fn category(&self) -> &'static str {
        match self {
            CoreError::InvalidArgument(_) => "invalid_argument",
            CoreError::Shutdown(_) => "shutdown",
            CoreError::Interrupted(_) => "interrupted",
            CoreError::IOFailure { .. } => "io_failure",
            CoreError::PermissionDenied(_) => "permission_denied",
            CoreError::NotFound(_) => "not_found",
            CoreError::SymlinkCycle(_) => "symlink_cycle",
            CoreError::HashError { .. } => "hash_error",
            CoreError::OutOfMemory(_) => "out_of_memory",
            CoreError::Timeout(_) => "timeout",
            CoreError::BatchFailure(_) => "batch_failure",
        }
    }

    /// Whether the enclosing scan can reasonably continue after this error.
    ///
    /// Per spec: I/O, permission, not-found, symlink-cycle, and hash errors
    /// are recorded as `ScanError` entries and do not terminate the scan.
    /// Shutdown and out-of-memory (after retry) are fatal.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CoreError::Shutdown(_) | CoreError::OutOfMemory(_))
    }

    /// Whether this error reflects an access-control violation rather than a
    /// transient or environmental failure.
    pub fn is_security_error(&self) -> bool {
        matches!(self, CoreError::PermissionDenied(_))
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        CoreError::InvalidArgument(message.into())
    }

    pub fn io_failure(path: Option<PathBuf>, message: impl Into<String>) -> Self {
        CoreError::IOFailure {
            path,
            message: message.into(),
        }
    }

    pub fn hash_error(chunk_index: usize, path: PathBuf, cause: impl Into<String>) -> Self {
        CoreError::HashError {
            chunk_index,
            path,
            cause: cause.into(),
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => CoreError::NotFound(PathBuf::new()),
            ErrorKind::PermissionDenied => CoreError::PermissionDenied(PathBuf::new()),
            ErrorKind::TimedOut => CoreError::Timeout(std::time::Duration::from_secs(0)),
            _ => CoreError::IOFailure {
                path: None,
                message: err.to_string(),
            },
        }
    }
}

/// The kind discriminant carried by a [`crate::value_objects::scan_result::ScanError`]
/// entry — a lighter-weight tag than the full `CoreError` (no payload), used
/// so `ScanResult` stays cheaply `Clone`/`Serialize` without cloning causes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum CoreErrorKind {
    InvalidArgument,
    Shutdown,
    Interrupted,
    IOFailure,
    PermissionDenied,
    NotFound,
    SymlinkCycle,
    HashError,
    OutOfMemory,
    Timeout,
    BatchFailure,
}

impl From<&CoreError> for CoreErrorKind {
    fn from(err: &CoreError) -> Self {
        match err {
            CoreError::InvalidArgument(_) => CoreErrorKind::InvalidArgument,
            CoreError::Shutdown(_) => CoreErrorKind::Shutdown,
            CoreError::Interrupted(_) => CoreErrorKind::Interrupted,
            CoreError::IOFailure { .. } => CoreErrorKind::IOFailure,
            CoreError::PermissionDenied(_) => CoreErrorKind::PermissionDenied,
            CoreError::NotFound(_) => CoreErrorKind::NotFound,
            CoreError::SymlinkCycle(_) => CoreErrorKind::SymlinkCycle,
            CoreError::HashError { .. } => CoreErrorKind::HashError,
            CoreError::OutOfMemory(_) => CoreErrorKind::OutOfMemory,
            CoreError::Timeout(_) => CoreErrorKind::Timeout,
            CoreError::BatchFailure(_) => CoreErrorKind::BatchFailure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_is_stable_per_variant() {
        assert_eq!(CoreError::invalid_argument("bad").category(), "invalid_argument");
        assert_eq!(CoreError::Shutdown("closed".into()).category(), "shutdown");
        assert_eq!(
            CoreError::hash_error(3, PathBuf::from("/tmp/a"), "digest mismatch").category(),
            "hash_error"
        );
    }

    #[test]
    fn shutdown_and_oom_are_unrecoverable() {
        assert!(!CoreError::Shutdown("x".into()).is_recoverable());
        assert!(!CoreError::OutOfMemory("x".into()).is_recoverable());
        assert!(CoreError::NotFound(PathBuf::from("/tmp/a")).is_recoverable());
        assert!(CoreError::invalid_argument("x").is_recoverable());
    }

    #[test]
    fn permission_denied_is_the_only_security_error() {
        assert!(CoreError::PermissionDenied(PathBuf::from("/etc/shadow")).is_security_error());
        assert!(!CoreError::NotFound(PathBuf::from("/tmp/a")).is_security_error());
    }

    #[test]
    fn kind_discriminant_matches_variant() {
        let err = CoreError::SymlinkCycle(PathBuf::from("/a/b"));
        assert_eq!(CoreErrorKind::from(&err), CoreErrorKind::SymlinkCycle);
    }
}
