// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # scanforge-domain
//!
//! Pure data model and external-collaborator ports for the scanner core,
//! following the hybrid DDD/Clean/Hexagonal layering of the workspace this
//! crate was derived from: domain code has no opinion on execution model,
//! persistence format, or transport. It defines what a scan result, a
//! chunk job, or a watch registration *is*, and the traits an embedding
//! program or an infrastructure adapter must satisfy to collaborate with
//! the core — never how concurrency is scheduled or bytes hit disk.
//!
//! Domain traits here are synchronous unless they are genuinely I/O-bound
//! ports (`ContentStore`, `MetadataSink`, `ErrorSink`); CPU-bound business
//! logic (`Hasher`) stays sync and is wrapped for async call sites by an
//! infrastructure adapter, not by widening the trait itself.

pub mod error;
pub mod ports;
pub mod value_objects;

pub use error::{CoreError, CoreErrorKind};
pub use ports::{ContentStore, ErrorSink, FileMetadata, FileVisitor, Hasher, MetadataSink, ProgressListener, VisitResult};
