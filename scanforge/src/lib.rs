// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

// Production code safety enforced via CI and `make lint-strict`
// (lib/bins checked separately from tests - tests may use unwrap/expect)

//! # Scanforge
//!
//! Concurrency and resource-management core of an asynchronous
//! filesystem scanner. This crate is the engine an embedding program
//! wires up: buffer pool, thread-pool manager, backpressure controller,
//! chunk pipeline, batch processor, directory scanner, and watch
//! manager, plus the ambient stack (config profiles, tracing, metrics).
//!
//! ## Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Application Layer                          │
//! │  (ScanService use case, JSON report export)                 │
//! └─────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Infrastructure Layer                          │
//! │  (buffer pool, thread pools, backpressure, chunk pipeline,   │
//! │   batch processor, scanner, watch manager, config/logging/   │
//! │   metrics)                                                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The data model, error taxonomy, and external-collaborator ports live
//! in `scanforge-domain`; process-level shutdown coordination and
//! tracing-subscriber wiring live in `scanforge-bootstrap`.

pub mod application;
pub mod infrastructure;

pub use application::{ScanRequest, ScanService};
pub use scanforge_domain::{
    error::{CoreError, CoreErrorKind},
    ports::{ContentStore, ErrorSink, FileVisitor, Hasher, MetadataSink, ProgressListener, VisitResult},
    value_objects::{Profile, ScanOptions, ScanOptionsBuilder, ScanResult},
};
