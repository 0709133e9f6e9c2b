// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Immutable data model (spec §3): validated records with no setters that
//! can put an already-constructed value into an invalid state.

pub mod batch_operation;
pub mod chunk_job;
pub mod file_change_event;
pub mod pressure;
pub mod scan_options;
pub mod scan_result;
pub mod watch_registration;

pub use batch_operation::{BatchKind, BatchOperation, BatchOperationResult, BatchResult, Priority, ResourceRequirements};
pub use chunk_job::{ChunkJob, ChunkResult};
pub use file_change_event::{EventKind, FileChangeEvent};
pub use pressure::{PressureLevel, PressureSnapshot};
pub use scan_options::{HiddenPolicy, Profile, ScanOptions, ScanOptionsBuilder, SharedScanOptions, SymlinkPolicy};
pub use scan_result::{ScanError, ScanResult, ScanResultBuilder, ScannedFile};
pub use watch_registration::{WatchConfigSnapshot, WatchRegistration};
