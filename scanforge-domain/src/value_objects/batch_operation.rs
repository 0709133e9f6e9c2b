// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Batch processor work and result records (spec §3, §4.5).

use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::chunk_job::ChunkResult;

/// The homogeneous class of operations a batch groups by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatchKind {
    Chunking,
    Hashing,
    Storage,
    Transfer,
    Verification,
    Compression,
    Deduplication,
    Metadata,
    Recovery,
    Maintenance,
}

/// Dispatch priority. Lower numeric value is higher priority
/// (`Critical=1 < High=2 < Normal=3 < Low=4 < Background=5`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Priority {
    Critical = 1,
    High = 2,
    Normal = 3,
    Low = 4,
    Background = 5,
}

/// Budget a batch declares before the processor will admit it (spec §4.5
/// "resource gating").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    pub memory_bytes: u64,
    pub cpu_cores: f64,
    pub io_bandwidth_mbps: f64,
    pub timeout_ms: u64,
}

impl Default for ResourceRequirements {
    fn default() -> Self {
        Self {
            memory_bytes: 0,
            cpu_cores: 0.0,
            io_bandwidth_mbps: 0.0,
            timeout_ms: 300_000,
        }
    }
}

/// One submitted unit of batch work. `files` may be empty for operations
/// that are not file-scoped (e.g. `Maintenance`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOperation {
    pub id: Uuid,
    pub kind: BatchKind,
    pub priority: Priority,
    pub resource_requirements: ResourceRequirements,
    pub files: Vec<PathBuf>,
}

impl BatchOperation {
    pub fn new(kind: BatchKind, priority: Priority, resource_requirements: ResourceRequirements, files: Vec<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            priority,
            resource_requirements,
            files,
        }
    }

    /// Whether this operation's payload is small enough to bypass batching
    /// entirely and dispatch straight to the relevant pool (spec §4.5,
    /// default threshold 64 KiB).
    pub fn bypasses_batching(&self, small_buffer_threshold_bytes: u64) -> bool {
        self.resource_requirements.memory_bytes <= small_buffer_threshold_bytes
    }
}

/// Outcome for a single file within a [`BatchOperation`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOperationResult {
    pub success: bool,
    pub error: Option<String>,
    pub start_time: SystemTime,
    pub end_time: SystemTime,
    pub bytes_processed: u64,
    pub files_succeeded: u64,
    pub files_failed: u64,
    pub per_file_results: Vec<ChunkResult>,
}

impl BatchOperationResult {
    /// Derived: `succeeded / (succeeded + failed) * 100`, `0.0` when no
    /// files were attempted.
    pub fn success_rate_percent(&self) -> f64 {
        let total = self.files_succeeded + self.files_failed;
        if total == 0 {
            0.0
        } else {
            (self.files_succeeded as f64 / total as f64) * 100.0
        }
    }

    /// Derived: `bytes / elapsed_seconds`, `0.0` when elapsed is zero.
    pub fn throughput_mbps(&self) -> f64 {
        let elapsed = self
            .end_time
            .duration_since(self.start_time)
            .unwrap_or_default()
            .as_secs_f64();
        if elapsed <= 0.0 {
            0.0
        } else {
            (self.bytes_processed as f64 / (1024.0 * 1024.0)) / elapsed
        }
    }
}

/// Aggregate result for a whole [`BatchOperation`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub operation_id: Uuid,
    pub result: BatchOperationResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering_matches_spec_numeric_values() {
        assert!(Priority::Critical < Priority::High);
        assert!(Priority::High < Priority::Normal);
        assert!(Priority::Normal < Priority::Low);
        assert!(Priority::Low < Priority::Background);
    }

    #[test]
    fn small_payload_bypasses_batching() {
        let op = BatchOperation::new(
            BatchKind::Hashing,
            Priority::Normal,
            ResourceRequirements {
                memory_bytes: 32 * 1024,
                ..Default::default()
            },
            vec![],
        );
        assert!(op.bypasses_batching(64 * 1024));
    }

    #[test]
    fn large_payload_does_not_bypass_batching() {
        let op = BatchOperation::new(
            BatchKind::Hashing,
            Priority::Normal,
            ResourceRequirements {
                memory_bytes: 10 * 1024 * 1024,
                ..Default::default()
            },
            vec![],
        );
        assert!(!op.bypasses_batching(64 * 1024));
    }

    #[test]
    fn success_rate_is_zero_when_nothing_was_attempted() {
        let result = BatchOperationResult {
            success: true,
            error: None,
            start_time: SystemTime::now(),
            end_time: SystemTime::now(),
            bytes_processed: 0,
            files_succeeded: 0,
            files_failed: 0,
            per_file_results: vec![],
        };
        assert_eq!(result.success_rate_percent(), 0.0);
    }

    #[test]
    fn success_rate_computes_the_expected_percentage() {
        let result = BatchOperationResult {
            success: true,
            error: None,
            start_time: SystemTime::now(),
            end_time: SystemTime::now(),
            bytes_processed: 1024,
            files_succeeded: 3,
            files_failed: 1,
            per_file_results: vec![],
        };
        assert_eq!(result.success_rate_percent(), 75.0);
    }
}
