// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Chunk pipeline work unit (spec §3, §4.4).

use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One unit of work submitted to the Chunk Pipeline: a single chunk of a
/// single file, in file order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkJob {
    pub file_id: Uuid,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub offset: u64,
    pub size: usize,
    pub submitted_at_unix_nanos: u128,
}

impl ChunkJob {
    pub fn new(file_id: Uuid, chunk_index: usize, total_chunks: usize, offset: u64, size: usize) -> Self {
        debug_assert!(total_chunks >= 1);
        debug_assert!(chunk_index < total_chunks);
        Self {
            file_id,
            chunk_index,
            total_chunks,
            offset,
            size,
            submitted_at_unix_nanos: SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos(),
        }
    }

    pub fn submitted_at(&self) -> SystemTime {
        SystemTime::UNIX_EPOCH + std::time::Duration::from_nanos(self.submitted_at_unix_nanos as u64)
    }
}

/// Exactly one result — success with hash, or failure — is emitted per
/// [`ChunkJob`] (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChunkResult {
    Success { chunk_index: usize, hash_hex: String },
    Failure { chunk_index: usize, path: PathBuf, cause: String },
}

impl ChunkResult {
    pub fn chunk_index(&self) -> usize {
        match self {
            ChunkResult::Success { chunk_index, .. } => *chunk_index,
            ChunkResult::Failure { chunk_index, .. } => *chunk_index,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ChunkResult::Success { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_job_records_offset_order_fields() {
        let job = ChunkJob::new(Uuid::new_v4(), 2, 4, 512 * 1024, 262_144);
        assert_eq!(job.chunk_index, 2);
        assert_eq!(job.total_chunks, 4);
        assert_eq!(job.offset, 512 * 1024);
    }

    #[test]
    fn chunk_result_exposes_its_index_regardless_of_outcome() {
        let ok = ChunkResult::Success {
            chunk_index: 1,
            hash_hex: "deadbeef".into(),
        };
        let err = ChunkResult::Failure {
            chunk_index: 2,
            path: PathBuf::from("/tmp/a"),
            cause: "read failed".into(),
        };
        assert_eq!(ok.chunk_index(), 1);
        assert!(ok.is_success());
        assert_eq!(err.chunk_index(), 2);
        assert!(!err.is_success());
    }
}
