// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Watch-manager event type (spec §3, §4.7).

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Normalized event kind emitted by the Watch Manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Create,
    Modify,
    Delete,
    Overflow,
    Unknown,
}

/// A single, normalized filesystem change.
///
/// Immutable after construction: `with_file_size`/`with_metadata` return new
/// instances rather than mutating in place, matching spec §3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChangeEvent {
    pub kind: EventKind,
    pub path: PathBuf,
    pub occurred_at: SystemTime,
    pub is_directory: bool,
    /// `-1` when the size is unknown (e.g. a `DELETE` or `OVERFLOW` event).
    pub size: i64,
    pub registration_id: Uuid,
    pub metadata: HashMap<String, String>,
}

impl FileChangeEvent {
    pub fn new(kind: EventKind, path: PathBuf, is_directory: bool, registration_id: Uuid) -> Self {
        Self {
            kind,
            path,
            occurred_at: SystemTime::now(),
            is_directory,
            size: -1,
            registration_id,
            metadata: HashMap::new(),
        }
    }

    pub fn with_file_size(&self, size: i64) -> Self {
        let mut clone = self.clone();
        clone.size = size;
        clone
    }

    pub fn with_metadata(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut clone = self.clone();
        clone.metadata.insert(key.into(), value.into());
        clone
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_file_size_returns_a_new_instance() {
        let original = FileChangeEvent::new(EventKind::Create, PathBuf::from("/a"), false, Uuid::new_v4());
        let sized = original.with_file_size(42);
        assert_eq!(original.size, -1);
        assert_eq!(sized.size, 42);
    }

    #[test]
    fn with_metadata_does_not_mutate_the_original() {
        let original = FileChangeEvent::new(EventKind::Modify, PathBuf::from("/a"), false, Uuid::new_v4());
        let tagged = original.with_metadata("source", "debounced");
        assert!(original.metadata.is_empty());
        assert_eq!(tagged.metadata.get("source"), Some(&"debounced".to_string()));
    }
}
