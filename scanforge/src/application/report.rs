// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Scan Reports
//!
//! JSON export of a completed [`ScanResult`]. CSV and XML export are an
//! external collaborator's job (spec.md §1 Non-goals); this core only
//! serializes its own `Serialize`-derived value objects.

use scanforge_domain::error::CoreError;
use scanforge_domain::value_objects::ScanResult;

/// Serializes a [`ScanResult`] to pretty-printed JSON.
pub fn to_json(result: &ScanResult) -> Result<String, CoreError> {
    serde_json::to_string_pretty(result)
        .map_err(|e| CoreError::invalid_argument(format!("failed to serialize scan result: {e}")))
}

/// Serializes a [`ScanResult`] to compact JSON, for log lines or
/// line-delimited export.
pub fn to_json_compact(result: &ScanResult) -> Result<String, CoreError> {
    serde_json::to_string(result).map_err(|e| CoreError::invalid_argument(format!("failed to serialize scan result: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanforge_domain::value_objects::ScanResultBuilder;
    use std::path::PathBuf;

    #[test]
    fn json_round_trips_a_minimal_result() {
        let result = ScanResultBuilder::new(PathBuf::from("/tmp")).finish(1, 0);
        let json = to_json(&result).unwrap();
        let parsed: ScanResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.file_count(), result.file_count());
    }

    #[test]
    fn compact_json_has_no_pretty_whitespace() {
        let result = ScanResultBuilder::new(PathBuf::from("/tmp")).finish(1, 0);
        let compact = to_json_compact(&result).unwrap();
        assert!(!compact.contains("\n  "));
    }
}
