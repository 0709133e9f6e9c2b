// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Scan Options
//!
//! `ScanOptions` is an immutable configuration record validated once at
//! construction, following the re-architecture guidance of replacing
//! shared-mutable-configuration-via-setters with a validated record built
//! through a builder. There is no setter that can put an existing
//! `ScanOptions` into an invalid state after the fact.

use std::sync::Arc;

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Symlink traversal strategy (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymlinkPolicy {
    /// Never descend into a symlinked directory; do not record it.
    Skip,
    /// Descend, detecting cycles via a visited set keyed by canonical path.
    Follow,
    /// Record the entry (with `link_target` set) but never descend.
    ReportOnly,
}

/// Whether dotfiles/dot-directories are visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HiddenPolicy {
    Skip,
    Include,
}

/// Pre-seeded option profiles (spec §6 configuration surface).
///
/// A dynamic, string-keyed profile selector is replaced with this closed
/// enum; an unrecognized profile name is a validation error at the call
/// site that parses it, not a runtime lookup miss here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Profile {
    HighPerformance,
    LowResource,
    Balanced,
}

impl Profile {
    /// Parses a profile name from a configuration key, honoring "unknown
    /// keys are warned and ignored" (spec §6) at the caller's discretion —
    /// this returns `None` rather than a hard error so the caller can choose
    /// to warn-and-ignore.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "high-performance" => Some(Profile::HighPerformance),
            "low-resource" => Some(Profile::LowResource),
            "balanced" => Some(Profile::Balanced),
            _ => None,
        }
    }
}

/// Immutable scan configuration.
///
/// `include`/`exclude` are compiled `GlobSet`s wrapped in `Arc` so a
/// `ScanOptions` stays cheaply `Clone`-able across the many producers (I/O
/// pool workers, watch manager) that read it without mutating it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOptions {
    #[serde(skip, default = "GlobSet::empty")]
    include: GlobSet,
    include_patterns: Vec<String>,
    #[serde(skip, default = "GlobSet::empty")]
    exclude: GlobSet,
    exclude_patterns: Vec<String>,
    symlink_policy: SymlinkPolicy,
    max_depth: Option<u32>,
    hidden_policy: HiddenPolicy,
    min_file_size: u64,
    max_file_size: u64,
    detect_sparse_files: bool,

    // Async extensions (spec §3).
    parallelism: usize,
    batch_size: usize,
    backpressure_threshold: f64,
    debounce_timeout_ms: u64,
    batch_timeout_ms: u64,
    memory_limit_bytes: u64,
    prefetch_depth: u32,
    zero_copy: bool,
    progress_interval_ms: u64,
}

impl ScanOptions {
    pub fn builder() -> ScanOptionsBuilder {
        ScanOptionsBuilder::default()
    }

    pub fn include(&self) -> &GlobSet {
        &self.include
    }

    pub fn exclude(&self) -> &GlobSet {
        &self.exclude
    }

    pub fn symlink_policy(&self) -> SymlinkPolicy {
        self.symlink_policy
    }

    pub fn max_depth(&self) -> Option<u32> {
        self.max_depth
    }

    pub fn hidden_policy(&self) -> HiddenPolicy {
        self.hidden_policy
    }

    pub fn min_file_size(&self) -> u64 {
        self.min_file_size
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn detect_sparse_files(&self) -> bool {
        self.detect_sparse_files
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn backpressure_threshold(&self) -> f64 {
        self.backpressure_threshold
    }

    pub fn debounce_timeout_ms(&self) -> u64 {
        self.debounce_timeout_ms
    }

    pub fn batch_timeout_ms(&self) -> u64 {
        self.batch_timeout_ms
    }

    pub fn memory_limit_bytes(&self) -> u64 {
        self.memory_limit_bytes
    }

    pub fn prefetch_depth(&self) -> u32 {
        self.prefetch_depth
    }

    pub fn zero_copy(&self) -> bool {
        self.zero_copy
    }

    pub fn progress_interval_ms(&self) -> u64 {
        self.progress_interval_ms
    }

    /// Seeds a builder from a known profile; fields may still be overridden
    /// before `build()`.
    pub fn for_profile(profile: Profile) -> ScanOptionsBuilder {
        let mut builder = ScanOptionsBuilder::default();
        match profile {
            Profile::HighPerformance => {
                builder.parallelism = num_cpus_hint() * 2;
                builder.batch_size = 2000;
                builder.backpressure_threshold = 0.9;
                builder.memory_limit_bytes = 2 * 1024 * 1024 * 1024;
                builder.prefetch_depth = 4;
                builder.zero_copy = true;
            }
            Profile::LowResource => {
                builder.parallelism = 2;
                builder.batch_size = 100;
                builder.backpressure_threshold = 0.5;
                builder.memory_limit_bytes = 128 * 1024 * 1024;
                builder.prefetch_depth = 0;
                builder.zero_copy = false;
            }
            Profile::Balanced => {
                // Builder defaults already describe the balanced profile.
            }
        }
        builder
    }

    /// Applies a single runtime key/value override, ignoring unknown keys
    /// (spec §6: "Unknown keys are warned and ignored").
    ///
    /// Returns `Ok(true)` if the key was recognized and applied, `Ok(false)`
    /// if it was unrecognized, `Err` if the key was recognized but the value
    /// failed to parse or validate.
    pub fn apply_override(builder: &mut ScanOptionsBuilder, key: &str, value: &str) -> Result<bool, CoreError> {
        match key {
            "parallelism" => {
                builder.parallelism = parse_positive_usize(key, value)?;
            }
            "batchSize" => {
                builder.batch_size = parse_positive_usize(key, value)?;
            }
            "prefetching" => {
                builder.prefetch_depth = if parse_bool(key, value)? { 4 } else { 0 };
            }
            "zeroCopy" => {
                builder.zero_copy = parse_bool(key, value)?;
            }
            "backpressureThreshold" => {
                builder.backpressure_threshold = value
                    .parse::<f64>()
                    .map_err(|e| CoreError::invalid_argument(format!("{key}: {e}")))?;
            }
            _ => return Ok(false),
        }
        Ok(true)
    }
}

fn parse_positive_usize(key: &str, value: &str) -> Result<usize, CoreError> {
    let n: usize = value
        .parse()
        .map_err(|e| CoreError::invalid_argument(format!("{key}: {e}")))?;
    if n == 0 {
        return Err(CoreError::invalid_argument(format!("{key} must be >= 1")));
    }
    Ok(n)
}

fn parse_bool(key: &str, value: &str) -> Result<bool, CoreError> {
    value
        .parse()
        .map_err(|e| CoreError::invalid_argument(format!("{key}: {e}")))
}

fn num_cpus_hint() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

/// Mutable builder that validates on [`ScanOptionsBuilder::build`].
#[derive(Debug, Clone)]
pub struct ScanOptionsBuilder {
    include_patterns: Vec<String>,
    exclude_patterns: Vec<String>,
    symlink_policy: SymlinkPolicy,
    max_depth: Option<u32>,
    hidden_policy: HiddenPolicy,
    min_file_size: u64,
    max_file_size: u64,
    detect_sparse_files: bool,
    parallelism: usize,
    batch_size: usize,
    backpressure_threshold: f64,
    debounce_timeout_ms: u64,
    batch_timeout_ms: u64,
    memory_limit_bytes: u64,
    prefetch_depth: u32,
    zero_copy: bool,
    progress_interval_ms: u64,
}

impl Default for ScanOptionsBuilder {
    fn default() -> Self {
        Self {
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            symlink_policy: SymlinkPolicy::Skip,
            max_depth: None,
            hidden_policy: HiddenPolicy::Include,
            min_file_size: 0,
            max_file_size: u64::MAX,
            detect_sparse_files: false,
            parallelism: num_cpus_hint(),
            batch_size: 1000,
            backpressure_threshold: 0.8,
            debounce_timeout_ms: 100,
            batch_timeout_ms: 300_000,
            memory_limit_bytes: 512 * 1024 * 1024,
            prefetch_depth: 0,
            zero_copy: false,
            progress_interval_ms: 1000,
        }
    }
}

impl ScanOptionsBuilder {
    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.include_patterns.push(pattern.into());
        self
    }

    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_patterns.push(pattern.into());
        self
    }

    pub fn symlink_policy(mut self, policy: SymlinkPolicy) -> Self {
        self.symlink_policy = policy;
        self
    }

    pub fn max_depth(mut self, depth: u32) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn hidden_policy(mut self, policy: HiddenPolicy) -> Self {
        self.hidden_policy = policy;
        self
    }

    pub fn file_size_range(mut self, min: u64, max: u64) -> Self {
        self.min_file_size = min;
        self.max_file_size = max;
        self
    }

    pub fn detect_sparse_files(mut self, enabled: bool) -> Self {
        self.detect_sparse_files = enabled;
        self
    }

    pub fn parallelism(mut self, n: usize) -> Self {
        self.parallelism = n;
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    pub fn backpressure_threshold(mut self, t: f64) -> Self {
        self.backpressure_threshold = t;
        self
    }

    pub fn debounce_timeout_ms(mut self, ms: u64) -> Self {
        self.debounce_timeout_ms = ms;
        self
    }

    pub fn batch_timeout_ms(mut self, ms: u64) -> Self {
        self.batch_timeout_ms = ms;
        self
    }

    pub fn memory_limit_bytes(mut self, bytes: u64) -> Self {
        self.memory_limit_bytes = bytes;
        self
    }

    pub fn prefetch_depth(mut self, depth: u32) -> Self {
        self.prefetch_depth = depth;
        self
    }

    pub fn zero_copy(mut self, enabled: bool) -> Self {
        self.zero_copy = enabled;
        self
    }

    pub fn progress_interval_ms(mut self, ms: u64) -> Self {
        self.progress_interval_ms = ms;
        self
    }

    /// Validates and compiles the record. Glob compilation failures,
    /// `min > max`, `parallelism == 0`, `batch_size == 0`, a backpressure
    /// threshold outside `[0, 1]`, or a zero `memory_limit_bytes`/
    /// `progress_interval_ms` are all rejected here — never after
    /// construction.
    pub fn build(self) -> Result<ScanOptions, CoreError> {
        if self.min_file_size > self.max_file_size {
            return Err(CoreError::invalid_argument("min_file_size must be <= max_file_size"));
        }
        if self.parallelism == 0 {
            return Err(CoreError::invalid_argument("parallelism must be >= 1"));
        }
        if self.batch_size == 0 {
            return Err(CoreError::invalid_argument("batch_size must be >= 1"));
        }
        if !(0.0..=1.0).contains(&self.backpressure_threshold) {
            return Err(CoreError::invalid_argument(
                "backpressure_threshold must be in [0, 1]",
            ));
        }
        if self.memory_limit_bytes == 0 {
            return Err(CoreError::invalid_argument("memory_limit_bytes must be > 0"));
        }
        if self.progress_interval_ms == 0 {
            return Err(CoreError::invalid_argument("progress_interval_ms must be > 0"));
        }

        let include = compile_globset(&self.include_patterns)?;
        let exclude = compile_globset(&self.exclude_patterns)?;

        Ok(ScanOptions {
            include,
            include_patterns: self.include_patterns,
            exclude,
            exclude_patterns: self.exclude_patterns,
            symlink_policy: self.symlink_policy,
            max_depth: self.max_depth,
            hidden_policy: self.hidden_policy,
            min_file_size: self.min_file_size,
            max_file_size: self.max_file_size,
            detect_sparse_files: self.detect_sparse_files,
            parallelism: self.parallelism,
            batch_size: self.batch_size,
            backpressure_threshold: self.backpressure_threshold,
            debounce_timeout_ms: self.debounce_timeout_ms,
            batch_timeout_ms: self.batch_timeout_ms,
            memory_limit_bytes: self.memory_limit_bytes,
            prefetch_depth: self.prefetch_depth,
            zero_copy: self.zero_copy,
            progress_interval_ms: self.progress_interval_ms,
        })
    }
}

fn compile_globset(patterns: &[String]) -> Result<GlobSet, CoreError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| CoreError::invalid_argument(format!("bad glob {pattern:?}: {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| CoreError::invalid_argument(format!("glob set: {e}")))
}

/// Round-trips a `ScanOptions` through JSON, recompiling the `GlobSet`s from
/// their serialized pattern lists (the compiled automaton itself is not
/// serializable, only the source patterns are — see `#[serde(skip)]` above).
impl ScanOptions {
    pub fn to_json(&self) -> Result<String, CoreError> {
        serde_json::to_string(self).map_err(|e| CoreError::invalid_argument(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let mut options: ScanOptions =
            serde_json::from_str(json).map_err(|e| CoreError::invalid_argument(e.to_string()))?;
        options.include = compile_globset(&options.include_patterns)?;
        options.exclude = compile_globset(&options.exclude_patterns)?;
        Ok(options)
    }
}

/// Shared, ref-counted handle so many producers can read one `ScanOptions`
/// without cloning the compiled glob automata.
pub type SharedScanOptions = Arc<ScanOptions>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_builder_produces_valid_options() {
        let options = ScanOptions::builder().build().expect("defaults must validate");
        assert_eq!(options.parallelism().min(1), options.parallelism());
        assert_eq!(options.batch_size(), 1000);
    }

    #[test]
    fn min_greater_than_max_is_rejected() {
        let err = ScanOptions::builder()
            .file_size_range(100, 10)
            .build()
            .unwrap_err();
        assert_eq!(err.category(), "invalid_argument");
    }

    #[test]
    fn zero_parallelism_is_rejected() {
        let err = ScanOptions::builder().parallelism(0).build().unwrap_err();
        assert_eq!(err.category(), "invalid_argument");
    }

    #[test]
    fn backpressure_threshold_out_of_range_is_rejected() {
        assert!(ScanOptions::builder().backpressure_threshold(1.5).build().is_err());
        assert!(ScanOptions::builder().backpressure_threshold(-0.1).build().is_err());
        assert!(ScanOptions::builder().backpressure_threshold(1.0).build().is_ok());
    }

    #[test]
    fn options_round_trip_through_json() {
        let options = ScanOptions::builder()
            .include("*.rs")
            .exclude("target/**")
            .max_depth(3)
            .build()
            .unwrap();
        let json = options.to_json().unwrap();
        let restored = ScanOptions::from_json(&json).unwrap();
        assert_eq!(restored.max_depth(), Some(3));
        assert!(restored.include().is_match("main.rs"));
        assert!(restored.exclude().is_match("target/debug/foo"));
    }

    #[test]
    fn profile_seeds_differ() {
        let hp = ScanOptions::for_profile(Profile::HighPerformance).build().unwrap();
        let lr = ScanOptions::for_profile(Profile::LowResource).build().unwrap();
        assert!(hp.parallelism() >= lr.parallelism());
        assert!(hp.memory_limit_bytes() > lr.memory_limit_bytes());
    }

    #[test]
    fn unknown_override_key_is_ignored_not_an_error() {
        let mut builder = ScanOptions::builder();
        let applied = ScanOptions::apply_override(&mut builder, "bogusKey", "1").unwrap();
        assert!(!applied);
    }

    #[test]
    fn known_override_key_is_applied() {
        let mut builder = ScanOptions::builder();
        let applied = ScanOptions::apply_override(&mut builder, "parallelism", "8").unwrap();
        assert!(applied);
        assert_eq!(builder.build().unwrap().parallelism(), 8);
    }

    proptest::proptest! {
        #[test]
        fn threshold_in_range_always_builds(t in 0.0f64..=1.0f64) {
            let options = ScanOptions::builder().backpressure_threshold(t).build();
            prop_assert!(options.is_ok());
        }

        #[test]
        fn min_le_max_always_builds(min in 0u64..1_000_000, extra in 0u64..1_000_000) {
            let max = min + extra;
            let options = ScanOptions::builder().file_size_range(min, max).build().unwrap();
            prop_assert!(options.min_file_size() <= options.max_file_size());
        }
    }
}
