// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Per-entry filter predicates for the directory scanner (spec §4.6).

use std::fs::Metadata;
use std::path::Path;

use scanforge_domain::value_objects::ScanOptions;

pub fn passes_hidden_filter(path: &Path, options: &ScanOptions) -> bool {
    use scanforge_domain::value_objects::HiddenPolicy;
    if options.hidden_policy() == HiddenPolicy::Include {
        return true;
    }
    !is_hidden(path)
}

/// Dot-prefixed name convention (spec §4.6 "hidden"). Windows'
/// `FILE_ATTRIBUTE_HIDDEN` bit is not consulted; this core only runs the
/// convention the teacher's own file-walking code assumes.
pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.') && n != "." && n != "..")
        .unwrap_or(false)
}

pub fn passes_glob_filters(path: &Path, options: &ScanOptions) -> bool {
    if !options.exclude().is_empty() && options.exclude().is_match(path) {
        return false;
    }
    options.include().is_empty() || options.include().is_match(path)
}

pub fn passes_size_filter(size_bytes: u64, options: &ScanOptions) -> bool {
    size_bytes >= options.min_file_size() && size_bytes <= options.max_file_size()
}

pub fn passes_depth_filter(depth: u32, options: &ScanOptions) -> bool {
    match options.max_depth() {
        Some(max) => depth <= max,
        None => true,
    }
}

/// Sparse-file heuristic: allocated blocks (512 bytes each, per POSIX
/// `st_blocks`) cover less than the logical length (spec §4.6). Always
/// `false` off Unix since there is no portable allocated-block count.
#[cfg(unix)]
pub fn is_sparse(metadata: &Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    let allocated = metadata.blocks() * 512;
    allocated < metadata.len()
}

#[cfg(not(unix))]
pub fn is_sparse(_metadata: &Metadata) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanforge_domain::value_objects::ScanOptionsBuilder;
    use std::path::PathBuf;

    #[test]
    fn dotfiles_are_hidden() {
        assert!(is_hidden(&PathBuf::from("/a/.gitignore")));
        assert!(!is_hidden(&PathBuf::from("/a/readme.md")));
        assert!(!is_hidden(&PathBuf::from(".")));
    }

    #[test]
    fn size_filter_is_inclusive_on_both_ends() {
        let options = ScanOptionsBuilder::default().file_size_range(10, 20).build().unwrap();
        assert!(passes_size_filter(10, &options));
        assert!(passes_size_filter(20, &options));
        assert!(!passes_size_filter(9, &options));
        assert!(!passes_size_filter(21, &options));
    }

    #[test]
    fn depth_filter_allows_everything_when_unset() {
        let options = ScanOptionsBuilder::default().build().unwrap();
        assert!(passes_depth_filter(1000, &options));
    }

    #[test]
    fn depth_filter_rejects_past_max_depth() {
        let options = ScanOptionsBuilder::default().max_depth(2).build().unwrap();
        assert!(passes_depth_filter(2, &options));
        assert!(!passes_depth_filter(3, &options));
    }

    #[test]
    fn glob_filters_apply_exclude_before_include() {
        let options = ScanOptionsBuilder::default()
            .include("*.rs")
            .exclude("*_test.rs")
            .build()
            .unwrap();
        assert!(passes_glob_filters(&PathBuf::from("src/lib.rs"), &options));
        assert!(!passes_glob_filters(&PathBuf::from("src/lib_test.rs"), &options));
        assert!(!passes_glob_filters(&PathBuf::from("src/lib.md"), &options));
    }
}
