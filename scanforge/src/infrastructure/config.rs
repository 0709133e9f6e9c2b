// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Engine Configuration
//!
//! `ScanOptions` (in `scanforge-domain`) already carries the per-scan
//! knobs spec.md §6 names, including `Profile`-seeded defaults and
//! string key/value overrides (`ScanOptions::apply_override`). This
//! module is the engine-level counterpart: it turns a built
//! `ScanOptions`' `parallelism()` into the [`ThreadPoolConfig`] table
//! §4.2 describes, the same way the teacher's CLI turns
//! `--cpu-threads`/`--io-threads` into a `ResourceConfig` before handing
//! it to `GlobalResourceManager::new`.

use scanforge_domain::value_objects::ScanOptions;

use crate::infrastructure::thread_pools::{default_configs, ThreadPoolConfig};

/// Derives the six pool configs from a scan's resolved options, scaling
/// the spec's CPU-count-derived table by `options.parallelism()` instead
/// of raw `available_parallelism()` so a `LowResource`-profile scan with
/// `parallelism=2` gets genuinely small pools rather than the whole
/// machine's core count.
pub fn pool_configs_for(options: &ScanOptions) -> Vec<ThreadPoolConfig> {
    default_configs(options.parallelism().max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanforge_domain::value_objects::{Profile, ScanOptions};

    #[test]
    fn low_resource_profile_yields_small_pools() {
        let options = ScanOptions::for_profile(Profile::LowResource).build().unwrap();
        let configs = pool_configs_for(&options);
        let io = configs.iter().find(|c| c.kind == crate::infrastructure::thread_pools::PoolKind::Io).unwrap();
        assert!(io.max <= 8);
    }

    #[test]
    fn high_performance_profile_yields_larger_pools_than_low_resource() {
        let hp = ScanOptions::for_profile(Profile::HighPerformance).build().unwrap();
        let lr = ScanOptions::for_profile(Profile::LowResource).build().unwrap();
        let hp_io = pool_configs_for(&hp)
            .into_iter()
            .find(|c| c.kind == crate::infrastructure::thread_pools::PoolKind::Io)
            .unwrap();
        let lr_io = pool_configs_for(&lr)
            .into_iter()
            .find(|c| c.kind == crate::infrastructure::thread_pools::PoolKind::Io)
            .unwrap();
        assert!(hp_io.max >= lr_io.max);
    }
}
