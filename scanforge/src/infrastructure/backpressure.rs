// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Backpressure Controller (spec §4.3)
//!
//! A single shared pressure level in `[0, 1]`, guarded by a
//! `parking_lot::RwLock` (the teacher's choice throughout
//! `resource_manager.rs`/`stage_executor.rs`, in preference to
//! `std::sync::RwLock`).
//!
//! Per `DESIGN.md`'s resolution of Open Question 1: this controller is the
//! authority for *whether* a producer may enqueue new work at all. Each
//! thread pool additionally shrinks its own effective max under sustained
//! local load — that is a separate, pool-local decision about *how many
//! threads run*, and never feeds back into this controller's level.

use std::time::SystemTime;

use parking_lot::RwLock;
use scanforge_domain::error::CoreError;
use scanforge_domain::value_objects::PressureSnapshot;

struct State {
    snapshot: PressureSnapshot,
}

pub struct BackpressureController {
    state: RwLock<State>,
}

impl Default for BackpressureController {
    fn default() -> Self {
        Self::new()
    }
}

impl BackpressureController {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State {
                snapshot: PressureSnapshot::initial(),
            }),
        }
    }

    /// Sets the current level. `0 -> >0` marks `applied` and increments
    /// `total_events`; `>0 -> >0` only updates the level; `>0 -> 0` clears
    /// `applied`. A level outside `[0, 1]` is rejected (spec §4.3).
    pub fn set_level(&self, level: f64) -> Result<(), CoreError> {
        if !(0.0..=1.0).contains(&level) {
            return Err(CoreError::invalid_argument("backpressure level must be in [0, 1]"));
        }
        let mut state = self.state.write();
        let was_applied = state.snapshot.applied;
        let is_applied = level > 0.0;

        if !was_applied && is_applied {
            state.snapshot.total_events += 1;
        }
        state.snapshot.applied = is_applied;
        state.snapshot.level = level;
        if was_applied != is_applied {
            state.snapshot.last_transition_at = SystemTime::now();
        }
        Ok(())
    }

    pub fn current(&self) -> f64 {
        self.state.read().snapshot.level
    }

    pub fn applied(&self) -> bool {
        self.state.read().snapshot.applied
    }

    pub fn total_events(&self) -> u64 {
        self.state.read().snapshot.total_events
    }

    pub fn is_under_backpressure(&self, threshold: f64) -> bool {
        self.state.read().snapshot.is_under_backpressure(threshold)
    }

    pub fn snapshot(&self) -> PressureSnapshot {
        self.state.read().snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_to_positive_transition_increments_total_events() {
        let controller = BackpressureController::new();
        assert_eq!(controller.total_events(), 0);
        controller.set_level(0.5).unwrap();
        assert_eq!(controller.total_events(), 1);
        assert!(controller.applied());
    }

    #[test]
    fn positive_to_positive_updates_level_without_incrementing_events() {
        let controller = BackpressureController::new();
        controller.set_level(0.3).unwrap();
        controller.set_level(0.6).unwrap();
        assert_eq!(controller.total_events(), 1);
        assert_eq!(controller.current(), 0.6);
    }

    #[test]
    fn positive_to_zero_clears_applied() {
        let controller = BackpressureController::new();
        controller.set_level(0.4).unwrap();
        controller.set_level(0.0).unwrap();
        assert!(!controller.applied());
        assert_eq!(controller.total_events(), 1);
    }

    #[test]
    fn level_outside_unit_interval_is_rejected() {
        let controller = BackpressureController::new();
        assert!(controller.set_level(1.5).is_err());
        assert!(controller.set_level(-0.1).is_err());
    }

    #[test]
    fn is_under_backpressure_is_monotone_in_threshold() {
        let controller = BackpressureController::new();
        controller.set_level(0.5).unwrap();
        assert!(controller.is_under_backpressure(0.4));
        assert!(controller.is_under_backpressure(0.5));
        assert!(!controller.is_under_backpressure(0.6));
    }

    #[test]
    fn apply_backpressure_zero_restores_initial_observable_state() {
        let controller = BackpressureController::new();
        controller.set_level(0.7).unwrap();
        controller.set_level(0.0).unwrap();
        assert_eq!(controller.current(), 0.0);
        assert!(!controller.applied());
        // Counters are explicitly excluded from "initial observable state"
        // by spec §8's round-trip property.
        assert_eq!(controller.total_events(), 1);
    }
}
