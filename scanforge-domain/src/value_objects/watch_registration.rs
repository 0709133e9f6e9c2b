// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! A live directory-watch binding (spec §3, §4.7).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use uuid::Uuid;

use super::file_change_event::EventKind;

/// Snapshot of a [`WatchRegistration`]'s configuration, captured at
/// registration time so later config-default changes don't retroactively
/// alter an in-flight registration.
#[derive(Debug, Clone)]
pub struct WatchConfigSnapshot {
    pub max_event_batch_size: usize,
    pub event_batch_timeout_ms: u64,
}

impl Default for WatchConfigSnapshot {
    fn default() -> Self {
        Self {
            max_event_batch_size: 50,
            event_batch_timeout_ms: 100,
        }
    }
}

/// A live directory-watch binding, identified by a UUID.
///
/// `active` is an atomic flag so [`WatchRegistration::deactivate`] can be
/// called concurrently and idempotently without external synchronization —
/// the same discipline as `adaptive_pipeline_bootstrap::shutdown::CancellationToken`.
#[derive(Debug)]
pub struct WatchRegistration {
    id: Uuid,
    directory: PathBuf,
    event_kinds: Vec<EventKind>,
    recursive: bool,
    registered_at: SystemTime,
    config: WatchConfigSnapshot,
    active: AtomicBool,
    processed_events: AtomicU64,
    errors: AtomicU64,
    last_event_at: Mutex<Option<SystemTime>>,
}

impl WatchRegistration {
    pub fn new(directory: PathBuf, event_kinds: Vec<EventKind>, recursive: bool, config: WatchConfigSnapshot) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            directory,
            event_kinds,
            recursive,
            registered_at: SystemTime::now(),
            config,
            active: AtomicBool::new(true),
            processed_events: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            last_event_at: Mutex::new(None),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn directory(&self) -> &std::path::Path {
        &self.directory
    }

    pub fn event_kinds(&self) -> &[EventKind] {
        &self.event_kinds
    }

    pub fn recursive(&self) -> bool {
        self.recursive
    }

    pub fn registered_at(&self) -> SystemTime {
        self.registered_at
    }

    pub fn config(&self) -> &WatchConfigSnapshot {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Idempotent: the first call flips `active` to `false` and returns
    /// `true`; every subsequent call observes it already `false` and
    /// returns `false` without side effects.
    pub fn deactivate(&self) -> bool {
        self.active
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn note_event_processed(&self) {
        self.processed_events.fetch_add(1, Ordering::Relaxed);
        *self.last_event_at.lock().unwrap() = Some(SystemTime::now());
    }

    pub fn note_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn processed_event_count(&self) -> u64 {
        self.processed_events.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn last_event_at(&self) -> Option<SystemTime> {
        *self.last_event_at.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deactivate_is_idempotent() {
        let reg = WatchRegistration::new(PathBuf::from("/tmp"), vec![EventKind::Create], true, WatchConfigSnapshot::default());
        assert!(reg.is_active());
        assert!(reg.deactivate());
        assert!(!reg.is_active());
        assert!(!reg.deactivate());
        assert!(!reg.is_active());
    }

    #[test]
    fn counters_increment_monotonically() {
        let reg = WatchRegistration::new(PathBuf::from("/tmp"), vec![EventKind::Modify], false, WatchConfigSnapshot::default());
        reg.note_event_processed();
        reg.note_event_processed();
        reg.note_error();
        assert_eq!(reg.processed_event_count(), 2);
        assert_eq!(reg.error_count(), 1);
        assert!(reg.last_event_at().is_some());
    }

    #[test]
    fn deactivate_concurrently_only_one_winner_semantics_hold() {
        let reg = WatchRegistration::new(PathBuf::from("/tmp"), vec![EventKind::Delete], true, WatchConfigSnapshot::default());
        let reg2 = reg.clone();
        let handle = std::thread::spawn(move || reg2.deactivate());
        let first_result = reg.deactivate();
        let second_result = handle.join().unwrap();
        // Exactly one of the two concurrent calls observes the transition.
        assert_ne!(first_result, second_result);
    }
}
