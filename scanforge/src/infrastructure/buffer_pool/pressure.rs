// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Memory-pressure detector (spec §4.1 "Memory pressure").
//!
//! Polls the pool's own in-use byte count against `memoryPressureThreshold`
//! rather than querying OS-level resident-set size: the teacher's
//! `resource_manager.rs` already treats token/semaphore occupancy as the
//! governance signal rather than shelling out to platform APIs, and no
//! crate in this workspace's dependency stack (no `sysinfo`) reaches for
//! real OS memory telemetry — staying consistent with the stack beats
//! adding one crate for a single reading.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::BufferPool;

/// Observed state of the detector at one poll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryPressureReading {
    pub in_use_bytes: u64,
    pub limit_bytes: u64,
    pub fraction: f64,
    pub breached: bool,
}

pub struct MemoryPressureDetector {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    last_breach_count: Arc<AtomicU64>,
}

impl MemoryPressureDetector {
    /// Spawns the polling loop. `on_breach` runs once per interval in which
    /// the threshold is exceeded, on the detector's own thread; it is
    /// expected to call [`BufferPool::release_idle_buffers_under_pressure`]
    /// and/or notify the Backpressure Controller.
    pub fn spawn(
        pool: BufferPool,
        limit_bytes: u64,
        threshold: f64,
        poll_interval: Duration,
        on_breach: impl Fn(MemoryPressureReading) + Send + 'static,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = stop.clone();
        let breach_count = Arc::new(AtomicU64::new(0));
        let breach_count_clone = breach_count.clone();

        let handle = std::thread::Builder::new()
            .name("buffer-pool-pressure".into())
            .spawn(move || {
                while !stop_clone.load(Ordering::Relaxed) {
                    std::thread::sleep(poll_interval);
                    if stop_clone.load(Ordering::Relaxed) {
                        break;
                    }
                    let stats = pool.stats();
                    let in_use_bytes: u64 = stats
                        .tiers
                        .iter()
                        .map(|t| (t.in_use as u64) * (t.size_bytes as u64))
                        .sum();
                    let fraction = if limit_bytes == 0 {
                        0.0
                    } else {
                        in_use_bytes as f64 / limit_bytes as f64
                    };
                    let breached = fraction >= threshold;
                    if breached {
                        breach_count_clone.fetch_add(1, Ordering::Relaxed);
                        on_breach(MemoryPressureReading {
                            in_use_bytes,
                            limit_bytes,
                            fraction,
                            breached,
                        });
                    }
                }
            })
            .expect("failed to spawn memory pressure detector thread");

        Self {
            stop,
            handle: Some(handle),
            last_breach_count: breach_count,
        }
    }

    pub fn breach_count(&self) -> u64 {
        self.last_breach_count.load(Ordering::Relaxed)
    }

    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MemoryPressureDetector {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::buffer_pool::BufferPoolConfig;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn breach_callback_fires_when_threshold_is_exceeded() {
        let pool = BufferPool::new(BufferPoolConfig::default());
        let _held: Vec<_> = (0..10).map(|_| pool.acquire(1 << 20).unwrap()).collect();
        let breaches = Arc::new(AtomicUsize::new(0));
        let breaches_clone = breaches.clone();
        let detector = MemoryPressureDetector::spawn(
            pool,
            5 * (1 << 20),
            0.5,
            Duration::from_millis(5),
            move |_reading| {
                breaches_clone.fetch_add(1, Ordering::Relaxed);
            },
        );
        std::thread::sleep(Duration::from_millis(40));
        detector.stop();
        assert!(breaches.load(Ordering::Relaxed) > 0);
    }
}
