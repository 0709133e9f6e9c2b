// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Management-pool task that periodically runs [`BufferPool::run_adaptive_tick`].
//!
//! Hosted on the Management pool per spec §5 ("The Management pool hosts
//! periodic supervisory tasks"), modeled here as a detached OS thread the
//! same way `resource_manager.rs`'s background services are described,
//! rather than a `tokio::spawn` task — this engine's six named pools are
//! plain OS threads (see `infrastructure::thread_pools`), not tokio tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::BufferPool;

/// Handle controlling the adaptive-sizing background task's lifetime.
pub struct AdaptiveSizingTask {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl AdaptiveSizingTask {
    pub fn spawn(pool: BufferPool, interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = stop.clone();
        let handle = std::thread::Builder::new()
            .name("buffer-pool-adaptive".into())
            .spawn(move || {
                while !stop_clone.load(Ordering::Relaxed) {
                    std::thread::sleep(interval);
                    if stop_clone.load(Ordering::Relaxed) {
                        break;
                    }
                    pool.run_adaptive_tick();
                }
            })
            .expect("failed to spawn buffer-pool adaptive sizing thread");
        Self {
            stop,
            handle: Some(handle),
        }
    }

    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AdaptiveSizingTask {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::buffer_pool::BufferPoolConfig;

    #[test]
    fn task_starts_and_stops_cleanly() {
        let pool = BufferPool::new(BufferPoolConfig::default());
        let task = AdaptiveSizingTask::spawn(pool, Duration::from_millis(10));
        std::thread::sleep(Duration::from_millis(30));
        task.stop();
    }
}
