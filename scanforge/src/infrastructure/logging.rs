// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Logging
//!
//! Installs the process-wide `tracing` subscriber this core's
//! `#[tracing::instrument]`ed scan/stage boundaries and `debug!`/`warn!`
//! call sites log through. Mirrors the teacher binary's
//! `tracing_subscriber::FmtSubscriber` setup (`pipeline/src/main.rs`),
//! generalized into a reusable init function since this crate is a
//! library an embedder calls, not a process that owns `main`.

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Verbosity presets an embedder can select without depending on
/// `tracing::Level` directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogVerbosity {
    Quiet,
    Normal,
    Verbose,
    Trace,
}

impl LogVerbosity {
    fn to_level(self) -> Level {
        match self {
            LogVerbosity::Quiet => Level::WARN,
            LogVerbosity::Normal => Level::INFO,
            LogVerbosity::Verbose => Level::DEBUG,
            LogVerbosity::Trace => Level::TRACE,
        }
    }
}

/// Installs a global `tracing` subscriber at the given verbosity.
///
/// Safe to call more than once in a process (e.g. across test modules);
/// later calls are no-ops since `tracing` only allows one global default.
pub fn init_tracing(verbosity: LogVerbosity) {
    let subscriber = FmtSubscriber::builder().with_max_level(verbosity.to_level()).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_does_not_panic_when_called_twice() {
        init_tracing(LogVerbosity::Normal);
        init_tracing(LogVerbosity::Verbose);
    }
}
