// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

// Production code safety enforced via CI and `make lint-strict`
// (lib/bins checked separately from tests - tests may use unwrap/expect)

//! # Bootstrap Module
//!
//! Sits outside the domain/infrastructure/application layers and owns the
//! two concerns every entry point embedding the scanner core needs before
//! the rest of the engine is wired up:
//!
//! - `shutdown` - [`shutdown::ShutdownCoordinator`] and
//!   [`shutdown::CancellationToken`], propagated into the Watch Manager,
//!   thread pools, and the scan loop's directory/file cancellation checks.
//! - `logger` - a thin [`logger::BootstrapLogger`] trait over `tracing` for
//!   bootstrap-phase messages emitted before the tracing subscriber is
//!   installed.
//!
//! This crate does not carry a CLI, platform abstraction, signal handling,
//! or composition root: the scanner core is a library other programs
//! embed, not a standalone binary with its own argument parsing and
//! process lifecycle.

pub mod logger;
pub mod shutdown;

pub use shutdown::{CancellationToken, ShutdownCoordinator};
