// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! An asynchronous, multi-threaded, signal-safe structured logging core.
//!
//! Many business threads emit log records through a small, cheap producer
//! path ([`producer::log`], normally reached through the [`log_output!`]
//! family of macros); a single internal handler thread (IHT) decodes,
//! formats, and writes them to one sink, in program order per producer.
//! [`lifecycle::init`] spawns the IHT and blocks until it is ready;
//! [`lifecycle::flush`] drains and syncs; [`lifecycle::finalize`] tears
//! everything down. The [`registry`] module tracks every named [`Logger`]
//! and lets [`registry::cfg_registered`] bulk-configure levels by prefix.
//!
//! Fork safety, a signal-relay path that guarantees buffered records reach
//! disk before a fatal signal's default disposition takes effect, and a
//! bounded-retry producer/IHT queueing protocol round out the core; see
//! `DESIGN.md` for how each piece is grounded.

pub mod config;
pub mod error;
pub mod exit;
pub mod iht;
pub mod level;
pub mod lifecycle;
#[macro_use]
pub mod macros;
pub mod producer;
pub mod protocol;
pub mod queue;
pub mod record;
pub mod registry;
// The process-wide fatal-signal handler is portable across unix targets;
// the IHT's `signalfd`-based crash-safety relay is Linux-specific and is
// itself gated, inside this module, to `target_os = "linux"`.
#[cfg(unix)]
pub mod signals;
pub mod tsd;

pub use config::RuntimeConfig;
pub use error::{Error, Result};
pub use level::Level;
pub use lifecycle::{current_state, finalize, flush, init, init_with_config, remember_identity, State};
pub use registry::{cfg_registered, register, registered, unregister, ConfigItem, Logger};

/// Convenience wrapper: [`lifecycle::init_with_config`] followed by
/// [`lifecycle::remember_identity`], so a single call leaves the runtime
/// ready to survive a subsequent `fork()`. Most callers should use this
/// instead of calling `init` and `remember_identity` separately.
pub fn init_remembering(progname: &str, sink: &str) -> error::Result<()> {
    init(progname, sink)?;
    remember_identity(progname, sink);
    Ok(())
}

/// Installs the process-wide fatal-signal handler (`SIGSEGV`, `SIGBUS`,
/// `SIGFPE`, `SIGILL`, `SIGINT`, `SIGTERM`), gated behind the `signals`
/// feature since it mutates global process disposition as a side effect of
/// being linked in. Requires the runtime to already be [`State::Initialized`]
/// so the handler has a control-queue handle to request IHT shutdown with.
#[cfg(all(unix, feature = "signals"))]
pub fn install_fatal_signal_handler() -> error::Result<()> {
    let control_queue = lifecycle::control_queue_handle().ok_or(Error::IllegalState {
        attempted: "install_fatal_signal_handler",
        from: current_state(),
    })?;
    signals::install_sighandler(control_queue)
        .map_err(|e| Error::SystemError(std::io::Error::from_raw_os_error(e as i32)))
}
