// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Exit helpers that guarantee buffered log records are flushed before the
//! process dies, plus the signal-handler's local CRITICAL log emission.
//! Callers should prefer these over `std::process::exit`/`assert!`
//! directly, since those would skip the flush.

use crate::level::Level;
use crate::lifecycle;
use crate::registry::Logger;
use std::sync::Arc;
use std::time::Duration;

/// `sysexits.h`'s `EX_SOFTWARE`: the exit code for assertion failures and
/// unrecoverable internal handler thread errors.
pub const EX_SOFTWARE: i32 = 70;

/// Logs `message` at `level` against `logger`, sleeps briefly to give the
/// internal handler thread a chance to drain its queue, flushes, then
/// exits the process with `exit_code`. Mirrors `bxilog_exit`.
pub fn exit_with_log(
    exit_code: i32,
    logger: &Arc<Logger>,
    level: Level,
    file: &str,
    func: &str,
    line: u32,
    message: impl std::fmt::Display,
) -> ! {
    crate::producer::log(
        logger,
        level,
        file,
        func,
        line,
        format_args!("{message}"),
    );
    std::thread::sleep(Duration::from_millis(50));
    let _ = lifecycle::flush();
    std::process::exit(exit_code);
}

/// If `result` is `Err`, logs it at [`Level::Critical`] and exits via
/// [`exit_with_log`] with [`EX_SOFTWARE`]. Mirrors `bxilog_abort_ifko`.
pub fn abort_if_err<T, E: std::fmt::Display>(
    logger: &Arc<Logger>,
    result: Result<T, E>,
    file: &str,
    func: &str,
    line: u32,
) -> T {
    match result {
        Ok(value) => value,
        Err(e) => exit_with_log(EX_SOFTWARE, logger, Level::Critical, file, func, line, e),
    }
}

/// Logs a CRITICAL record about a fatal signal from within the process-wide
/// signal handler. Not required to be signal-safe itself (it goes through
/// the ordinary producer path, which may allocate), acceptable because by
/// the time this runs the process is already committed to dying.
pub fn log_critical_from_signal(signum: i32, description: &str) {
    let logger = lifecycle::internal_logger();
    crate::producer::log(
        logger,
        Level::Critical,
        "signals.rs",
        "handle_fatal_signal",
        0,
        format_args!("fatal signal {signum}: {description}"),
    );
}

/// Asserts `cond`, exiting via [`exit_with_log`] with [`EX_SOFTWARE`] if it
/// is false, so an internal invariant violation still leaves buffered log
/// records on disk instead of aborting mid-write like `std::assert!` would.
#[macro_export]
macro_rules! bxi_assert {
    ($logger:expr, $cond:expr) => {
        if !$cond {
            $crate::exit::exit_with_log(
                $crate::exit::EX_SOFTWARE,
                $logger,
                $crate::level::Level::Panic,
                file!(),
                "bxi_assert",
                line!(),
                $crate::error::Error::Assert(stringify!($cond).to_string()),
            );
        }
    };
}
