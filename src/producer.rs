// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The producer path: what runs on a business thread when it calls one of
//! the severity-named logging macros. Fast-path level check, lazy TSD
//! acquisition, message formatting into the thread's reusable scratch
//! buffer, and zero-copy enqueue with bounded retry.

use crate::error::Error;
use crate::level::Level;
use crate::lifecycle::{self, State};
use crate::queue::DataQueue;
use crate::record::Record;
use crate::registry::Logger;
use crate::tsd;
use crossbeam_channel::TrySendError;
use std::fmt::Arguments;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const RETRY_DELAY: Duration = Duration::from_micros(500);

/// Logs one record against `logger` at `level`. Returns immediately without
/// formatting anything if `logger`'s threshold excludes `level`, or if the
/// runtime is not [`State::Initialized`] (both are silent no-ops, never
/// errors: a record is dropped rather than failing the caller).
#[allow(clippy::too_many_arguments)]
pub fn log(
    logger: &Arc<Logger>,
    level: Level,
    file: &str,
    func: &str,
    line: u32,
    args: Arguments<'_>,
) {
    if !logger.enabled_for(level) {
        return;
    }
    if lifecycle::current_state() != State::Initialized {
        return;
    }

    // `lifecycle::producer_queues` is passed, not called: `with_tsd` only
    // invokes it (and so only takes the runtime mutex) on this thread's
    // first log call or after a generation change, never on the
    // steady-state path where the cached queue handles in this thread's
    // TSD are still current.
    tsd::with_tsd(
        lifecycle::producer_queues,
        |slot| {
            slot.scratch.clear();
            // `String`'s `fmt::Write` impl grows the buffer as needed rather
            // than failing on overflow: the first oversized message grows
            // `scratch` once, and every subsequent call on this thread
            // reuses that larger capacity.
            if std::fmt::write(&mut slot.scratch, args).is_err() {
                slot.scratch.clear();
                slot.scratch.push_str("<log message formatting failed>");
            }
            let message: &str = &slot.scratch;

            let record = Record::new(
                level,
                slot.tid,
                slot.rank,
                line,
                file,
                func,
                logger.name(),
                message,
            );

            enqueue_with_retry(&slot.data_queue, record, logger);
        },
    );
}

/// Enqueues `record` with a non-blocking `try_send`, retrying up to 3 times
/// with 500µs sleeps on transient back-pressure (`Full`). If retries are
/// exhausted, degrades to a blocking `send` and reports the retry count via
/// a recursive warning on the internal logger, never on `logger` itself,
/// since `logger` might be configured to filter it right back out.
fn enqueue_with_retry(data_queue: &DataQueue, mut record: Record, _logger: &Arc<Logger>) {
    const RETRIES_MAX: u32 = 3;
    for attempt in 0..RETRIES_MAX {
        match data_queue.try_send(record) {
            Ok(()) => return,
            Err(TrySendError::Full(returned)) => {
                record = returned;
                thread::sleep(RETRY_DELAY);
                let _ = attempt;
            }
            Err(TrySendError::Disconnected(_)) => return,
        }
    }

    let retries_max_err = Error::RetriesMax(RETRIES_MAX);
    if data_queue.send(record).is_ok() {
        warn_recursively(retries_max_err);
    }
}

/// Emits a warning about a producer-path failure through the internal
/// logger. Recursive logging is permitted everywhere except inside
/// `flush()`; this function is never called from there.
fn warn_recursively(err: Error) {
    let internal = lifecycle::internal_logger();
    log(
        internal,
        Level::Warning,
        file!(),
        "warn_recursively",
        line!(),
        format_args!("{err}"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::Level;

    #[test]
    fn disabled_level_is_a_silent_noop_without_runtime() {
        let logger = Logger::new("t", Level::Warning);
        // No runtime initialized in this test; Info is below Warning so the
        // level check short-circuits before ever touching the runtime.
        log(&logger, Level::Info, file!(), "f", 1, format_args!("x"));
    }

    #[test]
    fn uninitialized_runtime_is_a_silent_noop() {
        let logger = Logger::new("t2", Level::Lowest);
        // Level passes (Lowest accepts everything) but no runtime exists in
        // this test process, so `producer_queues()` returns `None`.
        log(&logger, Level::Output, file!(), "f", 1, format_args!("hi"));
    }
}
