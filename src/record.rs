// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The in-memory record that flows from a producer thread to the internal
//! handler thread. Ownership transfer through
//! `crossbeam_channel::Sender::send` gives a zero-copy, single-free
//! guarantee for free, so the record is simply an owned struct rather than
//! a length-prefixed wire buffer with an explicit release callback.

use crate::level::Level;

/// A realtime timestamp split into seconds and nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub secs: i64,
    pub nanos: u32,
}

impl Timestamp {
    /// Captures the current wall-clock time via `clock_gettime(CLOCK_REALTIME)`.
    pub fn now() -> Self {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // SAFETY: `ts` is a valid, exclusively-owned `timespec` on the stack.
        let rc = unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut ts) };
        if rc != 0 {
            // Realtime clock reads essentially never fail; fall back to the
            // `std` clock rather than propagate an error on the hot path.
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default();
            return Timestamp {
                secs: now.as_secs() as i64,
                nanos: now.subsec_nanos(),
            };
        }
        Timestamp {
            secs: ts.tv_sec,
            nanos: ts.tv_nsec as u32,
        }
    }
}

/// One encoded log entry, moved from producer to IHT.
#[derive(Debug, Clone)]
pub struct Record {
    pub level: Level,
    pub timestamp: Timestamp,
    /// Kernel thread id, when the platform exposes a distinct one (Linux).
    pub tid: Option<i64>,
    /// User-assigned, per-process rank derived from `ThreadId`.
    pub rank: u16,
    pub line: u32,
    pub filename: String,
    pub funcname: String,
    pub loggername: String,
    pub message: String,
}

impl Record {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        level: Level,
        tid: Option<i64>,
        rank: u16,
        line: u32,
        filename: impl Into<String>,
        funcname: impl Into<String>,
        loggername: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Record {
            level,
            timestamp: Timestamp::now(),
            tid,
            rank,
            line,
            filename: filename.into(),
            funcname: funcname.into(),
            loggername: loggername.into(),
            message: message.into(),
        }
    }
}
