// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The error model for the logging core: a single enum with `#[source]`
//! chains, so the internal handler thread can walk `Error::source()` to
//! measure how deep a chain of recoverable failures has grown.

use std::io;

/// A recoverable or terminal failure in the logging core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A public call was made from a global state that forbids it.
    #[error("illegal state: {attempted} is not valid from state {from:?}")]
    IllegalState {
        attempted: &'static str,
        from: crate::lifecycle::State,
    },

    /// The sink argument or a `RuntimeConfig` field failed validation.
    #[error("invalid configuration: {0}")]
    ConfigError(String),

    /// The control channel carried a message neither side expected.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// The producer exhausted its non-blocking retries; the record was
    /// still delivered via the blocking fallback.
    #[error("exhausted {0} non-blocking send retries, fell back to a blocking send")]
    RetriesMax(u32),

    /// A syscall or `std::io` operation failed.
    #[error("system error: {0}")]
    SystemError(#[from] io::Error),

    /// A level name did not match any known severity or alias.
    #[error("unknown level name: {0:?}")]
    BadLevelName(String),

    /// An internal assertion was violated. Non-recoverable: callers should
    /// route this through [`crate::exit::exit_with_log`].
    #[error("assertion failed: {0}")]
    Assert(String),

    /// The internal handler thread's chained-error depth exceeded the
    /// configured limit; it is giving up and aborting.
    #[error("too many chained errors in the handler thread")]
    TooManyErrors {
        #[source]
        last: Box<Error>,
    },

    /// A recoverable error with an earlier cause attached, used to build
    /// chains deeper than one level without a dedicated variant per site.
    #[error("{context}")]
    Chained {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wraps `self` as the source of a new error carrying `context`.
    pub fn chain(self, context: impl Into<String>) -> Error {
        Error::Chained {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Counts the number of links in this error's `source()` chain,
    /// including `self`. Used by the IHT's "too many errors" quit policy.
    pub fn chain_depth(&self) -> usize {
        let mut depth = 1;
        let mut cur: &dyn std::error::Error = self;
        while let Some(src) = cur.source() {
            depth += 1;
            cur = src;
        }
        depth
    }
}

pub type Result<T> = std::result::Result<T, Error>;
