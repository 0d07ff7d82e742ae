// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Tunables for the runtime, validated at construction with
//! `anyhow::ensure!`.

use std::time::Duration;

/// Construction-time knobs for [`crate::lifecycle::Runtime`]. Every field
/// can be overridden individually, or in bulk via
/// [`RuntimeConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// How long the IHT's `Select` waits before treating the tick as a
    /// flush opportunity.
    pub poll_timeout: Duration,
    /// Initial size of a thread's reusable message-formatting buffer.
    pub scratch_buf_size: usize,
    /// High-water mark for the data channel (bounded channel capacity).
    pub data_queue_capacity: usize,
    /// Non-blocking `try_send` attempts before falling back to a blocking
    /// `send`.
    pub retries_max: u32,
    /// Sleep between non-blocking retry attempts.
    pub retry_delay: Duration,
    /// How long `init()` waits for the IHT's `Ready` reply before giving up
    /// with `Error::SystemError`, rather than blocking forever if the IHT
    /// never comes up.
    pub startup_timeout: Duration,
    /// Chained-error depth at which the IHT gives up and aborts.
    pub max_error_chain: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            poll_timeout: Duration::from_millis(500),
            scratch_buf_size: 128,
            data_queue_capacity: 1_500_000,
            retries_max: 3,
            retry_delay: Duration::from_micros(500),
            startup_timeout: Duration::from_secs(5),
            max_error_chain: 5,
        }
    }
}

impl RuntimeConfig {
    /// Validates field relationships that the defaults always satisfy but a
    /// hand-built config might not.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.data_queue_capacity > 0,
            "data_queue_capacity must be > 0"
        );
        anyhow::ensure!(self.scratch_buf_size > 0, "scratch_buf_size must be > 0");
        anyhow::ensure!(self.max_error_chain > 0, "max_error_chain must be > 0");
        Ok(())
    }

    /// Applies optional environment overrides on top of [`RuntimeConfig::default`].
    /// Unset or unparseable variables fall back to the default silently,
    /// since this is a convenience layer, never a hard failure.
    pub fn from_env() -> Self {
        let mut cfg = RuntimeConfig::default();
        if let Some(ms) = env_u64("BXILOG_POLL_TIMEOUT_MS") {
            cfg.poll_timeout = Duration::from_millis(ms);
        }
        if let Some(cap) = env_usize("BXILOG_DATA_QUEUE_CAPACITY") {
            cfg.data_queue_capacity = cap;
        }
        if let Some(retries) = env_u64("BXILOG_RETRIES_MAX") {
            cfg.retries_max = retries as u32;
        }
        cfg
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(RuntimeConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_queue_capacity_rejected() {
        let mut cfg = RuntimeConfig::default();
        cfg.data_queue_capacity = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn from_env_ignores_unset_vars() {
        std::env::remove_var("BXILOG_POLL_TIMEOUT_MS");
        let cfg = RuntimeConfig::from_env();
        assert_eq!(cfg.poll_timeout, Duration::from_millis(500));
    }
}
