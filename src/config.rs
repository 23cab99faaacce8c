// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Per-stream session configuration, loadable from TOML.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Scheduling hint for the driver thread that serves a stream's rings.
/// Passed to the endpoint during channel negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize)]
#[serde(transparent)]
pub struct ThreadPriority(pub i32);

impl ThreadPriority {
    pub const NORMAL: ThreadPriority = ThreadPriority(0);

    pub fn is_normal(self) -> bool {
        self == Self::NORMAL
    }
}

/// What a read does when the ring and the status record disagree on how
/// many bytes were produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadMismatchPolicy {
    /// Log it; the status record's count is reported.
    #[default]
    Warn,
    /// Report the smaller of the two counts.
    Min,
    /// Fail the read with `InconsistentRead`.
    Fail,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    #[serde(default = "defaults::burst_count")]
    pub burst_count: u32,
    #[serde(default)]
    pub thread_priority: ThreadPriority,
    #[serde(default = "defaults::wait_timeout_ms")]
    pub wait_timeout_ms: u64,
    #[serde(default = "defaults::max_wait_retries")]
    pub max_wait_retries: u32,
    #[serde(default = "defaults::position_cache_window_us")]
    pub position_cache_window_us: u64,
    #[serde(default)]
    pub read_mismatch: ReadMismatchPolicy,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),
}

mod defaults {
    pub fn burst_count() -> u32 {
        1
    }

    pub fn wait_timeout_ms() -> u64 {
        1000
    }

    pub fn max_wait_retries() -> u32 {
        1
    }

    pub fn position_cache_window_us() -> u64 {
        1000
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            burst_count: defaults::burst_count(),
            thread_priority: ThreadPriority::NORMAL,
            wait_timeout_ms: defaults::wait_timeout_ms(),
            max_wait_retries: defaults::max_wait_retries(),
            position_cache_window_us: defaults::position_cache_window_us(),
            read_mismatch: ReadMismatchPolicy::Warn,
        }
    }
}

impl StreamConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    /// How long one event flag wait may block.
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    /// How old a cached presentation position may be and still be served.
    pub fn position_cache_window(&self) -> Duration {
        Duration::from_micros(self.position_cache_window_us)
    }

    /// Set the wait bound, rounded up to whole milliseconds.
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        let millis = timeout.as_nanos().div_ceil(1_000_000);
        self.wait_timeout_ms = u64::try_from(millis).unwrap_or(u64::MAX);
        self
    }

    pub fn with_position_cache_window(mut self, window: Duration) -> Self {
        self.position_cache_window_us = window.as_micros() as u64;
        self
    }

    pub fn with_thread_priority(mut self, priority: ThreadPriority) -> Self {
        self.thread_priority = priority;
        self
    }

    pub fn with_read_mismatch(mut self, policy: ReadMismatchPolicy) -> Self {
        self.read_mismatch = policy;
        self
    }
}
