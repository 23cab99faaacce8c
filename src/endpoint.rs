// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// The remote stream endpoint: whatever request/response transport reaches the
// audio driver. Sessions only need channel negotiation, the presentation
// position query and `close`; every other operation defaults to NotSupported.

use std::sync::Arc;

use crate::config::ThreadPriority;
use crate::ring::ChannelPair;
use crate::status::{HalResult, PresentationPosition};

/// Failure of one endpoint call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    /// The call never completed (peer died, channel broken, ...).
    #[error("transport failure: {0}")]
    Transport(String),
    /// The call completed with a non-OK result code.
    #[error("endpoint returned {0:?}")]
    Remote(HalResult),
}

pub type EndpointResult<T> = Result<T, EndpointError>;

fn not_supported<T>() -> EndpointResult<T> {
    Err(EndpointError::Remote(HalResult::NotSupported))
}

/// How `drain` should report completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainMode {
    /// Notify when all queued audio has played.
    All,
    /// Notify shortly before the end, for gapless track switches.
    EarlyNotify,
}

/// Notifications an output endpoint delivers asynchronously.
pub trait StreamOutCallback: Send + Sync {
    fn on_write_ready(&self);
    fn on_drain_ready(&self);
    fn on_error(&self);
}

/// Operations common to both stream directions.
pub trait StreamEndpoint: Send + Sync {
    fn sample_rate(&self) -> EndpointResult<u32> {
        not_supported()
    }

    fn buffer_size(&self) -> EndpointResult<usize> {
        not_supported()
    }

    fn channel_mask(&self) -> EndpointResult<u32> {
        not_supported()
    }

    fn format(&self) -> EndpointResult<u32> {
        not_supported()
    }

    fn frame_size(&self) -> EndpointResult<usize> {
        not_supported()
    }

    fn standby(&self) -> EndpointResult<()> {
        not_supported()
    }

    fn start(&self) -> EndpointResult<()> {
        not_supported()
    }

    fn stop(&self) -> EndpointResult<()> {
        not_supported()
    }

    /// Release the remote stream. Called once, when the session closes.
    fn close(&self) -> EndpointResult<()>;
}

/// Playback side of the remote endpoint.
pub trait StreamOutEndpoint: StreamEndpoint {
    /// Create the data ring (sized for `buffer_size` bytes), the status ring
    /// and the event flag word for writing.
    fn prepare_for_writing(
        &self,
        burst_count: u32,
        buffer_size: usize,
        priority: ThreadPriority,
    ) -> EndpointResult<ChannelPair>;

    fn presentation_position(&self) -> EndpointResult<PresentationPosition>;

    fn latency(&self) -> EndpointResult<u32> {
        not_supported()
    }

    fn set_volume(&self, _left: f32, _right: f32) -> EndpointResult<()> {
        not_supported()
    }

    fn render_position(&self) -> EndpointResult<u32> {
        not_supported()
    }

    fn next_write_timestamp(&self) -> EndpointResult<i64> {
        not_supported()
    }

    fn set_callback(&self, _callback: Arc<dyn StreamOutCallback>) -> EndpointResult<()> {
        not_supported()
    }

    fn clear_callback(&self) -> EndpointResult<()> {
        not_supported()
    }

    /// `(pause, resume)` support.
    fn supports_pause_and_resume(&self) -> EndpointResult<(bool, bool)> {
        Ok((false, false))
    }

    fn pause(&self) -> EndpointResult<()> {
        not_supported()
    }

    fn resume(&self) -> EndpointResult<()> {
        not_supported()
    }

    fn supports_drain(&self) -> EndpointResult<bool> {
        Ok(false)
    }

    fn drain(&self, _mode: DrainMode) -> EndpointResult<()> {
        not_supported()
    }

    fn flush(&self) -> EndpointResult<()> {
        not_supported()
    }
}

/// Capture side of the remote endpoint.
pub trait StreamInEndpoint: StreamEndpoint {
    /// Create the data ring (sized for `buffer_size` bytes), the status ring
    /// and the event flag word for reading.
    fn prepare_for_reading(
        &self,
        burst_count: u32,
        buffer_size: usize,
        priority: ThreadPriority,
    ) -> EndpointResult<ChannelPair>;

    fn set_gain(&self, _gain: f32) -> EndpointResult<()> {
        not_supported()
    }

    fn input_frames_lost(&self) -> EndpointResult<u32> {
        not_supported()
    }

    /// `(frames, time_ns)` of the most recent capture.
    fn capture_position(&self) -> EndpointResult<(i64, i64)> {
        not_supported()
    }
}
