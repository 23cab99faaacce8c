// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Playback session: the write handshake, the presentation position cache and
// asynchronous callbacks.

use std::sync::{Arc, Weak};

use tracing::{debug, warn};

use super::callback::{CallbackSlot, SessionCallback};
use super::position::PositionCache;
use super::queues::{wait_failed, Channels, MessageQueues};
use super::StreamOps;
use crate::config::StreamConfig;
use crate::endpoint::{DrainMode, StreamOutCallback, StreamOutEndpoint};
use crate::error::{process_return, process_status, Result, StreamError};
use crate::status::{flag_bits, PresentationPosition, WriteStatus};

/// Client-side playback stream.
///
/// Channels are negotiated lazily by the first non-empty [`write`], sized for
/// that write. A negotiation failure is final: later writes fail with
/// `NotInitialized`.
///
/// [`write`]: StreamOut::write
pub struct StreamOut<E: StreamOutEndpoint> {
    endpoint: Option<Arc<E>>,
    config: StreamConfig,
    channels: Channels<WriteStatus>,
    position: PositionCache,
    callbacks: Arc<CallbackSlot>,
}

impl<E: StreamOutEndpoint> StreamOut<E> {
    pub fn new(endpoint: Arc<E>, config: StreamConfig) -> Self {
        let position = PositionCache::new(config.position_cache_window());
        Self {
            endpoint: Some(endpoint),
            config,
            channels: Channels::Unprepared,
            position,
            callbacks: Arc::default(),
        }
    }

    /// Whether channels have been negotiated and attached.
    pub fn is_prepared(&self) -> bool {
        matches!(self.channels, Channels::Ready(_))
    }

    /// Capacity of the data ring, once negotiated.
    pub fn ring_capacity(&self) -> Option<usize> {
        self.channels.queues().ok().map(|q| q.data.capacity())
    }

    /// Queue `buffer` for playback and wait for the driver to consume it.
    ///
    /// Returns the number of bytes the driver reports as written, never more
    /// than were handed over. At most the ring's free space is handed over
    /// per call; the caller resubmits the rest.
    ///
    /// After a `Timeout` the abandoned transfer's status is still owed. The
    /// next write consumes it, so its count (and position) belong to the
    /// previous transfer while its own bytes stay queued. Counts run one
    /// transfer behind until a write times out again or the stream closes.
    pub fn write(&mut self, buffer: &[u8]) -> Result<usize> {
        if self.endpoint.is_none() {
            return Err(StreamError::NotInitialized);
        }
        if self.channels.is_unprepared() {
            if buffer.is_empty() {
                // Probe write; the ring size would be meaningless.
                if self.callbacks.is_set() {
                    warn!("first call to async write with 0 bytes");
                }
                return Ok(0);
            }
            self.prepare_for_writing(buffer.len())?;
        }

        let queues = self.channels.queues()?;
        let count = buffer.len().min(queues.data.available_to_write());
        if !queues.data.write(&buffer[..count]) {
            warn!(count, "data message queue write failed");
        }
        queues.flag.wake(flag_bits::NOT_EMPTY).map_err(wait_failed)?;
        queues.wait(flag_bits::NOT_FULL, &self.config)?;

        let status = queues.status.read_one().ok_or_else(|| {
            warn!("status message queue empty after NOT_FULL");
            StreamError::NotInitialized
        })?;
        process_status("write", status.write_result())?;

        let outcome = status.position().map_err(StreamError::from);
        if let Err(err) = &outcome {
            debug!(%err, "write status carries no presentation position");
        }
        self.position.record(outcome);

        let written = usize::try_from(status.written).unwrap_or(usize::MAX);
        if written > count {
            warn!(written, count, "driver reports more bytes written than were queued");
        }
        Ok(written.min(count))
    }

    fn prepare_for_writing(&mut self, buffer_size: usize) -> Result<()> {
        let endpoint = self.endpoint.as_ref().ok_or(StreamError::NotInitialized)?;
        let reply = endpoint.prepare_for_writing(
            self.config.burst_count,
            buffer_size,
            self.config.thread_priority,
        );
        let attached = process_return("prepare_for_writing", reply)
            .and_then(|pair| MessageQueues::attach(&pair, "writing"));
        match attached {
            Ok(queues) => {
                self.channels = Channels::Ready(queues);
                Ok(())
            }
            Err(err) => {
                self.channels = Channels::Failed;
                Err(err)
            }
        }
    }

    /// Frames presented so far and when, served from the last write's status
    /// while it is younger than the configured window.
    pub fn presentation_position(&mut self) -> Result<PresentationPosition> {
        let endpoint = self.endpoint.as_ref().ok_or(StreamError::NotInitialized)?;
        self.position
            .query(|| process_return("presentation_position", endpoint.presentation_position()))
    }

    pub fn latency(&self) -> Result<u32> {
        process_return("latency", self.endpoint()?.latency())
    }

    pub fn set_volume(&self, left: f32, right: f32) -> Result<()> {
        process_return("set_volume", self.endpoint()?.set_volume(left, right))
    }

    pub fn render_position(&self) -> Result<u32> {
        process_return("render_position", self.endpoint()?.render_position())
    }

    pub fn next_write_timestamp(&self) -> Result<i64> {
        process_return("next_write_timestamp", self.endpoint()?.next_write_timestamp())
    }

    /// Register `handler` for asynchronous notifications. The session holds
    /// it weakly; notifications arriving after the handler or the session is
    /// gone are dropped.
    pub fn set_callback(&mut self, handler: Weak<dyn StreamOutCallback>) -> Result<()> {
        let proxy: Arc<dyn StreamOutCallback> = Arc::new(SessionCallback::new(&self.callbacks));
        process_return("set_callback", self.endpoint()?.set_callback(proxy))?;
        self.callbacks.set(handler);
        Ok(())
    }

    pub fn clear_callback(&mut self) -> Result<()> {
        let reply = process_return("clear_callback", self.endpoint()?.clear_callback());
        self.callbacks.clear();
        reply
    }

    /// `(pause, resume)` support.
    pub fn supports_pause_and_resume(&self) -> Result<(bool, bool)> {
        process_return("supports_pause_and_resume", self.endpoint()?.supports_pause_and_resume())
    }

    pub fn pause(&self) -> Result<()> {
        process_return("pause", self.endpoint()?.pause())
    }

    pub fn resume(&self) -> Result<()> {
        process_return("resume", self.endpoint()?.resume())
    }

    pub fn supports_drain(&self) -> Result<bool> {
        process_return("supports_drain", self.endpoint()?.supports_drain())
    }

    pub fn drain(&self, mode: DrainMode) -> Result<()> {
        process_return("drain", self.endpoint()?.drain(mode))
    }

    pub fn flush(&self) -> Result<()> {
        process_return("flush", self.endpoint()?.flush())
    }

    /// Release the endpoint and the channels. Idempotent; every later call
    /// fails with `NotInitialized`.
    pub fn close(&mut self) -> Result<()> {
        let Some(endpoint) = self.endpoint.take() else {
            return Ok(());
        };
        if self.callbacks.is_set() {
            // Best effort; the endpoint is closed regardless.
            let _ = process_return("clear_callback", endpoint.clear_callback());
            self.callbacks.clear();
        }
        self.channels = Channels::Unprepared;
        debug!("closing output stream");
        process_return("close", endpoint.close())
    }
}

impl<E: StreamOutEndpoint> StreamOps for StreamOut<E> {
    type Endpoint = E;

    fn endpoint(&self) -> Result<&E> {
        self.endpoint.as_deref().ok_or(StreamError::NotInitialized)
    }
}

impl<E: StreamOutEndpoint> Drop for StreamOut<E> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
