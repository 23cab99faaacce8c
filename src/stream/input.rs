// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Capture session: the read handshake.

use std::sync::Arc;

use tracing::{debug, warn};

use super::queues::{wait_failed, Channels, MessageQueues};
use super::StreamOps;
use crate::config::{ReadMismatchPolicy, StreamConfig};
use crate::endpoint::StreamInEndpoint;
use crate::error::{process_return, process_status, Result, StreamError};
use crate::status::{flag_bits, ReadStatus};

/// Client-side capture stream.
///
/// The first non-empty [`read`] negotiates channels sized for that read and
/// primes the driver with NOT_FULL so it starts producing.
///
/// [`read`]: StreamIn::read
pub struct StreamIn<E: StreamInEndpoint> {
    endpoint: Option<Arc<E>>,
    config: StreamConfig,
    channels: Channels<ReadStatus>,
}

impl<E: StreamInEndpoint> StreamIn<E> {
    pub fn new(endpoint: Arc<E>, config: StreamConfig) -> Self {
        Self { endpoint: Some(endpoint), config, channels: Channels::Unprepared }
    }

    pub fn is_prepared(&self) -> bool {
        matches!(self.channels, Channels::Ready(_))
    }

    pub fn ring_capacity(&self) -> Option<usize> {
        self.channels.queues().ok().map(|q| q.data.capacity())
    }

    /// Fill `buffer` with captured bytes. Returns how many are valid.
    pub fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        if self.endpoint.is_none() {
            return Err(StreamError::NotInitialized);
        }
        if self.channels.is_unprepared() {
            if buffer.is_empty() {
                return Ok(0);
            }
            self.prepare_for_reading(buffer.len())?;
            self.channels.queues()?.flag.wake(flag_bits::NOT_FULL).map_err(wait_failed)?;
        }

        let queues = self.channels.queues()?;
        queues.wait(flag_bits::NOT_EMPTY, &self.config)?;

        let available = queues.data.available_to_read();
        let count = buffer.len().min(available);
        if !queues.data.read(&mut buffer[..count]) {
            warn!(count, "data message queue read failed");
        }
        let status = queues.status.read_one();
        queues.flag.wake(flag_bits::NOT_FULL).map_err(wait_failed)?;

        let status = status.ok_or_else(|| {
            warn!("status message queue empty after NOT_EMPTY");
            StreamError::NotInitialized
        })?;
        process_status("read", status.read_result())?;

        let reported = status.read as usize;
        if reported == available {
            return Ok(reported.min(count));
        }
        match self.config.read_mismatch {
            ReadMismatchPolicy::Warn => {
                warn!(ring = available, status = reported, "read report inconsistent");
                Ok(reported.min(buffer.len()))
            }
            ReadMismatchPolicy::Min => {
                debug!(ring = available, status = reported, "read report inconsistent");
                Ok(reported.min(count))
            }
            ReadMismatchPolicy::Fail => {
                warn!(ring = available, status = reported, "read report inconsistent");
                Err(StreamError::InconsistentRead { ring: available, status: reported })
            }
        }
    }

    fn prepare_for_reading(&mut self, buffer_size: usize) -> Result<()> {
        let endpoint = self.endpoint.as_ref().ok_or(StreamError::NotInitialized)?;
        let reply = endpoint.prepare_for_reading(
            self.config.burst_count,
            buffer_size,
            self.config.thread_priority,
        );
        let attached = process_return("prepare_for_reading", reply)
            .and_then(|pair| MessageQueues::attach(&pair, "reading"));
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

    pub fn set_gain(&self, gain: f32) -> Result<()> {
        process_return("set_gain", self.endpoint()?.set_gain(gain))
    }

    pub fn input_frames_lost(&self) -> Result<u32> {
        process_return("input_frames_lost", self.endpoint()?.input_frames_lost())
    }

    /// `(frames, time_ns)` of the most recent capture.
    pub fn capture_position(&self) -> Result<(i64, i64)> {
        process_return("capture_position", self.endpoint()?.capture_position())
    }

    pub fn close(&mut self) -> Result<()> {
        let Some(endpoint) = self.endpoint.take() else {
            return Ok(());
        };
        self.channels = Channels::Unprepared;
        debug!("closing input stream");
        process_return("close", endpoint.close())
    }
}

impl<E: StreamInEndpoint> StreamOps for StreamIn<E> {
    type Endpoint = E;

    fn endpoint(&self) -> Result<&E> {
        self.endpoint.as_deref().ok_or(StreamError::NotInitialized)
    }
}

impl<E: StreamInEndpoint> Drop for StreamIn<E> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
