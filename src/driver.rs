// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Driver side of the ring handshake: creates the channels a session
// negotiates and serves one transfer per signal.

use std::io;
use std::time::{Duration, Instant};

use tracing::{trace, warn};

use crate::event_flag::{EventFlag, WaitOutcome};
use crate::ring::{ChannelPair, RingChannel};
use crate::status::{flag_bits, ReadStatus, WriteStatus};

struct DriverQueues<S: Copy + 'static> {
    data: RingChannel<u8>,
    status: RingChannel<S>,
    flag: EventFlag,
    scratch: Vec<u8>,
}

impl<S: Copy + 'static> DriverQueues<S> {
    /// Rings are `{name}_data` (with the event flag) and `{name}_status`
    /// (one record).
    fn create(name: &str, buffer_size: usize) -> io::Result<(Self, ChannelPair)> {
        let data = RingChannel::<u8>::create(&format!("{name}_data"), buffer_size, true)?;
        let status = RingChannel::<S>::create(&format!("{name}_status"), 1, false)?;
        let flag = EventFlag::attach(&data)?;
        let pair = ChannelPair { data: data.descriptor(), status: status.descriptor() };
        let queues = Self { data, status, flag, scratch: vec![0; buffer_size] };
        Ok((queues, pair))
    }

    /// Wait until `bits` is signalled or `timeout` passes.
    fn wait_signalled(&self, bits: u32, timeout: Duration) -> io::Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.flag.wait(bits, left)? {
                WaitOutcome::Signalled(_) => return Ok(true),
                WaitOutcome::TimedOut => return Ok(false),
                WaitOutcome::Interrupted if left.is_zero() => return Ok(false),
                WaitOutcome::Interrupted => {}
            }
        }
    }
}

/// Serves a playback session: consumes what the client queued and answers
/// each transfer with a [`WriteStatus`].
pub struct WriteDriver {
    queues: DriverQueues<WriteStatus>,
}

impl WriteDriver {
    /// Create the channels for a session that writes up to `buffer_size`
    /// bytes per transfer. The returned pair goes back to the client.
    pub fn create(name: &str, buffer_size: usize) -> io::Result<(Self, ChannelPair)> {
        let (queues, pair) = DriverQueues::create(name, buffer_size)?;
        Ok((Self { queues }, pair))
    }

    pub fn capacity(&self) -> usize {
        self.queues.data.capacity()
    }

    /// Serve one transfer: wait for NOT_EMPTY, hand everything queued to
    /// `render`, post the status it returns and signal NOT_FULL.
    ///
    /// Returns `Ok(false)` if the client sent nothing within `timeout`.
    pub fn serve<F>(&mut self, timeout: Duration, render: F) -> io::Result<bool>
    where
        F: FnOnce(&[u8]) -> WriteStatus,
    {
        let q = &mut self.queues;
        if !q.wait_signalled(flag_bits::NOT_EMPTY, timeout)? {
            return Ok(false);
        }

        let count = q.data.available_to_read().min(q.scratch.len());
        let chunk = &mut q.scratch[..count];
        if !q.data.read(chunk) {
            warn!(count, "driver data queue read failed");
        }
        let status = render(&chunk[..]);
        trace!(count, written = status.written, "write transfer served");

        if !q.status.write_one(&status) {
            warn!("driver status queue full, dropping write status");
        }
        q.flag.wake(flag_bits::NOT_FULL)?;
        Ok(true)
    }
}

/// Serves a capture session: fills the ring whenever the client frees it and
/// answers each fill with a [`ReadStatus`].
pub struct ReadDriver {
    queues: DriverQueues<ReadStatus>,
}

impl ReadDriver {
    /// Create the channels for a session that reads up to `buffer_size`
    /// bytes per transfer.
    pub fn create(name: &str, buffer_size: usize) -> io::Result<(Self, ChannelPair)> {
        let (queues, pair) = DriverQueues::create(name, buffer_size)?;
        Ok((Self { queues }, pair))
    }

    pub fn capacity(&self) -> usize {
        self.queues.data.capacity()
    }

    /// Serve one transfer: wait for NOT_FULL, let `capture` fill the free
    /// space, queue what it reports as read, post the status and signal
    /// NOT_EMPTY.
    ///
    /// Returns `Ok(false)` if the client asked for nothing within `timeout`.
    pub fn serve<F>(&mut self, timeout: Duration, capture: F) -> io::Result<bool>
    where
        F: FnOnce(&mut [u8]) -> ReadStatus,
    {
        let q = &mut self.queues;
        if !q.wait_signalled(flag_bits::NOT_FULL, timeout)? {
            return Ok(false);
        }

        let free = q.data.available_to_write().min(q.scratch.len());
        let chunk = &mut q.scratch[..free];
        let status = capture(&mut chunk[..]);
        let produced = if status.read_result().is_ok() { (status.read as usize).min(free) } else { 0 };
        if !q.data.write(&chunk[..produced]) {
            warn!(produced, "driver data queue write failed");
        }
        trace!(produced, "read transfer served");

        if !q.status.write_one(&status) {
            warn!("driver status queue full, dropping read status");
        }
        q.flag.wake(flag_bits::NOT_EMPTY)?;
        Ok(true)
    }
}
