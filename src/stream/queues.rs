// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// The client's view of a negotiated channel set: data ring, status ring and
// the event flag on the data ring, attached together or not at all.

use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::event_flag::{EventFlag, WaitOutcome};
use crate::ring::{ChannelPair, RingChannel};

pub(crate) struct MessageQueues<S: Copy + 'static> {
    pub(crate) data: RingChannel<u8>,
    pub(crate) status: RingChannel<S>,
    pub(crate) flag: EventFlag,
}

/// Negotiation state of a session.
pub(crate) enum Channels<S: Copy + 'static> {
    Unprepared,
    Ready(MessageQueues<S>),
    /// Negotiation failed; the session cannot stream any more.
    Failed,
}

impl<S: Copy + 'static> Channels<S> {
    pub(crate) fn is_unprepared(&self) -> bool {
        matches!(self, Channels::Unprepared)
    }

    pub(crate) fn queues(&self) -> Result<&MessageQueues<S>> {
        match self {
            Channels::Ready(queues) => Ok(queues),
            Channels::Unprepared | Channels::Failed => Err(StreamError::NotInitialized),
        }
    }
}

pub(crate) fn wait_failed(err: std::io::Error) -> StreamError {
    error!("event flag operation failed: {err}");
    StreamError::WaitFailed(err.to_string())
}

impl<S: Copy + 'static> MessageQueues<S> {
    /// Map both rings of `pair` and attach the event flag. Nothing is kept
    /// unless all three succeed.
    pub(crate) fn attach(pair: &ChannelPair, direction: &'static str) -> Result<Self> {
        let setup_failure = |what: &str, err: std::io::Error| {
            error!(direction, "{what} is invalid: {err}");
            StreamError::ChannelSetupFailure(format!("{what} for {direction}: {err}"))
        };

        let data = RingChannel::<u8>::open(&pair.data)
            .map_err(|e| setup_failure("data message queue", e))?;
        let status = RingChannel::<S>::open(&pair.status)
            .map_err(|e| setup_failure("status message queue", e))?;
        let flag = EventFlag::attach(&data).map_err(|e| setup_failure("event flag", e))?;

        debug!(direction, capacity = data.capacity(), "message queues attached");
        Ok(Self { data, status, flag })
    }

    /// Wait for `bits`, absorbing up to `config.max_wait_retries`
    /// interrupted waits. Anything beyond that is a timeout.
    pub(crate) fn wait(&self, bits: u32, config: &StreamConfig) -> Result<u32> {
        let timeout = config.wait_timeout();
        let deadline = Instant::now() + timeout;
        let mut retries = 0;
        loop {
            // A retry only gets what is left of the original bound.
            let left = if retries == 0 { timeout } else { deadline.saturating_duration_since(Instant::now()) };
            match self.flag.wait(bits, left).map_err(wait_failed)? {
                WaitOutcome::Signalled(set) => return Ok(set),
                WaitOutcome::TimedOut => {
                    debug!(bits, ?timeout, "event flag wait timed out");
                    return Err(StreamError::Timeout);
                }
                WaitOutcome::Interrupted if retries < config.max_wait_retries && left > Duration::ZERO => {
                    retries += 1;
                    debug!(bits, retries, "event flag wait interrupted, retrying");
                }
                WaitOutcome::Interrupted => {
                    warn!(bits, retries, "event flag wait kept getting interrupted");
                    return Err(StreamError::Timeout);
                }
            }
        }
    }
}
