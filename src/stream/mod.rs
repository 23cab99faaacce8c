// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Client-side stream sessions.
//
// A session owns a remote endpoint and, after the first non-empty transfer,
// a negotiated set of shared-memory rings. Transfers go through the rings
// with an event flag handshake; everything else is forwarded to the endpoint.

mod callback;
mod input;
mod output;
mod position;
mod queues;

pub use callback::SessionCallback;
pub use input::StreamIn;
pub use output::StreamOut;

use crate::endpoint::StreamEndpoint;
use crate::error::{process_return, Result};

/// Operations shared by both stream directions, forwarded to the endpoint.
///
/// Every call fails with `NotInitialized` once the session is closed.
pub trait StreamOps {
    type Endpoint: StreamEndpoint + ?Sized;

    /// The live endpoint, or `NotInitialized` after `close`.
    fn endpoint(&self) -> Result<&Self::Endpoint>;

    fn sample_rate(&self) -> Result<u32> {
        process_return("sample_rate", self.endpoint()?.sample_rate())
    }

    fn buffer_size(&self) -> Result<usize> {
        process_return("buffer_size", self.endpoint()?.buffer_size())
    }

    fn channel_mask(&self) -> Result<u32> {
        process_return("channel_mask", self.endpoint()?.channel_mask())
    }

    fn format(&self) -> Result<u32> {
        process_return("format", self.endpoint()?.format())
    }

    fn frame_size(&self) -> Result<usize> {
        process_return("frame_size", self.endpoint()?.frame_size())
    }

    fn standby(&self) -> Result<()> {
        process_return("standby", self.endpoint()?.standby())
    }

    fn start(&self) -> Result<()> {
        process_return("start", self.endpoint()?.start())
    }

    fn stop(&self) -> Result<()> {
        process_return("stop", self.endpoint()?.stop())
    }
}
