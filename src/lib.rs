// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Shared-memory audio stream transport. A client session negotiates a data
// ring, a one-record status ring and an event flag word with its driver, then
// moves audio through them with a NOT_EMPTY / NOT_FULL handshake. Control
// operations go through a request/response endpoint.

#[cfg(not(unix))]
compile_error!("libhalstream needs POSIX shared memory");

pub mod shm_name;

mod platform;

mod shm;
pub use shm::{ShmHandle, ShmOpenMode};

mod ring;
pub use ring::{ChannelPair, RingChannel, RingChannelDescriptor, HEADER_SIZE};

mod event_flag;
pub use event_flag::{EventFlag, WaitOutcome};

pub mod status;
pub use status::{flag_bits, HalResult, PresentationPosition, ReadStatus, TimeSpec, WriteStatus};

mod error;
pub use error::{Result, StreamError};

pub mod config;
pub use config::{ConfigError, ReadMismatchPolicy, StreamConfig, ThreadPriority};

pub mod endpoint;
pub use endpoint::{
    DrainMode, EndpointError, EndpointResult, StreamEndpoint, StreamInEndpoint, StreamOutCallback,
    StreamOutEndpoint,
};

pub mod stream;
pub use stream::{SessionCallback, StreamIn, StreamOps, StreamOut};

pub mod driver;
pub use driver::{ReadDriver, WriteDriver};

pub mod local;
pub use local::{CaptureSource, LocalInEndpoint, LocalOutEndpoint, RenderSink};

pub mod rt_prio;
