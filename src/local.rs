// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// In-process endpoints. Negotiation creates the rings and starts a worker
// thread that runs the driver side of the handshake, so a session can be
// exercised end to end without a remote audio service.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::config::ThreadPriority;
use crate::driver::{ReadDriver, WriteDriver};
use crate::endpoint::{
    EndpointError, EndpointResult, StreamEndpoint, StreamInEndpoint, StreamOutCallback,
    StreamOutEndpoint,
};
use crate::ring::ChannelPair;
use crate::rt_prio;
use crate::status::{HalResult, PresentationPosition, ReadStatus, WriteStatus};

/// How long a worker sleeps on the flag before checking for shutdown.
const WORKER_POLL: Duration = Duration::from_millis(20);

/// Consumes playback data on the worker thread.
pub trait RenderSink: Send + 'static {
    fn render(&mut self, bytes: &[u8]) -> WriteStatus;
}

impl<F> RenderSink for F
where
    F: FnMut(&[u8]) -> WriteStatus + Send + 'static,
{
    fn render(&mut self, bytes: &[u8]) -> WriteStatus {
        self(bytes)
    }
}

/// Produces capture data on the worker thread.
pub trait CaptureSource: Send + 'static {
    fn capture(&mut self, buf: &mut [u8]) -> ReadStatus;
}

impl<F> CaptureSource for F
where
    F: FnMut(&mut [u8]) -> ReadStatus + Send + 'static,
{
    fn capture(&mut self, buf: &mut [u8]) -> ReadStatus {
        self(buf)
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Worker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Worker {
    fn spawn<F>(name: String, priority: ThreadPriority, mut serve: F) -> EndpointResult<Self>
    where
        F: FnMut() -> std::io::Result<bool> + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let thread_name = name.clone();
        let handle = std::thread::Builder::new()
            .name(name)
            .spawn(move || {
                if !priority.is_normal() {
                    let applied = rt_prio::apply_thread_priority(
                        priority,
                        WORKER_POLL.as_nanos() as u64,
                    );
                    debug!(thread = %thread_name, ?priority, applied, "worker priority");
                }
                while !flag.load(Ordering::Acquire) {
                    if let Err(e) = serve() {
                        error!(thread = %thread_name, "driver worker failed: {e}");
                        break;
                    }
                }
            })
            .map_err(|e| EndpointError::Transport(format!("failed to spawn driver worker: {e}")))?;
        Ok(Self { stop, handle })
    }

    fn shutdown(self) {
        self.stop.store(true, Ordering::Release);
        if self.handle.join().is_err() {
            warn!("driver worker panicked");
        }
    }
}

fn channel_size(fixed: Option<usize>, requested: usize) -> EndpointResult<usize> {
    match fixed.unwrap_or(requested) {
        0 => Err(EndpointError::Remote(HalResult::InvalidArguments)),
        n => Ok(n),
    }
}

fn setup_failed(name: &str, err: std::io::Error) -> EndpointError {
    warn!(name, "failed to create driver channels: {err}");
    EndpointError::Remote(HalResult::NotInitialized)
}

/// Playback endpoint served by a [`WriteDriver`] on a worker thread.
pub struct LocalOutEndpoint {
    name: String,
    buffer_size: Option<usize>,
    sink: Mutex<Option<Box<dyn RenderSink>>>,
    worker: Mutex<Option<Worker>>,
    last_position: Arc<Mutex<Result<PresentationPosition, HalResult>>>,
    callback: Mutex<Option<Arc<dyn StreamOutCallback>>>,
}

impl LocalOutEndpoint {
    /// `name` prefixes the shared-memory rings and must be unique among
    /// live streams.
    pub fn new(name: &str, sink: impl RenderSink) -> Self {
        Self {
            name: name.to_owned(),
            buffer_size: None,
            sink: Mutex::new(Some(Box::new(sink))),
            worker: Mutex::new(None),
            last_position: Arc::new(Mutex::new(Err(HalResult::InvalidState))),
            callback: Mutex::new(None),
        }
    }

    /// Size the data ring at `bytes` no matter what the client asks for.
    pub fn with_buffer_size(mut self, bytes: usize) -> Self {
        self.buffer_size = Some(bytes);
        self
    }

    /// The callback the session registered, for delivering notifications.
    pub fn callback(&self) -> Option<Arc<dyn StreamOutCallback>> {
        lock(&self.callback).clone()
    }

    fn stop_worker(&self) {
        if let Some(worker) = lock(&self.worker).take() {
            worker.shutdown();
        }
    }
}

impl StreamEndpoint for LocalOutEndpoint {
    fn buffer_size(&self) -> EndpointResult<usize> {
        self.buffer_size.ok_or(EndpointError::Remote(HalResult::NotSupported))
    }

    fn close(&self) -> EndpointResult<()> {
        self.stop_worker();
        Ok(())
    }
}

impl StreamOutEndpoint for LocalOutEndpoint {
    fn prepare_for_writing(
        &self,
        _burst_count: u32,
        buffer_size: usize,
        priority: ThreadPriority,
    ) -> EndpointResult<ChannelPair> {
        let mut worker = lock(&self.worker);
        if worker.is_some() {
            return Err(EndpointError::Remote(HalResult::InvalidState));
        }
        let size = channel_size(self.buffer_size, buffer_size)?;
        let mut sink = lock(&self.sink).take().ok_or(EndpointError::Remote(HalResult::InvalidState))?;

        let (mut driver, pair) =
            WriteDriver::create(&self.name, size).map_err(|e| setup_failed(&self.name, e))?;
        let last_position = Arc::clone(&self.last_position);
        *worker = Some(Worker::spawn(format!("{}-writer", self.name), priority, move || {
            driver.serve(WORKER_POLL, |bytes| {
                let status = sink.render(bytes);
                *lock(&last_position) = status.position();
                status
            })
        })?);
        debug!(name = %self.name, size, "write channels created");
        Ok(pair)
    }

    fn presentation_position(&self) -> EndpointResult<PresentationPosition> {
        (*lock(&self.last_position)).map_err(EndpointError::Remote)
    }

    fn set_callback(&self, callback: Arc<dyn StreamOutCallback>) -> EndpointResult<()> {
        *lock(&self.callback) = Some(callback);
        Ok(())
    }

    fn clear_callback(&self) -> EndpointResult<()> {
        *lock(&self.callback) = None;
        Ok(())
    }
}

impl Drop for LocalOutEndpoint {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

/// Capture endpoint served by a [`ReadDriver`] on a worker thread.
pub struct LocalInEndpoint {
    name: String,
    buffer_size: Option<usize>,
    source: Mutex<Option<Box<dyn CaptureSource>>>,
    worker: Mutex<Option<Worker>>,
}

impl LocalInEndpoint {
    pub fn new(name: &str, source: impl CaptureSource) -> Self {
        Self {
            name: name.to_owned(),
            buffer_size: None,
            source: Mutex::new(Some(Box::new(source))),
            worker: Mutex::new(None),
        }
    }

    pub fn with_buffer_size(mut self, bytes: usize) -> Self {
        self.buffer_size = Some(bytes);
        self
    }

    fn stop_worker(&self) {
        if let Some(worker) = lock(&self.worker).take() {
            worker.shutdown();
        }
    }
}

impl StreamEndpoint for LocalInEndpoint {
    fn buffer_size(&self) -> EndpointResult<usize> {
        self.buffer_size.ok_or(EndpointError::Remote(HalResult::NotSupported))
    }

    fn close(&self) -> EndpointResult<()> {
        self.stop_worker();
        Ok(())
    }
}

impl StreamInEndpoint for LocalInEndpoint {
    fn prepare_for_reading(
        &self,
        _burst_count: u32,
        buffer_size: usize,
        priority: ThreadPriority,
    ) -> EndpointResult<ChannelPair> {
        let mut worker = lock(&self.worker);
        if worker.is_some() {
            return Err(EndpointError::Remote(HalResult::InvalidState));
        }
        let size = channel_size(self.buffer_size, buffer_size)?;
        let mut source =
            lock(&self.source).take().ok_or(EndpointError::Remote(HalResult::InvalidState))?;

        let (mut driver, pair) =
            ReadDriver::create(&self.name, size).map_err(|e| setup_failed(&self.name, e))?;
        *worker = Some(Worker::spawn(format!("{}-reader", self.name), priority, move || {
            driver.serve(WORKER_POLL, |buf| source.capture(buf))
        })?);
        debug!(name = %self.name, size, "read channels created");
        Ok(pair)
    }
}

impl Drop for LocalInEndpoint {
    fn drop(&mut self) {
        self.stop_worker();
    }
}
