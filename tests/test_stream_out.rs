// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Playback sessions against local and scripted endpoints.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

use libhalstream::{
    ChannelPair, EndpointError, EndpointResult, HalResult, LocalOutEndpoint,
    PresentationPosition, RingChannelDescriptor, StreamConfig, StreamEndpoint, StreamError,
    StreamOps, StreamOut, StreamOutCallback, StreamOutEndpoint, ThreadPriority, TimeSpec,
    WriteDriver, WriteStatus,
};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unique_name(prefix: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_out_{n}_{}", std::process::id())
}

fn quick_config() -> StreamConfig {
    StreamConfig::default().with_wait_timeout(Duration::from_millis(500))
}

fn position_for(total_bytes: usize) -> PresentationPosition {
    PresentationPosition { frames: (total_bytes / 4) as u64, timestamp: TimeSpec::new(7, 0) }
}

/// Local endpoint whose sink records everything it is handed.
fn recording_endpoint(name: &str) -> (LocalOutEndpoint, Arc<Mutex<Vec<u8>>>) {
    let played = Arc::new(Mutex::new(Vec::new()));
    let sink_log = Arc::clone(&played);
    let endpoint = LocalOutEndpoint::new(name, move |bytes: &[u8]| {
        let mut log = sink_log.lock().unwrap();
        log.extend_from_slice(bytes);
        WriteStatus::ok(bytes.len(), position_for(log.len()))
    });
    (endpoint, played)
}

// ========== Scripted endpoints ==========

/// Fails negotiation and position queries with a fixed error.
struct RefusingOut {
    reply: EndpointError,
    prepare_calls: AtomicUsize,
    position_calls: AtomicUsize,
}

impl RefusingOut {
    fn new(reply: EndpointError) -> Self {
        Self { reply, prepare_calls: AtomicUsize::new(0), position_calls: AtomicUsize::new(0) }
    }
}

impl StreamEndpoint for RefusingOut {
    fn close(&self) -> EndpointResult<()> {
        Ok(())
    }
}

impl StreamOutEndpoint for RefusingOut {
    fn prepare_for_writing(&self, _: u32, _: usize, _: ThreadPriority) -> EndpointResult<ChannelPair> {
        self.prepare_calls.fetch_add(1, Ordering::Relaxed);
        Err(self.reply.clone())
    }

    fn presentation_position(&self) -> EndpointResult<PresentationPosition> {
        self.position_calls.fetch_add(1, Ordering::Relaxed);
        Err(self.reply.clone())
    }
}

/// Counts position round trips on top of a local endpoint.
struct CountingOut {
    inner: LocalOutEndpoint,
    position_calls: AtomicUsize,
}

impl StreamEndpoint for CountingOut {
    fn close(&self) -> EndpointResult<()> {
        self.inner.close()
    }
}

impl StreamOutEndpoint for CountingOut {
    fn prepare_for_writing(
        &self,
        burst_count: u32,
        buffer_size: usize,
        priority: ThreadPriority,
    ) -> EndpointResult<ChannelPair> {
        self.inner.prepare_for_writing(burst_count, buffer_size, priority)
    }

    fn presentation_position(&self) -> EndpointResult<PresentationPosition> {
        self.position_calls.fetch_add(1, Ordering::Relaxed);
        self.inner.presentation_position()
    }
}

/// Creates real channels but leaves serving them to the test.
struct StalledOut {
    name: String,
    driver: Mutex<Option<WriteDriver>>,
}

impl StreamEndpoint for StalledOut {
    fn close(&self) -> EndpointResult<()> {
        Ok(())
    }
}

impl StreamOutEndpoint for StalledOut {
    fn prepare_for_writing(&self, _: u32, size: usize, _: ThreadPriority) -> EndpointResult<ChannelPair> {
        let (driver, pair) = WriteDriver::create(&self.name, size)
            .map_err(|e| EndpointError::Transport(e.to_string()))?;
        *self.driver.lock().unwrap() = Some(driver);
        Ok(pair)
    }

    fn presentation_position(&self) -> EndpointResult<PresentationPosition> {
        Err(EndpointError::Remote(HalResult::InvalidState))
    }
}

/// Hands out descriptors for rings that do not exist.
struct BogusOut;

impl StreamEndpoint for BogusOut {
    fn close(&self) -> EndpointResult<()> {
        Ok(())
    }
}

impl StreamOutEndpoint for BogusOut {
    fn prepare_for_writing(&self, _: u32, size: usize, _: ThreadPriority) -> EndpointResult<ChannelPair> {
        let missing = |suffix: &str, element_size: usize, has_event_flag: bool| RingChannelDescriptor {
            shm_name: unique_name(suffix),
            capacity: size,
            element_size,
            has_event_flag,
        };
        Ok(ChannelPair {
            data: missing("bogus_data", 1, true),
            status: missing("bogus_status", std::mem::size_of::<WriteStatus>(), false),
        })
    }

    fn presentation_position(&self) -> EndpointResult<PresentationPosition> {
        Err(EndpointError::Remote(HalResult::NotSupported))
    }
}

/// Creates real channels but advertises an impossible data ring capacity.
struct HugeOut {
    name: String,
    driver: Mutex<Option<WriteDriver>>,
}

impl StreamEndpoint for HugeOut {
    fn close(&self) -> EndpointResult<()> {
        Ok(())
    }
}

impl StreamOutEndpoint for HugeOut {
    fn prepare_for_writing(&self, _: u32, size: usize, _: ThreadPriority) -> EndpointResult<ChannelPair> {
        let (driver, mut pair) = WriteDriver::create(&self.name, size)
            .map_err(|e| EndpointError::Transport(e.to_string()))?;
        *self.driver.lock().unwrap() = Some(driver);
        pair.data.capacity = usize::MAX;
        Ok(pair)
    }

    fn presentation_position(&self) -> EndpointResult<PresentationPosition> {
        Err(EndpointError::Remote(HalResult::NotSupported))
    }
}

#[derive(Default)]
struct DrainCounter {
    drains: AtomicUsize,
    errors: AtomicUsize,
}

impl StreamOutCallback for DrainCounter {
    fn on_write_ready(&self) {}

    fn on_drain_ready(&self) {
        self.drains.fetch_add(1, Ordering::Relaxed);
    }

    fn on_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }
}

// ========== Write path ==========

#[test]
fn empty_write_before_negotiation_is_a_probe() {
    let endpoint = Arc::new(RefusingOut::new(EndpointError::Remote(HalResult::InvalidState)));
    let mut stream = StreamOut::new(Arc::clone(&endpoint), quick_config());

    assert_eq!(stream.write(&[]), Ok(0));
    assert!(!stream.is_prepared());
    assert_eq!(endpoint.prepare_calls.load(Ordering::Relaxed), 0);
}

#[test]
fn write_is_played_in_order() {
    let (endpoint, played) = recording_endpoint(&unique_name("order"));
    let mut stream = StreamOut::new(Arc::new(endpoint), quick_config());

    let audio: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
    for chunk in audio.chunks(1000) {
        assert_eq!(stream.write(chunk), Ok(chunk.len()));
    }
    assert_eq!(stream.ring_capacity(), Some(1000));
    assert_eq!(*played.lock().unwrap(), audio);
}

#[test]
fn oversized_write_is_cut_to_ring_capacity() {
    let (endpoint, played) = recording_endpoint(&unique_name("cut"));
    let mut stream = StreamOut::new(Arc::new(endpoint.with_buffer_size(4096)), quick_config());

    let audio = vec![0x5au8; 6000];
    assert_eq!(stream.write(&audio), Ok(4096));
    assert_eq!(stream.write(&audio[4096..]), Ok(1904));
    assert_eq!(played.lock().unwrap().len(), 6000);
}

#[test]
fn non_ok_write_status_fails_the_write() {
    let endpoint = LocalOutEndpoint::new(&unique_name("refuse"), |_: &[u8]| {
        WriteStatus::failed(HalResult::InvalidArguments)
    });
    let mut stream = StreamOut::new(Arc::new(endpoint), quick_config());
    assert_eq!(stream.write(&[1, 2, 3, 4]), Err(StreamError::InvalidArguments));
    // The failure is per transfer; the channels stay up.
    assert!(stream.is_prepared());
}

#[test]
fn write_times_out_and_the_stream_recovers() {
    let endpoint = Arc::new(StalledOut { name: unique_name("stall"), driver: Mutex::new(None) });
    let config = StreamConfig::default().with_wait_timeout(Duration::from_millis(50));
    let mut stream = StreamOut::new(Arc::clone(&endpoint), config);

    assert_eq!(stream.write(&[9u8; 64]), Err(StreamError::Timeout));
    assert!(stream.is_prepared());

    // The driver catches up with the abandoned transfer, taking half of it.
    let mut driver = endpoint.driver.lock().unwrap().take().expect("negotiated");
    let served = driver
        .serve(Duration::from_secs(1), |bytes| {
            WriteStatus::ok_without_position(bytes.len() / 2, HalResult::NotSupported)
        })
        .expect("serve");
    assert!(served);

    // The next write picks up the status that was left behind...
    assert_eq!(stream.write(&[7u8; 64]), Ok(32));

    // ...while its own bytes are still queued for the driver.
    let mut seen = Vec::new();
    driver
        .serve(Duration::from_secs(1), |bytes| {
            seen.extend_from_slice(bytes);
            WriteStatus::ok_without_position(bytes.len(), HalResult::NotSupported)
        })
        .expect("serve");
    assert_eq!(seen, vec![7u8; 64]);
}

#[test]
fn over_reported_write_count_is_clamped() {
    let endpoint = LocalOutEndpoint::new(&unique_name("over"), |bytes: &[u8]| {
        WriteStatus::ok(bytes.len() * 4, position_for(bytes.len()))
    });
    let mut stream = StreamOut::new(Arc::new(endpoint), quick_config());
    assert_eq!(stream.write(&[1u8; 16]), Ok(16));
    assert_eq!(stream.write(&[2u8; 8]), Ok(8));
}

#[test]
fn overflowing_channel_descriptor_fails_setup() {
    let endpoint = Arc::new(HugeOut { name: unique_name("huge"), driver: Mutex::new(None) });
    let mut stream = StreamOut::new(endpoint, quick_config());
    assert!(matches!(stream.write(&[0u8; 16]), Err(StreamError::ChannelSetupFailure(_))));
    assert_eq!(stream.write(&[0u8; 16]), Err(StreamError::NotInitialized));
}

#[test]
fn undrained_ring_accepts_no_more_than_capacity() {
    let endpoint = Arc::new(StalledOut { name: unique_name("full"), driver: Mutex::new(None) });
    let config = StreamConfig::default().with_wait_timeout(Duration::from_millis(30));
    let mut stream = StreamOut::new(Arc::clone(&endpoint), config);

    assert_eq!(stream.write(&[1u8; 100]), Err(StreamError::Timeout));
    assert_eq!(stream.write(&[2u8; 100]), Err(StreamError::Timeout));

    let mut driver = endpoint.driver.lock().unwrap().take().expect("negotiated");
    let mut seen = Vec::new();
    driver
        .serve(Duration::from_secs(1), |bytes| {
            seen.extend_from_slice(bytes);
            WriteStatus::ok_without_position(bytes.len(), HalResult::NotSupported)
        })
        .expect("serve");
    assert_eq!(seen, vec![1u8; 100]);
}

#[test]
fn negotiation_failure_is_final() {
    let endpoint = Arc::new(RefusingOut::new(EndpointError::Remote(HalResult::InvalidArguments)));
    let mut stream = StreamOut::new(Arc::clone(&endpoint), quick_config());

    assert_eq!(stream.write(&[0u8; 16]), Err(StreamError::InvalidArguments));
    assert_eq!(stream.write(&[0u8; 16]), Err(StreamError::NotInitialized));
    assert_eq!(stream.write(&[]), Err(StreamError::NotInitialized));
    assert_eq!(endpoint.prepare_calls.load(Ordering::Relaxed), 1);
}

#[test]
fn transport_failure_during_negotiation_is_reported() {
    let endpoint = Arc::new(RefusingOut::new(EndpointError::Transport("peer died".into())));
    let mut stream = StreamOut::new(endpoint, quick_config());
    assert_eq!(stream.write(&[0u8; 16]), Err(StreamError::TransportFailure("peer died".into())));
}

#[test]
fn unusable_channels_fail_setup() {
    let mut stream = StreamOut::new(Arc::new(BogusOut), quick_config());
    assert!(matches!(stream.write(&[0u8; 16]), Err(StreamError::ChannelSetupFailure(_))));
    assert!(!stream.is_prepared());
    assert_eq!(stream.write(&[0u8; 16]), Err(StreamError::NotInitialized));
}

// ========== Presentation position ==========

#[test]
fn position_after_write_is_served_from_cache() {
    let (inner, _) = recording_endpoint(&unique_name("cache"));
    let endpoint = Arc::new(CountingOut { inner, position_calls: AtomicUsize::new(0) });
    let config = quick_config().with_position_cache_window(Duration::from_secs(60));
    let mut stream = StreamOut::new(Arc::clone(&endpoint), config);

    assert_eq!(stream.write(&[0u8; 480]), Ok(480));
    assert_eq!(stream.presentation_position(), Ok(position_for(480)));
    assert_eq!(stream.presentation_position(), Ok(position_for(480)));
    assert_eq!(endpoint.position_calls.load(Ordering::Relaxed), 0);
}

#[test]
fn stale_position_is_fetched_again() {
    let (inner, _) = recording_endpoint(&unique_name("stale"));
    let endpoint = Arc::new(CountingOut { inner, position_calls: AtomicUsize::new(0) });
    let config = quick_config().with_position_cache_window(Duration::ZERO);
    let mut stream = StreamOut::new(Arc::clone(&endpoint), config);

    assert_eq!(stream.write(&[0u8; 400]), Ok(400));
    thread::sleep(Duration::from_millis(2));
    assert_eq!(stream.presentation_position(), Ok(position_for(400)));
    assert_eq!(endpoint.position_calls.load(Ordering::Relaxed), 1);
}

#[test]
fn missing_position_in_write_status_is_cached_as_failure() {
    let endpoint = LocalOutEndpoint::new(&unique_name("nopos"), |bytes: &[u8]| {
        WriteStatus::ok_without_position(bytes.len(), HalResult::InvalidState)
    });
    let config = quick_config().with_position_cache_window(Duration::from_secs(60));
    let mut stream = StreamOut::new(Arc::new(endpoint), config);

    assert_eq!(stream.write(&[0u8; 64]), Ok(64));
    assert_eq!(stream.presentation_position(), Err(StreamError::InvalidState));
}

#[test]
fn unsupported_position_query_latches() {
    let endpoint = Arc::new(RefusingOut::new(EndpointError::Remote(HalResult::NotSupported)));
    let config = quick_config().with_position_cache_window(Duration::ZERO);
    let mut stream = StreamOut::new(Arc::clone(&endpoint), config);

    for _ in 0..3 {
        assert_eq!(stream.presentation_position(), Err(StreamError::NotSupported));
    }
    assert_eq!(endpoint.position_calls.load(Ordering::Relaxed), 1);
}

// ========== Callbacks ==========

#[test]
fn notifications_reach_the_handler_until_the_stream_is_gone() {
    let endpoint = Arc::new(LocalOutEndpoint::new(&unique_name("cb"), |bytes: &[u8]| {
        WriteStatus::ok(bytes.len(), position_for(bytes.len()))
    }));
    let handler = Arc::new(DrainCounter::default());
    let weak: Weak<dyn StreamOutCallback> = Arc::downgrade(&handler) as Weak<dyn StreamOutCallback>;

    let mut stream = StreamOut::new(Arc::clone(&endpoint), quick_config());
    stream.set_callback(weak).expect("set_callback");

    let registered = endpoint.callback().expect("endpoint holds the callback");
    registered.on_drain_ready();
    registered.on_error();
    assert_eq!(handler.drains.load(Ordering::Relaxed), 1);
    assert_eq!(handler.errors.load(Ordering::Relaxed), 1);

    drop(stream);
    assert!(endpoint.callback().is_none());

    // A notification already in flight when the stream went away.
    registered.on_drain_ready();
    assert_eq!(handler.drains.load(Ordering::Relaxed), 1);
}

#[test]
fn notification_after_handler_dropped_is_ignored() {
    let endpoint = Arc::new(LocalOutEndpoint::new(&unique_name("cbgone"), |bytes: &[u8]| {
        WriteStatus::ok(bytes.len(), position_for(bytes.len()))
    }));
    let handler = Arc::new(DrainCounter::default());
    let mut stream = StreamOut::new(Arc::clone(&endpoint), quick_config());
    stream.set_callback(Arc::downgrade(&handler) as Weak<dyn StreamOutCallback>).expect("set_callback");

    drop(handler);
    let registered = endpoint.callback().expect("endpoint holds the callback");
    registered.on_write_ready();
    registered.on_drain_ready();
}

#[test]
fn callback_registration_failure_is_reported() {
    let endpoint = Arc::new(RefusingOut::new(EndpointError::Remote(HalResult::InvalidState)));
    let handler = Arc::new(DrainCounter::default());
    let mut stream = StreamOut::new(endpoint, quick_config());
    assert_eq!(
        stream.set_callback(Arc::downgrade(&handler) as Weak<dyn StreamOutCallback>),
        Err(StreamError::NotSupported)
    );
}

// ========== Forwarded operations and close ==========

#[test]
fn unimplemented_operations_report_not_supported() {
    let (endpoint, _) = recording_endpoint(&unique_name("fwd"));
    let stream = StreamOut::new(Arc::new(endpoint), quick_config());

    assert_eq!(stream.latency(), Err(StreamError::NotSupported));
    assert_eq!(stream.sample_rate(), Err(StreamError::NotSupported));
    assert_eq!(stream.supports_drain(), Ok(false));
    assert_eq!(stream.supports_pause_and_resume(), Ok((false, false)));
    assert_eq!(stream.pause(), Err(StreamError::NotSupported));
}

#[test]
fn closed_stream_rejects_everything() {
    let (endpoint, _) = recording_endpoint(&unique_name("closed"));
    let mut stream = StreamOut::new(Arc::new(endpoint.with_buffer_size(256)), quick_config());
    assert_eq!(stream.write(&[1u8; 128]), Ok(128));

    assert_eq!(stream.close(), Ok(()));
    assert_eq!(stream.close(), Ok(()));
    assert_eq!(stream.write(&[1u8; 128]), Err(StreamError::NotInitialized));
    assert_eq!(stream.presentation_position(), Err(StreamError::NotInitialized));
    assert_eq!(stream.buffer_size(), Err(StreamError::NotInitialized));
    assert!(!stream.is_prepared());
}
