// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Usage: demo_loopback [config.toml]
//
// Plays a 440 Hz tone through an output stream whose driver pushes the audio
// into an in-memory pipe, then captures it back through an input stream and
// checks it arrived intact. Logging follows RUST_LOG (default: info).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use libhalstream::rt_prio::audio_period_ns;
use libhalstream::{
    LocalInEndpoint, LocalOutEndpoint, PresentationPosition, ReadStatus, StreamConfig, StreamIn,
    StreamOut, TimeSpec, WriteStatus,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const SAMPLE_RATE: u32 = 48_000;
const CHANNELS: usize = 2;
const FRAME_BYTES: usize = CHANNELS * std::mem::size_of::<i16>();
const FRAMES_PER_BUFFER: usize = 256;
const BUFFERS: usize = 16;

fn tone(frames: usize, start_frame: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(frames * FRAME_BYTES);
    for n in start_frame..start_frame + frames {
        let phase = 2.0 * std::f32::consts::PI * 440.0 * n as f32 / SAMPLE_RATE as f32;
        let sample = (phase.sin() * i16::MAX as f32 * 0.25) as i16;
        for _ in 0..CHANNELS {
            out.extend_from_slice(&sample.to_ne_bytes());
        }
    }
    out
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => match StreamConfig::load(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                error!(%path, "cannot load config: {e}");
                std::process::exit(1);
            }
        },
        None => StreamConfig::default(),
    };
    info!(?config, period_ns = audio_period_ns(SAMPLE_RATE, FRAMES_PER_BUFFER as u32), "starting loopback");

    let pipe: Arc<Mutex<VecDeque<u8>>> = Arc::default();
    let epoch = Instant::now();

    let sink_pipe = Arc::clone(&pipe);
    let mut presented = 0u64;
    let output = LocalOutEndpoint::new("demo_loopback_out", move |bytes: &[u8]| {
        if let Ok(mut q) = sink_pipe.lock() {
            q.extend(bytes.iter().copied());
        }
        presented += (bytes.len() / FRAME_BYTES) as u64;
        let timestamp = TimeSpec::from_nanos(epoch.elapsed().as_nanos() as u64);
        WriteStatus::ok(bytes.len(), PresentationPosition { frames: presented, timestamp })
    });

    let source_pipe = Arc::clone(&pipe);
    let input = LocalInEndpoint::new("demo_loopback_in", move |buf: &mut [u8]| {
        let Ok(mut q) = source_pipe.lock() else {
            return ReadStatus::ok(0);
        };
        let n = buf.len().min(q.len());
        for (dst, src) in buf.iter_mut().zip(q.drain(..n)) {
            *dst = src;
        }
        ReadStatus::ok(n)
    });

    let mut playback = StreamOut::new(Arc::new(output), config.clone());
    let mut sent = Vec::new();
    for i in 0..BUFFERS {
        let mut chunk = tone(FRAMES_PER_BUFFER, i * FRAMES_PER_BUFFER);
        sent.extend_from_slice(&chunk);
        while !chunk.is_empty() {
            match playback.write(&chunk) {
                Ok(n) => {
                    chunk.drain(..n);
                }
                Err(e) => {
                    error!("write failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        match playback.presentation_position() {
            Ok(pos) => info!(buffer = i, frames = pos.frames, ts_ns = pos.timestamp.as_nanos(), "presented"),
            Err(e) => warn!(buffer = i, "no presentation position: {e}"),
        }
    }

    let mut capture = StreamIn::new(Arc::new(input), config);
    let mut received = Vec::with_capacity(sent.len());
    let mut buf = vec![0u8; FRAMES_PER_BUFFER * FRAME_BYTES];
    while received.len() < sent.len() {
        match capture.read(&mut buf) {
            Ok(n) => received.extend_from_slice(&buf[..n]),
            Err(e) => {
                error!("read failed: {e}");
                std::process::exit(1);
            }
        }
    }

    if received == sent {
        info!(bytes = sent.len(), "loopback intact");
    } else {
        error!(bytes = sent.len(), "loopback corrupted");
        std::process::exit(1);
    }
}
