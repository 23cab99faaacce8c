// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Lock-free single-producer single-consumer ring over named shared memory.
//
// The same primitive carries PCM bytes (data channel, `T = u8`) and status
// records (status channel, capacity 1). Cursors are monotonic element counts;
// the slot index is `cursor % capacity`, so any capacity works.

use std::io;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{ShmHandle, ShmOpenMode};

// ---------------------------------------------------------------------------
// Shared memory layout
// ---------------------------------------------------------------------------

const RING_MAGIC: u32 = 0x4853_5251; // "HSRQ"
const HAS_EVENT_FLAG: u32 = 1 << 0;

/// Control header at the start of every ring segment. Each cursor and the
/// event flag word sit on their own cache line.
#[repr(C)]
pub(crate) struct RingHeader {
    write_pos: AtomicU64,
    _pad0: [u8; 64 - 8],
    read_pos: AtomicU64,
    _pad1: [u8; 64 - 8],
    pub(crate) event_flag: AtomicU32,
    _pad2: [u8; 64 - 4],
    capacity: AtomicU64,
    element_size: AtomicU32,
    flags: AtomicU32,
    magic: AtomicU32,
    _pad3: [u8; 64 - 20],
}

const _: () = assert!(std::mem::size_of::<RingHeader>() == 256);

/// Bytes in front of the element region of every ring segment.
pub const HEADER_SIZE: usize = std::mem::size_of::<RingHeader>();

// ---------------------------------------------------------------------------
// Descriptors
// ---------------------------------------------------------------------------

/// Everything a peer needs to map an existing ring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingChannelDescriptor {
    pub shm_name: String,
    /// Capacity in elements.
    pub capacity: usize,
    pub element_size: usize,
    /// Whether the header's event flag word is in use.
    pub has_event_flag: bool,
}

/// The data and status rings handed out by channel negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelPair {
    pub data: RingChannelDescriptor,
    pub status: RingChannelDescriptor,
}

// ---------------------------------------------------------------------------
// RingChannel
// ---------------------------------------------------------------------------

/// Fixed-capacity SPSC ring of `T` in shared memory.
///
/// - `T` must be `Copy` with no padding-dependent meaning; it is copied
///   bytewise across the process boundary.
/// - At most one producer calls [`write`](Self::write) and at most one
///   consumer calls [`read`](Self::read) at a time.
pub struct RingChannel<T: Copy + 'static> {
    shm: Arc<ShmHandle>,
    capacity: usize,
    has_event_flag: bool,
    _marker: PhantomData<T>,
}

impl<T: Copy + 'static> RingChannel<T> {
    fn layout_size(capacity: usize) -> io::Result<usize> {
        std::mem::size_of::<T>()
            .checked_mul(capacity)
            .and_then(|bytes| bytes.checked_add(HEADER_SIZE))
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidData, format!("ring capacity {capacity} overflows"))
            })
    }

    /// Create a fresh ring segment called `name`.
    pub fn create(name: &str, capacity: usize, with_event_flag: bool) -> io::Result<Self> {
        if capacity == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "ring capacity is 0"));
        }
        assert!(std::mem::size_of::<T>() > 0, "RingChannel element must not be zero-sized");
        assert!(std::mem::align_of::<T>() <= 64, "RingChannel element alignment exceeds 64");

        let size = Self::layout_size(capacity)?;
        let shm = ShmHandle::acquire(name, size, ShmOpenMode::Create)?;
        unsafe { std::ptr::write_bytes(shm.as_mut_ptr(), 0, size) };

        let hdr = unsafe { &*(shm.as_mut_ptr() as *const RingHeader) };
        hdr.write_pos.store(0, Ordering::Relaxed);
        hdr.read_pos.store(0, Ordering::Relaxed);
        hdr.event_flag.store(0, Ordering::Relaxed);
        hdr.capacity.store(capacity as u64, Ordering::Relaxed);
        hdr.element_size.store(std::mem::size_of::<T>() as u32, Ordering::Relaxed);
        hdr.flags.store(if with_event_flag { HAS_EVENT_FLAG } else { 0 }, Ordering::Relaxed);
        hdr.magic.store(RING_MAGIC, Ordering::Release);

        Ok(Self { shm: Arc::new(shm), capacity, has_event_flag: with_event_flag, _marker: PhantomData })
    }

    /// Map the ring described by `desc`, validating it against the header.
    pub fn open(desc: &RingChannelDescriptor) -> io::Result<Self> {
        let invalid = |what: String| io::Error::new(io::ErrorKind::InvalidData, what);

        if desc.capacity == 0 {
            return Err(invalid(format!("ring '{}' has capacity 0", desc.shm_name)));
        }
        if desc.element_size != std::mem::size_of::<T>() {
            return Err(invalid(format!(
                "ring '{}' carries {}-byte elements, expected {}",
                desc.shm_name,
                desc.element_size,
                std::mem::size_of::<T>()
            )));
        }

        let shm = ShmHandle::acquire(&desc.shm_name, Self::layout_size(desc.capacity)?, ShmOpenMode::Open)?;
        let hdr = unsafe { &*(shm.as_mut_ptr() as *const RingHeader) };
        if hdr.magic.load(Ordering::Acquire) != RING_MAGIC {
            return Err(invalid(format!("ring '{}' is not initialized", desc.shm_name)));
        }
        let capacity = hdr.capacity.load(Ordering::Relaxed);
        let element_size = hdr.element_size.load(Ordering::Relaxed);
        let has_event_flag = hdr.flags.load(Ordering::Relaxed) & HAS_EVENT_FLAG != 0;
        if capacity != desc.capacity as u64
            || element_size as usize != desc.element_size
            || has_event_flag != desc.has_event_flag
        {
            return Err(invalid(format!(
                "ring '{}' header does not match its descriptor",
                desc.shm_name
            )));
        }

        Ok(Self { shm: Arc::new(shm), capacity: desc.capacity, has_event_flag, _marker: PhantomData })
    }

    pub fn descriptor(&self) -> RingChannelDescriptor {
        RingChannelDescriptor {
            shm_name: self.shm.path().to_owned(),
            capacity: self.capacity,
            element_size: std::mem::size_of::<T>(),
            has_event_flag: self.has_event_flag,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn has_event_flag(&self) -> bool {
        self.has_event_flag
    }

    pub(crate) fn header(&self) -> &RingHeader {
        unsafe { &*(self.shm.as_mut_ptr() as *const RingHeader) }
    }

    /// Mapping that keeps the header alive, for the event flag.
    pub(crate) fn shm(&self) -> &Arc<ShmHandle> {
        &self.shm
    }

    fn slots(&self) -> *mut T {
        unsafe { self.shm.as_mut_ptr().add(HEADER_SIZE) as *mut T }
    }

    // --- Status ---

    /// Elements the producer can write without overrunning the consumer.
    pub fn available_to_write(&self) -> usize {
        self.capacity - self.available_to_read()
    }

    /// Elements the consumer can read.
    pub fn available_to_read(&self) -> usize {
        let hdr = self.header();
        let w = hdr.write_pos.load(Ordering::Acquire);
        let r = hdr.read_pos.load(Ordering::Acquire);
        // A corrupted peer cursor must not make us index past the buffer.
        (w.wrapping_sub(r) as usize).min(self.capacity)
    }

    // --- Producer API (single writer) ---

    /// Append all of `items`. Returns `false`, writing nothing, if they do
    /// not fit in [`available_to_write`](Self::available_to_write).
    pub fn write(&self, items: &[T]) -> bool {
        let hdr = self.header();
        let w = hdr.write_pos.load(Ordering::Relaxed);
        let r = hdr.read_pos.load(Ordering::Acquire);
        let free = self.capacity - (w.wrapping_sub(r) as usize).min(self.capacity);
        if items.len() > free {
            return false;
        }
        if items.is_empty() {
            return true;
        }

        let start = (w % self.capacity as u64) as usize;
        let first = items.len().min(self.capacity - start);
        unsafe {
            std::ptr::copy_nonoverlapping(items.as_ptr(), self.slots().add(start), first);
            std::ptr::copy_nonoverlapping(items.as_ptr().add(first), self.slots(), items.len() - first);
        }
        hdr.write_pos.store(w.wrapping_add(items.len() as u64), Ordering::Release);
        true
    }

    pub fn write_one(&self, item: &T) -> bool {
        self.write(std::slice::from_ref(item))
    }

    // --- Consumer API (single reader) ---

    /// Fill all of `out`. Returns `false`, reading nothing, if fewer than
    /// `out.len()` elements are available.
    pub fn read(&self, out: &mut [T]) -> bool {
        unsafe { self.copy_out(out.as_mut_ptr(), out.len()) }
    }

    /// Pop a single element, if one is available.
    pub fn read_one(&self) -> Option<T> {
        let mut slot = std::mem::MaybeUninit::<T>::uninit();
        if unsafe { self.copy_out(slot.as_mut_ptr(), 1) } {
            Some(unsafe { slot.assume_init() })
        } else {
            None
        }
    }

    /// # Safety
    /// `dst` must be valid for `n` element writes.
    unsafe fn copy_out(&self, dst: *mut T, n: usize) -> bool {
        let hdr = self.header();
        let r = hdr.read_pos.load(Ordering::Relaxed);
        let w = hdr.write_pos.load(Ordering::Acquire);
        let used = (w.wrapping_sub(r) as usize).min(self.capacity);
        if n > used {
            return false;
        }
        if n == 0 {
            return true;
        }

        let start = (r % self.capacity as u64) as usize;
        let first = n.min(self.capacity - start);
        std::ptr::copy_nonoverlapping(self.slots().add(start), dst, first);
        std::ptr::copy_nonoverlapping(self.slots(), dst.add(first), n - first);
        hdr.read_pos.store(r.wrapping_add(n as u64), Ordering::Release);
        true
    }
}
