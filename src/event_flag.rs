// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Wait/wake flag bits on the 32-bit word in a data ring's header. Each side
// waits on the bits the other side sets: the client waits NOT_FULL after a
// write and NOT_EMPTY before a read, the driver the opposite.

use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::platform::{futex_wait, futex_wake_all, FutexWait};
use crate::ring::{RingChannel, RingHeader};
use crate::ShmHandle;

/// Outcome of [`EventFlag::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// These requested bits were set; they have been cleared.
    Signalled(u32),
    /// The timeout elapsed with no requested bit set.
    TimedOut,
    /// Woken without any requested bit set. Call `wait` again.
    Interrupted,
}

/// Flag word living in a ring header, shared with the peer process.
///
/// Holds its own reference to the ring mapping, so it stays valid for as
/// long as it exists and is torn down exactly once, when dropped.
pub struct EventFlag {
    shm: Arc<ShmHandle>,
}

impl EventFlag {
    /// Attach to the flag word of `ring`. Fails if the ring was created
    /// without one.
    pub fn attach<T: Copy + 'static>(ring: &RingChannel<T>) -> io::Result<Self> {
        if !ring.has_event_flag() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "ring carries no event flag word",
            ));
        }
        Ok(Self { shm: Arc::clone(ring.shm()) })
    }

    fn word(&self) -> &AtomicU32 {
        let hdr = unsafe { &*(self.shm.as_mut_ptr() as *const RingHeader) };
        &hdr.event_flag
    }

    /// Set `bits` and wake any sleeper on the word.
    pub fn wake(&self, bits: u32) -> io::Result<()> {
        let old = self.word().fetch_or(bits, Ordering::AcqRel);
        // Bits already pending mean nobody can be asleep waiting for them.
        if old & bits == bits {
            return Ok(());
        }
        futex_wake_all(self.word())
    }

    /// Wait up to `timeout` for any of `bits`, consuming the ones found.
    pub fn wait(&self, bits: u32, timeout: Duration) -> io::Result<WaitOutcome> {
        let word = self.word();
        let old = word.fetch_and(!bits, Ordering::AcqRel);
        if old & bits != 0 {
            return Ok(WaitOutcome::Signalled(old & bits));
        }

        match futex_wait(word, old & !bits, timeout)? {
            FutexWait::TimedOut => Ok(WaitOutcome::TimedOut),
            // The word moved under us or we were woken; either way the bits
            // may be there now.
            FutexWait::Interrupted | FutexWait::Woken => {
                let old = word.fetch_and(!bits, Ordering::AcqRel);
                if old & bits != 0 {
                    Ok(WaitOutcome::Signalled(old & bits))
                } else {
                    Ok(WaitOutcome::Interrupted)
                }
            }
        }
    }

    /// Current bits, without consuming any.
    pub fn peek(&self) -> u32 {
        self.word().load(Ordering::Acquire)
    }
}
