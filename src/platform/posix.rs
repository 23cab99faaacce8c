// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// POSIX backing for the stream transport: named shared memory segments that
// carry the rings, and a futex-style sleep/wake on a 32-bit word inside them.

use std::ffi::CString;
use std::io;
use std::ptr;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::time::Duration;
#[cfg(any(test, not(target_os = "linux")))]
use std::time::Instant;

use crate::shm_name;

// ---------------------------------------------------------------------------
// Segment layout: [ user bytes | pad to 4 | AtomicI32 map count ]
// ---------------------------------------------------------------------------

const COUNTER_ALIGN: usize = std::mem::align_of::<AtomicI32>();

/// Bytes to reserve for `user_size` user bytes plus the map count, or `None`
/// if that does not fit in a `usize`.
pub(crate) fn mapped_len(user_size: usize) -> Option<usize> {
    user_size
        .div_ceil(COUNTER_ALIGN)
        .checked_mul(COUNTER_ALIGN)?
        .checked_add(std::mem::size_of::<AtomicI32>())
}

fn segment_size(fd: libc::c_int) -> io::Result<usize> {
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    if unsafe { libc::fstat(fd, &mut st) } != 0 {
        return Err(io::Error::last_os_error());
    }
    usize::try_from(st.st_size)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "shm reports a negative size"))
}

/// # Safety
/// `base` must point to a live mapping of `len` bytes.
unsafe fn map_count<'a>(base: *mut u8, len: usize) -> &'a AtomicI32 {
    &*(base.add(len - std::mem::size_of::<AtomicI32>()) as *const AtomicI32)
}

/// Open mode for [`PlatformShm::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmMode {
    Create,
    Open,
    CreateOrOpen,
}

/// A mapped POSIX shared memory object.
///
/// Every mapping bumps a counter stored in the last four bytes of the object;
/// the mapping that brings it back to zero unlinks the object, so a ring
/// disappears once both the client and the driver have let go of it. The
/// whole object is always mapped, so every mapping finds the counter at the
/// same offset whatever size it asked for.
pub struct PlatformShm {
    base: *mut u8,
    len: usize,
    user_size: usize,
    path: String,
}

// Safety: the mapping is shared between processes by construction; all
// cross-thread access to its contents goes through atomics.
unsafe impl Send for PlatformShm {}
unsafe impl Sync for PlatformShm {}

fn shm_open(path: &CString, flags: libc::c_int) -> io::Result<libc::c_int> {
    let fd = unsafe { libc::shm_open(path.as_ptr(), flags, 0o600 as libc::c_uint) };
    if fd == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(fd)
    }
}

impl PlatformShm {
    pub fn acquire(name: &str, user_size: usize, mode: ShmMode) -> io::Result<Self> {
        if name.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "shm name is empty"));
        }
        if user_size == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "shm size is 0"));
        }

        let path = shm_name::make_shm_name(name);
        let c_path = CString::new(path.as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let requested = mapped_len(user_size)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "shm size overflows"))?;
        let requested_off = libc::off_t::try_from(requested)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "shm size overflows"))?;

        let exclusive = libc::O_RDWR | libc::O_CREAT | libc::O_EXCL;
        let (fd, created) = match mode {
            ShmMode::Create => (shm_open(&c_path, exclusive)?, true),
            ShmMode::Open => (shm_open(&c_path, libc::O_RDWR)?, false),
            ShmMode::CreateOrOpen => match shm_open(&c_path, exclusive) {
                Ok(fd) => (fd, true),
                Err(e) if e.raw_os_error() == Some(libc::EEXIST) => {
                    (shm_open(&c_path, libc::O_RDWR)?, false)
                }
                Err(e) => return Err(e),
            },
        };

        // Only the creator sizes the object; resizing an existing one can
        // clobber a peer's live data on some kernels.
        if created && unsafe { libc::ftruncate(fd, requested_off) } != 0 {
            let err = io::Error::last_os_error();
            unsafe {
                libc::close(fd);
                libc::shm_unlink(c_path.as_ptr());
            }
            return Err(err);
        }

        // Some kernels round the object up to a page, so the real size is
        // read back even by the creator.
        let len = match segment_size(fd) {
            Ok(len) if len >= requested => len,
            Ok(len) => {
                unsafe { libc::close(fd) };
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("shm '{path}' holds {len} bytes, need {requested}"),
                ));
            }
            Err(err) => {
                unsafe {
                    libc::close(fd);
                    if created {
                        libc::shm_unlink(c_path.as_ptr());
                    }
                }
                return Err(err);
            }
        };

        let mem = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        unsafe { libc::close(fd) };
        if mem == libc::MAP_FAILED {
            let err = io::Error::last_os_error();
            if created {
                unsafe { libc::shm_unlink(c_path.as_ptr()) };
            }
            return Err(err);
        }

        let base = mem as *mut u8;
        unsafe { map_count(base, len).fetch_add(1, Ordering::AcqRel) };
        Ok(Self { base, len, user_size, path })
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.base
    }

    pub fn user_size(&self) -> usize {
        self.user_size
    }

    /// Platform path (with leading '/').
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn map_count(&self) -> i32 {
        unsafe { map_count(self.base, self.len).load(Ordering::Acquire) }
    }

    pub fn unlink_by_name(name: &str) {
        if let Ok(c_path) = CString::new(shm_name::make_shm_name(name)) {
            unsafe { libc::shm_unlink(c_path.as_ptr()) };
        }
    }
}

impl Drop for PlatformShm {
    fn drop(&mut self) {
        let prev = unsafe { map_count(self.base, self.len).fetch_sub(1, Ordering::AcqRel) };
        unsafe { libc::munmap(self.base as *mut libc::c_void, self.len) };
        if prev <= 1 {
            if let Ok(c_path) = CString::new(self.path.as_bytes()) {
                unsafe { libc::shm_unlink(c_path.as_ptr()) };
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Futex sleep/wake on a shared 32-bit word
// ---------------------------------------------------------------------------

/// How a [`futex_wait`] call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FutexWait {
    /// Returned after a wake (possibly spurious).
    Woken,
    TimedOut,
    /// The word no longer held `expected`, or a signal arrived.
    Interrupted,
}

/// Sleep while `word == expected`, for at most `timeout`.
#[cfg(target_os = "linux")]
pub(crate) fn futex_wait(word: &AtomicU32, expected: u32, timeout: Duration) -> io::Result<FutexWait> {
    let ts = libc::timespec {
        tv_sec: timeout.as_secs() as libc::time_t,
        tv_nsec: timeout.subsec_nanos() as libc::c_long,
    };
    // Shared (non-private) futex: the peer lives in another process.
    let ret = unsafe {
        libc::syscall(
            libc::SYS_futex,
            word as *const AtomicU32 as *const u32,
            libc::FUTEX_WAIT,
            expected,
            &ts as *const libc::timespec,
            ptr::null::<u32>(),
            0u32,
        )
    };
    if ret == 0 {
        return Ok(FutexWait::Woken);
    }
    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::ETIMEDOUT) => Ok(FutexWait::TimedOut),
        Some(libc::EAGAIN) | Some(libc::EINTR) => Ok(FutexWait::Interrupted),
        _ => Err(err),
    }
}

/// Wake every thread sleeping on `word`.
#[cfg(target_os = "linux")]
pub(crate) fn futex_wake_all(word: &AtomicU32) -> io::Result<()> {
    let ret = unsafe {
        libc::syscall(
            libc::SYS_futex,
            word as *const AtomicU32 as *const u32,
            libc::FUTEX_WAKE,
            i32::MAX,
            ptr::null::<libc::timespec>(),
            ptr::null::<u32>(),
            0u32,
        )
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Without a futex, poll the word with adaptive backoff until it changes.
#[cfg(not(target_os = "linux"))]
pub(crate) fn futex_wait(word: &AtomicU32, expected: u32, timeout: Duration) -> io::Result<FutexWait> {
    let deadline = Instant::now() + timeout;
    let mut backoff = Backoff::new();
    loop {
        if word.load(Ordering::Acquire) != expected {
            return Ok(FutexWait::Woken);
        }
        if Instant::now() >= deadline {
            return Ok(FutexWait::TimedOut);
        }
        backoff.snooze();
    }
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn futex_wake_all(_word: &AtomicU32) -> io::Result<()> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Backoff
// ---------------------------------------------------------------------------

/// Spin, then yield, then sleep 1ms.
#[cfg(not(target_os = "linux"))]
pub(crate) struct Backoff {
    step: u32,
}

#[cfg(not(target_os = "linux"))]
impl Backoff {
    pub(crate) fn new() -> Self {
        Self { step: 0 }
    }

    pub(crate) fn snooze(&mut self) {
        if self.step < 4 {
            // busy spin
        } else if self.step < 16 {
            std::hint::spin_loop();
        } else if self.step < 32 {
            std::thread::yield_now();
        } else {
            std::thread::sleep(Duration::from_millis(1));
            return;
        }
        self.step += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapped_len_appends_counter() {
        assert_eq!(mapped_len(1), Some(8));
        assert_eq!(mapped_len(4), Some(8));
        assert_eq!(mapped_len(5), Some(12));
    }

    #[test]
    fn mapped_len_rejects_overflow() {
        assert_eq!(mapped_len(usize::MAX), None);
        assert_eq!(mapped_len(usize::MAX - 3), None);
    }

    #[test]
    fn futex_wait_times_out_when_unchanged() {
        let word = AtomicU32::new(7);
        let start = Instant::now();
        let r = futex_wait(&word, 7, Duration::from_millis(20)).expect("wait");
        assert_eq!(r, FutexWait::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn futex_wait_returns_immediately_on_stale_value() {
        let word = AtomicU32::new(1);
        let r = futex_wait(&word, 0, Duration::from_secs(1)).expect("wait");
        assert_ne!(r, FutexWait::TimedOut);
    }
}
