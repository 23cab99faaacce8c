// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Named shared memory handle used as the backing store of ring channels.

use std::io;

use crate::platform::posix::ShmMode;
use crate::platform::PlatformShm;

/// Open mode for shared memory segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmOpenMode {
    /// Create exclusively; fail if the name exists.
    Create,
    /// Open existing; fail if it does not exist.
    Open,
    /// Create if missing, open otherwise.
    CreateOrOpen,
}

/// A named, inter-process shared memory region.
///
/// The region is unlinked automatically when the last handle to it (in any
/// process) is dropped.
pub struct ShmHandle {
    inner: PlatformShm,
}

impl ShmHandle {
    /// Map `size` usable bytes of the segment called `name`.
    pub fn acquire(name: &str, size: usize, mode: ShmOpenMode) -> io::Result<Self> {
        let mode = match mode {
            ShmOpenMode::Create => ShmMode::Create,
            ShmOpenMode::Open => ShmMode::Open,
            ShmOpenMode::CreateOrOpen => ShmMode::CreateOrOpen,
        };
        Ok(Self { inner: PlatformShm::acquire(name, size, mode)? })
    }

    /// Start of the usable region.
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.inner.as_mut_ptr()
    }

    pub fn size(&self) -> usize {
        self.inner.user_size()
    }

    pub fn path(&self) -> &str {
        self.inner.path()
    }

    /// Number of live mappings across all processes.
    pub fn ref_count(&self) -> i32 {
        self.inner.map_count()
    }

    /// Remove a segment by name without mapping it.
    pub fn unlink_by_name(name: &str) {
        PlatformShm::unlink_by_name(name);
    }
}
