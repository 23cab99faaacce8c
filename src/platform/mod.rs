// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors

pub mod posix;

pub use posix::PlatformShm;
pub(crate) use posix::{futex_wait, futex_wake_all, FutexWait};
