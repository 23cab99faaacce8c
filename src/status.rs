// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Result codes and the fixed-size status records posted on the status ring
// after every transfer. Records hold raw integers so whatever a peer writes
// into shared memory is a valid value on this side.

use serde::{Deserialize, Serialize};

/// Result code reported by the remote endpoint and by status records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HalResult {
    Ok,
    NotInitialized,
    InvalidArguments,
    InvalidState,
    NotSupported,
    /// A code outside the known set.
    Unknown(i32),
}

impl HalResult {
    pub const fn from_raw(code: i32) -> Self {
        match code {
            0 => HalResult::Ok,
            1 => HalResult::NotInitialized,
            2 => HalResult::InvalidArguments,
            3 => HalResult::InvalidState,
            4 => HalResult::NotSupported,
            other => HalResult::Unknown(other),
        }
    }

    pub const fn as_raw(self) -> i32 {
        match self {
            HalResult::Ok => 0,
            HalResult::NotInitialized => 1,
            HalResult::InvalidArguments => 2,
            HalResult::InvalidState => 3,
            HalResult::NotSupported => 4,
            HalResult::Unknown(code) => code,
        }
    }

    pub const fn is_ok(self) -> bool {
        matches!(self, HalResult::Ok)
    }
}

/// Flag bits carried on the data ring's event flag word.
pub mod flag_bits {
    /// The consumer has data to read.
    pub const NOT_EMPTY: u32 = 1 << 0;
    /// The producer has room to write.
    pub const NOT_FULL: u32 = 1 << 1;
}

/// Wall-clock style timestamp as reported by the driver.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSpec {
    pub sec: u64,
    pub nsec: u64,
}

impl TimeSpec {
    pub const fn new(sec: u64, nsec: u64) -> Self {
        Self { sec, nsec }
    }

    pub fn from_nanos(ns: u64) -> Self {
        Self { sec: ns / 1_000_000_000, nsec: ns % 1_000_000_000 }
    }

    pub fn as_nanos(&self) -> u64 {
        self.sec.saturating_mul(1_000_000_000).saturating_add(self.nsec)
    }
}

/// Frames presented to the listener so far, and when that count was taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresentationPosition {
    pub frames: u64,
    pub timestamp: TimeSpec,
}

/// Status record for one drain of the playback data ring.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStatus {
    pub write_result: i32,
    pub presentation_result: i32,
    pub written: u64,
    pub frames: u64,
    pub timestamp: TimeSpec,
}

const _: () = assert!(std::mem::size_of::<WriteStatus>() == 40);

impl WriteStatus {
    /// A successful drain of `written` bytes with a position snapshot.
    pub fn ok(written: usize, position: PresentationPosition) -> Self {
        Self {
            write_result: HalResult::Ok.as_raw(),
            presentation_result: HalResult::Ok.as_raw(),
            written: written as u64,
            frames: position.frames,
            timestamp: position.timestamp,
        }
    }

    /// A successful drain whose position could not be taken.
    pub fn ok_without_position(written: usize, presentation: HalResult) -> Self {
        Self {
            write_result: HalResult::Ok.as_raw(),
            presentation_result: presentation.as_raw(),
            written: written as u64,
            ..Self::default()
        }
    }

    pub fn failed(result: HalResult) -> Self {
        Self {
            write_result: result.as_raw(),
            presentation_result: HalResult::NotInitialized.as_raw(),
            ..Self::default()
        }
    }

    pub fn write_result(&self) -> HalResult {
        HalResult::from_raw(self.write_result)
    }

    pub fn presentation_result(&self) -> HalResult {
        HalResult::from_raw(self.presentation_result)
    }

    /// The position snapshot, or the code explaining why there is none.
    pub fn position(&self) -> Result<PresentationPosition, HalResult> {
        match self.presentation_result() {
            HalResult::Ok => Ok(PresentationPosition { frames: self.frames, timestamp: self.timestamp }),
            other => Err(other),
        }
    }
}

/// Status record for one fill of the capture data ring.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStatus {
    pub read_result: i32,
    _pad: u32,
    pub read: u64,
}

const _: () = assert!(std::mem::size_of::<ReadStatus>() == 16);

impl ReadStatus {
    pub fn ok(read: usize) -> Self {
        Self { read_result: HalResult::Ok.as_raw(), _pad: 0, read: read as u64 }
    }

    pub fn failed(result: HalResult) -> Self {
        Self { read_result: result.as_raw(), _pad: 0, read: 0 }
    }

    pub fn read_result(&self) -> HalResult {
        HalResult::from_raw(self.read_result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_codes_survive_conversion() {
        for code in -1..6 {
            assert_eq!(HalResult::from_raw(code).as_raw(), code);
        }
        assert_eq!(HalResult::from_raw(4), HalResult::NotSupported);
        assert_eq!(HalResult::from_raw(17), HalResult::Unknown(17));
    }

    #[test]
    fn write_status_position_follows_presentation_result() {
        let pos = PresentationPosition { frames: 480, timestamp: TimeSpec::new(3, 250) };
        assert_eq!(WriteStatus::ok(1920, pos).position(), Ok(pos));

        let st = WriteStatus::ok_without_position(1920, HalResult::InvalidState);
        assert!(st.write_result().is_ok());
        assert_eq!(st.position(), Err(HalResult::InvalidState));
    }

    #[test]
    fn failed_write_status_carries_no_bytes() {
        let st = WriteStatus::failed(HalResult::InvalidArguments);
        assert_eq!(st.write_result(), HalResult::InvalidArguments);
        assert_eq!(st.written, 0);
    }

    #[test]
    fn timespec_nanos() {
        let ts = TimeSpec::from_nanos(2_500_000_001);
        assert_eq!(ts, TimeSpec::new(2, 500_000_001));
        assert_eq!(ts.as_nanos(), 2_500_000_001);
    }
}
