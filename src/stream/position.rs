// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Short-lived cache of the presentation position. Every successful write
// already carries a fresh position, so a query right after it is answered
// locally instead of with another round trip.

use std::time::{Duration, Instant};

use crate::error::{Result, StreamError};
use crate::status::PresentationPosition;

struct CachedPosition {
    outcome: Result<PresentationPosition>,
    obtained_at: Instant,
}

pub(crate) struct PositionCache {
    window: Duration,
    /// Latched once the endpoint says it cannot report positions.
    not_supported: bool,
    entry: Option<CachedPosition>,
}

impl PositionCache {
    pub(crate) fn new(window: Duration) -> Self {
        Self { window, not_supported: false, entry: None }
    }

    /// Remember `outcome`, stamped now.
    pub(crate) fn record(&mut self, outcome: Result<PresentationPosition>) {
        self.entry = Some(CachedPosition { outcome, obtained_at: Instant::now() });
    }

    #[cfg(test)]
    fn is_not_supported(&self) -> bool {
        self.not_supported
    }

    /// Serve from the cache if it is fresh, otherwise call `fetch`.
    pub(crate) fn query<F>(&mut self, fetch: F) -> Result<PresentationPosition>
    where
        F: FnOnce() -> Result<PresentationPosition>,
    {
        if self.not_supported {
            return Err(StreamError::NotSupported);
        }
        if let Some(entry) = &self.entry {
            if entry.obtained_at.elapsed() <= self.window {
                return entry.outcome.clone();
            }
        }

        let outcome = fetch();
        if outcome == Err(StreamError::NotSupported) {
            self.not_supported = true;
            self.entry = None;
        } else {
            self.record(outcome.clone());
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::TimeSpec;
    use std::cell::Cell;

    fn pos(frames: u64) -> PresentationPosition {
        PresentationPosition { frames, timestamp: TimeSpec::new(1, frames) }
    }

    #[test]
    fn fresh_entry_is_served_without_fetching() {
        let mut cache = PositionCache::new(Duration::from_secs(60));
        cache.record(Ok(pos(48)));
        let calls = Cell::new(0);
        let fetch = || {
            calls.set(calls.get() + 1);
            Ok(pos(96))
        };
        assert_eq!(cache.query(fetch), Ok(pos(48)));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn cached_failure_is_served_verbatim() {
        let mut cache = PositionCache::new(Duration::from_secs(60));
        cache.record(Err(StreamError::InvalidState));
        assert_eq!(cache.query(|| Ok(pos(1))), Err(StreamError::InvalidState));
    }

    #[test]
    fn stale_entry_is_refreshed() {
        let mut cache = PositionCache::new(Duration::ZERO);
        cache.record(Ok(pos(48)));
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(cache.query(|| Ok(pos(96))), Ok(pos(96)));
        // The refreshed value is cached in turn.
        assert!(cache.entry.as_ref().is_some_and(|e| e.outcome == Ok(pos(96))));
    }

    #[test]
    fn not_supported_latches() {
        let mut cache = PositionCache::new(Duration::ZERO);
        assert_eq!(cache.query(|| Err(StreamError::NotSupported)), Err(StreamError::NotSupported));
        assert!(cache.is_not_supported());

        let calls = Cell::new(0);
        for _ in 0..3 {
            let r = cache.query(|| {
                calls.set(calls.get() + 1);
                Ok(pos(1))
            });
            assert_eq!(r, Err(StreamError::NotSupported));
        }
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn other_failures_do_not_latch() {
        let mut cache = PositionCache::new(Duration::ZERO);
        let _ = cache.query(|| Err(StreamError::TransportFailure("gone".into())));
        assert!(!cache.is_not_supported());
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(cache.query(|| Ok(pos(7))), Ok(pos(7)));
    }
}
