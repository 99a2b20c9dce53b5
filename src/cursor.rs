//! Polling cursor over the device log timeline.
//!
//! Each lock owns one [`LogWindowCursor`]; nothing here is process-global,
//! so multiple locks poll without cross-talk. The cursor hands out
//! `[start, now)` windows and moves asymmetrically: forward when a window
//! produced entries, backward when it did not. "Nothing happened lately"
//! says nothing about the current bolt position, so an empty window widens
//! the search into the past instead of silently advancing past the last
//! real signal.

use chrono::Utc;

/// Backward probe distance applied per empty poll cycle.
pub const THIRTY_DAYS_MS: i64 = 2_592_000_000;

/// Default cap on how far back the cursor may probe, relative to creation.
pub const DEFAULT_MAX_LOOKBACK_MS: i64 = 365 * 24 * 60 * 60 * 1000;

/// Half-open time range `[start_ms, end_ms)` queried in one poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconciliationWindow {
    pub start_ms: i64,
    pub end_ms: i64,
}

/// Per-device cursor tracking the next window to query.
#[derive(Debug, Clone)]
pub struct LogWindowCursor {
    /// Low-water mark: start of the next window.
    start_ms: i64,
    /// End of the most recently handed-out window.
    last_end_ms: i64,
    /// Oldest instant the backward probe may reach.
    floor_ms: i64,
}

impl LogWindowCursor {
    /// Create a cursor starting at `start_ms`, probing no further back than
    /// `floor_ms`.
    pub fn new(start_ms: i64, floor_ms: i64) -> Self {
        let start_ms = start_ms.max(floor_ms);
        Self {
            start_ms,
            last_end_ms: start_ms,
            floor_ms,
        }
    }

    /// Create a cursor starting at the current instant with the default
    /// lookback cap.
    pub fn starting_now() -> Self {
        let now = Utc::now().timestamp_millis();
        Self::new(now, now - DEFAULT_MAX_LOOKBACK_MS)
    }

    /// The window to query next; its end is "now" at call time.
    pub fn current_window(&mut self) -> ReconciliationWindow {
        self.window_ending_at(Utc::now().timestamp_millis())
    }

    /// Like [`current_window`] with an explicit clock reading.
    ///
    /// [`current_window`]: LogWindowCursor::current_window
    pub fn window_ending_at(&mut self, now_ms: i64) -> ReconciliationWindow {
        // start_ms <= end_ms must hold even against a clock stepping back.
        let end_ms = now_ms.max(self.start_ms);
        self.last_end_ms = end_ms;
        ReconciliationWindow {
            start_ms: self.start_ms,
            end_ms,
        }
    }

    /// Move the cursor after a poll cycle.
    ///
    /// `found_entries == true`: the next window starts exactly where the
    /// last one ended; no gap, no re-scan of reconciled time.
    ///
    /// `found_entries == false`: step the start back by [`THIRTY_DAYS_MS`]
    /// to look for the last known signal further in the past, clamped at
    /// the floor. Backward, not forward: an empty window is not evidence.
    pub fn advance(&mut self, found_entries: bool) {
        if found_entries {
            self.start_ms = self.last_end_ms;
        } else {
            self.start_ms = (self.start_ms - THIRTY_DAYS_MS).max(self.floor_ms);
        }
    }

    /// Current low-water mark.
    pub fn start_ms(&self) -> i64 {
        self.start_ms
    }

    /// Configured probe floor.
    pub fn floor_ms(&self) -> i64 {
        self.floor_ms
    }
}
