//! Cursor throttle — coalesces pointer-move broadcasts to a fixed interval.
//!
//! DESIGN
//! ======
//! Pointer movement arrives far faster than peers need to see it. Each
//! connection owns one gate: a position offered inside the quiet interval is
//! held as pending and replaced by any newer one, and the connection loop's
//! tick drains whatever is pending once the interval elapses. Coalescing
//! drops intermediate positions but never the final one.
//!
//! The gate takes explicit `Instant`s so tests drive time directly.

use std::time::{Duration, Instant};

use crate::board::CursorPoint;

const DEFAULT_CURSOR_INTERVAL_MS: u64 = 16;

/// Broadcast interval for cursor moves, from `CURSOR_INTERVAL_MS`.
#[must_use]
pub fn cursor_interval() -> Duration {
    let ms = std::env::var("CURSOR_INTERVAL_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_CURSOR_INTERVAL_MS);
    Duration::from_millis(ms)
}

/// Per-connection coalescing gate for outbound cursor positions.
#[derive(Debug)]
pub struct CursorGate {
    interval: Duration,
    last_sent: Option<Instant>,
    pending: Option<CursorPoint>,
}

impl CursorGate {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self { interval, last_sent: None, pending: None }
    }

    /// Offer a fresh position. Returns it when the interval has elapsed and
    /// it should broadcast now; otherwise it is held as pending, replacing
    /// any older held position.
    pub fn offer(&mut self, point: CursorPoint, now: Instant) -> Option<CursorPoint> {
        let due = self
            .last_sent
            .is_none_or(|sent| now.duration_since(sent) >= self.interval);
        if due {
            self.last_sent = Some(now);
            self.pending = None;
            Some(point)
        } else {
            self.pending = Some(point);
            None
        }
    }

    /// Drain the pending position if its quiet interval has elapsed. Called
    /// from the connection loop's tick so the final position of a burst is
    /// delayed by at most one interval, never skipped.
    pub fn flush(&mut self, now: Instant) -> Option<CursorPoint> {
        self.pending?;
        let due = self
            .last_sent
            .is_none_or(|sent| now.duration_since(sent) >= self.interval);
        if due {
            self.last_sent = Some(now);
            self.pending.take()
        } else {
            None
        }
    }

    /// Drop any held position (pointer left the canvas).
    pub fn clear(&mut self) {
        self.pending = None;
    }
}

// =============================================================================
// TESTS
// =============================================================================
