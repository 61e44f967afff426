//! Playback cursor and run budget.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Wrapping index into the waveform table.
///
/// Only the driving loop calls [`advance`](Self::advance); the tick handler
/// only calls [`position`](Self::position). The position is always in
/// `[0, len)`.
#[derive(Debug)]
pub struct PlaybackCursor {
    position: AtomicUsize,
    len: usize,
}

impl PlaybackCursor {
    /// Cursor over a table of `len` rows. `None` for an empty table.
    pub fn new(len: usize) -> Option<Self> {
        (len > 0).then(|| Self {
            position: AtomicUsize::new(0),
            len,
        })
    }

    /// Current index.
    pub fn position(&self) -> usize {
        self.position.load(Ordering::Acquire)
    }

    /// Table length the cursor wraps at.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false; an empty cursor cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Move to the next row, wrapping to 0 at the end. Returns the new index.
    pub fn advance(&self) -> usize {
        let next = self.position() + 1;
        let next = if next >= self.len { 0 } else { next };
        self.position.store(next, Ordering::Release);
        next
    }
}

/// Number of ticks a playback run executes. Zero means run until stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunBudget(u64);

impl RunBudget {
    /// Budget of exactly `ticks` ticks (0 = unbounded).
    pub fn ticks(ticks: u64) -> Self {
        Self(ticks)
    }

    /// Run until stopped externally.
    pub fn unbounded() -> Self {
        Self(0)
    }

    /// `seconds * sample_rate` ticks.
    pub fn from_duration(seconds: u32, sample_rate: f64) -> Self {
        let ticks = (f64::from(seconds) * sample_rate).round();
        if ticks.is_finite() && ticks > 0.0 {
            Self(ticks as u64)
        } else {
            Self(0)
        }
    }

    /// Tick count, 0 when unbounded.
    pub fn get(&self) -> u64 {
        self.0
    }

    /// True when the budget never runs out.
    pub fn is_unbounded(&self) -> bool {
        self.0 == 0
    }

    /// True once `completed` ticks use up the budget.
    pub fn is_exhausted(&self, completed: u64) -> bool {
        !self.is_unbounded() && completed >= self.0
    }
}
