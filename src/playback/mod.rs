//! Periodic waveform playback.
//!
//! A loaded [`WaveformTable`](crate::waveform::WaveformTable) is streamed to
//! the output channel one clamped sample per period, wrapping at the end of
//! the table until the [`RunBudget`] is used up.
//!
//! ```text
//! Idle ──arm()──▶ Armed ──run()──▶ Running ──budget/shutdown──▶ Draining ──▶ Terminated
//!   create,          baseline        tick: write table[cursor]    disarm timer    neutral,
//!   configure,       written         loop: advance cursor,        take session    stop,
//!   start                                  count, resume           back           release
//! ```
//!
//! - [`cursor`]: the wrapping [`PlaybackCursor`] and [`RunBudget`]
//! - [`timer`]: [`PeriodicTask`], the cancellable tick source
//! - [`scheduler`]: [`PlaybackScheduler`] tying both to a channel session

pub mod cursor;
pub mod scheduler;
pub mod timer;

pub use cursor::{PlaybackCursor, RunBudget};
pub use scheduler::{
    PlaybackConfig, PlaybackExit, PlaybackReport, PlaybackScheduler, TickOutcome,
};
pub use timer::{PeriodicTask, Resume, Tick, TickHandler};
