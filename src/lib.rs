//! # wave-daq
//!
//! Drives one analog DAQ channel in two modes:
//!
//! - **out**: a `time,voltage` table is streamed to the output channel, one
//!   sample every `1 / sample_rate` seconds, wrapping at the end of the table.
//!   Values are clamped to 0-5 V and the channel is always returned to 0 V on
//!   exit.
//! - **in**: a finite, hardware-timed capture is read in one blocking call,
//!   negative readings are floored to 0, and the result is written as a table.
//!
//! ## Crate Structure
//!
//! - **`driver`**: the [`ChannelDriver`](driver::ChannelDriver) capability
//!   trait, the ordered [`ChannelSession`](driver::ChannelSession) lifecycle
//!   wrapper and the bundled simulated driver.
//! - **`playback`**: the periodic scheduler (cursor, run budget, timer task).
//! - **`acquisition`**: the finite acquisition runner.
//! - **`waveform`** / **`tabular`**: the sample table and its CSV format.
//! - **`config`**: layered settings (defaults, TOML, environment).
//! - **`error`**: [`DaqError`](error::DaqError) and exit-code mapping.
//! - **`tracing_setup`**: subscriber initialization.
//! - **`app`** / **`cli`**: the `in`/`out` routines and the command line.

pub mod acquisition;
pub mod app;
pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod playback;
pub mod tabular;
pub mod tracing_setup;
pub mod waveform;

pub use error::{AppResult, DaqError};
