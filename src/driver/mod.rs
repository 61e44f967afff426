//! Channel driver abstraction.
//!
//! The core never talks to DAQ hardware directly; it sequences calls against a
//! [`ChannelDriver`], the minimal capability set a single analog channel needs:
//!
//! | Capability | Method |
//! |---|---|
//! | create a task/session | [`ChannelDriver::create_session`] |
//! | create an output channel | [`ChannelDriver::configure_output_channel`] |
//! | create an input channel | [`ChannelDriver::configure_input_channel`] |
//! | configure timing | [`ChannelDriver::set_timing`] |
//! | start / stop / release | [`ChannelDriver::start`], [`ChannelDriver::stop`], [`ChannelDriver::release`] |
//! | write one sample | [`ChannelDriver::write_sample`] |
//! | read N samples synchronously | [`ChannelDriver::read_samples`] |
//!
//! Calls are blocking and bounded by the timeouts passed in.
//!
//! [`ChannelSession`] wraps a driver plus one session handle and enforces the
//! create → configure → start → (write*|read) → stop → release ordering,
//! including an idempotent [`ChannelSession::finalize`].
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use wave_daq::driver::{ChannelSession, MockChannelDriver, OutputChannel, SessionRole, Timing};
//!
//! # fn example() -> wave_daq::error::AppResult<()> {
//! let driver = MockChannelDriver::new();
//! let mut session = ChannelSession::open(
//!     driver.clone(),
//!     SessionRole::Output { neutral: 0.0, timeout: Duration::from_millis(100) },
//! )?;
//! session.configure_output(&OutputChannel::default())?;
//! session.set_timing(&Timing::OnDemand)?;
//! session.start()?;
//! session.write(2.5, Duration::from_millis(10)).ok();
//! session.finalize();
//! # Ok(())
//! # }
//! ```

pub mod mock;
mod session;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DriverError;

pub use mock::{DriverCall, FailureScenario, MockChannelDriver, MockConfig, MockMode, Operation};
pub use session::{ChannelSession, SessionRole};

/// Result type for individual driver calls.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Opaque identifier of a driver session (task).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(pub u64);

impl std::fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// Physical units of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoltageUnits {
    /// Volts
    #[default]
    Volts,
}

/// Input terminal configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalConfig {
    /// Whatever the device defaults to
    Default,
    /// Referenced single-ended
    #[default]
    Rse,
    /// Non-referenced single-ended
    Nrse,
    /// Differential
    Differential,
    /// Pseudo-differential
    PseudoDifferential,
}

/// Analog output channel definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputChannel {
    /// Physical channel name, e.g. `Dev1/ao0`
    pub id: String,
    /// Minimum voltage the channel will be asked to produce
    pub min: f64,
    /// Maximum voltage the channel will be asked to produce
    pub max: f64,
    /// Units of `min`/`max`
    pub units: VoltageUnits,
}

impl Default for OutputChannel {
    fn default() -> Self {
        Self {
            id: "Dev1/ao0".to_string(),
            min: 0.0,
            max: 5.0,
            units: VoltageUnits::Volts,
        }
    }
}

/// Analog input channel definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputChannel {
    /// Physical channel name, e.g. `Dev1/ai0`
    pub id: String,
    /// Terminal configuration
    pub terminal: TerminalConfig,
    /// Minimum expected voltage
    pub min: f64,
    /// Maximum expected voltage
    pub max: f64,
    /// Units of `min`/`max`
    pub units: VoltageUnits,
}

impl Default for InputChannel {
    fn default() -> Self {
        Self {
            id: "Dev1/ai0".to_string(),
            terminal: TerminalConfig::Rse,
            min: -10.0,
            max: 10.0,
            units: VoltageUnits::Volts,
        }
    }
}

/// Active clock edge for sample-clock timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockEdge {
    /// Sample on the rising edge
    #[default]
    Rising,
    /// Sample on the falling edge
    Falling,
}

/// Whether a sample-clock task stops after `count` samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleMode {
    /// Stop after `count` samples
    #[default]
    Finite,
    /// Run until stopped
    Continuous,
}

/// Session timing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Timing {
    /// Software-timed: each write is applied when issued
    OnDemand,
    /// Hardware sample clock
    SampleClock {
        /// Samples per second
        rate: f64,
        /// Active edge
        edge: ClockEdge,
        /// Finite or continuous
        sample_mode: SampleMode,
        /// Samples per channel (finite mode)
        count: u64,
    },
}

impl Timing {
    /// Finite sample-clock timing on the rising edge.
    pub fn finite(rate: f64, count: u64) -> Self {
        Timing::SampleClock {
            rate,
            edge: ClockEdge::Rising,
            sample_mode: SampleMode::Finite,
            count,
        }
    }
}

/// Minimal capability set of a single-channel analog driver.
///
/// Implementations are expected to be blocking; every call that may wait on
/// hardware takes an explicit timeout.
pub trait ChannelDriver: Send + 'static {
    /// Short driver identifier used in errors and logs.
    fn name(&self) -> &str;

    /// Create a new, unconfigured session.
    fn create_session(&mut self) -> DriverResult<SessionHandle>;

    /// Add an analog output channel to the session.
    fn configure_output_channel(
        &mut self,
        session: SessionHandle,
        channel: &OutputChannel,
    ) -> DriverResult<()>;

    /// Add an analog input channel to the session.
    fn configure_input_channel(
        &mut self,
        session: SessionHandle,
        channel: &InputChannel,
    ) -> DriverResult<()>;

    /// Configure session timing.
    fn set_timing(&mut self, session: SessionHandle, timing: &Timing) -> DriverResult<()>;

    /// Start the session.
    fn start(&mut self, session: SessionHandle) -> DriverResult<()>;

    /// Write one sample to the output channel.
    fn write_sample(
        &mut self,
        session: SessionHandle,
        value: f64,
        timeout: Duration,
    ) -> DriverResult<()>;

    /// Block until `count` samples are read or `timeout` expires.
    ///
    /// May return fewer samples than requested.
    fn read_samples(
        &mut self,
        session: SessionHandle,
        count: usize,
        timeout: Duration,
    ) -> DriverResult<Vec<f64>>;

    /// Stop a started session.
    fn stop(&mut self, session: SessionHandle) -> DriverResult<()>;

    /// Release all resources held by the session.
    fn release(&mut self, session: SessionHandle) -> DriverResult<()>;
}
