//! Simulated single-channel DAQ driver.
//!
//! `MockChannelDriver` behaves like a small on-demand/finite-sample device:
//!
//! - Output writes are range-checked against the configured channel limits,
//!   as real hardware rejects out-of-range values.
//! - Finite reads return either scripted samples or a simulated sine with
//!   uniform noise, clipped to the input channel range.
//! - In [`MockMode::Realistic`] a read blocks for `count / rate` seconds, like
//!   a hardware-timed acquisition.
//!
//! Calls are counted per [`Operation`] and, when [`MockConfig::record_calls`]
//! is set, also kept as a [`DriverCall`] log. Failures can be injected per
//! operation with [`FailureScenario`]. Clones share state, so a test can keep
//! a handle while the driver itself is moved into a session.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{
    ChannelDriver, DriverResult, InputChannel, OutputChannel, SampleMode, SessionHandle, Timing,
};
use crate::error::{DriverError, DriverErrorKind};

const DRIVER_NAME: &str = "mock";

/// Operational modes for the simulated driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MockMode {
    /// Zero delays, deterministic - for unit tests
    #[default]
    Instant,
    /// Reads block for the acquisition duration
    Realistic,
}

/// Simulated input waveform: `offset + amplitude * sin(2π f t) + noise`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedSignal {
    /// Sine amplitude in volts
    pub amplitude: f64,
    /// Sine frequency in Hz
    pub frequency_hz: f64,
    /// DC offset in volts
    pub offset: f64,
    /// Peak uniform noise in volts
    pub noise: f64,
}

impl Default for SimulatedSignal {
    fn default() -> Self {
        Self {
            amplitude: 2.0,
            frequency_hz: 1.0,
            offset: 0.5,
            noise: 0.01,
        }
    }
}

impl SimulatedSignal {
    fn value_at(&self, t: f64, rng: &mut StdRng) -> f64 {
        let noise = if self.noise > 0.0 {
            rng.gen_range(-self.noise..=self.noise)
        } else {
            0.0
        };
        self.offset + self.amplitude * (2.0 * std::f64::consts::PI * self.frequency_hz * t).sin()
            + noise
    }
}

/// Configuration for the simulated driver.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MockConfig {
    /// Timing behavior
    #[serde(default)]
    pub mode: MockMode,
    /// Input waveform
    #[serde(default)]
    pub signal: SimulatedSignal,
    /// Noise seed; random when unset
    #[serde(default)]
    pub seed: Option<u64>,
    /// Keep every call in memory. The log is unbounded, so leave this off for
    /// long-running playback.
    #[serde(default)]
    pub record_calls: bool,
}

/// Driver operations, used to target failure injection and count calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `create_session`
    CreateSession,
    /// `configure_output_channel`
    ConfigureOutput,
    /// `configure_input_channel`
    ConfigureInput,
    /// `set_timing`
    SetTiming,
    /// `start`
    Start,
    /// `write_sample`
    Write,
    /// `read_samples`
    Read,
    /// `stop`
    Stop,
    /// `release`
    Release,
}

impl Operation {
    fn failure_kind(self) -> DriverErrorKind {
        match self {
            Operation::CreateSession | Operation::Start => DriverErrorKind::Initialization,
            Operation::ConfigureOutput | Operation::ConfigureInput | Operation::SetTiming => {
                DriverErrorKind::Configuration
            }
            Operation::Write | Operation::Read => DriverErrorKind::Timeout,
            Operation::Stop | Operation::Release => DriverErrorKind::Shutdown,
        }
    }
}

/// Injected failure.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureScenario {
    /// Every call of `operation` fails
    Always {
        /// Targeted operation
        operation: Operation,
    },
    /// Only the `n`th call (1-based) of `operation` fails
    Nth {
        /// Targeted operation
        operation: Operation,
        /// Call number that fails
        n: u32,
    },
}

/// One recorded call against the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    /// A session was requested
    CreateSession {
        /// Handle handed out
        session: SessionHandle,
    },
    /// Output channel setup
    ConfigureOutput {
        /// Target session
        session: SessionHandle,
        /// Requested channel
        channel: OutputChannel,
    },
    /// Input channel setup
    ConfigureInput {
        /// Target session
        session: SessionHandle,
        /// Requested channel
        channel: InputChannel,
    },
    /// Timing setup
    SetTiming {
        /// Target session
        session: SessionHandle,
        /// Requested timing
        timing: Timing,
    },
    /// Session start
    Start {
        /// Target session
        session: SessionHandle,
    },
    /// Single-sample write
    Write {
        /// Target session
        session: SessionHandle,
        /// Voltage written
        value: f64,
        /// Write timeout
        timeout: Duration,
    },
    /// Bulk read
    Read {
        /// Target session
        session: SessionHandle,
        /// Samples requested
        count: usize,
        /// Read timeout
        timeout: Duration,
    },
    /// Session stop
    Stop {
        /// Target session
        session: SessionHandle,
    },
    /// Session release
    Release {
        /// Target session
        session: SessionHandle,
    },
}

impl DriverCall {
    /// Operation this call belongs to.
    pub fn operation(&self) -> Operation {
        match self {
            DriverCall::CreateSession { .. } => Operation::CreateSession,
            DriverCall::ConfigureOutput { .. } => Operation::ConfigureOutput,
            DriverCall::ConfigureInput { .. } => Operation::ConfigureInput,
            DriverCall::SetTiming { .. } => Operation::SetTiming,
            DriverCall::Start { .. } => Operation::Start,
            DriverCall::Write { .. } => Operation::Write,
            DriverCall::Read { .. } => Operation::Read,
            DriverCall::Stop { .. } => Operation::Stop,
            DriverCall::Release { .. } => Operation::Release,
        }
    }
}

#[derive(Debug, Default)]
struct MockSession {
    output: Option<OutputChannel>,
    input: Option<InputChannel>,
    timing: Option<Timing>,
    running: bool,
}

struct MockState {
    config: MockConfig,
    next_handle: u64,
    sessions: HashMap<SessionHandle, MockSession>,
    calls: Vec<DriverCall>,
    failures: Vec<FailureScenario>,
    op_counts: HashMap<Operation, u32>,
    scripted_input: Option<Vec<f64>>,
    rng: StdRng,
}

impl MockState {
    fn record(&mut self, call: DriverCall) -> DriverResult<()> {
        let operation = call.operation();
        if self.config.record_calls {
            self.calls.push(call);
        }
        let count = {
            let entry = self.op_counts.entry(operation).or_insert(0);
            *entry += 1;
            *entry
        };

        let injected = self.failures.iter().any(|scenario| match scenario {
            FailureScenario::Always { operation: op } => *op == operation,
            FailureScenario::Nth { operation: op, n } => *op == operation && *n == count,
        });
        if injected {
            return Err(DriverError::new(
                DRIVER_NAME,
                operation.failure_kind(),
                format!("injected {:?} failure (call {})", operation, count),
            ));
        }
        Ok(())
    }

    fn session(&mut self, handle: SessionHandle) -> DriverResult<&mut MockSession> {
        self.sessions.get_mut(&handle).ok_or_else(|| {
            DriverError::new(
                DRIVER_NAME,
                DriverErrorKind::InvalidParameter,
                format!("unknown {}", handle),
            )
        })
    }
}

/// Simulated analog channel driver. See the module docs.
#[derive(Clone)]
pub struct MockChannelDriver {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockChannelDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChannelDriver {
    /// Instant-mode driver with the default simulated signal and a full call
    /// log.
    pub fn new() -> Self {
        Self::with_config(MockConfig {
            record_calls: true,
            ..MockConfig::default()
        })
    }

    /// Driver with custom configuration.
    pub fn with_config(config: MockConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            state: Arc::new(Mutex::new(MockState {
                config,
                next_handle: 1,
                sessions: HashMap::new(),
                calls: Vec::new(),
                failures: Vec::new(),
                op_counts: HashMap::new(),
                scripted_input: None,
                rng,
            })),
        }
    }

    /// Return exactly these samples (up to the requested count) from reads.
    pub fn with_input(self, samples: Vec<f64>) -> Self {
        self.state.lock().scripted_input = Some(samples);
        self
    }

    /// Add a failure scenario.
    pub fn inject(&self, scenario: FailureScenario) {
        self.state.lock().failures.push(scenario);
    }

    /// Snapshot of every recorded call so far.
    ///
    /// Empty unless [`MockConfig::record_calls`] is set.
    pub fn calls(&self) -> Vec<DriverCall> {
        self.state.lock().calls.clone()
    }

    /// Number of calls of `operation`, recorded or not.
    pub fn count(&self, operation: Operation) -> usize {
        self.state
            .lock()
            .op_counts
            .get(&operation)
            .map_or(0, |n| *n as usize)
    }

    /// Values of every write attempt, in order.
    pub fn written_values(&self) -> Vec<f64> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                DriverCall::Write { value, .. } => Some(*value),
                _ => None,
            })
            .collect()
    }

    /// Sessions created and not yet released.
    pub fn open_sessions(&self) -> usize {
        self.state.lock().sessions.len()
    }
}

impl ChannelDriver for MockChannelDriver {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn create_session(&mut self) -> DriverResult<SessionHandle> {
        let mut state = self.state.lock();
        let session = SessionHandle(state.next_handle);
        state.next_handle += 1;
        state.record(DriverCall::CreateSession { session })?;
        state.sessions.insert(session, MockSession::default());
        Ok(session)
    }

    fn configure_output_channel(
        &mut self,
        session: SessionHandle,
        channel: &OutputChannel,
    ) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.record(DriverCall::ConfigureOutput {
            session,
            channel: channel.clone(),
        })?;
        if channel.id.is_empty() || !(channel.min < channel.max) {
            return Err(DriverError::new(
                DRIVER_NAME,
                DriverErrorKind::Configuration,
                format!(
                    "invalid output channel '{}' [{}, {}]",
                    channel.id, channel.min, channel.max
                ),
            ));
        }
        state.session(session)?.output = Some(channel.clone());
        Ok(())
    }

    fn configure_input_channel(
        &mut self,
        session: SessionHandle,
        channel: &InputChannel,
    ) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.record(DriverCall::ConfigureInput {
            session,
            channel: channel.clone(),
        })?;
        if channel.id.is_empty() || !(channel.min < channel.max) {
            return Err(DriverError::new(
                DRIVER_NAME,
                DriverErrorKind::Configuration,
                format!(
                    "invalid input channel '{}' [{}, {}]",
                    channel.id, channel.min, channel.max
                ),
            ));
        }
        state.session(session)?.input = Some(channel.clone());
        Ok(())
    }

    fn set_timing(&mut self, session: SessionHandle, timing: &Timing) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.record(DriverCall::SetTiming {
            session,
            timing: *timing,
        })?;
        if let Timing::SampleClock { rate, count, sample_mode, .. } = *timing {
            if !(rate > 0.0) || (sample_mode == SampleMode::Finite && count == 0) {
                return Err(DriverError::new(
                    DRIVER_NAME,
                    DriverErrorKind::Configuration,
                    format!("invalid sample clock: rate {} Hz, {} samples", rate, count),
                ));
            }
        }
        state.session(session)?.timing = Some(*timing);
        Ok(())
    }

    fn start(&mut self, session: SessionHandle) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.record(DriverCall::Start { session })?;
        state.session(session)?.running = true;
        Ok(())
    }

    fn write_sample(
        &mut self,
        session: SessionHandle,
        value: f64,
        timeout: Duration,
    ) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.record(DriverCall::Write {
            session,
            value,
            timeout,
        })?;
        let s = state.session(session)?;
        let channel = s.output.as_ref().ok_or_else(|| {
            DriverError::new(
                DRIVER_NAME,
                DriverErrorKind::InvalidParameter,
                format!("{} has no output channel", session),
            )
        })?;
        if !(value >= channel.min && value <= channel.max) {
            return Err(DriverError::new(
                DRIVER_NAME,
                DriverErrorKind::InvalidParameter,
                format!(
                    "{} V outside output range [{}, {}]",
                    value, channel.min, channel.max
                ),
            ));
        }
        if !s.running {
            return Err(DriverError::new(
                DRIVER_NAME,
                DriverErrorKind::InvalidParameter,
                format!("{} is not running", session),
            ));
        }
        Ok(())
    }

    fn read_samples(
        &mut self,
        session: SessionHandle,
        count: usize,
        timeout: Duration,
    ) -> DriverResult<Vec<f64>> {
        let (samples, duration) = {
            let mut state = self.state.lock();
            state.record(DriverCall::Read {
                session,
                count,
                timeout,
            })?;

            let s = state.session(session)?;
            let (input, timing, running) = (s.input.clone(), s.timing, s.running);
            let input = input.ok_or_else(|| {
                DriverError::new(
                    DRIVER_NAME,
                    DriverErrorKind::InvalidParameter,
                    format!("{} has no input channel", session),
                )
            })?;
            let (rate, available) = match timing {
                Some(Timing::SampleClock { rate, count, .. }) => (rate, count),
                _ => {
                    return Err(DriverError::new(
                        DRIVER_NAME,
                        DriverErrorKind::Configuration,
                        format!("{} has no sample clock", session),
                    ))
                }
            };
            if !running {
                return Err(DriverError::new(
                    DRIVER_NAME,
                    DriverErrorKind::InvalidParameter,
                    format!("{} is not running", session),
                ));
            }

            let n = count.min(usize::try_from(available).unwrap_or(usize::MAX));
            let samples: Vec<f64> = match state.scripted_input.clone() {
                Some(scripted) => scripted.into_iter().take(n).collect(),
                None => {
                    let signal = state.config.signal;
                    (0..n)
                        .map(|i| {
                            signal
                                .value_at(i as f64 / rate, &mut state.rng)
                                .clamp(input.min, input.max)
                        })
                        .collect()
                }
            };

            let duration = match state.config.mode {
                MockMode::Instant => Duration::ZERO,
                MockMode::Realistic => Duration::from_secs_f64(n as f64 / rate),
            };
            (samples, duration)
        };

        if duration > timeout {
            return Err(DriverError::new(
                DRIVER_NAME,
                DriverErrorKind::Timeout,
                format!(
                    "acquisition needs {:?}, timeout is {:?}",
                    duration, timeout
                ),
            ));
        }
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
        Ok(samples)
    }

    fn stop(&mut self, session: SessionHandle) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.record(DriverCall::Stop { session })?;
        state.session(session)?.running = false;
        Ok(())
    }

    fn release(&mut self, session: SessionHandle) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.record(DriverCall::Release { session })?;
        state.sessions.remove(&session).map(|_| ()).ok_or_else(|| {
            DriverError::new(
                DRIVER_NAME,
                DriverErrorKind::InvalidParameter,
                format!("unknown {}", session),
            )
        })
    }
}

impl std::fmt::Debug for MockChannelDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockChannelDriver")
            .field("mode", &state.config.mode)
            .field("open_sessions", &state.sessions.len())
            .field("calls", &state.calls.len())
            .finish()
    }
}
