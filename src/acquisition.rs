//! Finite synchronous acquisition.
//!
//! One capture is two steps so the caller can gate the start on an operator:
//!
//! 1. [`AcquisitionRunner::prepare`] creates the input session and configures
//!    channel and sample clock. Nothing is sampled yet.
//! 2. [`PreparedAcquisition::acquire`] starts the clock, blocks in a single
//!    bulk read, and tears the session down before returning.
//!
//! The result is floored (negative readings become 0) and can be persisted
//! with [`AcquiredSeries::persist`] once the hardware is already released.

use std::path::Path;
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::driver::{ChannelDriver, ChannelSession, InputChannel, SessionRole, Timing};
use crate::error::{AppResult, DaqError, DriverError, DriverErrorKind};
use crate::tabular;
use crate::waveform::{floor_input, Sample};

/// Input-side parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionConfig {
    /// Samples per second
    pub sample_rate: f64,
    /// Input channel definition
    pub input: InputChannel,
    /// Largest sample count a single capture may request
    pub capacity: usize,
    /// Slack added to the nominal capture duration for the read timeout
    pub read_timeout_margin: Duration,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 100.0,
            input: InputChannel::default(),
            capacity: crate::waveform::BUF_SIZE,
            read_timeout_margin: Duration::from_millis(1000),
        }
    }
}

impl AcquisitionConfig {
    /// `seconds * sample_rate`, rounded.
    pub fn sample_count(&self, seconds: u32) -> u64 {
        let n = (f64::from(seconds) * self.sample_rate).round();
        if n.is_finite() && n > 0.0 {
            n as u64
        } else {
            0
        }
    }

    /// Nominal capture time for `count` samples plus the configured margin.
    pub fn read_timeout(&self, count: usize) -> Duration {
        let nominal = if self.sample_rate > 0.0 {
            Duration::from_secs_f64(count as f64 / self.sample_rate)
        } else {
            Duration::ZERO
        };
        nominal + self.read_timeout_margin
    }
}

/// Builds finite acquisitions against a driver.
#[derive(Debug)]
pub struct AcquisitionRunner<D: ChannelDriver> {
    driver: D,
    config: AcquisitionConfig,
}

impl<D: ChannelDriver> AcquisitionRunner<D> {
    /// Runner using `driver`.
    pub fn new(driver: D, config: AcquisitionConfig) -> Self {
        Self { driver, config }
    }

    /// Configure a capture of `seconds` worth of samples.
    ///
    /// Sample count and capacity are checked before the driver is touched.
    /// A driver reject finalizes the session and returns
    /// [`DaqError::Configuration`].
    #[instrument(skip(self), fields(channel = %self.config.input.id))]
    pub fn prepare(self, seconds: u32) -> AppResult<PreparedAcquisition<D>> {
        let Self { driver, config } = self;

        let requested = config.sample_count(seconds);
        if requested == 0 {
            return Err(DaqError::Configuration(DriverError::new(
                driver.name(),
                DriverErrorKind::InvalidParameter,
                format!(
                    "{} s at {} Hz requests no samples",
                    seconds, config.sample_rate
                ),
            )));
        }
        let count = match usize::try_from(requested) {
            Ok(n) if n <= config.capacity => n,
            _ => {
                return Err(DaqError::CapacityExceeded {
                    capacity: config.capacity,
                })
            }
        };

        let mut session = ChannelSession::open(driver, SessionRole::Input)?;
        let configured = session
            .configure_input(&config.input)
            .and_then(|()| session.set_timing(&Timing::finite(config.sample_rate, requested)));
        if let Err(e) = configured {
            session.finalize();
            return Err(e);
        }

        info!(count, rate = config.sample_rate, "Acquisition configured");
        Ok(PreparedAcquisition {
            session,
            config,
            count,
        })
    }
}

/// A configured, not yet started input session.
#[derive(Debug)]
pub struct PreparedAcquisition<D: ChannelDriver> {
    session: ChannelSession<D>,
    config: AcquisitionConfig,
    count: usize,
}

impl<D: ChannelDriver> PreparedAcquisition<D> {
    /// Number of samples that will be requested.
    pub fn requested(&self) -> usize {
        self.count
    }

    /// Read timeout that [`acquire`](Self::acquire) will use.
    pub fn read_timeout(&self) -> Duration {
        self.config.read_timeout(self.count)
    }

    /// Release the session without sampling.
    pub fn cancel(mut self) {
        self.session.finalize();
    }

    /// Start the clock and block until the finite read completes.
    ///
    /// The session is finalized before this returns, on success and failure.
    pub fn acquire(mut self) -> AppResult<AcquiredSeries> {
        let timeout = self.read_timeout();
        let result = self.sample(timeout);
        self.session.finalize();

        let raw = result?;
        if raw.len() < self.count {
            warn!(
                requested = self.count,
                acquired = raw.len(),
                "Acquisition returned fewer samples than requested"
            );
        }

        let rate = self.config.sample_rate;
        let samples = raw
            .into_iter()
            .enumerate()
            .map(|(i, v)| Sample::new(i as f64 / rate, floor_input(v)))
            .collect::<Vec<_>>();

        info!(acquired = samples.len(), "Acquisition complete");
        Ok(AcquiredSeries {
            samples,
            requested: self.count,
        })
    }

    fn sample(&mut self, timeout: Duration) -> AppResult<Vec<f64>> {
        self.session.start()?;
        self.session
            .read(self.count, timeout)
            .map_err(DaqError::Acquisition)
    }
}

/// Floored samples of a completed capture, time axis `i / sample_rate`.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquiredSeries {
    samples: Vec<Sample>,
    requested: usize,
}

impl AcquiredSeries {
    /// Acquired samples.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Samples that were asked for.
    pub fn requested(&self) -> usize {
        self.requested
    }

    /// Write the series as a two-column table.
    pub fn persist(&self, path: impl AsRef<Path>) -> AppResult<()> {
        tabular::write_table(path, &self.samples)
    }
}
