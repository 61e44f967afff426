//! Configuration management using figment.
//!
//! Settings are layered, later sources overriding earlier ones:
//! 1. Built-in defaults (the classic device layout: 100 Hz, `Dev1/ao0` 0-5 V,
//!    `Dev1/ai0` RSE ±10 V, 10 000 row tables)
//! 2. A TOML file, `wave-daq.toml` in the working directory unless another
//!    path is given
//! 3. Environment variables prefixed with `WAVE_DAQ_`, with `__` separating
//!    nested keys, e.g. `WAVE_DAQ_OUTPUT__BASELINE_VOLTAGE=2.0`
//!
//! # Example
//! ```no_run
//! use wave_daq::config::Settings;
//!
//! # fn main() -> wave_daq::error::AppResult<()> {
//! let settings = Settings::load(None)?;
//! println!("sampling at {} Hz", settings.sample_rate_hz);
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::acquisition::AcquisitionConfig;
use crate::driver::{InputChannel, MockConfig, MockMode, OutputChannel};
use crate::error::{AppResult, DaqError};
use crate::playback::PlaybackConfig;
use crate::tabular::OverflowPolicy;
use crate::tracing_setup::{self, OutputFormat};
use crate::waveform::{VoltageBand, BUF_SIZE, OUTPUT_BAND};

/// File read when no explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "wave-daq.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "WAVE_DAQ_";

/// Top-level settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Output tick rate and input sample clock, in Hz
    pub sample_rate_hz: f64,
    /// Maximum rows a waveform table or acquisition may hold
    pub table_capacity: usize,
    /// What to do when a source holds more rows than `table_capacity`
    pub table_overflow: OverflowPolicy,
    /// Output (playback) settings
    pub output: OutputSettings,
    /// Input (acquisition) settings
    pub input: InputSettings,
    /// Logging settings
    pub logging: LoggingSettings,
    /// Simulated driver settings
    pub simulator: MockConfig,
}

/// `[output]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Output channel
    pub channel: OutputChannel,
    /// Written once after the channel starts
    pub baseline_voltage: f64,
    /// Written during teardown
    pub neutral_voltage: f64,
    /// Timeout of each periodic write, in milliseconds
    pub write_timeout_ms: u64,
    /// Timeout of the baseline and neutral writes, in milliseconds
    pub settle_timeout_ms: u64,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            channel: OutputChannel::default(),
            baseline_voltage: 1.0,
            neutral_voltage: 0.0,
            write_timeout_ms: 10,
            settle_timeout_ms: 100,
        }
    }
}

/// `[input]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputSettings {
    /// Input channel
    pub channel: InputChannel,
    /// Added to the capture duration to form the read timeout, in milliseconds
    pub read_timeout_margin_ms: u64,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            channel: InputChannel::default(),
            read_timeout_margin_ms: 1000,
        }
    }
}

/// `[logging]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// trace, debug, info, warn or error
    pub level: String,
    /// pretty, compact or json
    pub format: OutputFormat,
    /// Log span open/close events
    pub span_events: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: OutputFormat::Compact,
            span_events: false,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sample_rate_hz: 100.0,
            table_capacity: BUF_SIZE,
            table_overflow: OverflowPolicy::Truncate,
            output: OutputSettings::default(),
            input: InputSettings::default(),
            logging: LoggingSettings::default(),
            simulator: MockConfig {
                mode: MockMode::Realistic,
                ..MockConfig::default()
            },
        }
    }
}

impl Settings {
    /// Load defaults, then `path` (or [`DEFAULT_CONFIG_FILE`] if present),
    /// then environment overrides, and validate the result.
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        if let Some(path) = path {
            if !path.is_file() {
                return Err(DaqError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
        }
        let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        Self::from_figment(Self::figment(file))
    }

    /// The layered provider stack for `file`.
    pub fn figment(file: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Extract and validate settings from any figment.
    pub fn from_figment(figment: Figment) -> AppResult<Self> {
        let settings: Settings = figment.extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check values the hardware layer would otherwise reject late.
    pub fn validate(&self) -> AppResult<()> {
        if !(self.sample_rate_hz.is_finite() && self.sample_rate_hz > 0.0) {
            return invalid(format!(
                "sample_rate_hz must be positive, got {}",
                self.sample_rate_hz
            ));
        }
        if self.table_capacity == 0 {
            return invalid("table_capacity must be at least 1".to_string());
        }

        let out = &self.output.channel;
        if out.id.trim().is_empty() {
            return invalid("output.channel.id must not be empty".to_string());
        }
        let Some(out_band) = VoltageBand::new(out.min, out.max) else {
            return invalid(format!(
                "output.channel range [{}, {}] is not ordered",
                out.min, out.max
            ));
        };
        for (name, v) in [
            ("baseline_voltage", self.output.baseline_voltage),
            ("neutral_voltage", self.output.neutral_voltage),
        ] {
            if !out_band.contains(v) || !OUTPUT_BAND.contains(v) {
                return invalid(format!(
                    "output.{} {} V is outside the output range",
                    name, v
                ));
            }
        }
        if self.output.write_timeout_ms == 0 {
            return invalid("output.write_timeout_ms must be at least 1".to_string());
        }

        let input = &self.input.channel;
        if input.id.trim().is_empty() {
            return invalid("input.channel.id must not be empty".to_string());
        }
        if VoltageBand::new(input.min, input.max).is_none() {
            return invalid(format!(
                "input.channel range [{}, {}] is not ordered",
                input.min, input.max
            ));
        }

        tracing_setup::parse_log_level(&self.logging.level)?;
        Ok(())
    }

    /// Tick period derived from the sample rate.
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.sample_rate_hz)
    }

    /// Parameters for the playback scheduler.
    pub fn playback(&self) -> PlaybackConfig {
        PlaybackConfig {
            sample_rate: self.sample_rate_hz,
            output: self.output.channel.clone(),
            baseline_voltage: self.output.baseline_voltage,
            neutral_voltage: self.output.neutral_voltage,
            write_timeout: Duration::from_millis(self.output.write_timeout_ms),
            settle_timeout: Duration::from_millis(self.output.settle_timeout_ms),
        }
    }

    /// Parameters for the acquisition runner.
    pub fn acquisition(&self) -> AcquisitionConfig {
        AcquisitionConfig {
            sample_rate: self.sample_rate_hz,
            input: self.input.channel.clone(),
            capacity: self.table_capacity,
            read_timeout_margin: Duration::from_millis(self.input.read_timeout_margin_ms),
        }
    }
}

fn invalid<T>(message: String) -> AppResult<T> {
    Err(DaqError::Config(message))
}
