//! Error types for the application.
//!
//! Two layers, mirroring the split between hardware and application concerns:
//!
//! - [`DriverError`]: what a [`ChannelDriver`](crate::driver::ChannelDriver)
//!   reports when a single call fails. It carries a [`DriverErrorKind`] so the
//!   caller can tell configuration rejects from transient write timeouts.
//! - [`DaqError`]: everything the `in`/`out` routines can fail with, from file
//!   access to hardware setup.
//!
//! ## Propagation Policy
//!
//! - **Configuration-time** failures (`Configuration`, `Acquisition`) abort the
//!   routine after the channel session has been finalized.
//! - **Per-tick** write failures never surface as `DaqError`; the scheduler logs
//!   them and counts them in its report.
//! - **File** failures (`SourceUnavailable`, `SinkUnavailable`, `Parse`) carry the
//!   resolved path so the operator can see which directory was searched.
//!
//! Every `DaqError` maps to the same process exit code (see [`DaqError::exit_code`]);
//! argument errors are handled separately by [`crate::cli::CliError`].

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Process exit code for a routine that could not be completed.
pub const EXIT_ROUTINE_FAILED: i32 = -11;

/// Category of a channel driver failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// Session or device could not be brought up
    Initialization,
    /// Channel or timing parameters rejected
    Configuration,
    /// Transport to the device failed
    Communication,
    /// Device reported a fault
    Hardware,
    /// Operation did not finish within its timeout
    Timeout,
    /// Call made with bad arguments or in the wrong session state
    InvalidParameter,
    /// Stop or release failed
    Shutdown,
}

impl std::fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DriverErrorKind::Initialization => "initialization",
            DriverErrorKind::Configuration => "configuration",
            DriverErrorKind::Communication => "communication",
            DriverErrorKind::Hardware => "hardware",
            DriverErrorKind::Timeout => "timeout",
            DriverErrorKind::InvalidParameter => "invalid_parameter",
            DriverErrorKind::Shutdown => "shutdown",
        };
        write!(f, "{}", label)
    }
}

/// A single failed call against a channel driver.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Driver '{driver}' {kind} error: {message}")]
pub struct DriverError {
    /// Driver name
    pub driver: String,
    /// Failure category
    pub kind: DriverErrorKind,
    /// Driver-specific detail
    pub message: String,
}

impl DriverError {
    /// Create a new driver error.
    pub fn new(
        driver: impl Into<String>,
        kind: DriverErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            driver: driver.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Primary error type for the `in` and `out` routines.
#[derive(Error, Debug)]
pub enum DaqError {
    /// Waveform source could not be opened.
    #[error("couldn't open {}: {source}", path.display())]
    SourceUnavailable {
        /// Resolved source path
        path: PathBuf,
        /// Underlying open failure
        #[source]
        source: std::io::Error,
    },

    /// Acquisition sink could not be created.
    #[error("couldn't open {} for writing: {source}", path.display())]
    SinkUnavailable {
        /// Resolved sink path
        path: PathBuf,
        /// Underlying create failure
        #[source]
        source: std::io::Error,
    },

    /// A row of the tabular source is not a `time,voltage` pair.
    #[error("{}:{line}: {message}", path.display())]
    Parse {
        /// Source file
        path: PathBuf,
        /// 1-based line number
        line: u64,
        /// What was wrong with the row
        message: String,
    },

    /// More samples were requested or supplied than the configured capacity.
    #[error("capacity of {capacity} samples exceeded")]
    CapacityExceeded {
        /// Configured table capacity
        capacity: usize,
    },

    /// Playback refuses to start with nothing to emit.
    #[error("waveform table is empty, nothing to play back")]
    EmptyTable,

    /// The driver rejected channel, timing or start configuration.
    #[error("channel configuration failed: {0}")]
    Configuration(DriverError),

    /// The finite read did not complete.
    #[error("acquisition failed: {0}")]
    Acquisition(DriverError),

    /// A sample write failed outside the steady-state loop.
    #[error("sample write failed: {0}")]
    WriteFailure(DriverError),

    /// The periodic timer could not be armed or joined.
    #[error("periodic timer failure: {0}")]
    TimerFailure(String),

    /// Blocking driver work could not be joined.
    #[error("blocking driver task failed: {0}")]
    Task(String),

    /// Settings could not be loaded or are invalid.
    #[error("settings error: {0}")]
    Config(String),

    /// Any other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for DaqError {
    fn from(err: figment::Error) -> Self {
        DaqError::Config(err.to_string())
    }
}

impl DaqError {
    /// Process exit code for this failure.
    ///
    /// File, hardware and settings failures all mean the requested routine did
    /// not complete, which the CLI contract reports as a single code.
    pub fn exit_code(&self) -> i32 {
        EXIT_ROUTINE_FAILED
    }

    /// True for failures raised while bringing up hardware.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}
