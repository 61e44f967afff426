//! Command line surface: `wave-daq <in|out> <path> <seconds>`.
//!
//! Argument problems exit with their own codes before anything else runs,
//! checked in this order:
//!
//! | Code | Meaning |
//! |---|---|
//! | `-10` | wrong number of arguments (any clap usage error) |
//! | `-13` | duration is not a whole number of seconds |
//! | `-12` | mode is neither `in` nor `out` |
//! | `-11` | the routine itself failed (see [`DaqError::exit_code`]) |

use std::io;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use clap::Parser;
use thiserror::Error;
use tracing::{error, info};

use crate::app;
use crate::config::Settings;
use crate::driver::MockChannelDriver;
use crate::error::{DaqError, EXIT_ROUTINE_FAILED};
use crate::tracing_setup::{self, TracingConfig};

/// Exit code for a wrong argument count.
pub const EXIT_BAD_ARGUMENT_COUNT: i32 = -10;
/// Exit code for an unknown mode.
pub const EXIT_UNKNOWN_MODE: i32 = -12;
/// Exit code for an unparseable duration.
pub const EXIT_BAD_DURATION: i32 = -13;

/// Analog waveform playback and finite acquisition on a single DAQ channel.
#[derive(Parser, Debug)]
#[command(name = "wave-daq", version, about, long_about = None)]
pub struct Cli {
    /// `out` plays the table at PATH, `in` records into PATH
    pub mode: String,

    /// Two-column `time,voltage` table
    pub path: PathBuf,

    /// Duration in whole seconds; 0 plays until interrupted
    #[arg(allow_hyphen_values = true)]
    pub seconds: String,

    /// Settings file (defaults to ./wave-daq.toml when present)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Override the configured log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Start acquisition without waiting for Enter
    #[arg(long)]
    pub no_prompt: bool,
}

/// Which routine to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Finite acquisition into a table
    In,
    /// Periodic playback of a table
    Out,
}

impl FromStr for Mode {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(Mode::In),
            "out" => Ok(Mode::Out),
            other => Err(CliError::UnknownMode(other.to_string())),
        }
    }
}

/// Argument errors, each with its own exit code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CliError {
    /// Usage error reported by the parser
    #[error("Bad Argument Number. {0}")]
    BadArgumentCount(String),

    /// Duration was not a non-negative integer
    #[error("Bad Time. '{0}' is not a whole number of seconds")]
    BadDuration(String),

    /// Mode other than `in` / `out`
    #[error("Bad Argument Type. \"in\" or \"out\", got '{0}'")]
    UnknownMode(String),
}

impl CliError {
    /// Process exit code.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::BadArgumentCount(_) => EXIT_BAD_ARGUMENT_COUNT,
            CliError::BadDuration(_) => EXIT_BAD_DURATION,
            CliError::UnknownMode(_) => EXIT_UNKNOWN_MODE,
        }
    }
}

/// Validated command line.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Routine
    pub mode: Mode,
    /// Table path
    pub path: PathBuf,
    /// Duration in seconds
    pub seconds: u32,
    /// Explicit settings file
    pub config: Option<PathBuf>,
    /// Log level override
    pub log_level: Option<String>,
    /// Wait for the operator before acquiring
    pub prompt: bool,
}

impl Cli {
    /// Check duration, then mode.
    pub fn validate(self) -> Result<Invocation, CliError> {
        let seconds = self
            .seconds
            .trim()
            .parse::<u32>()
            .map_err(|_| CliError::BadDuration(self.seconds.clone()))?;
        let mode = self.mode.parse::<Mode>()?;
        Ok(Invocation {
            mode,
            path: self.path,
            seconds,
            config: self.config,
            log_level: self.log_level,
            prompt: !self.no_prompt,
        })
    }
}

/// Parse and validate `args` (including the program name).
///
/// `Ok(Err(code))` means clap already handled the request (help, version)
/// and the process should exit with `code`.
pub fn parse<I, T>(args: I) -> Result<Result<Invocation, i32>, CliError>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    match Cli::try_parse_from(args) {
        Ok(cli) => cli.validate().map(Ok),
        Err(e) => match e.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                let _ = e.print();
                Ok(Err(0))
            }
            _ => Err(CliError::BadArgumentCount(e.to_string())),
        },
    }
}

/// Run a validated invocation and return the process exit code.
pub async fn execute(invocation: Invocation) -> i32 {
    match dispatch(&invocation).await {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Routine failed");
            eprintln!("Error: {:#}", e);
            e.downcast_ref::<DaqError>()
                .map(DaqError::exit_code)
                .unwrap_or(EXIT_ROUTINE_FAILED)
        }
    }
}

async fn dispatch(invocation: &Invocation) -> anyhow::Result<()> {
    let mut settings = Settings::load(invocation.config.as_deref())?;
    if let Some(level) = &invocation.log_level {
        tracing_setup::parse_log_level(level)?;
        settings.logging.level = level.clone();
    }
    tracing_setup::init(TracingConfig::from_settings(&settings.logging)?)?;

    let driver = MockChannelDriver::with_config(settings.simulator.clone());
    info!(
        mode = ?invocation.mode,
        path = %invocation.path.display(),
        seconds = invocation.seconds,
        "Starting"
    );

    match invocation.mode {
        Mode::Out => {
            let report = app::run_output(
                driver,
                &settings,
                &invocation.path,
                invocation.seconds,
                shutdown_signal(),
            )
            .await
            .with_context(|| format!("out routine failed for {}", invocation.path.display()))?;
            println!(
                "Played {} samples ({} write failures)",
                report.ticks, report.write_failures
            );
        }
        Mode::In => {
            let path = invocation.path.clone();
            let seconds = invocation.seconds;
            let prompt = invocation.prompt;
            let series = tokio::task::spawn_blocking(move || {
                if prompt {
                    app::run_input(driver, &settings, &path, seconds, || {
                        app::prompt_operator(io::stdin().lock(), io::stdout())
                    })
                } else {
                    app::run_input(driver, &settings, &path, seconds, || Ok(()))
                }
            })
            .await
            .context("acquisition thread panicked")?
            .with_context(|| format!("in routine failed for {}", invocation.path.display()))?;
            println!("Acquired {} points", series.samples().len());
        }
    }
    Ok(())
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed.
async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
    info!("Interrupt received, stopping playback");
}
