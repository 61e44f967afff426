//! Playback scheduler state machine.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use super::cursor::{PlaybackCursor, RunBudget};
use super::timer::{PeriodicTask, TickHandler};
use crate::driver::{ChannelDriver, ChannelSession, OutputChannel, SessionRole, Timing};
use crate::error::{AppResult, DaqError, DriverError};
use crate::waveform::{WaveformTable, OUTPUT_BAND};

/// Output-side parameters for one playback session.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackConfig {
    /// Ticks per second
    pub sample_rate: f64,
    /// Output channel definition
    pub output: OutputChannel,
    /// Voltage written once after start
    pub baseline_voltage: f64,
    /// Voltage written during finalize
    pub neutral_voltage: f64,
    /// Timeout for each periodic write
    pub write_timeout: Duration,
    /// Timeout for the baseline and neutral writes
    pub settle_timeout: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            sample_rate: 100.0,
            output: OutputChannel::default(),
            baseline_voltage: 1.0,
            neutral_voltage: 0.0,
            write_timeout: Duration::from_millis(10),
            settle_timeout: Duration::from_millis(100),
        }
    }
}

impl PlaybackConfig {
    /// Timer period, `1 / sample_rate`.
    pub fn period(&self) -> Duration {
        if self.sample_rate.is_finite() && self.sample_rate > 0.0 {
            Duration::from_secs_f64(1.0 / self.sample_rate)
        } else {
            Duration::ZERO
        }
    }
}

/// How a playback run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackExit {
    /// The run budget was used up
    BudgetExhausted,
    /// The shutdown future resolved
    Shutdown,
    /// The timer task ended on its own
    TimerStopped,
}

/// Summary of a completed playback run.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackReport {
    /// Ticks completed
    pub ticks: u64,
    /// Ticks whose write failed
    pub write_failures: u64,
    /// Most recent write failure
    pub last_error: Option<DriverError>,
    /// Cursor position after the last tick
    pub final_cursor: usize,
    /// Why the run ended
    pub exit: PlaybackExit,
}

/// Result of a single tick.
#[derive(Debug)]
pub struct TickOutcome {
    /// Table row that was written
    pub index: usize,
    /// Clamped voltage that was written
    pub voltage: f64,
    /// Driver result of the write
    pub result: Result<(), DriverError>,
}

/// Tick handler: writes the row under the cursor. Owns the session while the
/// timer runs.
struct TickEmitter<D: ChannelDriver> {
    session: ChannelSession<D>,
    table: Arc<WaveformTable>,
    cursor: Arc<PlaybackCursor>,
    write_timeout: Duration,
}

impl<D: ChannelDriver> TickHandler for TickEmitter<D> {
    type Outcome = TickOutcome;

    fn on_tick(&mut self) -> TickOutcome {
        let index = self.cursor.position();
        let voltage = self
            .table
            .output_voltage(index)
            .unwrap_or(OUTPUT_BAND.min);
        let result = self.session.write(voltage, self.write_timeout);
        if result.is_ok() {
            debug!(index, voltage, "Output");
        }
        TickOutcome {
            index,
            voltage,
            result,
        }
    }
}

/// Mutable state of one run, owned by the driving loop.
#[derive(Debug)]
struct PlaybackContext {
    cursor: Arc<PlaybackCursor>,
    budget: RunBudget,
    total: u64,
    write_failures: u64,
    last_error: Option<DriverError>,
}

impl PlaybackContext {
    fn new(cursor: Arc<PlaybackCursor>, budget: RunBudget) -> Self {
        Self {
            cursor,
            budget,
            total: 0,
            write_failures: 0,
            last_error: None,
        }
    }

    /// Account for one completed tick and move the cursor on.
    fn complete(&mut self, outcome: TickOutcome) {
        if let Err(e) = outcome.result {
            warn!(
                index = outcome.index,
                voltage = outcome.voltage,
                error = %DaqError::WriteFailure(e.clone()),
                "Output write failed, continuing"
            );
            self.write_failures += 1;
            self.last_error = Some(e);
        }
        self.cursor.advance();
        self.total += 1;
    }

    fn is_done(&self) -> bool {
        self.budget.is_exhausted(self.total)
    }

    fn into_report(self, exit: PlaybackExit) -> PlaybackReport {
        PlaybackReport {
            ticks: self.total,
            write_failures: self.write_failures,
            last_error: self.last_error,
            final_cursor: self.cursor.position(),
            exit,
        }
    }
}

/// An output session that has been configured, started and put at its
/// baseline voltage, ready to play a table.
///
/// Dropping it without [`run`](Self::run) or [`abort`](Self::abort) still
/// finalizes the channel through the session's `Drop`.
#[derive(Debug)]
pub struct PlaybackScheduler<D: ChannelDriver> {
    session: ChannelSession<D>,
    config: PlaybackConfig,
}

impl<D: ChannelDriver> PlaybackScheduler<D> {
    /// Create, configure and start the output session, then write the
    /// baseline sample.
    ///
    /// Any failure finalizes whatever was set up before returning.
    #[instrument(skip_all, fields(channel = %config.output.id, rate = config.sample_rate))]
    pub fn arm(driver: D, config: PlaybackConfig) -> AppResult<Self> {
        let mut session = ChannelSession::open(
            driver,
            SessionRole::Output {
                neutral: config.neutral_voltage,
                timeout: config.settle_timeout,
            },
        )?;

        if let Err(e) = bring_up(&mut session, &config) {
            session.finalize();
            return Err(e);
        }

        info!(baseline = config.baseline_voltage, "Output channel armed");
        Ok(Self { session, config })
    }

    /// [`arm`](Self::arm) on the blocking pool, for callers running on a
    /// tokio runtime.
    pub async fn arm_async(driver: D, config: PlaybackConfig) -> AppResult<Self> {
        let span = tracing::Span::current();
        tokio::task::spawn_blocking(move || span.in_scope(|| Self::arm(driver, config)))
            .await
            .map_err(|e| DaqError::Task(e.to_string()))?
    }

    /// Playback parameters.
    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// Finalize without playing anything.
    pub fn abort(mut self) {
        debug!("Playback aborted before running");
        self.session.finalize();
    }

    /// [`abort`](Self::abort) on the blocking pool.
    pub async fn abort_async(self) {
        debug!("Playback aborted before running");
        finalize_blocking(self.session).await;
    }

    /// Play `table` until `budget` ticks have been written.
    pub async fn run(self, table: WaveformTable, budget: RunBudget) -> AppResult<PlaybackReport> {
        self.run_until(table, budget, std::future::pending()).await
    }

    /// Play `table` until `budget` is used up or `shutdown` resolves.
    ///
    /// The channel is finalized on every path out of this function.
    pub async fn run_until<F>(
        self,
        table: WaveformTable,
        budget: RunBudget,
        shutdown: F,
    ) -> AppResult<PlaybackReport>
    where
        F: Future<Output = ()>,
    {
        let Self { session, config } = self;

        let cursor = match PlaybackCursor::new(table.len()) {
            Some(cursor) => Arc::new(cursor),
            None => {
                finalize_blocking(session).await;
                return Err(DaqError::EmptyTable);
            }
        };

        let emitter = TickEmitter {
            session,
            table: Arc::new(table),
            cursor: Arc::clone(&cursor),
            write_timeout: config.write_timeout,
        };

        let mut task = match PeriodicTask::arm(emitter, config.period()) {
            Ok(task) => task,
            Err((emitter, e)) => {
                warn!(error = %e, "Could not arm playback timer");
                finalize_blocking(emitter.session).await;
                return Err(e);
            }
        };

        info!(
            rows = cursor.len(),
            budget = budget.get(),
            period_ms = task.period().as_secs_f64() * 1e3,
            "Playback running"
        );

        let mut ctx = PlaybackContext::new(cursor, budget);
        tokio::pin!(shutdown);

        let exit = loop {
            let tick = tokio::select! {
                biased;
                _ = &mut shutdown => break PlaybackExit::Shutdown,
                tick = task.next_tick() => tick,
            };
            let Some(tick) = tick else {
                break PlaybackExit::TimerStopped;
            };

            let (outcome, resume) = tick.into_parts();
            ctx.complete(outcome);
            if ctx.is_done() {
                break PlaybackExit::BudgetExhausted;
            }
            resume.resume();
        };

        // A write already issued when shutdown won still counts as a tick.
        // The emitter is dropped inside a failed timer task; its session
        // finalizes on drop in that case.
        match task.disarm().await {
            Ok((emitter, unclaimed)) => {
                for outcome in unclaimed {
                    ctx.complete(outcome);
                }
                finalize_blocking(emitter.session).await;
            }
            Err(e) => warn!(error = %e, "Playback timer did not shut down cleanly"),
        }

        let report = ctx.into_report(exit);
        info!(
            ticks = report.ticks,
            write_failures = report.write_failures,
            exit = ?report.exit,
            "Playback finished"
        );
        Ok(report)
    }
}

/// Finalize `session` on the blocking pool; teardown writes wait on hardware.
async fn finalize_blocking<D: ChannelDriver>(mut session: ChannelSession<D>) {
    let span = tracing::Span::current();
    let teardown = tokio::task::spawn_blocking(move || span.in_scope(|| session.finalize()));
    if let Err(e) = teardown.await {
        warn!(error = %e, "Channel teardown task failed");
    }
}

fn bring_up<D: ChannelDriver>(
    session: &mut ChannelSession<D>,
    config: &PlaybackConfig,
) -> AppResult<()> {
    session.configure_output(&config.output)?;
    session.set_timing(&Timing::OnDemand)?;
    session.start()?;

    let baseline = OUTPUT_BAND.clamp(config.baseline_voltage);
    session
        .write(baseline, config.settle_timeout)
        .map_err(DaqError::WriteFailure)
}
