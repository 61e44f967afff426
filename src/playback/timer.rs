//! Cancellable periodic task source.
//!
//! [`PeriodicTask::arm`] moves a [`TickHandler`] into a dedicated tokio task
//! that fires it on a fixed interval. After each invocation the task hands the
//! outcome to the driving side as a [`Tick`] and waits. It only schedules the
//! next invocation once the driving side calls [`Resume::resume`], so handler
//! invocations never overlap and always observe state the driving side updated
//! in between.
//!
//! ```text
//!  timer task                    driving loop
//!  ──────────                    ────────────
//!  interval.tick()
//!  handler.on_tick() ──Tick──▶   next_tick() returns
//!        (waits)                 update state
//!        ◀──────────resume──     resume.resume()
//!  interval.tick()
//!  ...
//! ```
//!
//! Handlers are expected to block (a hardware write with a timeout), so each
//! invocation runs on tokio's blocking pool rather than on a runtime worker.
//!
//! [`PeriodicTask::disarm`] stops the task and returns the handler, so whatever
//! the handler owns (a channel session) comes back to the caller for teardown.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn, Instrument};

use crate::error::{AppResult, DaqError};

/// Work executed on every timer tick.
pub trait TickHandler: Send + 'static {
    /// What one invocation reports back.
    type Outcome: Send + 'static;

    /// Run one tick. Called from the blocking pool.
    fn on_tick(&mut self) -> Self::Outcome;
}

/// Permission for the timer task to schedule its next tick.
#[derive(Debug)]
pub struct Resume(oneshot::Sender<()>);

impl Resume {
    /// Let the timer task continue.
    pub fn resume(self) {
        // The task may already be stopping; nothing to do then.
        let _ = self.0.send(());
    }
}

/// Outcome of one handler invocation, plus the token that releases the next.
#[derive(Debug)]
pub struct Tick<T> {
    outcome: T,
    resume: Resume,
}

impl<T> Tick<T> {
    /// Handler outcome.
    pub fn outcome(&self) -> &T {
        &self.outcome
    }

    /// Split into the outcome and the resume token.
    ///
    /// Dropping the token without resuming ends the timer task.
    pub fn into_parts(self) -> (T, Resume) {
        (self.outcome, self.resume)
    }
}

/// An armed periodic timer driving a [`TickHandler`].
#[derive(Debug)]
pub struct PeriodicTask<H: TickHandler> {
    ticks: mpsc::Receiver<Tick<H::Outcome>>,
    stop: oneshot::Sender<()>,
    join: JoinHandle<Option<H>>,
    period: Duration,
}

impl<H: TickHandler> PeriodicTask<H> {
    /// Arm a timer with `period`; the first tick fires immediately.
    ///
    /// Fails with [`DaqError::TimerFailure`] for a zero period or when called
    /// outside a tokio runtime. The handler is handed back on failure.
    #[allow(clippy::result_large_err)]
    pub fn arm(handler: H, period: Duration) -> Result<Self, (H, DaqError)> {
        if period.is_zero() {
            return Err((
                handler,
                DaqError::TimerFailure("timer period must be non-zero".to_string()),
            ));
        }
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => return Err((handler, DaqError::TimerFailure(e.to_string()))),
        };

        let (tick_tx, ticks) = mpsc::channel(1);
        let (stop, stop_rx) = oneshot::channel();
        let join = runtime.spawn(
            drive(handler, period, tick_tx, stop_rx).instrument(tracing::Span::current()),
        );

        debug!(period_ms = period.as_secs_f64() * 1e3, "Periodic timer armed");
        Ok(Self {
            ticks,
            stop,
            join,
            period,
        })
    }

    /// Timer period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Wait for the next handler invocation to complete.
    ///
    /// Returns `None` if the timer task has ended.
    pub async fn next_tick(&mut self) -> Option<Tick<H::Outcome>> {
        self.ticks.recv().await
    }

    /// Stop the timer and take the handler back, together with the outcomes
    /// of invocations that completed but were never received.
    ///
    /// At most one invocation can be in flight when the stop lands; it runs to
    /// completion and its outcome is returned here.
    ///
    /// Fails if the timer task was aborted or the handler panicked; the handler
    /// is lost in that case.
    pub async fn disarm(self) -> AppResult<(H, Vec<H::Outcome>)> {
        let PeriodicTask {
            mut ticks,
            stop,
            join,
            ..
        } = self;
        let _ = stop.send(());

        let mut unclaimed = Vec::new();
        while let Some(tick) = ticks.recv().await {
            let (outcome, _) = tick.into_parts();
            unclaimed.push(outcome);
        }

        let handler = join
            .await
            .map_err(|e| DaqError::TimerFailure(format!("timer task did not finish: {}", e)))?
            .ok_or_else(|| DaqError::TimerFailure("tick handler panicked".to_string()))?;
        debug!(unclaimed = unclaimed.len(), "Periodic timer disarmed");
        Ok((handler, unclaimed))
    }
}

async fn drive<H: TickHandler>(
    mut handler: H,
    period: Duration,
    tick_tx: mpsc::Sender<Tick<H::Outcome>>,
    mut stop_rx: oneshot::Receiver<()>,
) -> Option<H> {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            _ = interval.tick() => {}
        }

        let span = tracing::Span::current();
        let invocation = tokio::task::spawn_blocking(move || {
            let outcome = span.in_scope(|| handler.on_tick());
            (handler, outcome)
        });
        let outcome = match invocation.await {
            Ok((returned, outcome)) => {
                handler = returned;
                outcome
            }
            Err(e) => {
                warn!(error = %e, "Tick handler did not complete");
                return None;
            }
        };

        let (resume_tx, resume_rx) = oneshot::channel();
        let tick = Tick {
            outcome,
            resume: Resume(resume_tx),
        };
        if tick_tx.send(tick).await.is_err() {
            break;
        }

        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            resumed = resume_rx => {
                if resumed.is_err() {
                    break;
                }
            }
        }
    }

    trace!("Timer task exiting");
    Some(handler)
}
