//! Integration tests for periodic waveform playback
//!
//! Drives `PlaybackScheduler` against the simulated driver with tokio's paused
//! clock, so every run is deterministic and finishes instantly.
//!
//! Run with: cargo test --test playback_scheduler

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing_test::traced_test;
use wave_daq::driver::{
    ChannelDriver, DriverCall, DriverResult, FailureScenario, InputChannel, MockChannelDriver,
    Operation, OutputChannel, SessionHandle, Timing,
};
use wave_daq::error::{DaqError, DriverError, DriverErrorKind};
use wave_daq::playback::{PlaybackConfig, PlaybackExit, PlaybackScheduler, RunBudget};
use wave_daq::waveform::{Sample, WaveformTable};

fn table_of(voltages: &[f64]) -> WaveformTable {
    let samples = voltages
        .iter()
        .enumerate()
        .map(|(i, v)| Sample::new(i as f64 / 100.0, *v))
        .collect();
    WaveformTable::from_samples(samples, 10_000)
}

/// Writes issued between the baseline and the neutral value.
fn periodic_writes(driver: &MockChannelDriver) -> Vec<f64> {
    let all = driver.written_values();
    assert!(all.len() >= 2, "expected baseline and neutral writes: {:?}", all);
    all[1..all.len() - 1].to_vec()
}

type WriteHook = dyn Fn(u32) -> DriverResult<()> + Send + Sync;

/// Simulated driver that runs a hook with the 1-based write number before
/// each write reaches the mock. A hook error fails the write.
#[derive(Clone)]
struct HookedDriver {
    inner: MockChannelDriver,
    writes: Arc<AtomicU32>,
    on_write: Arc<WriteHook>,
}

impl HookedDriver {
    fn new(inner: MockChannelDriver, on_write: impl Fn(u32) -> DriverResult<()> + Send + Sync + 'static) -> Self {
        Self {
            inner,
            writes: Arc::new(AtomicU32::new(0)),
            on_write: Arc::new(on_write),
        }
    }
}

impl ChannelDriver for HookedDriver {
    fn name(&self) -> &str {
        "hooked"
    }

    fn create_session(&mut self) -> DriverResult<SessionHandle> {
        self.inner.create_session()
    }

    fn configure_output_channel(&mut self, session: SessionHandle, channel: &OutputChannel) -> DriverResult<()> {
        self.inner.configure_output_channel(session, channel)
    }

    fn configure_input_channel(&mut self, session: SessionHandle, channel: &InputChannel) -> DriverResult<()> {
        self.inner.configure_input_channel(session, channel)
    }

    fn set_timing(&mut self, session: SessionHandle, timing: &Timing) -> DriverResult<()> {
        self.inner.set_timing(session, timing)
    }

    fn start(&mut self, session: SessionHandle) -> DriverResult<()> {
        self.inner.start(session)
    }

    fn write_sample(&mut self, session: SessionHandle, value: f64, timeout: Duration) -> DriverResult<()> {
        let n = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        (self.on_write)(n)?;
        self.inner.write_sample(session, value, timeout)
    }

    fn read_samples(&mut self, session: SessionHandle, count: usize, timeout: Duration) -> DriverResult<Vec<f64>> {
        self.inner.read_samples(session, count, timeout)
    }

    fn stop(&mut self, session: SessionHandle) -> DriverResult<()> {
        self.inner.stop(session)
    }

    fn release(&mut self, session: SessionHandle) -> DriverResult<()> {
        self.inner.release(session)
    }
}

// =============================================================================
// Emission order
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_clamped_wraparound_sequence() {
    let driver = MockChannelDriver::new();
    let table = WaveformTable::from_samples(
        vec![
            Sample::new(0.0, 1.0),
            Sample::new(0.01, 6.0),
            Sample::new(0.02, -1.0),
        ],
        10_000,
    );

    let report = PlaybackScheduler::arm(driver.clone(), PlaybackConfig::default())
        .unwrap()
        .run(table, RunBudget::ticks(5))
        .await
        .unwrap();

    assert_eq!(report.ticks, 5);
    assert_eq!(report.final_cursor, 2);
    assert_eq!(
        driver.written_values(),
        vec![1.0, 1.0, 5.0, 0.0, 1.0, 5.0, 0.0]
    );
}

#[tokio::test(start_paused = true)]
async fn test_indices_wrap_for_any_length_and_budget() {
    for len in 1..=5usize {
        for budget in 1..=12u64 {
            let driver = MockChannelDriver::new();
            // Row i carries voltage i * 0.5 so written values identify the row.
            let voltages: Vec<f64> = (0..len).map(|i| i as f64 * 0.5).collect();

            let report = PlaybackScheduler::arm(driver.clone(), PlaybackConfig::default())
                .unwrap()
                .run(table_of(&voltages), RunBudget::ticks(budget))
                .await
                .unwrap();

            let indices: Vec<usize> = periodic_writes(&driver)
                .iter()
                .map(|v| (v / 0.5).round() as usize)
                .collect();
            let expected: Vec<usize> = (0..budget as usize).map(|i| i % len).collect();

            assert_eq!(indices, expected, "len={} budget={}", len, budget);
            assert!(indices.iter().all(|&i| i < len));
            assert_eq!(report.ticks, budget);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_ticks_are_one_period_apart() {
    let driver = MockChannelDriver::new();
    let config = PlaybackConfig {
        sample_rate: 50.0,
        ..PlaybackConfig::default()
    };

    let start = tokio::time::Instant::now();
    PlaybackScheduler::arm(driver.clone(), config)
        .unwrap()
        .run(table_of(&[1.0, 2.0]), RunBudget::ticks(10))
        .await
        .unwrap();

    // First tick fires immediately, the remaining nine at 20 ms spacing.
    assert_eq!(start.elapsed(), Duration::from_millis(180));
}

#[tokio::test(start_paused = true)]
async fn test_periodic_writes_use_short_timeout() {
    let driver = MockChannelDriver::new();
    PlaybackScheduler::arm(driver.clone(), PlaybackConfig::default())
        .unwrap()
        .run(table_of(&[2.0]), RunBudget::ticks(2))
        .await
        .unwrap();

    let timeouts: Vec<Duration> = driver
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            DriverCall::Write { timeout, .. } => Some(timeout),
            _ => None,
        })
        .collect();
    assert_eq!(
        timeouts,
        vec![
            Duration::from_millis(100),
            Duration::from_millis(10),
            Duration::from_millis(10),
            Duration::from_millis(100),
        ]
    );
}

// =============================================================================
// Failures and shutdown
// =============================================================================

#[traced_test]
#[tokio::test(start_paused = true)]
async fn test_write_failure_does_not_stop_playback() {
    let driver = MockChannelDriver::new();
    // Write #1 is the baseline, so #3 is the second periodic tick.
    driver.inject(FailureScenario::Nth {
        operation: Operation::Write,
        n: 3,
    });

    let report = PlaybackScheduler::arm(driver.clone(), PlaybackConfig::default())
        .unwrap()
        .run(table_of(&[1.0, 2.0, 3.0]), RunBudget::ticks(4))
        .await
        .unwrap();

    assert_eq!(report.ticks, 4);
    assert_eq!(report.write_failures, 1);
    assert!(report.last_error.is_some());
    assert_eq!(periodic_writes(&driver), vec![1.0, 2.0, 3.0, 1.0]);
    assert!(logs_contain("Output write failed, continuing"));
}

#[tokio::test(start_paused = true)]
async fn test_empty_table_refused_and_torn_down() {
    let driver = MockChannelDriver::new();
    let err = PlaybackScheduler::arm(driver.clone(), PlaybackConfig::default())
        .unwrap()
        .run(WaveformTable::with_capacity(10_000), RunBudget::ticks(5))
        .await
        .unwrap_err();

    assert!(matches!(err, DaqError::EmptyTable));
    assert_eq!(driver.written_values(), vec![1.0, 0.0]);
    assert_eq!(driver.count(Operation::Stop), 1);
    assert_eq!(driver.count(Operation::Release), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_channel_tears_down() {
    let driver = MockChannelDriver::new();
    driver.inject(FailureScenario::Always {
        operation: Operation::ConfigureOutput,
    });

    let err = PlaybackScheduler::arm(driver.clone(), PlaybackConfig::default()).unwrap_err();

    assert!(err.is_configuration());
    assert_eq!(driver.count(Operation::Start), 0);
    assert_eq!(driver.count(Operation::Release), 1);
    assert_eq!(driver.open_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_run_stops_on_shutdown() {
    let driver = MockChannelDriver::new();
    let shutdown = tokio::time::sleep(Duration::from_millis(95));

    let report = PlaybackScheduler::arm(driver.clone(), PlaybackConfig::default())
        .unwrap()
        .run_until(table_of(&[1.0, 2.0, 3.0]), RunBudget::unbounded(), shutdown)
        .await
        .unwrap();

    assert_eq!(report.exit, PlaybackExit::Shutdown);
    // Ticks at 0, 10, ..., 90 ms.
    assert_eq!(report.ticks, 10);
    assert_eq!(report.final_cursor, 1);
    assert_eq!(driver.written_values().last(), Some(&0.0));
    assert_eq!(driver.open_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_finalize_happens_once() {
    let driver = MockChannelDriver::new();
    PlaybackScheduler::arm(driver.clone(), PlaybackConfig::default())
        .unwrap()
        .run(table_of(&[4.0]), RunBudget::ticks(3))
        .await
        .unwrap();

    assert_eq!(driver.count(Operation::Stop), 1);
    assert_eq!(driver.count(Operation::Release), 1);
    assert_eq!(
        driver.written_values().iter().filter(|v| **v == 0.0).count(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_write_in_flight_at_shutdown_is_counted() {
    let notify = Arc::new(Notify::new());
    let hook_notify = Arc::clone(&notify);
    // Write #1 is the baseline, so #4 is the third periodic tick.
    let driver = HookedDriver::new(MockChannelDriver::new(), move |n| {
        if n == 4 {
            hook_notify.notify_one();
        }
        Ok(())
    });
    let log = driver.inner.clone();

    let report = PlaybackScheduler::arm_async(driver, PlaybackConfig::default())
        .await
        .unwrap()
        .run_until(
            table_of(&[1.0, 2.0, 3.0]),
            RunBudget::unbounded(),
            async move { notify.notified().await },
        )
        .await
        .unwrap();

    assert_eq!(report.exit, PlaybackExit::Shutdown);
    assert_eq!(report.ticks as usize, periodic_writes(&log).len());
    assert_eq!(report.final_cursor, report.ticks as usize % 3);
}

// =============================================================================
// Blocking drivers
// =============================================================================

#[tokio::test]
async fn test_blocking_writes_leave_runtime_free() {
    let (permit_tx, permits) = std::sync::mpsc::channel::<()>();
    let permits = Mutex::new(permits);
    // Each write waits for a permit that only a task on this single-threaded
    // runtime can hand out.
    let driver = HookedDriver::new(MockChannelDriver::new(), move |_| {
        permits
            .lock()
            .recv_timeout(Duration::from_secs(2))
            .map_err(|_| DriverError::new("hooked", DriverErrorKind::Timeout, "no permit"))
    });
    let log = driver.inner.clone();

    // Baseline, five ticks, neutral.
    let feeder = tokio::spawn(async move {
        for _ in 0..7 {
            tokio::time::sleep(Duration::from_millis(2)).await;
            if permit_tx.send(()).is_err() {
                break;
            }
        }
    });

    let report = PlaybackScheduler::arm_async(driver, PlaybackConfig::default())
        .await
        .unwrap()
        .run(table_of(&[1.0, 2.0]), RunBudget::ticks(5))
        .await
        .unwrap();
    feeder.await.unwrap();

    assert_eq!(report.write_failures, 0);
    assert_eq!(
        log.written_values(),
        vec![1.0, 1.0, 2.0, 1.0, 2.0, 1.0, 0.0]
    );
    assert_eq!(log.open_sessions(), 0);
}
