//! Integration tests for finite acquisition and the `in` / `out` routines
//!
//! Run with: cargo test --test acquisition_runner

use std::fs;

use wave_daq::acquisition::{AcquisitionConfig, AcquisitionRunner};
use wave_daq::app;
use wave_daq::config::Settings;
use wave_daq::driver::{DriverCall, FailureScenario, MockChannelDriver, Operation, TerminalConfig, Timing};
use wave_daq::error::DaqError;

#[test]
fn test_short_read_is_floored_and_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.csv");
    let driver = MockChannelDriver::new().with_input(vec![-2.0, 0.0, 3.3]);
    let config = AcquisitionConfig {
        sample_rate: 5.0,
        ..AcquisitionConfig::default()
    };

    let prepared = AcquisitionRunner::new(driver.clone(), config)
        .prepare(1)
        .unwrap();
    assert_eq!(prepared.requested(), 5);

    let series = prepared.acquire().unwrap();
    series.persist(&path).unwrap();

    assert_eq!(series.samples().len(), 3);
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "0.000000,0.000000\n0.200000,0.000000\n0.400000,3.300000\n"
    );
    assert_eq!(driver.open_sessions(), 0);
}

#[test]
fn test_routine_persists_floored_samples() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.csv");
    let driver = MockChannelDriver::new().with_input(vec![-2.0, 0.0, 3.3]);
    let mut settings = Settings::default();
    settings.table_capacity = 100;

    let series = app::run_input(driver.clone(), &settings, &path, 1, || Ok(())).unwrap();

    assert_eq!(series.requested(), 100);
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "0.000000,0.000000\n0.010000,0.000000\n0.020000,3.300000\n"
    );
}

#[test]
fn test_session_configuration_sequence() {
    let driver = MockChannelDriver::new().with_input(vec![1.0; 200]);
    AcquisitionRunner::new(driver.clone(), AcquisitionConfig::default())
        .prepare(2)
        .unwrap()
        .acquire()
        .unwrap();

    let ops: Vec<Operation> = driver.calls().iter().map(DriverCall::operation).collect();
    assert_eq!(
        ops,
        vec![
            Operation::CreateSession,
            Operation::ConfigureInput,
            Operation::SetTiming,
            Operation::Start,
            Operation::Read,
            Operation::Stop,
            Operation::Release,
        ]
    );

    for call in driver.calls() {
        match call {
            DriverCall::ConfigureInput { channel, .. } => {
                assert_eq!(channel.id, "Dev1/ai0");
                assert_eq!(channel.terminal, TerminalConfig::Rse);
                assert_eq!((channel.min, channel.max), (-10.0, 10.0));
            }
            DriverCall::SetTiming { timing, .. } => {
                assert_eq!(timing, Timing::finite(100.0, 200));
            }
            _ => {}
        }
    }
}

#[test]
fn test_rejected_start_is_configuration_error() {
    let driver = MockChannelDriver::new();
    driver.inject(FailureScenario::Always {
        operation: Operation::Start,
    });

    let err = AcquisitionRunner::new(driver.clone(), AcquisitionConfig::default())
        .prepare(1)
        .unwrap()
        .acquire()
        .unwrap_err();

    assert!(err.is_configuration());
    assert_eq!(err.exit_code(), -11);
    assert_eq!(driver.count(Operation::Read), 0);
    assert_eq!(driver.open_sessions(), 0);
}

#[test]
fn test_over_capacity_request_touches_no_hardware() {
    let driver = MockChannelDriver::new();
    let mut settings = Settings::default();
    settings.table_capacity = 150;
    let dir = tempfile::tempdir().unwrap();

    let err = app::run_input(driver.clone(), &settings, &dir.path().join("x.csv"), 2, || Ok(()))
        .unwrap_err();

    assert!(matches!(err, DaqError::CapacityExceeded { capacity: 150 }));
    assert!(driver.calls().is_empty());
}

#[test]
fn test_unwritable_sink_after_teardown() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing-dir").join("capture.csv");
    let driver = MockChannelDriver::new().with_input(vec![1.0, 2.0]);
    let err = app::run_input(driver.clone(), &Settings::default(), &path, 1, || Ok(())).unwrap_err();

    assert!(matches!(err, DaqError::SinkUnavailable { .. }));
    assert_eq!(driver.count(Operation::Stop), 1);
    assert_eq!(driver.open_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_out_with_missing_file_tears_down() {
    let dir = tempfile::tempdir().unwrap();
    let driver = MockChannelDriver::new();

    let err = app::run_output(
        driver.clone(),
        &Settings::default(),
        &dir.path().join("does-not-exist.csv"),
        2,
        std::future::pending(),
    )
    .await
    .unwrap_err();

    match &err {
        DaqError::SourceUnavailable { path, .. } => {
            assert!(path.ends_with("does-not-exist.csv"));
        }
        other => panic!("expected SourceUnavailable, got {:?}", other),
    }
    assert_eq!(err.exit_code(), -11);
    assert_eq!(driver.count(Operation::Stop), 1);
    assert_eq!(driver.count(Operation::Release), 1);
    assert_eq!(driver.written_values(), vec![1.0, 0.0]);
}

#[tokio::test(start_paused = true)]
async fn test_out_plays_file_for_duration() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wave.csv");
    fs::write(&path, "0.00,1.0\n0.01,6.0\n0.02,-1.0\n").unwrap();
    let driver = MockChannelDriver::new();

    let report = app::run_output(driver.clone(), &Settings::default(), &path, 1, std::future::pending())
        .await
        .unwrap();

    assert_eq!(report.ticks, 100);
    assert_eq!(report.final_cursor, 100 % 3);
    let writes = driver.written_values();
    assert_eq!(writes.len(), 102);
    assert_eq!(&writes[1..6], &[1.0, 5.0, 0.0, 1.0, 5.0]);
}
