//! The `out` and `in` routines, composed from the library parts.
//!
//! Both take the driver by value and hand it to exactly one session, so a
//! routine that returns (successfully or not) has already released it.

use std::future::Future;
use std::io::{self, BufRead, Write};
use std::path::Path;

use tracing::{info, instrument};

use crate::acquisition::{AcquiredSeries, AcquisitionRunner};
use crate::config::Settings;
use crate::driver::ChannelDriver;
use crate::error::AppResult;
use crate::playback::{PlaybackReport, PlaybackScheduler, RunBudget};
use crate::tabular::RowLimit;
use crate::waveform::WaveformTable;

/// Play the table at `path` for `seconds` (0 = until `shutdown`).
///
/// The channel is armed before the table is read, so a missing or malformed
/// file still leaves the output at its neutral value. Driver calls run on the
/// blocking pool.
#[instrument(skip(driver, settings, path, shutdown), fields(path = %path.display()))]
pub async fn run_output<D, F>(
    driver: D,
    settings: &Settings,
    path: &Path,
    seconds: u32,
    shutdown: F,
) -> AppResult<PlaybackReport>
where
    D: ChannelDriver,
    F: Future<Output = ()>,
{
    let budget = RunBudget::from_duration(seconds, settings.sample_rate_hz);
    let scheduler = PlaybackScheduler::arm_async(driver, settings.playback()).await?;

    let table = match WaveformTable::load(
        path,
        RowLimit::from_budget(budget.get()),
        settings.table_capacity,
        settings.table_overflow,
    ) {
        Ok(table) => table,
        Err(e) => {
            scheduler.abort_async().await;
            return Err(e);
        }
    };
    info!(rows = table.len(), "Waveform loaded");

    scheduler.run_until(table, budget, shutdown).await
}

/// Capture `seconds` of input and write it to `path`.
///
/// `gate` runs after the channel is configured and before sampling starts;
/// an error from it releases the channel without sampling.
#[instrument(skip(driver, settings, path, gate), fields(path = %path.display()))]
pub fn run_input<D, G>(
    driver: D,
    settings: &Settings,
    path: &Path,
    seconds: u32,
    gate: G,
) -> AppResult<AcquiredSeries>
where
    D: ChannelDriver,
    G: FnOnce() -> io::Result<()>,
{
    let prepared = AcquisitionRunner::new(driver, settings.acquisition()).prepare(seconds)?;

    if let Err(e) = gate() {
        prepared.cancel();
        return Err(e.into());
    }

    let series = prepared.acquire()?;
    series.persist(path)?;
    info!(rows = series.samples().len(), "Acquisition written");
    Ok(series)
}

/// Prompt the operator and wait for a line on `input` before sampling.
pub fn prompt_operator<R: BufRead, W: Write>(mut input: R, mut output: W) -> io::Result<()> {
    writeln!(output, "Ready to Sample...")?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    writeln!(output, "GO!!!")?;
    output.flush()
}
