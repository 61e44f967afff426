//! Ordered lifecycle wrapper around one driver session.

use std::time::Duration;

use tracing::{debug, warn};

use super::{ChannelDriver, DriverResult, InputChannel, OutputChannel, SessionHandle, Timing};
use crate::error::{AppResult, DaqError, DriverError, DriverErrorKind};

/// What a session is used for, which decides how it is torn down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionRole {
    /// Output session; finalize drives the channel to `neutral` first.
    Output {
        /// Voltage written during finalize
        neutral: f64,
        /// Timeout for the neutral write
        timeout: Duration,
    },
    /// Input session; finalize only stops and releases.
    Input,
}

/// A driver together with a single session handle.
///
/// The session walks create → configure → start → (write*|read) → stop →
/// release. Out-of-order calls are refused with a driver error instead of
/// reaching the hardware. [`finalize`](Self::finalize) runs the teardown once;
/// later calls, and the `Drop` fallback, are no-ops.
pub struct ChannelSession<D: ChannelDriver> {
    driver: D,
    handle: SessionHandle,
    role: SessionRole,
    configured: bool,
    started: bool,
    finalized: bool,
}

impl<D: ChannelDriver> ChannelSession<D> {
    /// Create a session on `driver`.
    ///
    /// A rejected creation is a configuration failure; nothing needs to be
    /// released in that case.
    pub fn open(mut driver: D, role: SessionRole) -> AppResult<Self> {
        let handle = driver.create_session().map_err(DaqError::Configuration)?;
        debug!(driver = driver.name(), session = %handle, "Created channel session");
        Ok(Self {
            driver,
            handle,
            role,
            configured: false,
            started: false,
            finalized: false,
        })
    }

    /// Session handle.
    pub fn handle(&self) -> SessionHandle {
        self.handle
    }

    /// Session role.
    pub fn role(&self) -> SessionRole {
        self.role
    }

    /// True once the session has been started and not yet torn down.
    pub fn is_running(&self) -> bool {
        self.started && !self.finalized
    }

    /// True once [`finalize`](Self::finalize) has run.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Add the analog output channel.
    pub fn configure_output(&mut self, channel: &OutputChannel) -> AppResult<()> {
        self.ensure_configurable()?;
        self.driver
            .configure_output_channel(self.handle, channel)
            .map_err(DaqError::Configuration)?;
        self.configured = true;
        Ok(())
    }

    /// Add the analog input channel.
    pub fn configure_input(&mut self, channel: &InputChannel) -> AppResult<()> {
        self.ensure_configurable()?;
        self.driver
            .configure_input_channel(self.handle, channel)
            .map_err(DaqError::Configuration)?;
        self.configured = true;
        Ok(())
    }

    /// Configure timing. Requires a configured channel.
    pub fn set_timing(&mut self, timing: &Timing) -> AppResult<()> {
        self.ensure_configurable()?;
        if !self.configured {
            return Err(DaqError::Configuration(self.lifecycle_error(
                "timing configured before any channel",
            )));
        }
        self.driver
            .set_timing(self.handle, timing)
            .map_err(DaqError::Configuration)
    }

    /// Start the session.
    pub fn start(&mut self) -> AppResult<()> {
        self.ensure_configurable()?;
        if !self.configured {
            return Err(DaqError::Configuration(
                self.lifecycle_error("start requested before any channel"),
            ));
        }
        self.driver
            .start(self.handle)
            .map_err(DaqError::Configuration)?;
        self.started = true;
        debug!(session = %self.handle, "Channel session started");
        Ok(())
    }

    /// Write one sample. Only valid on a running session.
    pub fn write(&mut self, value: f64, timeout: Duration) -> DriverResult<()> {
        if !self.is_running() {
            return Err(self.lifecycle_error("write on a session that is not running"));
        }
        self.driver.write_sample(self.handle, value, timeout)
    }

    /// Read up to `count` samples. Only valid on a running session.
    pub fn read(&mut self, count: usize, timeout: Duration) -> DriverResult<Vec<f64>> {
        if !self.is_running() {
            return Err(self.lifecycle_error("read on a session that is not running"));
        }
        self.driver.read_samples(self.handle, count, timeout)
    }

    /// Tear the session down: neutral write (output, if started), stop, release.
    ///
    /// Every step is attempted even if an earlier one fails; failures are
    /// logged. Runs at most once per session.
    pub fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;

        if self.started {
            if let SessionRole::Output { neutral, timeout } = self.role {
                if let Err(e) = self.driver.write_sample(self.handle, neutral, timeout) {
                    warn!(session = %self.handle, error = %e, "Neutral write during finalize failed");
                }
            }
            if let Err(e) = self.driver.stop(self.handle) {
                warn!(session = %self.handle, error = %e, "Stopping session failed");
            }
        }

        if let Err(e) = self.driver.release(self.handle) {
            warn!(session = %self.handle, error = %e, "Releasing session failed");
        }
        debug!(session = %self.handle, "Channel session finalized");
    }

    fn ensure_configurable(&self) -> AppResult<()> {
        if self.started || self.finalized {
            return Err(DaqError::Configuration(
                self.lifecycle_error("session can no longer be configured"),
            ));
        }
        Ok(())
    }

    fn lifecycle_error(&self, message: &str) -> DriverError {
        DriverError::new(
            self.driver.name(),
            DriverErrorKind::InvalidParameter,
            format!("{}: {}", self.handle, message),
        )
    }
}

impl<D: ChannelDriver> Drop for ChannelSession<D> {
    fn drop(&mut self) {
        if !self.finalized {
            warn!(session = %self.handle, "Channel session dropped without finalize");
            self.finalize();
        }
    }
}

impl<D: ChannelDriver> std::fmt::Debug for ChannelSession<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSession")
            .field("driver", &self.driver.name())
            .field("handle", &self.handle)
            .field("role", &self.role)
            .field("started", &self.started)
            .field("finalized", &self.finalized)
            .finish()
    }
}
