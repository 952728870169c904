//! Device handle lifecycle
//!
//! Wraps a [`DeviceSource`] with an explicit state machine so that queries
//! are only issued while the source is ready, and turns every query outcome
//! into a [`MetricsSnapshot`].

use crate::domain::snapshot::unix_timestamp;
use crate::domain::{MetricsSnapshot, NOT_INITIALIZED};
use crate::error::NvmlError;
use crate::nvml::DeviceSource;

use std::fmt;

/// Initialization state of a device handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// `initialize` has not been called yet
    Uninitialized,
    /// The source is open and can be queried
    Ready,
    /// The last `initialize` attempt failed
    Failed,
    /// The source has been released
    ShutDown,
}

impl fmt::Display for HandleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HandleState::Uninitialized => "uninitialized",
            HandleState::Ready => "ready",
            HandleState::Failed => "failed",
            HandleState::ShutDown => "shut down",
        };
        f.write_str(s)
    }
}

/// Owned connection to one device
pub struct DeviceHandle<S: DeviceSource> {
    source: S,
    index: u32,
    state: HandleState,
    last_timestamp: f64,
    pcie_reported: bool,
}

impl<S: DeviceSource> DeviceHandle<S> {
    /// Create a handle for the device at `index`; nothing is opened yet
    pub fn new(source: S, index: u32) -> Self {
        Self {
            source,
            index,
            state: HandleState::Uninitialized,
            last_timestamp: 0.0,
            pcie_reported: false,
        }
    }

    /// Device index this handle is bound to
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Current state
    pub fn state(&self) -> HandleState {
        self.state
    }

    /// Whether queries can be issued
    pub fn is_ready(&self) -> bool {
        self.state == HandleState::Ready
    }

    /// Open the underlying source
    ///
    /// A second call while ready is a no-op. Every failure cause leaves the
    /// handle in [`HandleState::Failed`]; callers are expected to degrade
    /// rather than abort.
    pub fn initialize(&mut self) -> Result<(), NvmlError> {
        match self.state {
            HandleState::Ready => return Ok(()),
            HandleState::ShutDown => return Err(NvmlError::ShutDown),
            HandleState::Uninitialized | HandleState::Failed => {}
        }

        match self.source.initialize(self.index) {
            Ok(()) => {
                self.state = HandleState::Ready;
                log::debug!("Device {} initialized", self.index);
                Ok(())
            }
            Err(e) => {
                self.state = HandleState::Failed;
                Err(e)
            }
        }
    }

    /// Take one sample
    ///
    /// Never fails: query errors and non-ready states are returned as the
    /// error variant. Timestamps from one handle never go backwards.
    pub fn sample(&mut self) -> MetricsSnapshot {
        let timestamp = self.next_timestamp();

        match self.state {
            HandleState::Ready => {}
            HandleState::ShutDown => {
                return MetricsSnapshot::error(timestamp, NvmlError::ShutDown.to_string())
            }
            HandleState::Uninitialized | HandleState::Failed => {
                return MetricsSnapshot::error(timestamp, NOT_INITIALIZED)
            }
        }

        match self.source.readings() {
            Ok(readings) => {
                if readings.pcie.is_none() && !self.pcie_reported {
                    log::debug!(
                        "PCIe throughput counters unavailable on device {}, reporting 0",
                        self.index
                    );
                    self.pcie_reported = true;
                }
                MetricsSnapshot::from_readings(timestamp, &readings)
            }
            Err(e) => {
                log::debug!("Sample on device {} failed: {}", self.index, e);
                MetricsSnapshot::error(timestamp, e.to_string())
            }
        }
    }

    /// Release the underlying source
    ///
    /// Safe to call repeatedly and without a prior successful `initialize`.
    pub fn shutdown(&mut self) {
        match self.state {
            HandleState::ShutDown => return,
            HandleState::Ready => {
                if let Err(e) = self.source.shutdown() {
                    log::warn!("Device {} shutdown reported an error: {}", self.index, e);
                } else {
                    log::debug!("Device {} released", self.index);
                }
            }
            HandleState::Uninitialized | HandleState::Failed => {}
        }
        self.state = HandleState::ShutDown;
    }

    fn next_timestamp(&mut self) -> f64 {
        let now = unix_timestamp().max(self.last_timestamp);
        self.last_timestamp = now;
        now
    }
}

impl<S: DeviceSource> Drop for DeviceHandle<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<S: DeviceSource> fmt::Debug for DeviceHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("index", &self.index)
            .field("state", &self.state)
            .finish()
    }
}
