//! Process lifecycle orchestration
//!
//! Opens the device once at startup, runs the sampling loop when that works
//! and otherwise keeps the service up in degraded mode. Shutdown stops the
//! loop before releasing the device.

use crate::nvml::DeviceSource;
use crate::services::{Broadcaster, DeviceHandle, SamplerConfig, SamplingLoop};

use std::fmt;
use std::sync::Arc;

/// Operating mode decided at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// The device is open and samples are being published
    Live,
    /// The device could not be opened; joins receive an error snapshot
    Degraded { reason: String },
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Live => write!(f, "live"),
            Mode::Degraded { reason } => write!(f, "degraded ({})", reason),
        }
    }
}

/// Owns the sampling loop (and through it the device handle)
pub struct LifecycleController<S: DeviceSource + 'static> {
    broadcaster: Arc<Broadcaster>,
    sampler: SamplingLoop<S>,
    mode: Mode,
    shut_down: bool,
}

impl<S: DeviceSource + 'static> LifecycleController<S> {
    /// Open the device at `device_index` and start sampling if possible
    ///
    /// Never fails: an unusable device puts the controller in degraded mode.
    pub fn start(
        source: S,
        device_index: u32,
        config: SamplerConfig,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        let mut device = DeviceHandle::new(source, device_index);

        let init = device.initialize();
        let mut sampler = SamplingLoop::new(config, Arc::clone(&broadcaster), device);

        let mode = match init {
            Ok(()) => match sampler.start() {
                Ok(()) => Mode::Live,
                Err(e) => Mode::Degraded {
                    reason: e.to_string(),
                },
            },
            Err(e) => Mode::Degraded {
                reason: e.to_string(),
            },
        };

        match &mode {
            Mode::Live => log::info!("GPU {} telemetry is live", device_index),
            Mode::Degraded { reason } => {
                log::warn!("GPU {} unavailable: {}", device_index, reason);
                log::warn!("Serving in degraded mode; subscribers will receive error snapshots");
            }
        }

        Self {
            broadcaster,
            sampler,
            mode,
            shut_down: false,
        }
    }

    /// Mode decided at startup
    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    /// Whether samples are being published
    pub fn is_live(&self) -> bool {
        self.mode == Mode::Live && !self.shut_down
    }

    /// Broadcaster subscribers join through
    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Stop sampling, release the device, and end subscriber sessions
    ///
    /// Each step tolerates the previous one never having succeeded. Safe to
    /// call more than once.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        self.sampler.stop();
        if let Some(device) = self.sampler.device_mut() {
            device.shutdown();
        }
        self.broadcaster.close();

        log::info!("Telemetry shut down");
    }
}

impl<S: DeviceSource + 'static> Drop for LifecycleController<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
