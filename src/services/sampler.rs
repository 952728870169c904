//! Sampling loop
//!
//! Drives the device handle at a fixed cadence and publishes every sample,
//! success or error, to the configured channels.

use crate::domain::MetricsSnapshot;
use crate::error::SamplerError;
use crate::nvml::DeviceSource;
use crate::services::{Broadcaster, DeviceHandle};

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Default sampling interval
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

/// Configuration for the sampling loop
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Wait between the end of one tick and the start of the next
    pub interval: Duration,
    /// Channels every snapshot is published to
    pub channels: Vec<String>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            channels: vec!["/gpu".to_string(), "/".to_string()],
        }
    }
}

struct Running<S: DeviceSource> {
    stop_tx: mpsc::Sender<()>,
    thread: JoinHandle<DeviceHandle<S>>,
}

/// Background sampling loop
///
/// Owns the device handle. While running, the handle lives on the sampling
/// thread; `stop` joins the thread and takes the handle back.
pub struct SamplingLoop<S: DeviceSource + 'static> {
    config: SamplerConfig,
    broadcaster: Arc<Broadcaster>,
    device: Option<DeviceHandle<S>>,
    running: Option<Running<S>>,
}

impl<S: DeviceSource + 'static> SamplingLoop<S> {
    /// Create a stopped loop around `device`
    pub fn new(
        config: SamplerConfig,
        broadcaster: Arc<Broadcaster>,
        device: DeviceHandle<S>,
    ) -> Self {
        Self {
            config,
            broadcaster,
            device: Some(device),
            running: None,
        }
    }

    /// Whether the background thread is running
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Access the device handle while the loop is stopped
    pub fn device_mut(&mut self) -> Option<&mut DeviceHandle<S>> {
        self.device.as_mut()
    }

    /// Spawn the sampling thread
    pub fn start(&mut self) -> Result<(), SamplerError> {
        if self.running.is_some() {
            return Err(SamplerError::AlreadyRunning);
        }

        let device = match self.device.take() {
            Some(device) if device.is_ready() => device,
            Some(device) => {
                let state = device.state().to_string();
                self.device = Some(device);
                return Err(SamplerError::DeviceNotReady(state));
            }
            None => return Err(SamplerError::DeviceNotReady("missing".to_string())),
        };

        let (stop_tx, stop_rx) = mpsc::channel();
        let config = self.config.clone();
        let broadcaster = Arc::clone(&self.broadcaster);

        // On spawn failure the closure, and with it the device, is dropped,
        // which releases the handle
        let thread = std::thread::Builder::new()
            .name("nvstream-sampler".to_string())
            .spawn(move || run(device, &config, &broadcaster, &stop_rx))
            .map_err(SamplerError::Spawn)?;

        log::info!(
            "Sampling every {:?} to {}",
            self.config.interval,
            self.config.channels.join(", ")
        );
        self.running = Some(Running { stop_tx, thread });
        Ok(())
    }

    /// Stop the sampling thread and take the device handle back
    ///
    /// Returns as soon as the current tick finishes; the cadence wait is
    /// interrupted. No-op when already stopped.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        // The thread may already be gone if it panicked; join reports that
        let _ = running.stop_tx.send(());
        match running.thread.join() {
            Ok(device) => {
                self.device = Some(device);
                log::debug!("Sampling loop stopped");
            }
            Err(_) => log::error!("Sampling thread panicked; device handle lost"),
        }
    }
}

impl<S: DeviceSource + 'static> Drop for SamplingLoop<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<S: DeviceSource>(
    mut device: DeviceHandle<S>,
    config: &SamplerConfig,
    broadcaster: &Broadcaster,
    stop_rx: &mpsc::Receiver<()>,
) -> DeviceHandle<S> {
    loop {
        tick(&mut device, &config.channels, broadcaster);

        match stop_rx.recv_timeout(config.interval) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    device
}

/// Take one sample and publish it to every channel
pub fn tick<S: DeviceSource>(
    device: &mut DeviceHandle<S>,
    channels: &[String],
    broadcaster: &Broadcaster,
) -> Arc<MetricsSnapshot> {
    let snapshot = Arc::new(device.sample());
    if let Some(message) = snapshot.error_message() {
        log::debug!("Publishing error snapshot: {}", message);
    }

    for channel in channels {
        broadcaster.publish(channel, Arc::clone(&snapshot));
    }
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Temperature;
    use crate::mock::{MockSource, Query};
    use crate::services::HandleState;

    use std::time::Instant;

    fn config(interval_ms: u64) -> SamplerConfig {
        SamplerConfig {
            interval: Duration::from_millis(interval_ms),
            ..SamplerConfig::default()
        }
    }

    fn ready_loop(interval_ms: u64) -> (SamplingLoop<MockSource>, MockSource, Arc<Broadcaster>) {
        let source = MockSource::new();
        let mut device = DeviceHandle::new(source.clone(), 0);
        device.initialize().unwrap();
        let broadcaster = Arc::new(Broadcaster::default());
        let sampler = SamplingLoop::new(config(interval_ms), Arc::clone(&broadcaster), device);
        (sampler, source, broadcaster)
    }

    #[test]
    fn test_sampler_config_default() {
        let config = SamplerConfig::default();
        assert_eq!(config.interval, Duration::from_millis(500));
        assert_eq!(config.channels, vec!["/gpu".to_string(), "/".to_string()]);
    }

    #[test]
    fn test_tick_publishes_to_every_channel() {
        let source = MockSource::new();
        let mut device = DeviceHandle::new(source, 0);
        device.initialize().unwrap();
        let broadcaster = Broadcaster::default();
        let channels = SamplerConfig::default().channels;

        let snapshot = tick(&mut device, &channels, &broadcaster);
        assert!(snapshot.is_ok());
        for channel in &channels {
            let latest = broadcaster.latest(channel).unwrap();
            assert!(Arc::ptr_eq(&latest, &snapshot));
        }
    }

    #[test]
    fn test_start_requires_ready_device() {
        let source = MockSource::unavailable(crate::error::NvmlError::LibraryNotFound);
        let mut device = DeviceHandle::new(source, 0);
        assert!(device.initialize().is_err());

        let mut sampler =
            SamplingLoop::new(config(10), Arc::new(Broadcaster::default()), device);
        assert!(matches!(
            sampler.start(),
            Err(SamplerError::DeviceNotReady(_))
        ));
        assert!(!sampler.is_running());
        assert_eq!(sampler.device_mut().unwrap().state(), HandleState::Failed);
    }

    #[test]
    fn test_start_twice() {
        let (mut sampler, _source, _broadcaster) = ready_loop(10);
        sampler.start().unwrap();
        assert!(matches!(sampler.start(), Err(SamplerError::AlreadyRunning)));
        sampler.stop();
    }

    #[test]
    fn test_loop_publishes_samples() {
        let (mut sampler, source, broadcaster) = ready_loop(5);
        let mut sub = broadcaster.join("/gpu");
        sampler.start().unwrap();
        assert!(sampler.device_mut().is_none());

        std::thread::sleep(Duration::from_millis(100));
        sampler.stop();

        assert!(source.passes() >= 2);
        let mut last = 0.0;
        let mut count = 0;
        while let Some(snapshot) = sub.try_recv() {
            if snapshot.is_ok() {
                assert!(snapshot.timestamp() >= last);
                last = snapshot.timestamp();
                count += 1;
            }
        }
        assert!(count >= 2);
        assert!(sampler.device_mut().unwrap().is_ready());
    }

    #[test]
    fn test_loop_keeps_running_through_errors() {
        let (mut sampler, source, broadcaster) = ready_loop(5);
        source.fail(Query::Temperature);
        sampler.start().unwrap();

        std::thread::sleep(Duration::from_millis(50));
        let latest = broadcaster.latest("/").unwrap();
        assert!(!latest.is_ok());

        source.recover(Query::Temperature);
        source.set_temperature(Temperature::new(71));
        std::thread::sleep(Duration::from_millis(50));
        sampler.stop();

        let latest = broadcaster.latest("/").unwrap();
        assert_eq!(latest.metrics().unwrap().temperature_celsius, 71);
    }

    #[test]
    fn test_stop_is_prompt() {
        let (mut sampler, _source, _broadcaster) = ready_loop(60_000);
        sampler.start().unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let started = Instant::now();
        sampler.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!sampler.is_running());

        // Idempotent
        sampler.stop();
    }

    #[test]
    fn test_restart_after_stop() {
        let (mut sampler, source, _broadcaster) = ready_loop(5);
        sampler.start().unwrap();
        sampler.stop();
        let passes = source.passes();

        sampler.start().unwrap();
        std::thread::sleep(Duration::from_millis(30));
        sampler.stop();
        assert!(source.passes() > passes);
    }
}
