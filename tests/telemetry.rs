//! End-to-end telemetry tests against a scripted device

use std::sync::{Arc, Mutex};
use std::time::Duration;

use nvstream::domain::{
    MemoryInfo, MetricsSnapshot, PcieThroughput, PowerDraw, Temperature, Utilization,
};
use nvstream::error::NvmlError;
use nvstream::nvml::DeviceSource;
use nvstream::server::{self, AppState};
use nvstream::services::{Broadcaster, LifecycleController, Mode, SamplerConfig, Subscription};

#[derive(Default)]
struct Script {
    init_error: Option<NvmlError>,
    initialized: bool,
    shutdowns: u32,
}

/// Device that reports fixed readings, or refuses to open
#[derive(Clone, Default)]
struct ScriptedDevice {
    script: Arc<Mutex<Script>>,
}

impl ScriptedDevice {
    fn missing_driver() -> Self {
        let device = Self::default();
        device.script.lock().unwrap().init_error = Some(NvmlError::LibraryNotFound);
        device
    }

    fn shutdowns(&self) -> u32 {
        self.script.lock().unwrap().shutdowns
    }

    fn check(&self) -> Result<(), NvmlError> {
        if self.script.lock().unwrap().initialized {
            Ok(())
        } else {
            Err(NvmlError::NotInitialized)
        }
    }
}

impl DeviceSource for ScriptedDevice {
    fn initialize(&mut self, _index: u32) -> Result<(), NvmlError> {
        let mut script = self.script.lock().unwrap();
        if let Some(err) = script.init_error.clone() {
            return Err(err);
        }
        script.initialized = true;
        Ok(())
    }

    fn memory_info(&self) -> Result<MemoryInfo, NvmlError> {
        self.check()?;
        Ok(MemoryInfo::new(24 * 1024 * 1024 * 1024, 6 * 1024 * 1024 * 1024))
    }

    fn utilization(&self) -> Result<Utilization, NvmlError> {
        self.check()?;
        Ok(Utilization::from_raw(88, 30))
    }

    fn power_usage(&self) -> Result<PowerDraw, NvmlError> {
        self.check()?;
        Ok(PowerDraw::from_milliwatts(180_500))
    }

    fn temperature(&self) -> Result<Temperature, NvmlError> {
        self.check()?;
        Ok(Temperature::new(62))
    }

    fn pcie_throughput(&self) -> Result<PcieThroughput, NvmlError> {
        Err(NvmlError::NotSupported("PCIe counters".to_string()))
    }

    fn shutdown(&mut self) -> Result<(), NvmlError> {
        let mut script = self.script.lock().unwrap();
        script.initialized = false;
        script.shutdowns += 1;
        Ok(())
    }
}

fn fast_config() -> SamplerConfig {
    SamplerConfig {
        interval: Duration::from_millis(10),
        ..SamplerConfig::default()
    }
}

async fn next(sub: &mut Subscription) -> Arc<MetricsSnapshot> {
    tokio::time::timeout(Duration::from_secs(2), sub.recv())
        .await
        .expect("no snapshot within 2s")
        .expect("subscription closed")
}

async fn wait_for_sample(broadcaster: &Broadcaster, channel: &str) {
    for _ in 0..200 {
        if broadcaster.latest(channel).is_some() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("nothing published on {}", channel);
}

#[tokio::test]
async fn live_device_streams_to_both_channels() {
    let device = ScriptedDevice::default();
    let broadcaster = Arc::new(Broadcaster::default());
    let mut controller =
        LifecycleController::start(device.clone(), 0, fast_config(), Arc::clone(&broadcaster));
    assert_eq!(controller.mode(), &Mode::Live);

    wait_for_sample(&broadcaster, "/").await;
    let mut gpu = broadcaster.join("/gpu");
    let mut root = broadcaster.join("/");

    let mut last = 0.0;
    for _ in 0..3 {
        let snapshot = next(&mut gpu).await;
        let metrics = snapshot.metrics().expect("live snapshot");
        assert_eq!(metrics.temperature_celsius, 62);
        assert_eq!(metrics.sm_util_percent, 88);
        assert_eq!(metrics.vram_util_percent, 25.0);
        assert_eq!(metrics.power_draw_watts, 180.5);
        assert_eq!(metrics.pcie_tx_kbs, 0);
        assert!(metrics.timestamp >= last);
        last = metrics.timestamp;
    }
    assert!(next(&mut root).await.is_ok());

    controller.shutdown();
    assert_eq!(device.shutdowns(), 1);
}

#[tokio::test]
async fn late_joiner_gets_latest_snapshot_first() {
    let broadcaster = Arc::new(Broadcaster::default());
    let mut controller = LifecycleController::start(
        ScriptedDevice::default(),
        0,
        fast_config(),
        Arc::clone(&broadcaster),
    );

    wait_for_sample(&broadcaster, "/gpu").await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut late = broadcaster.join("/gpu");
    let first = next(&mut late).await;
    assert_eq!(first.metrics().map(|m| m.temperature_celsius), Some(62));

    controller.shutdown();
}

#[tokio::test]
async fn missing_driver_serves_error_snapshots() {
    let device = ScriptedDevice::missing_driver();
    let broadcaster = Arc::new(Broadcaster::default());
    let mut controller =
        LifecycleController::start(device.clone(), 0, fast_config(), Arc::clone(&broadcaster));
    assert!(matches!(controller.mode(), Mode::Degraded { .. }));
    assert!(!controller.is_live());

    let mut sub = broadcaster.join("/gpu");
    let first = next(&mut sub).await;
    assert_eq!(first.error_message(), Some("device not initialized"));

    // Nothing samples in degraded mode
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(sub.try_recv().is_none());

    controller.shutdown();
    assert_eq!(device.shutdowns(), 0);
}

#[tokio::test]
async fn shutdown_ends_subscriptions() {
    let broadcaster = Arc::new(Broadcaster::default());
    let mut controller = LifecycleController::start(
        ScriptedDevice::default(),
        0,
        fast_config(),
        Arc::clone(&broadcaster),
    );
    let mut sub = broadcaster.join("/");

    controller.shutdown();
    controller.shutdown();

    // Queued frames drain, then the subscription ends
    while tokio::time::timeout(Duration::from_secs(2), sub.recv())
        .await
        .expect("subscription did not end")
        .is_some()
    {}
    assert_eq!(broadcaster.subscriber_count("/"), 0);
}

#[tokio::test]
async fn snapshot_endpoint_reports_live_metrics() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let broadcaster = Arc::new(Broadcaster::default());
    let mut controller = LifecycleController::start(
        ScriptedDevice::default(),
        0,
        fast_config(),
        Arc::clone(&broadcaster),
    );
    wait_for_sample(&broadcaster, "/").await;

    let listener = server::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = AppState::new(Arc::clone(&broadcaster), fast_config().channels);
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let handle = tokio::spawn(server::serve(listener, state, async move {
        let _ = stop_rx.await;
    }));

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /api/gpu HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains(r#""temperature":62"#));
    assert!(response.contains(r#""smUtil":88"#));

    stop_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
    controller.shutdown();
}
