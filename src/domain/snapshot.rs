//! Metrics snapshot types
//!
//! A [`MetricsSnapshot`] is the unit of data pushed to subscribers. It is
//! built once per sampling tick from a [`DeviceReadings`] pass and never
//! mutated afterwards.
//!
//! The serialized form is a flat JSON object. A successful sample looks like:
//!
//! ```json
//! {"timestamp": 1718000000.5, "vramUsed": 8192.0, "vramTotal": 16384.0,
//!  "vramUtil": 50.0, "smUtil": 97, "memUtil": 41, "powerDraw": 215.0,
//!  "temperature": 62, "pcieTxKBs": 1200, "pcieRxKBs": 340}
//! ```
//!
//! and a failed one as `{"error": "...", "timestamp": 1718000000.5}`.

use crate::domain::{MemoryInfo, PcieThroughput, PowerDraw, Temperature, Utilization};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Message used when no sample has ever been taken
pub const NOT_INITIALIZED: &str = "device not initialized";

/// Raw readings from one query pass over a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceReadings {
    /// VRAM usage
    pub memory: MemoryInfo,
    /// SM and memory-controller utilization
    pub utilization: Utilization,
    /// Board power draw
    pub power: PowerDraw,
    /// GPU core temperature
    pub temperature: Temperature,
    /// Interconnect throughput, `None` when the counters are unavailable
    pub pcie: Option<PcieThroughput>,
}

/// One immutable telemetry sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricsSnapshot {
    /// All required sub-queries succeeded
    Ok(GpuMetrics),
    /// The sample could not be taken
    Error(SnapshotError),
}

/// Successful sample payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuMetrics {
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    #[serde(rename = "vramUsed")]
    pub vram_used_mb: f64,
    #[serde(rename = "vramTotal")]
    pub vram_total_mb: f64,
    #[serde(rename = "vramUtil")]
    pub vram_util_percent: f64,
    #[serde(rename = "smUtil")]
    pub sm_util_percent: u8,
    #[serde(rename = "memUtil")]
    pub mem_util_percent: u8,
    #[serde(rename = "powerDraw")]
    pub power_draw_watts: f64,
    #[serde(rename = "temperature")]
    pub temperature_celsius: i32,
    #[serde(rename = "pcieTxKBs")]
    pub pcie_tx_kbs: u32,
    #[serde(rename = "pcieRxKBs")]
    pub pcie_rx_kbs: u32,
}

/// Failed sample payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotError {
    /// Human-readable cause
    #[serde(rename = "error")]
    pub message: String,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
}

impl MetricsSnapshot {
    /// Build a successful snapshot, deriving VRAM utilization and unit conversions
    pub fn from_readings(timestamp: f64, readings: &DeviceReadings) -> Self {
        let pcie = readings.pcie.unwrap_or_default();

        MetricsSnapshot::Ok(GpuMetrics {
            timestamp,
            vram_used_mb: round2(readings.memory.used_mb()),
            vram_total_mb: round2(readings.memory.total_mb()),
            vram_util_percent: round2(readings.memory.usage_percent()),
            sm_util_percent: readings.utilization.gpu_percent(),
            mem_util_percent: readings.utilization.memory_percent(),
            power_draw_watts: round2(readings.power.as_watts()),
            temperature_celsius: readings.temperature.as_celsius(),
            pcie_tx_kbs: pcie.tx_kbs(),
            pcie_rx_kbs: pcie.rx_kbs(),
        })
    }

    /// Build an error snapshot
    pub fn error(timestamp: f64, message: impl Into<String>) -> Self {
        MetricsSnapshot::Error(SnapshotError {
            message: message.into(),
            timestamp,
        })
    }

    /// Error snapshot sent before any sample exists
    pub fn not_initialized() -> Self {
        Self::error(unix_timestamp(), NOT_INITIALIZED)
    }

    /// Seconds since the Unix epoch at which this snapshot was taken
    pub fn timestamp(&self) -> f64 {
        match self {
            MetricsSnapshot::Ok(m) => m.timestamp,
            MetricsSnapshot::Error(e) => e.timestamp,
        }
    }

    /// Whether this is the successful variant
    pub fn is_ok(&self) -> bool {
        matches!(self, MetricsSnapshot::Ok(_))
    }

    /// The successful payload, if any
    pub fn metrics(&self) -> Option<&GpuMetrics> {
        match self {
            MetricsSnapshot::Ok(m) => Some(m),
            MetricsSnapshot::Error(_) => None,
        }
    }

    /// The error message, if any
    pub fn error_message(&self) -> Option<&str> {
        match self {
            MetricsSnapshot::Ok(_) => None,
            MetricsSnapshot::Error(e) => Some(&e.message),
        }
    }
}

/// Current wall-clock time as fractional seconds since the Unix epoch
pub fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Round to two decimal places for transport stability
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
