//! Domain models for nvstream
//!
//! Typed device readings and the snapshot record built from them.

pub mod pcie;
pub mod performance;
pub mod power;
pub mod snapshot;
pub mod thermal;

pub use pcie::PcieThroughput;
pub use performance::{MemoryInfo, Utilization};
pub use power::PowerDraw;
pub use snapshot::{DeviceReadings, GpuMetrics, MetricsSnapshot, SnapshotError, NOT_INITIALIZED};
pub use thermal::Temperature;
