//! Trait definitions for device sources
//!
//! These traits abstract over NVML to enable testing with mocks.

use crate::domain::{
    DeviceReadings, MemoryInfo, PcieThroughput, PowerDraw, Temperature, Utilization,
};
use crate::error::NvmlError;

/// A hardware-management interface that can be opened, queried and released
///
/// Implementations only perform queries; state tracking (ready, failed,
/// shut down) lives in [`crate::services::DeviceHandle`].
pub trait DeviceSource: Send {
    /// Open the management library and bind to the device at `index`
    fn initialize(&mut self, index: u32) -> Result<(), NvmlError>;

    /// Get memory (VRAM) information
    fn memory_info(&self) -> Result<MemoryInfo, NvmlError>;

    /// Get SM and memory utilization rates
    fn utilization(&self) -> Result<Utilization, NvmlError>;

    /// Get current board power draw
    fn power_usage(&self) -> Result<PowerDraw, NvmlError>;

    /// Get current GPU core temperature
    fn temperature(&self) -> Result<Temperature, NvmlError>;

    /// Get PCIe TX/RX throughput
    ///
    /// Many boards and drivers do not expose these counters; callers should
    /// treat an error here as "not available" rather than a failed sample.
    fn pcie_throughput(&self) -> Result<PcieThroughput, NvmlError>;

    /// Run one full query pass
    ///
    /// Fails on the first required sub-query error. The PCIe sub-query is
    /// best-effort and becomes `None` on failure.
    fn readings(&self) -> Result<DeviceReadings, NvmlError> {
        let memory = self.memory_info()?;
        let utilization = self.utilization()?;
        let power = self.power_usage()?;
        let temperature = self.temperature()?;

        let pcie = optional_pcie(self.pcie_throughput());

        Ok(DeviceReadings {
            memory,
            utilization,
            power,
            temperature,
            pcie,
        })
    }

    /// Release the management library
    fn shutdown(&mut self) -> Result<(), NvmlError>;
}

/// Downgrade a PCIe query failure to "not available"
pub(crate) fn optional_pcie(
    result: Result<PcieThroughput, NvmlError>,
) -> Option<PcieThroughput> {
    match result {
        Ok(throughput) => Some(throughput),
        Err(e) => {
            log::trace!("PCIe throughput unavailable: {}", e);
            None
        }
    }
}
