//! NVML device queries
//!
//! Thin wrapper over an nvml-wrapper `Device` that converts readings into
//! domain types and NVML errors into ours.

use crate::domain::{MemoryInfo, PcieThroughput, PowerDraw, Temperature, Utilization};
use crate::error::NvmlError;

use nvml_wrapper::enum_wrappers::device::{PcieUtilCounter, TemperatureSensor};
use nvml_wrapper::Device;

/// Convert NVML error to our error type
pub(crate) fn convert_error(err: nvml_wrapper::error::NvmlError, index: u32) -> NvmlError {
    use nvml_wrapper::error::NvmlError as NE;
    match err {
        NE::NotSupported => {
            NvmlError::NotSupported("Operation not supported by this GPU".to_string())
        }
        NE::NoPermission => {
            NvmlError::InsufficientPermissions("Insufficient permissions".to_string())
        }
        NE::NotFound => NvmlError::DeviceNotFound(index),
        NE::GpuLost => NvmlError::GpuLost,
        NE::Uninitialized => NvmlError::NotInitialized,
        _ => NvmlError::Unknown(err.to_string()),
    }
}

/// NVML device wrapper bound to one index
pub struct NvmlDevice<'a> {
    device: Device<'a>,
    index: u32,
}

impl<'a> NvmlDevice<'a> {
    /// Create a new NVML device wrapper
    pub fn new(device: Device<'a>, index: u32) -> Self {
        Self { device, index }
    }

    /// Get memory (VRAM) information
    pub fn memory_info(&self) -> Result<MemoryInfo, NvmlError> {
        let mem = self.device.memory_info().map_err(|e| convert_error(e, self.index))?;
        Ok(MemoryInfo::new(mem.total, mem.used))
    }

    /// Get SM and memory utilization rates
    pub fn utilization(&self) -> Result<Utilization, NvmlError> {
        let util = self.device.utilization_rates().map_err(|e| convert_error(e, self.index))?;
        Ok(Utilization::from_raw(util.gpu, util.memory))
    }

    /// Get current power usage
    pub fn power_usage(&self) -> Result<PowerDraw, NvmlError> {
        let usage_mw = self.device.power_usage().map_err(|e| convert_error(e, self.index))?;
        Ok(PowerDraw::from_milliwatts(usage_mw))
    }

    /// Get current GPU temperature
    pub fn temperature(&self) -> Result<Temperature, NvmlError> {
        let temp = self
            .device
            .temperature(TemperatureSensor::Gpu)
            .map_err(|e| convert_error(e, self.index))?;
        Ok(Temperature::from(temp))
    }

    /// Get PCIe throughput in KB/s
    ///
    /// Both counters must be readable; a half-populated pair is reported as
    /// an error so callers fall back to zero for both.
    pub fn pcie_throughput(&self) -> Result<PcieThroughput, NvmlError> {
        let tx = self
            .device
            .pcie_throughput(PcieUtilCounter::Send)
            .map_err(|e| convert_error(e, self.index))?;
        let rx = self
            .device
            .pcie_throughput(PcieUtilCounter::Receive)
            .map_err(|e| convert_error(e, self.index))?;
        Ok(PcieThroughput::new(tx, rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nvml_wrapper::error::NvmlError as NE;

    #[test]
    fn test_convert_error() {
        assert_eq!(
            convert_error(NE::NotFound, 3),
            NvmlError::DeviceNotFound(3)
        );
        assert_eq!(convert_error(NE::GpuLost, 0), NvmlError::GpuLost);
        assert!(matches!(
            convert_error(NE::NoPermission, 0),
            NvmlError::InsufficientPermissions(_)
        ));
        assert!(matches!(
            convert_error(NE::NotSupported, 0),
            NvmlError::NotSupported(_)
        ));
    }
}
