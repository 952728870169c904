//! NVML-backed device source
//!
//! Owns the NVML library handle and resolves the configured device on each
//! query pass.

use crate::domain::{
    DeviceReadings, MemoryInfo, PcieThroughput, PowerDraw, Temperature, Utilization,
};
use crate::error::NvmlError;
use crate::nvml::device::{convert_error, NvmlDevice};
use crate::nvml::traits::{optional_pcie, DeviceSource};

use nvml_wrapper::Nvml;

/// NVML library handle plus the device index it is bound to
#[derive(Default)]
pub struct NvmlSource {
    nvml: Option<Nvml>,
    index: u32,
}

impl NvmlSource {
    /// Create an unopened source; nothing is loaded until `initialize`
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the driver version, if NVML is loaded
    pub fn driver_version(&self) -> Option<String> {
        self.nvml.as_ref()?.sys_driver_version().ok()
    }

    /// Get the bound device's name, if NVML is loaded
    pub fn device_name(&self) -> Option<String> {
        let nvml = self.nvml.as_ref()?;
        nvml.device_by_index(self.index).ok()?.name().ok()
    }

    fn device(&self) -> Result<NvmlDevice<'_>, NvmlError> {
        let nvml = self.nvml.as_ref().ok_or(NvmlError::NotInitialized)?;
        let device = nvml
            .device_by_index(self.index)
            .map_err(|e| convert_error(e, self.index))?;
        Ok(NvmlDevice::new(device, self.index))
    }
}

impl DeviceSource for NvmlSource {
    fn initialize(&mut self, index: u32) -> Result<(), NvmlError> {
        let nvml = Nvml::init().map_err(|e| match e {
            nvml_wrapper::error::NvmlError::LibloadingError(_) => NvmlError::LibraryNotFound,
            nvml_wrapper::error::NvmlError::DriverNotLoaded => {
                NvmlError::InitializationFailed("NVIDIA driver not loaded".to_string())
            }
            nvml_wrapper::error::NvmlError::NoPermission => {
                NvmlError::InsufficientPermissions("cannot open NVML".to_string())
            }
            other => NvmlError::InitializationFailed(other.to_string()),
        })?;

        // Fail at init time rather than on the first tick if the index is bad
        nvml.device_by_index(index)
            .map_err(|e| convert_error(e, index))?;

        self.nvml = Some(nvml);
        self.index = index;

        log::info!(
            "Bound to GPU {}: {} (driver {})",
            index,
            self.device_name().unwrap_or_else(|| "unknown".to_string()),
            self.driver_version().unwrap_or_else(|| "unknown".to_string())
        );
        Ok(())
    }

    fn memory_info(&self) -> Result<MemoryInfo, NvmlError> {
        self.device()?.memory_info()
    }

    fn utilization(&self) -> Result<Utilization, NvmlError> {
        self.device()?.utilization()
    }

    fn power_usage(&self) -> Result<PowerDraw, NvmlError> {
        self.device()?.power_usage()
    }

    fn temperature(&self) -> Result<Temperature, NvmlError> {
        self.device()?.temperature()
    }

    fn pcie_throughput(&self) -> Result<PcieThroughput, NvmlError> {
        self.device()?.pcie_throughput()
    }

    fn readings(&self) -> Result<DeviceReadings, NvmlError> {
        // Resolve the device once per pass instead of once per sub-query
        let device = self.device()?;

        Ok(DeviceReadings {
            memory: device.memory_info()?,
            utilization: device.utilization()?,
            power: device.power_usage()?,
            temperature: device.temperature()?,
            pcie: optional_pcie(device.pcie_throughput()),
        })
    }

    fn shutdown(&mut self) -> Result<(), NvmlError> {
        match self.nvml.take() {
            Some(nvml) => nvml.shutdown().map_err(|e| NvmlError::Unknown(e.to_string())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Note: These tests require actual NVIDIA hardware and drivers
    // They will be skipped if NVML is not available

    #[test]
    fn test_uninitialized_source() {
        let mut source = NvmlSource::new();
        assert_eq!(source.memory_info(), Err(NvmlError::NotInitialized));
        assert!(source.readings().is_err());
        assert!(source.driver_version().is_none());
        assert!(source.shutdown().is_ok());
    }

    #[test]
    #[ignore = "Requires NVIDIA GPU"]
    fn test_nvml_init_and_sample() {
        let mut source = NvmlSource::new();
        source.initialize(0).unwrap();
        let readings = source.readings().unwrap();
        assert!(readings.memory.total > 0);
        source.shutdown().unwrap();
    }

    #[test]
    #[ignore = "Requires NVIDIA GPU"]
    fn test_nvml_bad_index() {
        let mut source = NvmlSource::new();
        let result = source.initialize(u32::MAX);
        assert!(result.is_err());
    }
}
