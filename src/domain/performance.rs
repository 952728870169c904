//! Utilization and memory domain types
//!
//! Types for GPU utilization rates and VRAM usage.

use serde::{Deserialize, Serialize};

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// GPU and memory utilization rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Utilization {
    /// SM (compute) utilization (0-100%)
    pub gpu: u8,
    /// Memory bandwidth utilization (0-100%)
    pub memory: u8,
}

impl Utilization {
    /// Create a new utilization value
    pub fn new(gpu: u8, memory: u8) -> Self {
        Self {
            gpu: gpu.min(100),
            memory: memory.min(100),
        }
    }

    /// Create a utilization value from raw NVML percentages
    pub fn from_raw(gpu: u32, memory: u32) -> Self {
        Self::new(gpu.min(100) as u8, memory.min(100) as u8)
    }

    /// Get SM utilization as percentage
    pub fn gpu_percent(&self) -> u8 {
        self.gpu
    }

    /// Get memory bandwidth utilization as percentage
    pub fn memory_percent(&self) -> u8 {
        self.memory
    }
}

/// VRAM/Memory information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemoryInfo {
    /// Total memory in bytes
    pub total: u64,
    /// Used memory in bytes
    pub used: u64,
}

impl MemoryInfo {
    /// Create a new memory info value
    pub fn new(total: u64, used: u64) -> Self {
        Self { total, used }
    }

    /// Get total memory in MiB
    pub fn total_mb(&self) -> f64 {
        self.total as f64 / BYTES_PER_MIB
    }

    /// Get used memory in MiB
    pub fn used_mb(&self) -> f64 {
        self.used as f64 / BYTES_PER_MIB
    }

    /// Get usage percentage (0 - 100), 0 when the total is unknown
    pub fn usage_percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.used as f64 / self.total as f64 * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utilization() {
        let util = Utilization::new(75, 50);
        assert_eq!(util.gpu_percent(), 75);
        assert_eq!(util.memory_percent(), 50);
    }

    #[test]
    fn test_utilization_clamp() {
        let util = Utilization::from_raw(150, 300);
        assert_eq!(util.gpu_percent(), 100);
        assert_eq!(util.memory_percent(), 100);
    }

    #[test]
    fn test_memory_info() {
        // 8 GB total, 2 GB used
        let mem = MemoryInfo::new(8 * 1024 * 1024 * 1024, 2 * 1024 * 1024 * 1024);
        assert_eq!(mem.total_mb(), 8192.0);
        assert_eq!(mem.used_mb(), 2048.0);
        assert!((mem.usage_percent() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_memory_info_zero_total() {
        let mem = MemoryInfo::new(0, 0);
        assert_eq!(mem.usage_percent(), 0.0);

        // Driver quirk: used reported without a total
        let mem = MemoryInfo::new(0, 4096);
        assert_eq!(mem.usage_percent(), 0.0);
    }
}
