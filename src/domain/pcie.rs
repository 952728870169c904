//! PCIe throughput domain types
//!
//! NVML reports interconnect throughput as KB/s averaged over a short
//! driver-side window. Not every driver/board exposes these counters.

use serde::{Deserialize, Serialize};

/// PCIe throughput counters in KB/s
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PcieThroughput {
    /// Transmit (TX) throughput in KB/s
    tx_kbs: u32,
    /// Receive (RX) throughput in KB/s
    rx_kbs: u32,
}

impl PcieThroughput {
    /// Create new PCIe throughput metrics
    pub fn new(tx_kbs: u32, rx_kbs: u32) -> Self {
        Self { tx_kbs, rx_kbs }
    }

    /// Get TX throughput in KB/s
    pub fn tx_kbs(&self) -> u32 {
        self.tx_kbs
    }

    /// Get RX throughput in KB/s
    pub fn rx_kbs(&self) -> u32 {
        self.rx_kbs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throughput_accessors() {
        let t = PcieThroughput::new(1200, 340);
        assert_eq!(t.tx_kbs(), 1200);
        assert_eq!(t.rx_kbs(), 340);
        // Missing counters are reported as zero
        assert_eq!(PcieThroughput::default(), PcieThroughput::new(0, 0));
    }
}
