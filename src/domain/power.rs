//! Power domain types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Instantaneous power draw in milliwatts (stored internally) but displayed as watts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct PowerDraw(u32);

impl PowerDraw {
    /// Create a power reading from milliwatts, as NVML reports it
    pub const fn from_milliwatts(mw: u32) -> Self {
        Self(mw)
    }

    /// Get the power draw in milliwatts
    #[inline]
    pub const fn as_milliwatts(&self) -> u32 {
        self.0
    }

    /// Get the power draw in fractional watts
    #[inline]
    pub fn as_watts(&self) -> f64 {
        self.0 as f64 / 1000.0
    }
}

impl fmt::Display for PowerDraw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}W", self.as_watts())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_conversion() {
        let power = PowerDraw::from_milliwatts(215_000);
        assert_eq!(power.as_watts(), 215.0);
        assert_eq!(power.as_milliwatts(), 215_000);
        assert_eq!(PowerDraw::from_milliwatts(u32::MAX).as_watts(), 4_294_967.295);
    }

    #[test]
    fn test_power_display() {
        assert_eq!(PowerDraw::from_milliwatts(87_456).to_string(), "87.46W");
    }
}
