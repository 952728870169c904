//! Mock implementations for testing
//!
//! Provides a scriptable device source for unit testing without real hardware.

use crate::domain::{MemoryInfo, PcieThroughput, PowerDraw, Temperature, Utilization};
use crate::error::NvmlError;
use crate::nvml::DeviceSource;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Individual sub-queries that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Query {
    Memory,
    Utilization,
    Power,
    Temperature,
    Pcie,
}

#[derive(Debug)]
struct MockState {
    init_error: Option<NvmlError>,
    initialized: bool,
    index: Option<u32>,
    memory: MemoryInfo,
    utilization: Utilization,
    power: PowerDraw,
    temperature: Temperature,
    pcie: PcieThroughput,
    failing: HashSet<Query>,
    init_calls: u32,
    shutdown_calls: u32,
    passes: u64,
}

/// Mock device source for testing
///
/// Clones share state, so a test can keep one clone to adjust readings
/// while another is owned by a device handle or sampling thread.
#[derive(Debug, Clone)]
pub struct MockSource {
    state: Arc<Mutex<MockState>>,
}

impl MockSource {
    /// Create a healthy mock: 16 GiB card with 8 GiB in use, 62°C, 215 W
    pub fn new() -> Self {
        const GIB: u64 = 1024 * 1024 * 1024;
        Self {
            state: Arc::new(Mutex::new(MockState {
                init_error: None,
                initialized: false,
                index: None,
                memory: MemoryInfo::new(16 * GIB, 8 * GIB),
                utilization: Utilization::new(97, 41),
                power: PowerDraw::from_milliwatts(215_000),
                temperature: Temperature::new(62),
                pcie: PcieThroughput::new(1200, 340),
                failing: HashSet::new(),
                init_calls: 0,
                shutdown_calls: 0,
                passes: 0,
            })),
        }
    }

    /// Create a mock whose `initialize` always fails with `err`
    pub fn unavailable(err: NvmlError) -> Self {
        let mock = Self::new();
        mock.lock().init_error = Some(err);
        mock
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(&self, query: Query) -> Result<MutexGuard<'_, MockState>, NvmlError> {
        let state = self.lock();
        if !state.initialized {
            return Err(NvmlError::NotInitialized);
        }
        if state.failing.contains(&query) {
            return Err(NvmlError::Unknown(format!("{:?} query failed", query)));
        }
        Ok(state)
    }

    /// Make a sub-query fail until `recover` is called
    pub fn fail(&self, query: Query) {
        self.lock().failing.insert(query);
    }

    /// Make a previously failing sub-query succeed again
    pub fn recover(&self, query: Query) {
        self.lock().failing.remove(&query);
    }

    /// Set the mock temperature
    pub fn set_temperature(&self, temp: Temperature) {
        self.lock().temperature = temp;
    }

    /// Set the mock memory usage
    pub fn set_memory(&self, memory: MemoryInfo) {
        self.lock().memory = memory;
    }

    /// Set the mock power draw
    pub fn set_power(&self, power: PowerDraw) {
        self.lock().power = power;
    }

    /// Number of `initialize` calls seen
    pub fn init_calls(&self) -> u32 {
        self.lock().init_calls
    }

    /// Number of `shutdown` calls seen
    pub fn shutdown_calls(&self) -> u32 {
        self.lock().shutdown_calls
    }

    /// Number of memory queries served, one per full pass
    pub fn passes(&self) -> u64 {
        self.lock().passes
    }

    /// Index passed to the last successful `initialize`
    pub fn bound_index(&self) -> Option<u32> {
        self.lock().index
    }
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceSource for MockSource {
    fn initialize(&mut self, index: u32) -> Result<(), NvmlError> {
        let mut state = self.lock();
        state.init_calls += 1;
        if let Some(err) = state.init_error.clone() {
            return Err(err);
        }
        state.initialized = true;
        state.index = Some(index);
        Ok(())
    }

    fn memory_info(&self) -> Result<MemoryInfo, NvmlError> {
        let mut state = self.check(Query::Memory)?;
        state.passes += 1;
        Ok(state.memory)
    }

    fn utilization(&self) -> Result<Utilization, NvmlError> {
        Ok(self.check(Query::Utilization)?.utilization)
    }

    fn power_usage(&self) -> Result<PowerDraw, NvmlError> {
        Ok(self.check(Query::Power)?.power)
    }

    fn temperature(&self) -> Result<Temperature, NvmlError> {
        Ok(self.check(Query::Temperature)?.temperature)
    }

    fn pcie_throughput(&self) -> Result<PcieThroughput, NvmlError> {
        Ok(self.check(Query::Pcie)?.pcie)
    }

    fn shutdown(&mut self) -> Result<(), NvmlError> {
        let mut state = self.lock();
        state.shutdown_calls += 1;
        state.initialized = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_requires_initialize() {
        let mut source = MockSource::new();
        assert_eq!(source.temperature(), Err(NvmlError::NotInitialized));

        source.initialize(2).unwrap();
        assert_eq!(source.bound_index(), Some(2));
        assert_eq!(source.temperature().unwrap().as_celsius(), 62);
    }

    #[test]
    fn test_mock_failures() {
        let mut source = MockSource::new();
        source.initialize(0).unwrap();

        source.fail(Query::Power);
        assert!(source.power_usage().is_err());
        assert!(source.readings().is_err());

        source.recover(Query::Power);
        assert!(source.readings().is_ok());
    }

    #[test]
    fn test_mock_pcie_failure_is_optional() {
        let mut source = MockSource::new();
        source.initialize(0).unwrap();
        source.fail(Query::Pcie);

        let readings = source.readings().unwrap();
        assert!(readings.pcie.is_none());
        assert_eq!(readings.temperature.as_celsius(), 62);
    }

    #[test]
    fn test_mock_unavailable() {
        let mut source = MockSource::unavailable(NvmlError::LibraryNotFound);
        assert_eq!(source.initialize(0), Err(NvmlError::LibraryNotFound));
        assert_eq!(source.init_calls(), 1);
    }

    #[test]
    fn test_mock_shared_state() {
        let mut source = MockSource::new();
        let control = source.clone();
        source.initialize(0).unwrap();

        control.set_temperature(Temperature::new(80));
        assert_eq!(source.temperature().unwrap().as_celsius(), 80);
    }
}
