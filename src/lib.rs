//! nvstream - real-time GPU telemetry broadcaster
//!
//! This library samples a single NVIDIA GPU through NVML on a fixed
//! interval and fans every snapshot out to WebSocket subscribers. When the
//! driver is unavailable the service keeps running in degraded mode and
//! answers every subscriber with an error snapshot.
//!
//! # Modules
//!
//! - [`cli`]: Command-line interface definitions
//! - [`config`]: Configuration system
//! - [`domain`]: Metric models and the snapshot wire format
//! - [`error`]: Error types
//! - [`nvml`]: NVML abstraction layer
//! - [`server`]: WebSocket and HTTP transport
//! - [`services`]: Device handle, sampling loop, broadcaster, lifecycle

pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod nvml;
pub mod server;
pub mod services;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use error::{AppError, Result};
