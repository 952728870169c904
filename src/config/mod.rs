//! Configuration system
//!
//! Handles TOML config file parsing, CLI argument merging and validation.

pub mod builder;
pub mod file;

pub use builder::ConfigBuilder;
pub use file::ConfigFile;

use crate::error::ConfigError;
use crate::services::broadcaster::DEFAULT_SUBSCRIBER_BUFFER;
use crate::services::SamplerConfig;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Device selection
    pub device: DeviceConfig,
    /// Sampling loop settings
    pub sampling: SamplingConfig,
    /// Network settings
    pub server: ServerConfig,
}

/// Device selection configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DeviceConfig {
    /// GPU index (0-based)
    pub index: u32,
}

/// Sampling loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Interval between samples in milliseconds
    pub interval_ms: u64,
    /// Channels every snapshot is published to
    pub channels: Vec<String>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        let defaults = SamplerConfig::default();
        Self {
            interval_ms: defaults.interval.as_millis() as u64,
            channels: defaults.channels,
        }
    }
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Snapshots queued per subscriber before frames are dropped
    pub subscriber_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5001,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
        }
    }
}

impl Config {
    /// Check every value that could otherwise fail after startup
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sampling.interval_ms == 0 {
            return Err(ConfigError::invalid(
                "sampling.interval_ms",
                "must be greater than 0",
            ));
        }

        if self.sampling.channels.is_empty() {
            return Err(ConfigError::invalid(
                "sampling.channels",
                "at least one channel is required",
            ));
        }

        let mut seen = HashSet::new();
        for channel in &self.sampling.channels {
            if !is_valid_channel(channel) {
                return Err(ConfigError::invalid(
                    "sampling.channels",
                    format!("'{}' must be '/' or '/<name>' with no other slashes", channel),
                ));
            }
            if !seen.insert(channel.as_str()) {
                return Err(ConfigError::invalid(
                    "sampling.channels",
                    format!("'{}' is listed twice", channel),
                ));
            }
        }

        if self.server.subscriber_buffer == 0 {
            return Err(ConfigError::invalid(
                "server.subscriber_buffer",
                "must be greater than 0",
            ));
        }

        self.bind_addr()?;
        Ok(())
    }

    /// Socket address to listen on
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self.server.host.parse().map_err(|_| {
            ConfigError::invalid(
                "server.host",
                format!("'{}' is not an IP address", self.server.host),
            )
        })?;
        Ok(SocketAddr::new(ip, self.server.port))
    }

    /// Convert to the sampling loop configuration
    pub fn sampler_config(&self) -> SamplerConfig {
        SamplerConfig {
            interval: Duration::from_millis(self.sampling.interval_ms),
            channels: self.sampling.channels.clone(),
        }
    }
}

/// `/` or `/name` where name is non-empty and contains no further slashes
fn is_valid_channel(channel: &str) -> bool {
    match channel.strip_prefix('/') {
        Some("") => true,
        Some(name) => !name.contains('/') && !name.chars().any(char::is_whitespace),
        None => false,
    }
}
