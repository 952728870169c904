//! Configuration builder
//!
//! Merges configuration from files and CLI arguments.

use crate::config::{Config, ConfigFile};
use crate::error::ConfigError;

/// Builder for merging configuration sources
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Load configuration from a file
    ///
    /// An explicit path must exist; without one the default locations are
    /// searched and defaults are kept if none is found.
    pub fn with_file(mut self, path: Option<&str>) -> Result<Self, ConfigError> {
        let file_config = match path {
            Some(path) => Some(ConfigFile::load(path)?),
            None => ConfigFile::load_default()?,
        };

        if let Some(cfg) = file_config {
            self.config = cfg;
        }

        Ok(self)
    }

    /// Override with CLI GPU index
    pub fn with_gpu_index(mut self, index: Option<u32>) -> Self {
        if let Some(i) = index {
            self.config.device.index = i;
        }
        self
    }

    /// Override with CLI interval
    pub fn with_interval_ms(mut self, interval: Option<u64>) -> Self {
        if let Some(i) = interval {
            self.config.sampling.interval_ms = i;
        }
        self
    }

    /// Override with CLI channel list
    pub fn with_channels(mut self, channels: Vec<String>) -> Self {
        if !channels.is_empty() {
            self.config.sampling.channels = channels;
        }
        self
    }

    /// Override with CLI bind host
    pub fn with_host(mut self, host: Option<String>) -> Self {
        if let Some(h) = host {
            self.config.server.host = h;
        }
        self
    }

    /// Override with CLI bind port
    pub fn with_port(mut self, port: Option<u16>) -> Self {
        if let Some(p) = port {
            self.config.server.port = p;
        }
        self
    }

    /// Build the final configuration, validating it
    pub fn build(self) -> Result<Config, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
