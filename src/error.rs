//! Unified error types for nvstream
//!
//! This module defines all error types used throughout the application.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from NVML operations
    #[error("NVML error: {0}")]
    Nvml(#[from] NvmlError),

    /// Error from configuration parsing/validation
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error from the sampling loop
    #[error("Sampler error: {0}")]
    Sampler(#[from] SamplerError),

    /// IO error (sockets, runtime, file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from NVML and device source operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NvmlError {
    /// Failed to initialize NVML library
    #[error("Failed to initialize NVML: {0}")]
    InitializationFailed(String),

    /// NVML library not found
    #[error("NVML library not found. Is the NVIDIA driver installed?")]
    LibraryNotFound,

    /// Device not found at index
    #[error("GPU device not found at index {0}")]
    DeviceNotFound(u32),

    /// Operation not supported by this GPU
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// Insufficient permissions
    #[error("Insufficient permissions: {0}")]
    InsufficientPermissions(String),

    /// GPU is lost (fallen off bus, etc.)
    #[error("GPU is lost or has become inaccessible")]
    GpuLost,

    /// A query was issued before the source was initialized
    #[error("device not initialized")]
    NotInitialized,

    /// The handle was already released
    #[error("device handle shut down")]
    ShutDown,

    /// Unknown NVML error
    #[error("NVML error: {0}")]
    Unknown(String),
}

/// Errors from the sampling loop state machine
#[derive(Error, Debug)]
pub enum SamplerError {
    /// `start` was called while the loop is running
    #[error("Sampling loop is already running")]
    AlreadyRunning,

    /// `start` was called with a device handle that is not ready
    #[error("Device handle is not ready (state: {0})")]
    DeviceNotReady(String),

    /// The background thread could not be spawned
    #[error("Failed to spawn sampling thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Errors from configuration parsing and validation
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    /// Invalid config value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
