//! Unified error types for dvfsctl
//!
//! This module defines all error types used throughout the crate.
//! Uses thiserror for ergonomic error definitions.

use crate::domain::{Khz, Millivolts, RoundDirection};
use std::time::Duration;
use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from the scaling engine
    #[error("DVFS error: {0}")]
    Dvfs(#[from] DvfsError),

    /// Error from secondary CPU bring-up
    #[error("SMP error: {0}")]
    Smp(#[from] SmpError),

    /// Error from configuration parsing/validation
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error from domain type validation
    #[error("Domain validation error: {0}")]
    Domain(#[from] DomainError),

    /// Clock node not found by name
    #[error("Clock node not found: {0}")]
    NodeNotFound(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by hardware capabilities (regulators, clocks, power gates)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HwError {
    /// The capability does not implement this operation
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// Invalid argument passed to the hardware
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The hardware reported a failure
    #[error("Hardware failure: {0}")]
    Failed(String),
}

/// Errors from domain type validation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Frequency table must have at least one entry
    #[error("Frequency table must have at least one entry")]
    EmptyTable,

    /// Two table entries share a frequency
    #[error("Frequency table has duplicate entry for {0}")]
    DuplicateFrequency(Khz),

    /// Requested rate is above the table's highest entry
    #[error("Frequency {rate} out of range (table maximum: {max})")]
    FrequencyOutOfRange { rate: Khz, max: Khz },

    /// Rate limit with min above max
    #[error("Invalid rate limit: min {min} is above max {max}")]
    InvalidRateLimit { min: Khz, max: Khz },
}

/// Errors from the scaling engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DvfsError {
    /// No regulator or no discrete voltages; voltage control is unavailable
    #[error("Voltage control not available for domain '{0}'")]
    Unsupported(String),

    /// Value validation failed (table lookup, rate limit)
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// No supported voltage in the requested direction
    #[error("No supported voltage {direction} {volt} in domain '{domain}'")]
    VoltageOutOfRange {
        domain: String,
        volt: Millivolts,
        direction: RoundDirection,
    },

    /// Rate request outside the node's installed limit
    #[error("Rate {rate} for '{node}' outside limit {min}-{max}")]
    RateOutOfLimit {
        node: String,
        rate: Khz,
        min: Khz,
        max: Khz,
    },

    /// Regulator adapter failed
    #[error("Regulator for domain '{domain}' failed: {source}")]
    Regulator {
        domain: String,
        #[source]
        source: HwError,
    },

    /// Underlying rate-set callback failed
    #[error("Clock '{node}' failed to change rate: {source}")]
    Clock {
        node: String,
        #[source]
        source: HwError,
    },

    /// Stepped multi-domain scaling aborted
    #[error("Voltage scaling failed in domain '{domain}': {reason}")]
    ScalingFailed { domain: String, reason: String },

    /// Handle does not refer to a registered object
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Name already registered
    #[error("Name already registered: {0}")]
    DuplicateName(String),

    /// Dependency edge rejected
    #[error("Invalid dependency: {0}")]
    InvalidDependency(String),

    /// Scaling is disabled on this node
    #[error("DVFS is disabled for clock '{0}'")]
    Disabled(String),
}

impl DvfsError {
    /// Whether the error only means voltage control is missing
    ///
    /// Callers degrade to frequency-only operation on these.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, DvfsError::Unsupported(_))
    }
}

/// Errors from secondary CPU bring-up
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SmpError {
    /// CPU index outside the number of cores
    #[error("CPU {cpu} outside maximum number of cpus {cores}")]
    InvalidCpu { cpu: u32, cores: u32 },

    /// Power domain did not reach the requested state in time
    #[error("Power domain {domain} did not turn {} within {waited:?}", on_off(.on))]
    Timeout {
        domain: u32,
        on: bool,
        waited: Duration,
    },

    /// Power gate capability failed
    #[error("Power gate failed: {0}")]
    Gate(#[from] HwError),
}

fn on_off(on: &bool) -> &'static str {
    if *on {
        "on"
    } else {
        "off"
    }
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

    /// Reference to an undeclared domain or node
    #[error("Unknown {kind} '{name}' referenced in configuration")]
    UnknownReference { kind: &'static str, name: String },

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerError(#[from] toml::ser::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
