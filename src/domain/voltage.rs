//! Voltage domain types
//!
//! Provides the millivolt newtype, rounding direction and regulator modes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supply voltage in millivolts
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Millivolts(u32);

impl Millivolts {
    /// Create a new voltage from millivolts
    pub const fn new(mv: u32) -> Self {
        Self(mv)
    }

    /// Create a new voltage from microvolts (truncating)
    pub const fn from_microvolts(uv: u32) -> Self {
        Self(uv / 1000)
    }

    /// Get the voltage in millivolts
    #[inline]
    pub const fn as_mv(&self) -> u32 {
        self.0
    }

    /// Get the voltage in microvolts
    #[inline]
    pub const fn as_microvolts(&self) -> u64 {
        self.0 as u64 * 1000
    }

    /// Add an offset, saturating at the type bounds
    pub const fn saturating_add(self, mv: u32) -> Self {
        Self(self.0.saturating_add(mv))
    }

    /// Subtract an offset, saturating at zero
    pub const fn saturating_sub(self, mv: u32) -> Self {
        Self(self.0.saturating_sub(mv))
    }

    /// Absolute difference between two voltages in millivolts
    pub const fn abs_diff(self, other: Self) -> u32 {
        self.0.abs_diff(other.0)
    }
}

impl fmt::Display for Millivolts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}mV", self.0)
    }
}

impl From<u32> for Millivolts {
    fn from(mv: u32) -> Self {
        Self(mv)
    }
}

impl From<Millivolts> for u32 {
    fn from(volt: Millivolts) -> Self {
        volt.0
    }
}

/// Direction used when snapping a voltage onto the regulator's discrete steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundDirection {
    /// Largest supported voltage not above the request
    Down,
    /// Smallest supported voltage not below the request
    Up,
}

impl fmt::Display for RoundDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundDirection::Down => write!(f, "at or below"),
            RoundDirection::Up => write!(f, "at or above"),
        }
    }
}

/// Regulator operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum RegulatorMode {
    /// Fastest transient response, highest quiescent current
    Fast,
    /// Default operating mode
    #[default]
    Normal,
    /// Reduced quiescent current for light loads
    Idle,
    /// Lowest power, suitable for suspend
    Standby,
}

impl fmt::Display for RegulatorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegulatorMode::Fast => write!(f, "Fast"),
            RegulatorMode::Normal => write!(f, "Normal"),
            RegulatorMode::Idle => write!(f, "Idle"),
            RegulatorMode::Standby => write!(f, "Standby"),
        }
    }
}
