//! Frequency domain types
//!
//! Provides the kilohertz newtype and the min/max rate clamp.

use crate::error::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Clock rate in kilohertz
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Khz(u32);

impl Khz {
    /// Create a new rate from kilohertz
    pub const fn new(khz: u32) -> Self {
        Self(khz)
    }

    /// Create a new rate from megahertz
    pub const fn from_mhz(mhz: u32) -> Self {
        Self(mhz * 1000)
    }

    /// Create a new rate from hertz (truncating)
    pub const fn from_hz(hz: u64) -> Self {
        Self((hz / 1000) as u32)
    }

    /// Get the rate in kilohertz
    #[inline]
    pub const fn as_khz(&self) -> u32 {
        self.0
    }

    /// Get the rate in hertz
    #[inline]
    pub const fn as_hz(&self) -> u64 {
        self.0 as u64 * 1000
    }
}

impl fmt::Display for Khz {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}kHz", self.0)
    }
}

impl From<u32> for Khz {
    fn from(khz: u32) -> Self {
        Self(khz)
    }
}

impl From<Khz> for u32 {
    fn from(rate: Khz) -> Self {
        rate.0
    }
}

/// Inclusive [min, max] rate clamp applied to incoming rate requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Lowest rate a request may ask for
    pub min: Khz,
    /// Highest rate a request may ask for
    pub max: Khz,
}

impl RateLimit {
    /// Create a new rate limit
    ///
    /// # Errors
    /// Returns `DomainError::InvalidRateLimit` if `min > max`
    pub fn new(min: Khz, max: Khz) -> Result<Self, DomainError> {
        if min > max {
            return Err(DomainError::InvalidRateLimit { min, max });
        }
        Ok(Self { min, max })
    }

    /// Check if a rate lies within the clamp
    pub fn contains(&self, rate: Khz) -> bool {
        rate >= self.min && rate <= self.max
    }
}

impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}
