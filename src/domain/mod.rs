//! Domain models for dvfsctl
//!
//! This module contains the value types shared by the engine and the CLI.
//! Types are validated on construction (fail-fast pattern).

pub mod frequency;
pub mod table;
pub mod voltage;

pub use frequency::{Khz, RateLimit};
pub use table::{FreqVolt, FreqVoltTable};
pub use voltage::{Millivolts, RegulatorMode, RoundDirection};
