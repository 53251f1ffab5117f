//! Trait definitions for hardware capabilities
//!
//! These traits abstract over regulator, clock and PMU drivers so the engine
//! can be driven by simulated or mocked hardware.

use crate::domain::{Khz, Millivolts, RegulatorMode};
use crate::error::HwError;

use std::time::Duration;

/// Voltage regulator adapter
///
/// Calls may block for the regulator's bus and ramp latency.
pub trait Regulator: Send {
    /// Regulator name (e.g. "vdd_arm")
    fn name(&self) -> &str;

    /// Get the current output voltage
    fn get_voltage(&self) -> Result<Millivolts, HwError>;

    /// Set the output voltage to a value within `[min, max]`
    fn set_voltage(&mut self, min: Millivolts, max: Millivolts) -> Result<(), HwError>;

    /// Time in microseconds the output needs to settle after moving from
    /// `old` to `new`
    ///
    /// Returns `HwError::NotSupported` if the regulator does not report
    /// transition times.
    fn set_voltage_time(&self, old: Millivolts, new: Millivolts) -> Result<u32, HwError>;

    /// Set the operating mode
    fn set_mode(&mut self, mode: RegulatorMode) -> Result<(), HwError>;

    /// Get the operating mode
    fn get_mode(&self) -> Result<RegulatorMode, HwError>;

    /// Voltage produced by discrete selector `selector`
    fn list_voltage(&self, selector: u32) -> Result<Millivolts, HwError>;

    /// Number of discrete selectors
    fn count_voltages(&self) -> Result<u32, HwError>;
}

/// Underlying clock rate control for one clock node
pub trait ClockRate: Send {
    /// Get the current rate
    fn get_rate(&self) -> Result<Khz, HwError>;

    /// Program a new rate
    fn set_rate(&mut self, rate: Khz) -> Result<(), HwError>;
}

/// How a clock node reaches a new rate
///
/// The engine calls `target` once the rail carries `rate`, handing over the
/// node's low-level clock. A policy may pass through intermediate rates
/// (e.g. parking on a safe parent first) but must not program anything
/// above both the current rate and `rate`.
pub trait DvfsTarget: Send {
    /// Bring `clock` to `rate`
    fn target(&mut self, rate: Khz, clock: &mut dyn ClockRate) -> Result<(), HwError>;
}

/// Programs the requested rate directly
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectTarget;

impl DvfsTarget for DirectTarget {
    fn target(&mut self, rate: Khz, clock: &mut dyn ClockRate) -> Result<(), HwError> {
        clock.set_rate(rate)
    }
}

/// PMU power-domain gate
pub trait PowerGate: Send {
    /// Whether the power domain currently reports on
    fn is_on(&self, domain: u32) -> Result<bool, HwError>;

    /// Request the power domain on or off
    ///
    /// The hardware may take a while to reflect the new state; callers poll
    /// `is_on`.
    fn set_on(&mut self, domain: u32, on: bool) -> Result<(), HwError>;
}

/// Blocking delay provider
pub trait Delay: Send + Sync {
    /// Block for at least `us` microseconds
    fn delay_us(&self, us: u32);
}

/// Delay backed by `std::thread::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct StdDelay;

impl Delay for StdDelay {
    fn delay_us(&self, us: u32) {
        std::thread::sleep(Duration::from_micros(us as u64));
    }
}
