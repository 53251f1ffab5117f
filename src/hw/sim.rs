//! Simulated hardware backend
//!
//! Regulators, clocks and a PMU that behave like well-mannered hardware and
//! optionally record every state change into a shared [`SimTrace`].

use crate::domain::{Khz, Millivolts, RegulatorMode};
use crate::error::HwError;
use crate::hw::traits::{ClockRate, PowerGate, Regulator};

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// A hardware state change observed by the simulator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SimEvent {
    /// Regulator output changed
    Voltage { regulator: String, volt: Millivolts },
    /// Clock was reprogrammed
    Rate { clock: String, rate: Khz },
    /// PMU power domain was toggled
    Gate { domain: u32, on: bool },
}

impl fmt::Display for SimEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimEvent::Voltage { regulator, volt } => write!(f, "{} -> {}", regulator, volt),
            SimEvent::Rate { clock, rate } => write!(f, "{} -> {}", clock, rate),
            SimEvent::Gate { domain, on } => {
                write!(f, "pd{} -> {}", domain, if *on { "on" } else { "off" })
            }
        }
    }
}

/// Shared, ordered log of simulated hardware events
#[derive(Debug, Clone, Default)]
pub struct SimTrace {
    events: Arc<Mutex<Vec<SimEvent>>>,
}

impl SimTrace {
    /// Create an empty trace
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event
    pub fn record(&self, event: SimEvent) {
        log::trace!("sim: {}", event);
        self.events.lock().push(event);
    }

    /// Copy of all recorded events
    pub fn events(&self) -> Vec<SimEvent> {
        self.events.lock().clone()
    }

    /// Drain all recorded events
    pub fn take(&self) -> Vec<SimEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

/// Linear-range regulator: `min + n * step` for every step up to `max`
#[derive(Debug)]
pub struct SimRegulator {
    name: String,
    min: Millivolts,
    max: Millivolts,
    step_mv: u32,
    voltage: Millivolts,
    mode: RegulatorMode,
    ramp_uv_per_us: Option<u32>,
    trace: Option<SimTrace>,
}

impl SimRegulator {
    /// Create a regulator covering `[min, max]` in `step_mv` increments
    ///
    /// The output starts at `min`.
    pub fn new(name: impl Into<String>, min: Millivolts, max: Millivolts, step_mv: u32) -> Self {
        Self {
            name: name.into(),
            min,
            max,
            step_mv: step_mv.max(1),
            voltage: min,
            mode: RegulatorMode::Normal,
            ramp_uv_per_us: None,
            trace: None,
        }
    }

    /// Builder: set the initial output voltage
    pub fn with_voltage(mut self, volt: Millivolts) -> Self {
        self.voltage = volt;
        self
    }

    /// Builder: report transition times using a ramp rate in uV/us
    pub fn with_ramp_delay(mut self, uv_per_us: u32) -> Self {
        self.ramp_uv_per_us = Some(uv_per_us).filter(|r| *r > 0);
        self
    }

    /// Builder: record output changes into a trace
    pub fn with_trace(mut self, trace: SimTrace) -> Self {
        self.trace = Some(trace);
        self
    }

    fn selector_count(&self) -> u32 {
        if self.max < self.min {
            return 0;
        }
        (self.max.as_mv() - self.min.as_mv()) / self.step_mv + 1
    }
}

impl Regulator for SimRegulator {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_voltage(&self) -> Result<Millivolts, HwError> {
        Ok(self.voltage)
    }

    fn set_voltage(&mut self, min: Millivolts, max: Millivolts) -> Result<(), HwError> {
        let target = (0..self.selector_count())
            .map(|sel| self.min.saturating_add(sel * self.step_mv))
            .find(|v| *v >= min && *v <= max)
            .ok_or_else(|| {
                HwError::InvalidArgument(format!(
                    "{}: no selector within {}-{}",
                    self.name, min, max
                ))
            })?;

        self.voltage = target;
        if let Some(trace) = &self.trace {
            trace.record(SimEvent::Voltage {
                regulator: self.name.clone(),
                volt: target,
            });
        }
        Ok(())
    }

    fn set_voltage_time(&self, old: Millivolts, new: Millivolts) -> Result<u32, HwError> {
        let ramp = self
            .ramp_uv_per_us
            .ok_or_else(|| HwError::NotSupported(format!("{}: no ramp delay", self.name)))?;
        let delta_uv = old.abs_diff(new) * 1000;
        Ok(delta_uv.div_ceil(ramp))
    }

    fn set_mode(&mut self, mode: RegulatorMode) -> Result<(), HwError> {
        self.mode = mode;
        Ok(())
    }

    fn get_mode(&self) -> Result<RegulatorMode, HwError> {
        Ok(self.mode)
    }

    fn list_voltage(&self, selector: u32) -> Result<Millivolts, HwError> {
        if selector >= self.selector_count() {
            return Err(HwError::InvalidArgument(format!(
                "{}: selector {} out of range",
                self.name, selector
            )));
        }
        Ok(self.min.saturating_add(selector * self.step_mv))
    }

    fn count_voltages(&self) -> Result<u32, HwError> {
        Ok(self.selector_count())
    }
}

/// Clock that accepts any rate
#[derive(Debug)]
pub struct SimClock {
    name: String,
    rate: Khz,
    trace: Option<SimTrace>,
}

impl SimClock {
    /// Create a clock running at `rate`
    pub fn new(name: impl Into<String>, rate: Khz) -> Self {
        Self {
            name: name.into(),
            rate,
            trace: None,
        }
    }

    /// Builder: record rate changes into a trace
    pub fn with_trace(mut self, trace: SimTrace) -> Self {
        self.trace = Some(trace);
        self
    }
}

impl ClockRate for SimClock {
    fn get_rate(&self) -> Result<Khz, HwError> {
        Ok(self.rate)
    }

    fn set_rate(&mut self, rate: Khz) -> Result<(), HwError> {
        if rate.as_khz() == 0 {
            return Err(HwError::InvalidArgument(format!(
                "{}: rate must be non-zero",
                self.name
            )));
        }
        self.rate = rate;
        if let Some(trace) = &self.trace {
            trace.record(SimEvent::Rate {
                clock: self.name.clone(),
                rate,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct GateState {
    requested: bool,
    reported: bool,
    polls_left: u32,
}

/// PMU whose power domains report a new state after a fixed number of polls
#[derive(Debug)]
pub struct SimPmu {
    domains: Mutex<Vec<GateState>>,
    latency_polls: u32,
    trace: Option<SimTrace>,
}

impl SimPmu {
    /// Create a PMU with `count` power domains, all on
    pub fn new(count: u32) -> Self {
        let on = GateState {
            requested: true,
            reported: true,
            polls_left: 0,
        };
        Self {
            domains: Mutex::new(vec![on; count as usize]),
            latency_polls: 0,
            trace: None,
        }
    }

    /// Builder: number of `is_on` polls before a toggle becomes visible
    pub fn with_latency(mut self, polls: u32) -> Self {
        self.latency_polls = polls;
        self
    }

    /// Builder: record toggles into a trace
    pub fn with_trace(mut self, trace: SimTrace) -> Self {
        self.trace = Some(trace);
        self
    }

    fn out_of_range(domain: u32) -> HwError {
        HwError::InvalidArgument(format!("power domain {} does not exist", domain))
    }
}

impl PowerGate for SimPmu {
    fn is_on(&self, domain: u32) -> Result<bool, HwError> {
        let mut domains = self.domains.lock();
        let state = domains
            .get_mut(domain as usize)
            .ok_or_else(|| Self::out_of_range(domain))?;

        if state.reported != state.requested {
            if state.polls_left == 0 {
                state.reported = state.requested;
            } else {
                state.polls_left -= 1;
            }
        }
        Ok(state.reported)
    }

    fn set_on(&mut self, domain: u32, on: bool) -> Result<(), HwError> {
        let mut domains = self.domains.lock();
        let state = domains
            .get_mut(domain as usize)
            .ok_or_else(|| Self::out_of_range(domain))?;

        state.requested = on;
        state.polls_left = self.latency_polls;
        if let Some(trace) = &self.trace {
            trace.record(SimEvent::Gate { domain, on });
        }
        Ok(())
    }
}
