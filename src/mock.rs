//! Mock implementations for testing
//!
//! Provides mock regulators, clocks, rate-change policies, power gates and a
//! delay provider that can be told to fail and that record every accepted
//! hardware change.

use crate::domain::{Khz, Millivolts, RegulatorMode};
use crate::error::HwError;
use crate::hw::{ClockRate, Delay, DvfsTarget, PowerGate, Regulator};

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// A hardware change accepted by a mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedEvent {
    Voltage { regulator: String, volt: u32 },
    Rate { clock: String, rate: u32 },
    Gate { domain: u32, on: bool },
}

/// Shared, ordered event log
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl Recorder {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: RecordedEvent) {
        self.events.lock().push(event);
    }

    /// All recorded events
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    /// Only the voltage changes, as (regulator, mV)
    pub fn voltages(&self) -> Vec<(String, u32)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                RecordedEvent::Voltage { regulator, volt } => Some((regulator.clone(), *volt)),
                _ => None,
            })
            .collect()
    }

    /// Forget everything recorded so far
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

/// Handle that makes the owning mock fail its next `n` mutating calls
#[derive(Debug, Clone, Default)]
pub struct FailureSwitch {
    remaining: Arc<AtomicU32>,
}

impl FailureSwitch {
    /// Fail the next `n` calls
    pub fn fail_next(&self, n: u32) {
        self.remaining.store(n, Ordering::SeqCst);
    }

    fn trip(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Mock regulator with an explicit list of steps
#[derive(Debug)]
pub struct MockRegulator {
    name: String,
    steps: Vec<u32>,
    voltage: u32,
    mode: Option<RegulatorMode>,
    ramp_uv_per_us: Option<u32>,
    failures: FailureSwitch,
    recorder: Option<Recorder>,
}

impl MockRegulator {
    /// Regulator with steps `min, min + step, ..., max`, starting at `min`
    pub fn linear(min: u32, max: u32, step: u32) -> Self {
        let steps: Vec<u32> = (min..=max).step_by(step.max(1) as usize).collect();
        Self::with_steps(&steps)
    }

    /// Regulator with arbitrary steps, starting at the first one
    pub fn with_steps(steps: &[u32]) -> Self {
        Self {
            name: "mock_reg".to_string(),
            steps: steps.to_vec(),
            voltage: steps.first().copied().unwrap_or(0),
            mode: Some(RegulatorMode::Normal),
            ramp_uv_per_us: None,
            failures: FailureSwitch::default(),
            recorder: None,
        }
    }

    /// Builder: set the initial output voltage
    pub fn with_voltage(mut self, mv: u32) -> Self {
        self.voltage = mv;
        self
    }

    /// Builder: report settle times from a ramp rate in uV/us
    pub fn with_ramp_delay(mut self, uv_per_us: u32) -> Self {
        self.ramp_uv_per_us = Some(uv_per_us);
        self
    }

    /// Builder: reject mode calls
    pub fn without_modes(mut self) -> Self {
        self.mode = None;
        self
    }

    /// Builder: set name
    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Builder: record accepted voltage changes
    pub fn with_recorder(mut self, recorder: Recorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Switch for injecting `set_voltage` failures
    pub fn failure_switch(&self) -> FailureSwitch {
        self.failures.clone()
    }
}

impl Regulator for MockRegulator {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_voltage(&self) -> Result<Millivolts, HwError> {
        Ok(Millivolts::new(self.voltage))
    }

    fn set_voltage(&mut self, min: Millivolts, max: Millivolts) -> Result<(), HwError> {
        if self.failures.trip() {
            return Err(HwError::Failed(format!("{}: injected failure", self.name)));
        }
        let volt = self
            .steps
            .iter()
            .copied()
            .filter(|v| *v >= min.as_mv() && *v <= max.as_mv())
            .min()
            .ok_or_else(|| HwError::InvalidArgument(format!("{}: {}-{}", self.name, min, max)))?;

        self.voltage = volt;
        if let Some(recorder) = &self.recorder {
            recorder.push(RecordedEvent::Voltage {
                regulator: self.name.clone(),
                volt,
            });
        }
        Ok(())
    }

    fn set_voltage_time(&self, old: Millivolts, new: Millivolts) -> Result<u32, HwError> {
        let ramp = self
            .ramp_uv_per_us
            .ok_or_else(|| HwError::NotSupported(self.name.clone()))?;
        Ok((old.abs_diff(new) * 1000).div_ceil(ramp))
    }

    fn set_mode(&mut self, mode: RegulatorMode) -> Result<(), HwError> {
        match self.mode {
            Some(_) => {
                self.mode = Some(mode);
                Ok(())
            }
            None => Err(HwError::NotSupported(self.name.clone())),
        }
    }

    fn get_mode(&self) -> Result<RegulatorMode, HwError> {
        self.mode
            .ok_or_else(|| HwError::NotSupported(self.name.clone()))
    }

    fn list_voltage(&self, selector: u32) -> Result<Millivolts, HwError> {
        self.steps
            .get(selector as usize)
            .map(|mv| Millivolts::new(*mv))
            .ok_or_else(|| HwError::InvalidArgument(format!("selector {}", selector)))
    }

    fn count_voltages(&self) -> Result<u32, HwError> {
        Ok(self.steps.len() as u32)
    }
}

/// Mock clock
#[derive(Debug)]
pub struct MockClock {
    name: String,
    rate: u32,
    failures: FailureSwitch,
    recorder: Option<Recorder>,
}

impl MockClock {
    /// Clock running at `khz`
    pub fn new(khz: u32) -> Self {
        Self {
            name: "mock_clk".to_string(),
            rate: khz,
            failures: FailureSwitch::default(),
            recorder: None,
        }
    }

    /// Builder: set name
    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Builder: record accepted rate changes
    pub fn with_recorder(mut self, recorder: Recorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Switch for injecting `set_rate` failures
    pub fn failure_switch(&self) -> FailureSwitch {
        self.failures.clone()
    }
}

impl ClockRate for MockClock {
    fn get_rate(&self) -> Result<Khz, HwError> {
        Ok(Khz::new(self.rate))
    }

    fn set_rate(&mut self, rate: Khz) -> Result<(), HwError> {
        if self.failures.trip() {
            return Err(HwError::Failed(format!("{}: injected failure", self.name)));
        }
        self.rate = rate.as_khz();
        if let Some(recorder) = &self.recorder {
            recorder.push(RecordedEvent::Rate {
                clock: self.name.clone(),
                rate: self.rate,
            });
        }
        Ok(())
    }
}

/// Rate-change policy that parks the clock on a fixed rate first
#[derive(Debug, Clone)]
pub struct MockTarget {
    via: Khz,
    calls: Arc<AtomicU32>,
}

impl MockTarget {
    /// Pass through `khz` on every rate change
    pub fn via(khz: u32) -> Self {
        Self {
            via: Khz::new(khz),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Shared counter of `target` calls
    pub fn call_counter(&self) -> Arc<AtomicU32> {
        self.calls.clone()
    }
}

impl DvfsTarget for MockTarget {
    fn target(&mut self, rate: Khz, clock: &mut dyn ClockRate) -> Result<(), HwError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        clock.set_rate(self.via)?;
        clock.set_rate(rate)
    }
}

/// Mock PMU; toggles are visible immediately unless a domain is stuck
#[derive(Debug)]
pub struct MockGate {
    on: Vec<bool>,
    stuck: HashSet<u32>,
    polls: Arc<AtomicU32>,
    recorder: Option<Recorder>,
}

impl MockGate {
    /// PMU with `count` domains, all off
    pub fn new(count: u32) -> Self {
        Self {
            on: vec![false; count as usize],
            stuck: HashSet::new(),
            polls: Arc::new(AtomicU32::new(0)),
            recorder: None,
        }
    }

    /// Builder: `domain` ignores toggle requests
    pub fn with_stuck(mut self, domain: u32) -> Self {
        self.stuck.insert(domain);
        self
    }

    /// Builder: record toggle requests
    pub fn with_recorder(mut self, recorder: Recorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Shared counter of `is_on` calls
    pub fn poll_counter(&self) -> Arc<AtomicU32> {
        self.polls.clone()
    }
}

impl PowerGate for MockGate {
    fn is_on(&self, domain: u32) -> Result<bool, HwError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.on
            .get(domain as usize)
            .copied()
            .ok_or_else(|| HwError::InvalidArgument(format!("domain {}", domain)))
    }

    fn set_on(&mut self, domain: u32, on: bool) -> Result<(), HwError> {
        let stuck = self.stuck.contains(&domain);
        let state = self
            .on
            .get_mut(domain as usize)
            .ok_or_else(|| HwError::InvalidArgument(format!("domain {}", domain)))?;
        if !stuck {
            *state = on;
        }
        if let Some(recorder) = &self.recorder {
            recorder.push(RecordedEvent::Gate { domain, on });
        }
        Ok(())
    }
}

/// Delay provider that only adds up requested time
#[derive(Debug, Default)]
pub struct MockDelay {
    total_us: AtomicU64,
}

impl MockDelay {
    /// Total microseconds requested so far
    pub fn total_us(&self) -> u64 {
        self.total_us.load(Ordering::SeqCst)
    }
}

impl Delay for MockDelay {
    fn delay_us(&self, us: u32) {
        self.total_us.fetch_add(us as u64, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_switch_counts_down() {
        let mut reg = MockRegulator::linear(900, 1000, 50);
        reg.failure_switch().fail_next(2);
        let v = Millivolts::new(950);
        assert!(reg.set_voltage(v, v).is_err());
        assert!(reg.set_voltage(v, v).is_err());
        assert!(reg.set_voltage(v, v).is_ok());
        assert_eq!(reg.get_voltage().unwrap(), v);
    }

    #[test]
    fn test_recorder_keeps_order() {
        let recorder = Recorder::new();
        let mut reg = MockRegulator::linear(900, 1000, 50)
            .named("vdd")
            .with_recorder(recorder.clone());
        let mut clk = MockClock::new(100).named("clk").with_recorder(recorder.clone());

        reg.set_voltage(Millivolts::new(1000), Millivolts::new(1000))
            .unwrap();
        clk.set_rate(Khz::new(200)).unwrap();

        assert_eq!(recorder.voltages(), vec![("vdd".to_string(), 1000)]);
        assert_eq!(recorder.events().len(), 2);
        recorder.clear();
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn test_stuck_gate() {
        let mut gate = MockGate::new(2).with_stuck(1);
        gate.set_on(0, true).unwrap();
        gate.set_on(1, true).unwrap();
        assert!(gate.is_on(0).unwrap());
        assert!(!gate.is_on(1).unwrap());
        assert_eq!(gate.poll_counter().load(Ordering::SeqCst), 2);
    }
}
