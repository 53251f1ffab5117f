//! Voltage domains
//!
//! A voltage domain is one regulator-driven rail. Everything that changes at
//! runtime on the rail (its voltage, the regulator, member power domain
//! status and member clock state) lives behind the domain's single mutex.

use crate::domain::{Millivolts, RegulatorMode, RoundDirection};
use crate::dvfs::clock_node::NodeState;
use crate::dvfs::handle::{NodeHandle, PdHandle, VdHandle};
use crate::dvfs::power_domain::PdState;
use crate::error::DvfsError;
use crate::hw::{Delay, Regulator};

use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Upper bound on discrete voltages read from a regulator
pub const MAX_VOLTAGE_STEPS: u32 = 200;

/// Registration data for a voltage domain
pub struct VoltageDomainSpec {
    /// Domain name (e.g. "vd_arm")
    pub name: String,
    /// Regulator driving the rail; `None` means frequency-only operation
    pub regulator: Option<Box<dyn Regulator>>,
    /// Voltage to use while suspended
    pub suspend_volt: Option<Millivolts>,
}

impl VoltageDomainSpec {
    /// Create a spec without a regulator
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            regulator: None,
            suspend_volt: None,
        }
    }

    /// Builder: attach a regulator
    pub fn with_regulator(mut self, regulator: impl Regulator + 'static) -> Self {
        self.regulator = Some(Box::new(regulator));
        self
    }

    /// Builder: attach an already boxed regulator
    pub fn with_boxed_regulator(mut self, regulator: Box<dyn Regulator>) -> Self {
        self.regulator = Some(regulator);
        self
    }

    /// Builder: set the suspend voltage
    pub fn with_suspend_volt(mut self, volt: Millivolts) -> Self {
        self.suspend_volt = Some(volt);
        self
    }
}

/// Allowed skew between a dependent rail and the rail it depends on
///
/// A pair `(dependent, supplier)` is valid when
/// `dependent - supplier <= max_above_mv` and
/// `supplier - dependent <= max_below_mv`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Coupling {
    /// How far the dependent rail may sit above the supplier
    pub max_above_mv: u32,
    /// How far the dependent rail may sit below the supplier
    pub max_below_mv: u32,
}

impl Coupling {
    /// Create a coupling window
    pub const fn new(max_above_mv: u32, max_below_mv: u32) -> Self {
        Self {
            max_above_mv,
            max_below_mv,
        }
    }

    /// The dependent rail may never exceed the supplier
    pub const fn never_above() -> Self {
        Self::new(0, u32::MAX)
    }

    /// Check whether a (dependent, supplier) voltage pair is inside the window
    pub fn allows(&self, dependent: Millivolts, supplier: Millivolts) -> bool {
        if dependent >= supplier {
            dependent.as_mv() - supplier.as_mv() <= self.max_above_mv
        } else {
            supplier.as_mv() - dependent.as_mv() <= self.max_below_mv
        }
    }
}

impl fmt::Display for Coupling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.max_below_mv == u32::MAX {
            write!(f, "+{}mV/-any", self.max_above_mv)
        } else {
            write!(f, "+{}mV/-{}mV", self.max_above_mv, self.max_below_mv)
        }
    }
}

/// Which side of a dependency edge a domain is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkRole {
    /// This domain's voltage is constrained by the partner's
    Dependent,
    /// The partner's voltage is constrained by this domain's
    Supplier,
}

/// A domain's single dependency edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainLink {
    /// The other domain on the edge
    pub partner: VdHandle,
    /// This domain's role
    pub role: LinkRole,
    /// Skew window, always expressed as dependent relative to supplier
    pub coupling: Coupling,
}

pub(crate) struct VdState {
    pub(crate) cur_volt: Option<Millivolts>,
    pub(crate) regulator: Option<Box<dyn Regulator>>,
    pub(crate) power_domains: BTreeMap<PdHandle, PdState>,
    pub(crate) nodes: BTreeMap<NodeHandle, NodeState>,
}

/// A registered voltage domain
pub struct VoltageDomain {
    handle: VdHandle,
    name: String,
    regulator_name: Option<String>,
    supported: Vec<Millivolts>,
    volt_time_supported: bool,
    mode_supported: bool,
    suspend_volt: Option<Millivolts>,
    pub(crate) link: Option<DomainLink>,
    pub(crate) power_domains: Vec<PdHandle>,
    state: Mutex<VdState>,
}

impl VoltageDomain {
    pub(crate) fn new(handle: VdHandle, spec: VoltageDomainSpec) -> Self {
        let VoltageDomainSpec {
            name,
            regulator,
            suspend_volt,
        } = spec;

        let mut supported = Vec::new();
        let mut cur_volt = None;
        let mut volt_time_supported = false;
        let mut mode_supported = false;
        let regulator_name = regulator.as_ref().map(|r| r.name().to_string());

        if let Some(reg) = regulator.as_deref() {
            let count = reg.count_voltages().unwrap_or(0).min(MAX_VOLTAGE_STEPS);
            supported = (0..count)
                .filter_map(|sel| reg.list_voltage(sel).ok())
                .filter(|v| v.as_mv() > 0)
                .collect();
            supported.sort();
            supported.dedup();

            if let (Some(&lo), Some(&hi)) = (supported.first(), supported.last()) {
                volt_time_supported = reg.set_voltage_time(lo, hi).is_ok();
            }
            mode_supported = reg.get_mode().is_ok();

            // A reading between steps is tracked as the step below it.
            cur_volt = match reg.get_voltage() {
                Ok(volt) => round_in(&supported, volt, RoundDirection::Down),
                Err(e) => {
                    log::warn!("{}: cannot read regulator voltage: {}", name, e);
                    None
                }
            };

            log::debug!(
                "{}: regulator {} with {} steps, current {:?}, timing {}, modes {}",
                name,
                reg.name(),
                supported.len(),
                cur_volt,
                volt_time_supported,
                mode_supported
            );
        }

        Self {
            handle,
            name,
            regulator_name,
            supported,
            volt_time_supported,
            mode_supported,
            suspend_volt,
            link: None,
            power_domains: Vec::new(),
            state: Mutex::new(VdState {
                cur_volt,
                regulator,
                power_domains: BTreeMap::new(),
                nodes: BTreeMap::new(),
            }),
        }
    }

    /// Get the domain handle
    pub fn handle(&self) -> VdHandle {
        self.handle
    }

    /// Get the domain name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the attached regulator
    pub fn regulator_name(&self) -> Option<&str> {
        self.regulator_name.as_deref()
    }

    /// Discrete voltages the regulator can produce, ascending
    pub fn supported_voltages(&self) -> &[Millivolts] {
        &self.supported
    }

    /// Whether voltage can be controlled at all
    pub fn has_voltage_control(&self) -> bool {
        self.regulator_name.is_some() && !self.supported.is_empty()
    }

    /// Whether the regulator reports settle times
    pub fn supports_voltage_timing(&self) -> bool {
        self.volt_time_supported
    }

    /// Whether the regulator supports mode switching
    pub fn supports_modes(&self) -> bool {
        self.mode_supported
    }

    /// Suspend-time voltage
    pub fn suspend_voltage(&self) -> Option<Millivolts> {
        self.suspend_volt
    }

    /// Member power domains
    pub fn power_domains(&self) -> &[PdHandle] {
        &self.power_domains
    }

    /// Dependency edge this domain takes part in
    pub fn link(&self) -> Option<DomainLink> {
        self.link
    }

    /// Snap a voltage onto the regulator's discrete steps
    ///
    /// # Errors
    /// Returns `DvfsError::Unsupported` if the domain has no voltage control
    /// and `DvfsError::VoltageOutOfRange` if no step exists in `direction`
    pub fn round_to_supported(
        &self,
        volt: Millivolts,
        direction: RoundDirection,
    ) -> Result<Millivolts, DvfsError> {
        if !self.has_voltage_control() {
            return Err(DvfsError::Unsupported(self.name.clone()));
        }
        round_in(&self.supported, volt, direction).ok_or_else(|| DvfsError::VoltageOutOfRange {
            domain: self.name.clone(),
            volt,
            direction,
        })
    }

    pub(crate) fn lock(&self) -> DomainGuard<'_> {
        DomainGuard {
            domain: self,
            state: self.state.lock(),
        }
    }

    pub(crate) fn state_mut(&mut self) -> &mut VdState {
        self.state.get_mut()
    }
}

fn round_in(
    supported: &[Millivolts],
    volt: Millivolts,
    direction: RoundDirection,
) -> Option<Millivolts> {
    match direction {
        RoundDirection::Down => supported.iter().rev().find(|v| **v <= volt).copied(),
        RoundDirection::Up => supported.iter().find(|v| **v >= volt).copied(),
    }
}

/// A locked voltage domain
pub(crate) struct DomainGuard<'a> {
    pub(crate) domain: &'a VoltageDomain,
    pub(crate) state: MutexGuard<'a, VdState>,
}

impl DomainGuard<'_> {
    pub(crate) fn name(&self) -> &str {
        &self.domain.name
    }

    pub(crate) fn handle(&self) -> VdHandle {
        self.domain.handle
    }

    pub(crate) fn cur_volt(&self) -> Option<Millivolts> {
        self.state.cur_volt
    }

    /// Current voltage, required for coupled scaling
    pub(crate) fn known_volt(&self) -> Result<Millivolts, DvfsError> {
        self.state.cur_volt.ok_or_else(|| DvfsError::ScalingFailed {
            domain: self.domain.name.clone(),
            reason: "current voltage is unknown".to_string(),
        })
    }

    /// Program the regulator to exactly `volt`
    ///
    /// `cur_volt` and the member power domains' mirrors only change when the
    /// regulator accepts the request.
    pub(crate) fn set_direct(&mut self, volt: Millivolts) -> Result<(), DvfsError> {
        let name = &self.domain.name;
        let state = &mut *self.state;
        let regulator = state
            .regulator
            .as_mut()
            .ok_or_else(|| DvfsError::Unsupported(name.clone()))?;

        regulator
            .set_voltage(volt, volt)
            .map_err(|source| DvfsError::Regulator {
                domain: name.clone(),
                source,
            })?;

        state.cur_volt = Some(volt);
        for pd in state.power_domains.values_mut() {
            pd.cur_volt = Some(volt);
        }
        Ok(())
    }

    /// `set_direct` followed by the regulator's settle time
    pub(crate) fn scale_to(&mut self, volt: Millivolts, delay: &dyn Delay) -> Result<(), DvfsError> {
        let old = self.state.cur_volt;
        self.set_direct(volt)?;
        log::debug!("{}: {} -> {}", self.domain.name, DisplayVolt(old), volt);

        if let (true, Some(old)) = (self.domain.volt_time_supported, old) {
            let settle = self
                .state
                .regulator
                .as_ref()
                .and_then(|r| r.set_voltage_time(old, volt).ok());
            if let Some(us) = settle.filter(|us| *us > 0) {
                log::debug!("{}: settling for {}us", self.domain.name, us);
                delay.delay_us(us);
            }
        }
        Ok(())
    }

    /// Highest voltage requested by clocks in powered-on power domains
    ///
    /// `replace` substitutes one node's request; that node counts even when
    /// its power domain is off.
    pub(crate) fn floor(&self, replace: Option<(NodeHandle, Millivolts)>) -> Option<Millivolts> {
        self.state
            .nodes
            .iter()
            .filter_map(|(handle, node)| match replace {
                Some((h, volt)) if h == *handle => Some(volt),
                _ => self
                    .state
                    .power_domains
                    .get(&node.pd)
                    .is_some_and(|pd| pd.on)
                    .then_some(node.set_volt),
            })
            .max()
    }

    pub(crate) fn set_mode(&mut self, mode: RegulatorMode) -> Result<(), DvfsError> {
        if !self.domain.mode_supported {
            return Err(DvfsError::Unsupported(self.domain.name.clone()));
        }
        let name = &self.domain.name;
        let regulator = self
            .state
            .regulator
            .as_mut()
            .ok_or_else(|| DvfsError::Unsupported(name.clone()))?;
        regulator
            .set_mode(mode)
            .map_err(|source| DvfsError::Regulator {
                domain: name.clone(),
                source,
            })
    }

    pub(crate) fn mode(&self) -> Result<RegulatorMode, DvfsError> {
        if !self.domain.mode_supported {
            return Err(DvfsError::Unsupported(self.domain.name.clone()));
        }
        let name = &self.domain.name;
        let regulator = self
            .state
            .regulator
            .as_ref()
            .ok_or_else(|| DvfsError::Unsupported(name.clone()))?;
        regulator.get_mode().map_err(|source| DvfsError::Regulator {
            domain: name.clone(),
            source,
        })
    }
}

struct DisplayVolt(Option<Millivolts>);

impl fmt::Display for DisplayVolt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{}", v),
            None => write!(f, "unset"),
        }
    }
}
