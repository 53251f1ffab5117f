//! Voltage and frequency scaling engine
//!
//! [`Dvfs`] is an arena of voltage domains, power domains and clock nodes
//! built once at init through the registration calls, then shared across
//! threads. Handles index into the arena and any object can be found by name.
//!
//! Locking: every voltage domain has one mutex guarding its voltage, its
//! regulator and the runtime state of its power domains and clocks. A
//! domain with a dependency edge is always locked together with its partner,
//! lower handle first.

pub mod clock_node;
pub mod handle;
mod orchestrator;
pub mod power_domain;
mod scaling;
pub mod voltage_domain;

pub use clock_node::{ClockNode, ClockNodeSpec, NodeStatus};
pub use handle::{NodeHandle, PdHandle, VdHandle};
pub use orchestrator::{DependencyStatus, DomainPlan, DomainStatus, ScalingPlan};
pub use power_domain::{PowerDomain, PowerDomainSpec, PowerDomainStatus};
pub use voltage_domain::{
    Coupling, DomainLink, LinkRole, VoltageDomain, VoltageDomainSpec, MAX_VOLTAGE_STEPS,
};

use crate::domain::Millivolts;
use crate::dvfs::clock_node::NodeState;
use crate::dvfs::power_domain::PdState;
use crate::dvfs::scaling::Demand;
use crate::error::DvfsError;
use crate::hw::{Delay, StdDelay};

use std::sync::Arc;

/// The scaling engine and its registries
pub struct Dvfs {
    voltage_domains: Vec<VoltageDomain>,
    power_domains: Vec<PowerDomain>,
    nodes: Vec<ClockNode>,
    delay: Arc<dyn Delay>,
}

impl Dvfs {
    /// Create an empty engine that sleeps the thread for settle times
    pub fn new() -> Self {
        Self::with_delay(Arc::new(StdDelay))
    }

    /// Create an empty engine with a custom delay provider
    pub fn with_delay(delay: Arc<dyn Delay>) -> Self {
        Self {
            voltage_domains: Vec::new(),
            power_domains: Vec::new(),
            nodes: Vec::new(),
            delay,
        }
    }

    /// Register a voltage domain
    ///
    /// Queries the regulator for its discrete voltages, current output,
    /// settle-time and mode support.
    pub fn register_voltage_domain(
        &mut self,
        spec: VoltageDomainSpec,
    ) -> Result<VdHandle, DvfsError> {
        if self.find_voltage_domain_by_name(&spec.name).is_some() {
            return Err(DvfsError::DuplicateName(spec.name));
        }

        let handle = VdHandle(self.voltage_domains.len());
        let vd = VoltageDomain::new(handle, spec);
        log::debug!("Registered voltage domain {} as {}", vd.name(), handle);
        self.voltage_domains.push(vd);
        Ok(handle)
    }

    /// Register a power domain on a voltage domain
    pub fn register_power_domain(
        &mut self,
        spec: PowerDomainSpec,
        vd: VdHandle,
    ) -> Result<PdHandle, DvfsError> {
        self.voltage_domain(vd)?;
        if self.find_power_domain_by_name(&spec.name).is_some() {
            return Err(DvfsError::DuplicateName(spec.name));
        }

        let handle = PdHandle(self.power_domains.len());
        let domain = &mut self.voltage_domains[vd.0];
        let cur_volt = domain.state_mut().cur_volt;
        domain.power_domains.push(handle);
        domain.state_mut().power_domains.insert(
            handle,
            PdState {
                on: spec.on,
                cur_volt,
            },
        );

        log::debug!("Registered power domain {} as {}", spec.name, handle);
        self.power_domains.push(PowerDomain {
            handle,
            name: spec.name,
            vd,
            nodes: Vec::new(),
        });
        Ok(handle)
    }

    /// Register a clock node on a power domain
    ///
    /// The node starts at the clock's current rate with the voltage its table
    /// requires for that rate. If the power domain is on, the rail is raised
    /// to cover that voltage first. Nothing is registered if any check or the
    /// raise fails; a partial raise is left in place.
    pub fn register_clock_node(
        &mut self,
        spec: ClockNodeSpec,
        pd: PdHandle,
    ) -> Result<NodeHandle, DvfsError> {
        let vd = self.power_domain(pd)?.vd;
        if self.find_clock_node_by_name(&spec.name).is_some() {
            return Err(DvfsError::DuplicateName(spec.name));
        }

        let ClockNodeSpec {
            name,
            table,
            clock,
            target,
            enabled,
            limit,
        } = spec;

        let set_freq = clock.get_rate().map_err(|source| DvfsError::Clock {
            node: name.clone(),
            source,
        })?;
        let set_volt = table.lookup(set_freq)?;
        self.cover_new_node(vd, pd, set_volt)?;

        let handle = NodeHandle(self.nodes.len());
        self.voltage_domains[vd.0].state_mut().nodes.insert(
            handle,
            NodeState {
                pd,
                clock,
                target,
                set_freq,
                set_volt,
                enabled,
                limit,
                last_set_rate: None,
            },
        );
        self.power_domains[pd.0].nodes.push(handle);

        log::debug!(
            "Registered clock {} as {} at {} / {}",
            name,
            handle,
            set_freq,
            set_volt
        );
        self.nodes.push(ClockNode {
            handle,
            name,
            pd,
            vd,
            table,
        });
        Ok(handle)
    }

    /// Couple `dependent`'s voltage to `supplier`'s
    ///
    /// Each domain takes part in at most one edge, which keeps the
    /// dependency graph acyclic with depth one. Both domains need voltage
    /// control and a known current voltage that already satisfies the window.
    pub fn declare_dependency(
        &mut self,
        dependent: VdHandle,
        supplier: VdHandle,
        coupling: Coupling,
    ) -> Result<(), DvfsError> {
        let dep = self.voltage_domain(dependent)?;
        let sup = self.voltage_domain(supplier)?;

        if dependent == supplier {
            return Err(DvfsError::InvalidDependency(format!(
                "'{}' cannot depend on itself",
                dep.name()
            )));
        }
        for vd in [dep, sup] {
            if vd.link.is_some() {
                return Err(DvfsError::InvalidDependency(format!(
                    "'{}' already has a dependency edge",
                    vd.name()
                )));
            }
            if !vd.has_voltage_control() {
                return Err(DvfsError::InvalidDependency(format!(
                    "'{}' has no voltage control",
                    vd.name()
                )));
            }
        }

        let (dep_volt, sup_volt) = (dep.lock().known_volt()?, sup.lock().known_volt()?);
        if !coupling.allows(dep_volt, sup_volt) {
            return Err(DvfsError::InvalidDependency(format!(
                "'{}' at {} and '{}' at {} are outside {}",
                dep.name(),
                dep_volt,
                sup.name(),
                sup_volt,
                coupling
            )));
        }

        log::debug!(
            "{} depends on {} within {}",
            dep.name(),
            sup.name(),
            coupling
        );
        self.voltage_domains[dependent.0].link = Some(DomainLink {
            partner: supplier,
            role: LinkRole::Dependent,
            coupling,
        });
        self.voltage_domains[supplier.0].link = Some(DomainLink {
            partner: dependent,
            role: LinkRole::Supplier,
            coupling,
        });
        Ok(())
    }

    /// Find a clock node by name
    pub fn find_clock_node_by_name(&self, name: &str) -> Option<NodeHandle> {
        self.nodes.iter().find(|n| n.name == name).map(|n| n.handle)
    }

    /// Find a power domain by name
    pub fn find_power_domain_by_name(&self, name: &str) -> Option<PdHandle> {
        self.power_domains
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.handle)
    }

    /// Find a voltage domain by name
    pub fn find_voltage_domain_by_name(&self, name: &str) -> Option<VdHandle> {
        self.voltage_domains
            .iter()
            .find(|v| v.name() == name)
            .map(|v| v.handle())
    }

    /// Get a voltage domain
    pub fn voltage_domain(&self, handle: VdHandle) -> Result<&VoltageDomain, DvfsError> {
        self.voltage_domains
            .get(handle.0)
            .ok_or_else(|| DvfsError::InvalidHandle(handle.to_string()))
    }

    /// Get a power domain
    pub fn power_domain(&self, handle: PdHandle) -> Result<&PowerDomain, DvfsError> {
        self.power_domains
            .get(handle.0)
            .ok_or_else(|| DvfsError::InvalidHandle(handle.to_string()))
    }

    /// Get a clock node
    pub fn clock_node(&self, handle: NodeHandle) -> Result<&ClockNode, DvfsError> {
        self.nodes
            .get(handle.0)
            .ok_or_else(|| DvfsError::InvalidHandle(handle.to_string()))
    }

    /// All voltage domains in registration order
    pub fn voltage_domains(&self) -> &[VoltageDomain] {
        &self.voltage_domains
    }

    /// All power domains in registration order
    pub fn power_domains(&self) -> &[PowerDomain] {
        &self.power_domains
    }

    /// All clock nodes in registration order
    pub fn clock_nodes(&self) -> &[ClockNode] {
        &self.nodes
    }

    pub(crate) fn delay(&self) -> &dyn Delay {
        self.delay.as_ref()
    }

    /// Raise `vd` (and its partner) so a clock joining `pd` at `volt` runs
    /// on a rail that carries it
    fn cover_new_node(&self, vd: VdHandle, pd: PdHandle, volt: Millivolts) -> Result<(), DvfsError> {
        let mut group = self.lock_group(vd)?;
        let powered = group
            .guard(vd)?
            .state
            .power_domains
            .get(&pd)
            .is_some_and(|state| state.on);
        if !powered {
            return Ok(());
        }

        let targets = group.targets(Demand::domain_min(vd, volt))?;
        group.apply(group.raise_only(targets), self.delay())
    }
}

impl Default for Dvfs {
    fn default() -> Self {
        Self::new()
    }
}
