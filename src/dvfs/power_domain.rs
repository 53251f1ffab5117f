//! Power domains
//!
//! A power domain groups clocks that are gated together on one rail.

use crate::domain::Millivolts;
use crate::dvfs::handle::{NodeHandle, PdHandle, VdHandle};
use serde::Serialize;

/// Registration data for a power domain
#[derive(Debug, Clone)]
pub struct PowerDomainSpec {
    /// Domain name (e.g. "pd_cpu")
    pub name: String,
    /// Initial on/off status
    pub on: bool,
}

impl PowerDomainSpec {
    /// Create a spec for a powered-on domain
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            on: true,
        }
    }

    /// Builder: set the initial status
    pub fn with_status(mut self, on: bool) -> Self {
        self.on = on;
        self
    }
}

/// Runtime state, guarded by the owning voltage domain's lock
#[derive(Debug, Clone, Copy)]
pub(crate) struct PdState {
    pub(crate) on: bool,
    pub(crate) cur_volt: Option<Millivolts>,
}

/// A registered power domain
#[derive(Debug)]
pub struct PowerDomain {
    pub(crate) handle: PdHandle,
    pub(crate) name: String,
    pub(crate) vd: VdHandle,
    pub(crate) nodes: Vec<NodeHandle>,
}

impl PowerDomain {
    /// Get the domain handle
    pub fn handle(&self) -> PdHandle {
        self.handle
    }

    /// Get the domain name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning voltage domain
    pub fn voltage_domain(&self) -> VdHandle {
        self.vd
    }

    /// Member clock nodes
    pub fn clock_nodes(&self) -> &[NodeHandle] {
        &self.nodes
    }
}

/// Power domain status snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PowerDomainStatus {
    pub name: String,
    pub on: bool,
    pub voltage: Option<Millivolts>,
    pub clocks: Vec<String>,
}
