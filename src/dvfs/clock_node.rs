//! Clock nodes
//!
//! A clock node is one scalable clock with its frequency/voltage table. The
//! immutable description lives in [`ClockNode`]; the committed
//! (frequency, voltage) pair, policy flags and the clock capability itself
//! live in `NodeState` under the owning voltage domain's lock.

use crate::domain::{FreqVoltTable, Khz, Millivolts, RateLimit};
use crate::dvfs::handle::{NodeHandle, PdHandle, VdHandle};
use crate::hw::{ClockRate, DirectTarget, DvfsTarget};
use serde::Serialize;

/// Registration data for a clock node
pub struct ClockNodeSpec {
    /// Clock name (e.g. "cpu")
    pub name: String,
    /// Frequency-to-voltage table
    pub table: FreqVoltTable,
    /// Underlying rate control
    pub clock: Box<dyn ClockRate>,
    /// Rate-change policy driving `clock`
    pub target: Box<dyn DvfsTarget>,
    /// Whether rate requests take effect from the start
    pub enabled: bool,
    /// Initial rate clamp
    pub limit: Option<RateLimit>,
}

impl ClockNodeSpec {
    /// Create an enabled, unlimited clock node spec
    pub fn new(
        name: impl Into<String>,
        table: FreqVoltTable,
        clock: impl ClockRate + 'static,
    ) -> Self {
        Self::with_boxed_clock(name, table, Box::new(clock))
    }

    /// Create a spec from an already boxed clock
    pub fn with_boxed_clock(
        name: impl Into<String>,
        table: FreqVoltTable,
        clock: Box<dyn ClockRate>,
    ) -> Self {
        Self {
            name: name.into(),
            table,
            clock,
            target: Box::new(DirectTarget),
            enabled: true,
            limit: None,
        }
    }

    /// Builder: replace the direct rate-change policy
    pub fn with_target(mut self, target: impl DvfsTarget + 'static) -> Self {
        self.target = Box::new(target);
        self
    }

    /// Builder: set the initial enabled flag
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Builder: install a rate clamp
    pub fn with_limit(mut self, limit: RateLimit) -> Self {
        self.limit = Some(limit);
        self
    }
}

pub(crate) struct NodeState {
    pub(crate) pd: PdHandle,
    pub(crate) clock: Box<dyn ClockRate>,
    pub(crate) target: Box<dyn DvfsTarget>,
    pub(crate) set_freq: Khz,
    pub(crate) set_volt: Millivolts,
    pub(crate) enabled: bool,
    pub(crate) limit: Option<RateLimit>,
    pub(crate) last_set_rate: Option<Khz>,
}

/// A registered clock node
#[derive(Debug)]
pub struct ClockNode {
    pub(crate) handle: NodeHandle,
    pub(crate) name: String,
    pub(crate) pd: PdHandle,
    pub(crate) vd: VdHandle,
    pub(crate) table: FreqVoltTable,
}

impl ClockNode {
    /// Get the node handle
    pub fn handle(&self) -> NodeHandle {
        self.handle
    }

    /// Get the clock name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning power domain
    pub fn power_domain(&self) -> PdHandle {
        self.pd
    }

    /// Owning voltage domain
    pub fn voltage_domain(&self) -> VdHandle {
        self.vd
    }

    /// Frequency-to-voltage table
    pub fn table(&self) -> &FreqVoltTable {
        &self.table
    }
}

/// Clock node status snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub name: String,
    pub power_domain: String,
    pub voltage_domain: String,
    pub set_freq: Khz,
    pub set_volt: Millivolts,
    pub enabled: bool,
    pub limit: Option<RateLimit>,
    pub last_set_rate: Option<Khz>,
}
