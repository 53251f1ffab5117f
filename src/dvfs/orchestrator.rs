//! Rate-change orchestration and node policy
//!
//! Rising requests raise voltage before the clock; falling requests lower
//! the clock before the voltage. A clock never runs faster than its rail
//! allows, not even between two regulator steps.

use crate::domain::{FreqVoltTable, Khz, Millivolts, RateLimit, RegulatorMode, RoundDirection};
use crate::dvfs::clock_node::{ClockNode, NodeState, NodeStatus};
use crate::dvfs::handle::{NodeHandle, PdHandle, VdHandle};
use crate::dvfs::power_domain::{PdState, PowerDomainStatus};
use crate::dvfs::scaling::{Demand, Targets};
use crate::dvfs::voltage_domain::{Coupling, LinkRole};
use crate::dvfs::Dvfs;
use crate::error::DvfsError;
use crate::hw::DvfsTarget;

use serde::Serialize;
use std::collections::BTreeMap;

/// What a rate request would do to each affected voltage domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScalingPlan {
    pub node: String,
    pub from_freq: Khz,
    pub from_volt: Millivolts,
    pub to_freq: Khz,
    pub to_volt: Millivolts,
    pub domains: Vec<DomainPlan>,
}

/// Planned voltage change for one domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainPlan {
    pub name: String,
    pub from: Option<Millivolts>,
    /// `None` when the domain has no voltage control
    pub to: Option<Millivolts>,
}

/// Voltage domain status snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainStatus {
    pub name: String,
    pub regulator: Option<String>,
    pub voltage: Option<Millivolts>,
    /// Highest voltage requested by powered clocks
    pub requested: Option<Millivolts>,
    pub min_supported: Option<Millivolts>,
    pub max_supported: Option<Millivolts>,
    pub suspend_voltage: Option<Millivolts>,
    pub mode: Option<RegulatorMode>,
    pub dependency: Option<DependencyStatus>,
    pub power_domains: Vec<PowerDomainStatus>,
}

/// Dependency edge as seen from one domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyStatus {
    pub partner: String,
    pub role: LinkRole,
    pub coupling: Coupling,
}

/// Validate a request against node policy and return the voltage it needs
fn check_request(clk: &ClockNode, state: &NodeState, rate: Khz) -> Result<Millivolts, DvfsError> {
    if !state.enabled {
        return Err(DvfsError::Disabled(clk.name.clone()));
    }
    if let Some(limit) = state.limit {
        if !limit.contains(rate) {
            return Err(DvfsError::RateOutOfLimit {
                node: clk.name.clone(),
                rate,
                min: limit.min,
                max: limit.max,
            });
        }
    }
    Ok(clk.table.lookup(rate)?)
}

impl Dvfs {
    /// Change a clock's rate, scaling its rail (and any coupled rail) safely
    ///
    /// Voltage that must rise is raised before the rate callback runs;
    /// voltage that may fall is lowered after it. If the callback fails the
    /// node keeps its previous (frequency, voltage) and any voltage already
    /// raised stays raised. If lowering fails after the rate changed, the
    /// new rate is committed and `ScalingFailed` is returned.
    pub fn request_rate(&self, node: NodeHandle, rate: Khz) -> Result<(), DvfsError> {
        let clk = self.clock_node(node)?;
        let mut group = self.lock_group(clk.vd)?;

        let state = group.node(clk.vd, node)?;
        let new_volt = check_request(clk, state, rate)?;
        let (old_freq, old_volt) = (state.set_freq, state.set_volt);
        if old_freq == rate {
            log::debug!("{}: already at {}", clk.name, rate);
            return Ok(());
        }

        let targets = group.targets(Demand::node(node, new_volt))?;
        if targets == Targets::Single(None) {
            log::debug!("{}: no voltage control, scaling frequency only", clk.name);
        }

        group.apply(group.raise_only(targets), self.delay())?;

        let state = group.node_mut(clk.vd, node)?;
        state
            .target
            .target(rate, state.clock.as_mut())
            .map_err(|source| DvfsError::Clock {
                node: clk.name.clone(),
                source,
            })?;
        state.set_freq = rate;
        state.set_volt = new_volt;
        state.last_set_rate = Some(rate);

        log::info!(
            "{}: {} / {} -> {} / {}",
            clk.name,
            old_freq,
            old_volt,
            rate,
            new_volt
        );

        group.apply(targets, self.delay())
    }

    /// Compute what `request_rate` would do without touching hardware
    pub fn plan_rate(&self, node: NodeHandle, rate: Khz) -> Result<ScalingPlan, DvfsError> {
        let clk = self.clock_node(node)?;
        let group = self.lock_group(clk.vd)?;

        let state = group.node(clk.vd, node)?;
        let new_volt = check_request(clk, state, rate)?;
        let targets = group.targets(Demand::node(node, new_volt))?;

        let to = match targets {
            Targets::Single(volt) => vec![volt],
            Targets::Coupled {
                dependent,
                supplier,
            } => vec![Some(dependent), Some(supplier)],
        };
        let domains = group
            .guards()
            .into_iter()
            .zip(to)
            .map(|(g, to)| DomainPlan {
                name: g.name().to_string(),
                from: g.cur_volt(),
                to,
            })
            .collect();

        Ok(ScalingPlan {
            node: clk.name.clone(),
            from_freq: state.set_freq,
            from_volt: state.set_volt,
            to_freq: rate,
            to_volt: new_volt,
            domains,
        })
    }

    /// Let rate requests on `node` take effect again
    ///
    /// Re-reads the clock's rate, re-derives the node's voltage from its
    /// table and brings the rail to the resulting requirement.
    pub fn enable_dvfs(&self, node: NodeHandle) -> Result<(), DvfsError> {
        let clk = self.clock_node(node)?;
        let mut group = self.lock_group(clk.vd)?;

        let state = group.node_mut(clk.vd, node)?;
        let rate = state.clock.get_rate().map_err(|source| DvfsError::Clock {
            node: clk.name.clone(),
            source,
        })?;
        let volt = clk.table.lookup(rate)?;
        state.set_freq = rate;
        state.set_volt = volt;
        state.enabled = true;
        log::debug!("{}: dvfs enabled at {} / {}", clk.name, rate, volt);

        let targets = group.targets(Demand::default())?;
        group.apply(targets, self.delay())
    }

    /// Replace the rate-change policy of `node`
    ///
    /// Takes effect from the next rate request.
    pub fn register_target(
        &self,
        node: NodeHandle,
        target: impl DvfsTarget + 'static,
    ) -> Result<(), DvfsError> {
        let target: Box<dyn DvfsTarget> = Box::new(target);
        self.with_node(node, |state| state.target = target)?;
        log::debug!("{}: rate-change policy replaced", self.clock_node(node)?.name);
        Ok(())
    }

    /// Freeze scaling on `node`; the current rate and voltage are kept
    pub fn disable_dvfs(&self, node: NodeHandle) -> Result<(), DvfsError> {
        self.with_node(node, |state| state.enabled = false)?;
        log::debug!("{}: dvfs disabled", self.clock_node(node)?.name);
        Ok(())
    }

    /// Install a [min, max] clamp checked on the next request
    pub fn enable_limit(&self, node: NodeHandle, min: Khz, max: Khz) -> Result<(), DvfsError> {
        let limit = RateLimit::new(min, max)?;
        self.with_node(node, |state| state.limit = Some(limit))
    }

    /// Remove the rate clamp
    pub fn disable_limit(&self, node: NodeHandle) -> Result<(), DvfsError> {
        self.with_node(node, |state| state.limit = None)
    }

    /// Record a power domain's gate state and rescale its rail
    ///
    /// Clocks in an off power domain do not hold the rail up. Turning a
    /// domain on raises the rail before returning; if that fails the domain
    /// is recorded as off again.
    pub fn set_power_domain_status(&self, pd: PdHandle, on: bool) -> Result<(), DvfsError> {
        let domain = self.power_domain(pd)?;
        let vd = domain.vd;
        let mut group = self.lock_group(vd)?;

        let previous = set_pd_on(&mut group.guard_mut(vd)?.state.power_domains, pd, on);
        let result = group
            .targets(Demand::default())
            .and_then(|targets| group.apply(targets, self.delay()));

        if result.is_err() && on {
            set_pd_on(&mut group.guard_mut(vd)?.state.power_domains, pd, previous);
        }
        log::debug!(
            "{}: power domain {}",
            domain.name,
            if on { "on" } else { "off" }
        );
        result
    }

    /// Bring a rail (and its coupled partner) to what its clocks require
    pub fn reset_volt(&self, vd: VdHandle) -> Result<(), DvfsError> {
        let mut group = self.lock_group(vd)?;
        let targets = group.targets(Demand::default())?;
        group.apply(targets, self.delay())
    }

    /// Set a rail to `volt`, never below what its powered clocks require
    pub fn set_domain_voltage(&self, vd: VdHandle, volt: Millivolts) -> Result<(), DvfsError> {
        let mut group = self.lock_group(vd)?;
        let targets = group.targets(Demand::domain_min(vd, volt))?;
        group.apply(targets, self.delay())
    }

    /// Move a rail to its suspend voltage; no-op without one
    pub fn suspend(&self, vd: VdHandle) -> Result<(), DvfsError> {
        match self.voltage_domain(vd)?.suspend_voltage() {
            Some(volt) => self.set_domain_voltage(vd, volt),
            None => Ok(()),
        }
    }

    /// Leave suspend: rescale to the clocks' requirement
    pub fn resume(&self, vd: VdHandle) -> Result<(), DvfsError> {
        self.reset_volt(vd)
    }

    /// Snap a voltage onto a domain's regulator steps
    pub fn round_to_supported(
        &self,
        vd: VdHandle,
        volt: Millivolts,
        direction: RoundDirection,
    ) -> Result<Millivolts, DvfsError> {
        self.voltage_domain(vd)?.round_to_supported(volt, direction)
    }

    /// Highest voltage requested by the domain's powered clocks
    pub fn requested_voltage(&self, vd: VdHandle) -> Result<Option<Millivolts>, DvfsError> {
        Ok(self.voltage_domain(vd)?.lock().floor(None))
    }

    /// Current voltage of a domain
    pub fn domain_voltage(&self, vd: VdHandle) -> Result<Option<Millivolts>, DvfsError> {
        Ok(self.voltage_domain(vd)?.lock().cur_volt())
    }

    /// Set the regulator's operating mode
    pub fn set_regulator_mode(&self, vd: VdHandle, mode: RegulatorMode) -> Result<(), DvfsError> {
        self.voltage_domain(vd)?.lock().set_mode(mode)
    }

    /// Get the regulator's operating mode
    pub fn regulator_mode(&self, vd: VdHandle) -> Result<RegulatorMode, DvfsError> {
        self.voltage_domain(vd)?.lock().mode()
    }

    /// Frequency-to-voltage table of a clock node
    pub fn freq_volt_table(&self, node: NodeHandle) -> Result<&FreqVoltTable, DvfsError> {
        Ok(&self.clock_node(node)?.table)
    }

    /// Snapshot of a clock node's committed state
    pub fn node_status(&self, node: NodeHandle) -> Result<NodeStatus, DvfsError> {
        let clk = self.clock_node(node)?;
        let vd = self.voltage_domain(clk.vd)?;
        let guard = vd.lock();
        let state = guard
            .state
            .nodes
            .get(&node)
            .ok_or_else(|| DvfsError::InvalidHandle(node.to_string()))?;

        Ok(NodeStatus {
            name: clk.name.clone(),
            power_domain: self.power_domain(clk.pd)?.name.clone(),
            voltage_domain: vd.name().to_string(),
            set_freq: state.set_freq,
            set_volt: state.set_volt,
            enabled: state.enabled,
            limit: state.limit,
            last_set_rate: state.last_set_rate,
        })
    }

    /// Snapshot of a voltage domain
    pub fn domain_status(&self, vd: VdHandle) -> Result<DomainStatus, DvfsError> {
        let domain = self.voltage_domain(vd)?;
        let dependency = match domain.link() {
            Some(link) => Some(DependencyStatus {
                partner: self.voltage_domain(link.partner)?.name().to_string(),
                role: link.role,
                coupling: link.coupling,
            }),
            None => None,
        };

        let guard = domain.lock();
        let power_domains = domain
            .power_domains()
            .iter()
            .filter_map(|h| {
                let pd = self.power_domains.get(h.0)?;
                let state = guard.state.power_domains.get(h)?;
                Some(PowerDomainStatus {
                    name: pd.name.clone(),
                    on: state.on,
                    voltage: state.cur_volt,
                    clocks: pd
                        .nodes
                        .iter()
                        .filter_map(|n| self.nodes.get(n.0).map(|c| c.name.clone()))
                        .collect(),
                })
            })
            .collect();

        Ok(DomainStatus {
            name: domain.name().to_string(),
            regulator: domain.regulator_name().map(str::to_string),
            voltage: guard.cur_volt(),
            requested: guard.floor(None),
            min_supported: domain.supported_voltages().first().copied(),
            max_supported: domain.supported_voltages().last().copied(),
            suspend_voltage: domain.suspend_voltage(),
            mode: guard.mode().ok(),
            dependency,
            power_domains,
        })
    }

    fn with_node<F>(&self, node: NodeHandle, f: F) -> Result<(), DvfsError>
    where
        F: FnOnce(&mut NodeState),
    {
        let clk = self.clock_node(node)?;
        let mut guard = self.voltage_domain(clk.vd)?.lock();
        let state = guard
            .state
            .nodes
            .get_mut(&node)
            .ok_or_else(|| DvfsError::InvalidHandle(node.to_string()))?;
        f(state);
        Ok(())
    }
}

fn set_pd_on(
    power_domains: &mut BTreeMap<PdHandle, PdState>,
    pd: PdHandle,
    on: bool,
) -> bool {
    match power_domains.get_mut(&pd) {
        Some(state) => std::mem::replace(&mut state.on, on),
        None => on,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FreqVoltTable;
    use crate::dvfs::{ClockNodeSpec, PowerDomainSpec, VoltageDomainSpec};
    use crate::mock::{MockClock, MockDelay, MockRegulator, MockTarget, RecordedEvent, Recorder};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn cpu_table() -> FreqVoltTable {
        FreqVoltTable::from_pairs(&[(600_000, 950), (800_000, 1050), (1_000_000, 1150)]).unwrap()
    }

    struct Fixture {
        dvfs: Dvfs,
        vd: VdHandle,
        pd: PdHandle,
        cpu: NodeHandle,
        recorder: Recorder,
        regulator_fail: crate::mock::FailureSwitch,
        clock_fail: crate::mock::FailureSwitch,
    }

    fn fixture() -> Fixture {
        let recorder = Recorder::new();
        let mut dvfs = Dvfs::with_delay(Arc::new(MockDelay::default()));

        let regulator = MockRegulator::linear(850, 1400, 25)
            .with_voltage(950)
            .named("vdd_arm")
            .with_recorder(recorder.clone());
        let regulator_fail = regulator.failure_switch();
        let vd = dvfs
            .register_voltage_domain(VoltageDomainSpec::new("vd_arm").with_regulator(regulator))
            .unwrap();
        let pd = dvfs
            .register_power_domain(PowerDomainSpec::new("pd_cpu"), vd)
            .unwrap();

        let clock = MockClock::new(600_000)
            .named("cpu")
            .with_recorder(recorder.clone());
        let clock_fail = clock.failure_switch();
        let cpu = dvfs
            .register_clock_node(ClockNodeSpec::new("cpu", cpu_table(), clock), pd)
            .unwrap();

        Fixture {
            dvfs,
            vd,
            pd,
            cpu,
            recorder,
            regulator_fail,
            clock_fail,
        }
    }

    fn state(f: &Fixture) -> (u32, u32) {
        let status = f.dvfs.node_status(f.cpu).unwrap();
        (status.set_freq.as_khz(), status.set_volt.as_mv())
    }

    #[test]
    fn test_rising_request_raises_voltage_first() {
        let f = fixture();
        f.dvfs.request_rate(f.cpu, Khz::new(1_000_000)).unwrap();

        assert_eq!(
            f.recorder.events(),
            vec![
                RecordedEvent::Voltage {
                    regulator: "vdd_arm".to_string(),
                    volt: 1150
                },
                RecordedEvent::Rate {
                    clock: "cpu".to_string(),
                    rate: 1_000_000
                },
            ]
        );
        assert_eq!(state(&f), (1_000_000, 1150));
        assert_eq!(
            f.dvfs.domain_voltage(f.vd).unwrap(),
            Some(Millivolts::new(1150))
        );
    }

    #[test]
    fn test_falling_request_lowers_rate_first() {
        let f = fixture();
        f.dvfs.request_rate(f.cpu, Khz::new(1_000_000)).unwrap();
        f.recorder.clear();

        f.dvfs.request_rate(f.cpu, Khz::new(600_000)).unwrap();
        assert_eq!(
            f.recorder.events(),
            vec![
                RecordedEvent::Rate {
                    clock: "cpu".to_string(),
                    rate: 600_000
                },
                RecordedEvent::Voltage {
                    regulator: "vdd_arm".to_string(),
                    volt: 950
                },
            ]
        );
        assert_eq!(state(&f), (600_000, 950));
    }

    #[test]
    fn test_between_entries_uses_higher_voltage() {
        let f = fixture();
        f.dvfs.request_rate(f.cpu, Khz::new(700_000)).unwrap();
        assert_eq!(state(&f), (700_000, 1050));
    }

    #[test]
    fn test_same_rate_is_noop() {
        let f = fixture();
        f.dvfs.request_rate(f.cpu, Khz::new(600_000)).unwrap();
        assert!(f.recorder.events().is_empty());
    }

    #[test]
    fn test_rate_failure_keeps_state_and_raised_voltage() {
        let f = fixture();
        f.clock_fail.fail_next(1);

        let err = f
            .dvfs
            .request_rate(f.cpu, Khz::new(1_000_000))
            .unwrap_err();
        assert!(matches!(err, DvfsError::Clock { .. }));
        assert_eq!(state(&f), (600_000, 950));
        assert_eq!(
            f.dvfs.domain_voltage(f.vd).unwrap(),
            Some(Millivolts::new(1150))
        );
        assert_eq!(f.dvfs.node_status(f.cpu).unwrap().last_set_rate, None);
    }

    #[test]
    fn test_regulator_failure_blocks_rate_change() {
        let f = fixture();
        f.regulator_fail.fail_next(1);

        let err = f
            .dvfs
            .request_rate(f.cpu, Khz::new(1_000_000))
            .unwrap_err();
        assert!(matches!(err, DvfsError::ScalingFailed { .. }));
        assert!(f.recorder.events().is_empty());
        assert_eq!(state(&f), (600_000, 950));
    }

    #[test]
    fn test_lowering_failure_commits_rate() {
        let f = fixture();
        f.dvfs.request_rate(f.cpu, Khz::new(1_000_000)).unwrap();
        f.regulator_fail.fail_next(1);

        let err = f.dvfs.request_rate(f.cpu, Khz::new(600_000)).unwrap_err();
        assert!(matches!(err, DvfsError::ScalingFailed { .. }));
        assert_eq!(state(&f), (600_000, 950));
        assert_eq!(
            f.dvfs.domain_voltage(f.vd).unwrap(),
            Some(Millivolts::new(1150))
        );

        // The next request finishes the job.
        f.dvfs.reset_volt(f.vd).unwrap();
        assert_eq!(
            f.dvfs.domain_voltage(f.vd).unwrap(),
            Some(Millivolts::new(950))
        );
    }

    #[test]
    fn test_out_of_table_rejected() {
        let f = fixture();
        let err = f
            .dvfs
            .request_rate(f.cpu, Khz::new(1_200_000))
            .unwrap_err();
        assert!(matches!(
            err,
            DvfsError::Domain(crate::error::DomainError::FrequencyOutOfRange { .. })
        ));
        assert!(f.recorder.events().is_empty());
    }

    #[test]
    fn test_limit_checked_lazily() {
        let f = fixture();
        f.dvfs.request_rate(f.cpu, Khz::new(1_000_000)).unwrap();

        f.dvfs
            .enable_limit(f.cpu, Khz::new(600_000), Khz::new(800_000))
            .unwrap();
        // Installing the limit does not rescale.
        assert_eq!(state(&f), (1_000_000, 1150));

        let err = f
            .dvfs
            .request_rate(f.cpu, Khz::new(900_000))
            .unwrap_err();
        assert!(matches!(err, DvfsError::RateOutOfLimit { .. }));

        f.dvfs.request_rate(f.cpu, Khz::new(800_000)).unwrap();
        f.dvfs.disable_limit(f.cpu).unwrap();
        f.dvfs.request_rate(f.cpu, Khz::new(1_000_000)).unwrap();
        assert_eq!(state(&f), (1_000_000, 1150));
    }

    #[test]
    fn test_invalid_limit_rejected() {
        let f = fixture();
        assert!(matches!(
            f.dvfs
                .enable_limit(f.cpu, Khz::new(800_000), Khz::new(600_000)),
            Err(DvfsError::Domain(_))
        ));
    }

    #[test]
    fn test_disabled_node_freezes() {
        let f = fixture();
        f.dvfs.request_rate(f.cpu, Khz::new(800_000)).unwrap();
        f.dvfs.disable_dvfs(f.cpu).unwrap();

        assert_eq!(state(&f), (800_000, 1050));
        assert!(matches!(
            f.dvfs.request_rate(f.cpu, Khz::new(600_000)),
            Err(DvfsError::Disabled(_))
        ));

        f.dvfs.enable_dvfs(f.cpu).unwrap();
        f.dvfs.request_rate(f.cpu, Khz::new(600_000)).unwrap();
        assert_eq!(state(&f), (600_000, 950));
    }

    #[test]
    fn test_shared_rail_follows_highest_request() {
        let mut f = fixture();
        let gpu = f
            .dvfs
            .register_clock_node(
                ClockNodeSpec::new(
                    "gpu",
                    FreqVoltTable::from_pairs(&[(200_000, 950), (400_000, 1100)]).unwrap(),
                    MockClock::new(200_000),
                ),
                f.pd,
            )
            .unwrap();

        f.dvfs.request_rate(gpu, Khz::new(400_000)).unwrap();
        f.dvfs.request_rate(f.cpu, Khz::new(1_000_000)).unwrap();
        f.dvfs.request_rate(f.cpu, Khz::new(600_000)).unwrap();

        // The GPU still needs 1100mV.
        assert_eq!(
            f.dvfs.domain_voltage(f.vd).unwrap(),
            Some(Millivolts::new(1100))
        );
        assert_eq!(
            f.dvfs.requested_voltage(f.vd).unwrap(),
            Some(Millivolts::new(1100))
        );
        assert_eq!(state(&f), (600_000, 950));
    }

    #[test]
    fn test_power_domain_off_releases_rail() {
        let mut f = fixture();
        let pd_gpu = f
            .dvfs
            .register_power_domain(PowerDomainSpec::new("pd_gpu"), f.vd)
            .unwrap();
        let gpu = f
            .dvfs
            .register_clock_node(
                ClockNodeSpec::new(
                    "gpu",
                    FreqVoltTable::from_pairs(&[(200_000, 950), (400_000, 1100)]).unwrap(),
                    MockClock::new(200_000),
                ),
                pd_gpu,
            )
            .unwrap();
        f.dvfs.request_rate(gpu, Khz::new(400_000)).unwrap();

        f.dvfs.set_power_domain_status(pd_gpu, false).unwrap();
        assert_eq!(
            f.dvfs.domain_voltage(f.vd).unwrap(),
            Some(Millivolts::new(950))
        );

        f.dvfs.set_power_domain_status(pd_gpu, true).unwrap();
        assert_eq!(
            f.dvfs.domain_voltage(f.vd).unwrap(),
            Some(Millivolts::new(1100))
        );
        let status = f.dvfs.domain_status(f.vd).unwrap();
        assert!(status.power_domains.iter().all(|pd| pd.on));
        assert!(status
            .power_domains
            .iter()
            .all(|pd| pd.voltage == Some(Millivolts::new(1100))));
    }

    #[test]
    fn test_power_on_failure_reverts_status() {
        let mut f = fixture();
        let pd_gpu = f
            .dvfs
            .register_power_domain(PowerDomainSpec::new("pd_gpu").with_status(false), f.vd)
            .unwrap();
        f.dvfs
            .register_clock_node(
                ClockNodeSpec::new(
                    "gpu",
                    FreqVoltTable::from_pairs(&[(400_000, 1100)]).unwrap(),
                    MockClock::new(400_000),
                ),
                pd_gpu,
            )
            .unwrap();

        f.regulator_fail.fail_next(1);
        assert!(f.dvfs.set_power_domain_status(pd_gpu, true).is_err());
        let status = f.dvfs.domain_status(f.vd).unwrap();
        let gpu_pd = status
            .power_domains
            .iter()
            .find(|pd| pd.name == "pd_gpu")
            .unwrap();
        assert!(!gpu_pd.on);
    }

    #[test]
    fn test_suspend_and_resume() {
        let recorder = Recorder::new();
        let mut dvfs = Dvfs::with_delay(Arc::new(MockDelay::default()));
        let vd = dvfs
            .register_voltage_domain(
                VoltageDomainSpec::new("vd_arm")
                    .with_regulator(
                        MockRegulator::linear(850, 1400, 25)
                            .with_voltage(1050)
                            .with_recorder(recorder.clone()),
                    )
                    .with_suspend_volt(Millivolts::new(900)),
            )
            .unwrap();
        let pd = dvfs
            .register_power_domain(PowerDomainSpec::new("pd_cpu"), vd)
            .unwrap();
        dvfs.register_clock_node(
            ClockNodeSpec::new("cpu", cpu_table(), MockClock::new(800_000)),
            pd,
        )
        .unwrap();

        // Powered clocks keep the rail up.
        dvfs.suspend(vd).unwrap();
        assert_eq!(dvfs.domain_voltage(vd).unwrap(), Some(Millivolts::new(1050)));

        dvfs.set_power_domain_status(pd, false).unwrap();
        dvfs.suspend(vd).unwrap();
        assert_eq!(dvfs.domain_voltage(vd).unwrap(), Some(Millivolts::new(900)));

        dvfs.set_power_domain_status(pd, true).unwrap();
        dvfs.resume(vd).unwrap();
        assert_eq!(dvfs.domain_voltage(vd).unwrap(), Some(Millivolts::new(1050)));
    }

    #[test]
    fn test_frequency_only_without_regulator() {
        let recorder = Recorder::new();
        let mut dvfs = Dvfs::with_delay(Arc::new(MockDelay::default()));
        let vd = dvfs
            .register_voltage_domain(VoltageDomainSpec::new("vd_io"))
            .unwrap();
        let pd = dvfs
            .register_power_domain(PowerDomainSpec::new("pd_io"), vd)
            .unwrap();
        let node = dvfs
            .register_clock_node(
                ClockNodeSpec::new(
                    "uart",
                    cpu_table(),
                    MockClock::new(600_000).with_recorder(recorder.clone()),
                ),
                pd,
            )
            .unwrap();

        dvfs.request_rate(node, Khz::new(1_000_000)).unwrap();
        assert_eq!(recorder.events().len(), 1);
        assert_eq!(dvfs.domain_voltage(vd).unwrap(), None);
        assert!(matches!(
            dvfs.round_to_supported(vd, Millivolts::new(1000), RoundDirection::Up),
            Err(DvfsError::Unsupported(_))
        ));
    }

    #[test]
    fn test_plan_does_not_touch_hardware() {
        let f = fixture();
        let plan = f.dvfs.plan_rate(f.cpu, Khz::new(800_000)).unwrap();

        assert_eq!(plan.from_freq, Khz::new(600_000));
        assert_eq!(plan.to_volt, Millivolts::new(1050));
        assert_eq!(
            plan.domains,
            vec![DomainPlan {
                name: "vd_arm".to_string(),
                from: Some(Millivolts::new(950)),
                to: Some(Millivolts::new(1050)),
            }]
        );
        assert!(f.recorder.events().is_empty());
        assert_eq!(state(&f), (600_000, 950));
    }

    #[test]
    fn test_regulator_mode_passthrough() {
        let f = fixture();
        f.dvfs
            .set_regulator_mode(f.vd, RegulatorMode::Fast)
            .unwrap();
        assert_eq!(f.dvfs.regulator_mode(f.vd).unwrap(), RegulatorMode::Fast);
        assert_eq!(
            f.dvfs.domain_status(f.vd).unwrap().mode,
            Some(RegulatorMode::Fast)
        );
    }

    #[test]
    fn test_table_accessor() {
        let f = fixture();
        assert_eq!(f.dvfs.freq_volt_table(f.cpu).unwrap().len(), 3);
        assert!(f.dvfs.freq_volt_table(NodeHandle(9)).is_err());
    }

    fn gpu_table() -> FreqVoltTable {
        FreqVoltTable::from_pairs(&[(200_000, 950), (400_000, 1100)]).unwrap()
    }

    fn gpu_clock(f: &Fixture, khz: u32) -> MockClock {
        MockClock::new(khz)
            .named("gpu")
            .with_recorder(f.recorder.clone())
    }

    #[test]
    fn test_request_in_off_power_domain_raises_voltage_first() {
        let mut f = fixture();
        let pd_gpu = f
            .dvfs
            .register_power_domain(PowerDomainSpec::new("pd_gpu").with_status(false), f.vd)
            .unwrap();
        let clock = gpu_clock(&f, 200_000);
        let gpu = f
            .dvfs
            .register_clock_node(ClockNodeSpec::new("gpu", gpu_table(), clock), pd_gpu)
            .unwrap();

        f.dvfs.request_rate(gpu, Khz::new(400_000)).unwrap();
        assert_eq!(
            f.recorder.events(),
            vec![
                RecordedEvent::Voltage {
                    regulator: "vdd_arm".to_string(),
                    volt: 1100
                },
                RecordedEvent::Rate {
                    clock: "gpu".to_string(),
                    rate: 400_000
                },
            ]
        );

        // Powering the domain on finds the rail already high enough.
        f.recorder.clear();
        f.dvfs.set_power_domain_status(pd_gpu, true).unwrap();
        assert!(f.recorder.events().is_empty());
        assert_eq!(
            f.dvfs.domain_voltage(f.vd).unwrap(),
            Some(Millivolts::new(1100))
        );
    }

    #[test]
    fn test_registration_raises_rail_for_running_clock() {
        let mut f = fixture();
        let clock = gpu_clock(&f, 400_000);
        let gpu = f
            .dvfs
            .register_clock_node(ClockNodeSpec::new("gpu", gpu_table(), clock), f.pd)
            .unwrap();

        assert_eq!(
            f.recorder.events(),
            vec![RecordedEvent::Voltage {
                regulator: "vdd_arm".to_string(),
                volt: 1100
            }]
        );
        assert_eq!(
            f.dvfs.domain_voltage(f.vd).unwrap(),
            Some(Millivolts::new(1100))
        );
        assert_eq!(
            f.dvfs.node_status(gpu).unwrap().set_volt,
            Millivolts::new(1100)
        );

        f.recorder.clear();
        f.dvfs.request_rate(gpu, Khz::new(400_000)).unwrap();
        assert!(f.recorder.events().is_empty());
    }

    #[test]
    fn test_registration_in_off_domain_leaves_rail() {
        let mut f = fixture();
        let pd_gpu = f
            .dvfs
            .register_power_domain(PowerDomainSpec::new("pd_gpu").with_status(false), f.vd)
            .unwrap();
        let clock = gpu_clock(&f, 400_000);
        f.dvfs
            .register_clock_node(ClockNodeSpec::new("gpu", gpu_table(), clock), pd_gpu)
            .unwrap();

        assert!(f.recorder.events().is_empty());
        assert_eq!(
            f.dvfs.domain_voltage(f.vd).unwrap(),
            Some(Millivolts::new(950))
        );

        f.dvfs.set_power_domain_status(pd_gpu, true).unwrap();
        assert_eq!(
            f.dvfs.domain_voltage(f.vd).unwrap(),
            Some(Millivolts::new(1100))
        );
    }

    #[test]
    fn test_registration_raise_failure_registers_nothing() {
        let mut f = fixture();
        f.regulator_fail.fail_next(1);
        let clock = gpu_clock(&f, 400_000);

        let err = f
            .dvfs
            .register_clock_node(ClockNodeSpec::new("gpu", gpu_table(), clock), f.pd)
            .unwrap_err();
        assert!(matches!(err, DvfsError::ScalingFailed { .. }));
        assert_eq!(f.dvfs.find_clock_node_by_name("gpu"), None);
        assert_eq!(f.dvfs.clock_nodes().len(), 1);
        assert_eq!(f.dvfs.power_domain(f.pd).unwrap().clock_nodes(), &[f.cpu]);
    }

    #[test]
    fn test_registered_target_drives_clock() {
        let f = fixture();
        let target = MockTarget::via(600_000);
        let calls = target.call_counter();
        f.dvfs.register_target(f.cpu, target).unwrap();

        f.dvfs.request_rate(f.cpu, Khz::new(1_000_000)).unwrap();
        assert_eq!(
            f.recorder.events(),
            vec![
                RecordedEvent::Voltage {
                    regulator: "vdd_arm".to_string(),
                    volt: 1150
                },
                RecordedEvent::Rate {
                    clock: "cpu".to_string(),
                    rate: 600_000
                },
                RecordedEvent::Rate {
                    clock: "cpu".to_string(),
                    rate: 1_000_000
                },
            ]
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(state(&f), (1_000_000, 1150));

        assert!(matches!(
            f.dvfs.register_target(NodeHandle(9), MockTarget::via(600_000)),
            Err(DvfsError::InvalidHandle(_))
        ));
    }

    #[test]
    fn test_target_given_at_registration() {
        let mut f = fixture();
        let target = MockTarget::via(200_000);
        let calls = target.call_counter();
        let clock = gpu_clock(&f, 200_000);
        let gpu = f
            .dvfs
            .register_clock_node(
                ClockNodeSpec::new("gpu", gpu_table(), clock).with_target(target),
                f.pd,
            )
            .unwrap();

        f.dvfs.request_rate(gpu, Khz::new(400_000)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            f.dvfs.node_status(gpu).unwrap().set_freq,
            Khz::new(400_000)
        );
    }

    #[test]
    fn test_target_failure_keeps_state() {
        let f = fixture();
        f.dvfs.register_target(f.cpu, MockTarget::via(600_000)).unwrap();
        f.clock_fail.fail_next(1);

        let err = f
            .dvfs
            .request_rate(f.cpu, Khz::new(1_000_000))
            .unwrap_err();
        assert!(matches!(err, DvfsError::Clock { .. }));
        assert_eq!(state(&f), (600_000, 950));
    }
}
