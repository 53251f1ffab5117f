//! Stepped voltage scaling
//!
//! A scaling group is a locked voltage domain, or a locked dependent/supplier
//! pair. Targets for a group are derived from the clocks' requested voltages
//! and the pair's coupling window; applying targets walks the regulators
//! through steps that keep the pair inside the window at every point.

use crate::domain::{Millivolts, RoundDirection};
use crate::dvfs::clock_node::NodeState;
use crate::dvfs::handle::{NodeHandle, VdHandle};
use crate::dvfs::voltage_domain::{Coupling, DomainGuard, LinkRole};
use crate::dvfs::Dvfs;
use crate::error::DvfsError;
use crate::hw::Delay;

/// Extra demand folded into a group's floors when computing targets
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Demand {
    /// Replace one node's requested voltage
    pub(crate) node: Option<(NodeHandle, Millivolts)>,
    /// Minimum voltage for one domain, used even when no clock is powered
    pub(crate) domain_min: Option<(VdHandle, Millivolts)>,
}

impl Demand {
    pub(crate) fn node(node: NodeHandle, volt: Millivolts) -> Self {
        Self {
            node: Some((node, volt)),
            domain_min: None,
        }
    }

    pub(crate) fn domain_min(vd: VdHandle, volt: Millivolts) -> Self {
        Self {
            node: None,
            domain_min: Some((vd, volt)),
        }
    }
}

/// Voltages a group should end up at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Targets {
    /// Lone domain; `None` means voltage control is unavailable
    Single(Option<Millivolts>),
    /// Coupled pair
    Coupled {
        dependent: Millivolts,
        supplier: Millivolts,
    },
}

/// One or two locked voltage domains scaled together
pub(crate) enum ScalingGroup<'a> {
    Single(DomainGuard<'a>),
    Coupled {
        dependent: DomainGuard<'a>,
        supplier: DomainGuard<'a>,
        coupling: Coupling,
    },
}

impl Dvfs {
    /// Lock `vd` and its dependency partner, lower handle first
    pub(crate) fn lock_group(&self, vd: VdHandle) -> Result<ScalingGroup<'_>, DvfsError> {
        let domain = self.voltage_domain(vd)?;
        let Some(link) = domain.link else {
            return Ok(ScalingGroup::Single(domain.lock()));
        };

        let partner = self.voltage_domain(link.partner)?;
        let (first, second) = if vd < link.partner {
            (domain, partner)
        } else {
            (partner, domain)
        };
        let first = first.lock();
        let second = second.lock();

        let (own, other) = if vd < link.partner {
            (first, second)
        } else {
            (second, first)
        };
        let (dependent, supplier) = match link.role {
            LinkRole::Dependent => (own, other),
            LinkRole::Supplier => (other, own),
        };

        Ok(ScalingGroup::Coupled {
            dependent,
            supplier,
            coupling: link.coupling,
        })
    }
}

impl<'a> ScalingGroup<'a> {
    pub(crate) fn guards(&self) -> Vec<&DomainGuard<'a>> {
        match self {
            ScalingGroup::Single(g) => vec![g],
            ScalingGroup::Coupled {
                dependent,
                supplier,
                ..
            } => vec![dependent, supplier],
        }
    }

    pub(crate) fn guard(&self, vd: VdHandle) -> Result<&DomainGuard<'a>, DvfsError> {
        self.guards()
            .into_iter()
            .find(|g| g.handle() == vd)
            .ok_or_else(|| DvfsError::InvalidHandle(vd.to_string()))
    }

    pub(crate) fn guard_mut(&mut self, vd: VdHandle) -> Result<&mut DomainGuard<'a>, DvfsError> {
        match self {
            ScalingGroup::Single(g) if g.handle() == vd => Ok(g),
            ScalingGroup::Coupled { dependent, .. } if dependent.handle() == vd => Ok(dependent),
            ScalingGroup::Coupled { supplier, .. } if supplier.handle() == vd => Ok(supplier),
            _ => Err(DvfsError::InvalidHandle(vd.to_string())),
        }
    }

    pub(crate) fn node(&self, vd: VdHandle, node: NodeHandle) -> Result<&NodeState, DvfsError> {
        self.guard(vd)?
            .state
            .nodes
            .get(&node)
            .ok_or_else(|| DvfsError::InvalidHandle(node.to_string()))
    }

    pub(crate) fn node_mut(
        &mut self,
        vd: VdHandle,
        node: NodeHandle,
    ) -> Result<&mut NodeState, DvfsError> {
        self.guard_mut(vd)?
            .state
            .nodes
            .get_mut(&node)
            .ok_or_else(|| DvfsError::InvalidHandle(node.to_string()))
    }

    /// Compute the voltages the group must reach to satisfy `demand`
    pub(crate) fn targets(&self, demand: Demand) -> Result<Targets, DvfsError> {
        match self {
            ScalingGroup::Single(g) => {
                if !g.domain.has_voltage_control() {
                    return Ok(Targets::Single(None));
                }
                let Some(want) = floor_for(g, demand) else {
                    return Ok(Targets::Single(g.cur_volt()));
                };
                match g.domain.round_to_supported(want, RoundDirection::Up) {
                    Ok(volt) => Ok(Targets::Single(Some(volt))),
                    Err(e) if e.is_unsupported() => Ok(Targets::Single(None)),
                    Err(e) => Err(e),
                }
            }
            ScalingGroup::Coupled {
                dependent,
                supplier,
                coupling,
            } => {
                let dep_floor = floor_for(dependent, demand).unwrap_or(dependent.known_volt()?);
                let sup_floor = floor_for(supplier, demand).unwrap_or(supplier.known_volt()?);

                let dep = dependent.domain.round_to_supported(
                    dep_floor.max(sup_floor.saturating_sub(coupling.max_below_mv)),
                    RoundDirection::Up,
                )?;
                let sup = supplier.domain.round_to_supported(
                    sup_floor.max(dep.saturating_sub(coupling.max_above_mv)),
                    RoundDirection::Up,
                )?;

                if !coupling.allows(dep, sup) {
                    return Err(DvfsError::ScalingFailed {
                        domain: dependent.name().to_string(),
                        reason: format!(
                            "no supported pair satisfies {} (wanted {} / {} on '{}')",
                            coupling,
                            dep,
                            sup,
                            supplier.name()
                        ),
                    });
                }
                Ok(Targets::Coupled {
                    dependent: dep,
                    supplier: sup,
                })
            }
        }
    }

    /// Targets that only raise: the element-wise max of current and `targets`
    pub(crate) fn raise_only(&self, targets: Targets) -> Targets {
        match (self, targets) {
            (ScalingGroup::Single(g), Targets::Single(Some(t))) => {
                Targets::Single(Some(g.cur_volt().map_or(t, |cur| cur.max(t))))
            }
            (
                ScalingGroup::Coupled {
                    dependent,
                    supplier,
                    ..
                },
                Targets::Coupled {
                    dependent: dt,
                    supplier: st,
                },
            ) => Targets::Coupled {
                dependent: dependent.cur_volt().map_or(dt, |cur| cur.max(dt)),
                supplier: supplier.cur_volt().map_or(st, |cur| cur.max(st)),
            },
            (_, targets) => targets,
        }
    }

    /// Walk the group's regulators to `targets`
    ///
    /// Aborts with `ScalingFailed` on the first regulator failure; every
    /// voltage reached before that point is left in place.
    pub(crate) fn apply(&mut self, targets: Targets, delay: &dyn Delay) -> Result<(), DvfsError> {
        match (self, targets) {
            (ScalingGroup::Single(_), Targets::Single(None)) => Ok(()),
            (ScalingGroup::Single(g), Targets::Single(Some(target))) => {
                if g.cur_volt() != Some(target) {
                    step(g, target, delay)?;
                }
                Ok(())
            }
            (
                ScalingGroup::Coupled {
                    dependent,
                    supplier,
                    coupling,
                },
                Targets::Coupled {
                    dependent: dt,
                    supplier: st,
                },
            ) => scale_bystep(dependent, supplier, *coupling, dt, st, delay),
            (_, targets) => Err(DvfsError::ScalingFailed {
                domain: String::new(),
                reason: format!("targets {:?} do not match the locked group", targets),
            }),
        }
    }
}

fn floor_for(guard: &DomainGuard<'_>, demand: Demand) -> Option<Millivolts> {
    let requested = guard.floor(demand.node);
    let minimum = demand
        .domain_min
        .filter(|(vd, _)| *vd == guard.handle())
        .map(|(_, volt)| volt);
    requested.max(minimum)
}

fn step(guard: &mut DomainGuard<'_>, volt: Millivolts, delay: &dyn Delay) -> Result<(), DvfsError> {
    guard
        .scale_to(volt, delay)
        .map_err(|e| DvfsError::ScalingFailed {
            domain: guard.name().to_string(),
            reason: e.to_string(),
        })
}

/// Move `guard` toward `target` without leaving `[lo, hi]`
///
/// Returns whether the domain moved.
fn step_within(
    guard: &mut DomainGuard<'_>,
    target: Millivolts,
    lo: Millivolts,
    hi: Millivolts,
    delay: &dyn Delay,
) -> Result<bool, DvfsError> {
    let cur = guard.known_volt()?;
    let next = if target > cur {
        guard
            .domain
            .round_to_supported(target.min(hi), RoundDirection::Down)
            .ok()
            .filter(|v| *v > cur)
    } else if target < cur {
        guard
            .domain
            .round_to_supported(target.max(lo), RoundDirection::Up)
            .ok()
            .filter(|v| *v < cur)
    } else {
        None
    };

    match next {
        Some(volt) => {
            step(guard, volt, delay)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Bring a coupled pair to (`dep_target`, `sup_target`)
///
/// The supplier moves first whenever its full move keeps the pair inside the
/// window, then the dependent. When neither full move fits, each side
/// advances as far as the window allows against the other's current
/// voltage until both arrive.
fn scale_bystep(
    dependent: &mut DomainGuard<'_>,
    supplier: &mut DomainGuard<'_>,
    coupling: Coupling,
    dep_target: Millivolts,
    sup_target: Millivolts,
    delay: &dyn Delay,
) -> Result<(), DvfsError> {
    loop {
        let dep = dependent.known_volt()?;
        let sup = supplier.known_volt()?;
        if dep == dep_target && sup == sup_target {
            return Ok(());
        }

        if sup != sup_target && coupling.allows(dep, sup_target) {
            step(supplier, sup_target, delay)?;
            continue;
        }
        if dep != dep_target && coupling.allows(dep_target, sup) {
            step(dependent, dep_target, delay)?;
            continue;
        }

        let moved_sup = step_within(
            supplier,
            sup_target,
            dep.saturating_sub(coupling.max_above_mv),
            dep.saturating_add(coupling.max_below_mv),
            delay,
        )?;
        let sup = supplier.known_volt()?;
        let moved_dep = step_within(
            dependent,
            dep_target,
            sup.saturating_sub(coupling.max_below_mv),
            sup.saturating_add(coupling.max_above_mv),
            delay,
        )?;

        if !moved_sup && !moved_dep {
            return Err(DvfsError::ScalingFailed {
                domain: dependent.name().to_string(),
                reason: format!(
                    "stalled at {} / {} ('{}') short of {} / {} within {}",
                    dep,
                    sup,
                    supplier.name(),
                    dep_target,
                    sup_target,
                    coupling
                ),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dvfs::VoltageDomainSpec;
    use crate::mock::{MockDelay, MockRegulator, RecordedEvent, Recorder};

    fn coupled(
        dep_mv: u32,
        sup_mv: u32,
        coupling: Coupling,
        step_mv: u32,
    ) -> (Dvfs, VdHandle, VdHandle, Recorder) {
        let recorder = Recorder::new();
        let mut dvfs = Dvfs::with_delay(std::sync::Arc::new(MockDelay::default()));
        let dep = dvfs
            .register_voltage_domain(
                VoltageDomainSpec::new("vd_arm").with_regulator(
                    MockRegulator::linear(800, 1500, step_mv)
                        .with_voltage(dep_mv)
                        .named("vdd_arm")
                        .with_recorder(recorder.clone()),
                ),
            )
            .unwrap();
        let sup = dvfs
            .register_voltage_domain(
                VoltageDomainSpec::new("vd_logic").with_regulator(
                    MockRegulator::linear(800, 1500, step_mv)
                        .with_voltage(sup_mv)
                        .named("vdd_logic")
                        .with_recorder(recorder.clone()),
                ),
            )
            .unwrap();
        dvfs.declare_dependency(dep, sup, coupling).unwrap();
        (dvfs, dep, sup, recorder)
    }

    fn apply(dvfs: &Dvfs, vd: VdHandle, dep: u32, sup: u32) -> Result<(), DvfsError> {
        let mut group = dvfs.lock_group(vd).unwrap();
        group.apply(
            Targets::Coupled {
                dependent: Millivolts::new(dep),
                supplier: Millivolts::new(sup),
            },
            dvfs.delay(),
        )
    }

    /// Replays recorded voltage changes and checks the window at every point
    fn assert_window_held(events: &[RecordedEvent], start: (u32, u32), coupling: Coupling) {
        let (mut dep, mut sup) = start;
        for event in events {
            if let RecordedEvent::Voltage { regulator, volt } = event {
                match regulator.as_str() {
                    "vdd_arm" => dep = *volt,
                    "vdd_logic" => sup = *volt,
                    other => panic!("unexpected regulator {}", other),
                }
                assert!(
                    coupling.allows(Millivolts::new(dep), Millivolts::new(sup)),
                    "window broken at {}/{}",
                    dep,
                    sup
                );
            }
        }
    }

    #[test]
    fn test_lock_group_pairs_domains() {
        let (dvfs, dep, sup, _) = coupled(1000, 1000, Coupling::never_above(), 25);
        for vd in [dep, sup] {
            match dvfs.lock_group(vd).unwrap() {
                ScalingGroup::Coupled {
                    dependent,
                    supplier,
                    ..
                } => {
                    assert_eq!(dependent.handle(), dep);
                    assert_eq!(supplier.handle(), sup);
                }
                ScalingGroup::Single(_) => panic!("expected a coupled group"),
            }
        }
    }

    #[test]
    fn test_supplier_raised_first() {
        let (dvfs, dep, _, recorder) = coupled(1000, 1050, Coupling::never_above(), 25);
        apply(&dvfs, dep, 1200, 1200).unwrap();

        assert_eq!(
            recorder.voltages(),
            vec![("vdd_logic".to_string(), 1200), ("vdd_arm".to_string(), 1200)]
        );
    }

    #[test]
    fn test_dependent_lowered_first() {
        let (dvfs, dep, _, recorder) = coupled(1200, 1200, Coupling::never_above(), 25);
        apply(&dvfs, dep, 1000, 1000).unwrap();

        assert_eq!(
            recorder.voltages(),
            vec![("vdd_arm".to_string(), 1000), ("vdd_logic".to_string(), 1000)]
        );
    }

    #[test]
    fn test_narrow_window_steps_alternately() {
        let coupling = Coupling::new(100, 100);
        let (dvfs, dep, _, recorder) = coupled(1000, 1000, coupling, 25);
        apply(&dvfs, dep, 1300, 1300).unwrap();

        let events = recorder.events();
        assert!(events.len() > 2);
        assert_window_held(&events, (1000, 1000), coupling);

        let group = dvfs.lock_group(dep).unwrap();
        let volts: Vec<_> = group.guards().iter().map(|g| g.cur_volt()).collect();
        assert_eq!(
            volts,
            vec![Some(Millivolts::new(1300)), Some(Millivolts::new(1300))]
        );
    }

    #[test]
    fn test_narrow_window_falling() {
        let coupling = Coupling::new(50, 75);
        let (dvfs, dep, _, recorder) = coupled(1400, 1350, coupling, 25);
        apply(&dvfs, dep, 900, 950).unwrap();
        assert_window_held(&recorder.events(), (1400, 1350), coupling);
    }

    #[test]
    fn test_failure_aborts_and_keeps_reached_voltages() {
        let recorder = Recorder::new();
        let mut dvfs = Dvfs::with_delay(std::sync::Arc::new(MockDelay::default()));
        let arm_reg = MockRegulator::linear(800, 1500, 25)
            .with_voltage(1000)
            .named("vdd_arm")
            .with_recorder(recorder.clone());
        let arm_fail = arm_reg.failure_switch();
        let dep = dvfs
            .register_voltage_domain(VoltageDomainSpec::new("vd_arm").with_regulator(arm_reg))
            .unwrap();
        let sup = dvfs
            .register_voltage_domain(
                VoltageDomainSpec::new("vd_logic").with_regulator(
                    MockRegulator::linear(800, 1500, 25)
                        .with_voltage(1000)
                        .named("vdd_logic")
                        .with_recorder(recorder.clone()),
                ),
            )
            .unwrap();
        dvfs.declare_dependency(dep, sup, Coupling::never_above())
            .unwrap();

        arm_fail.fail_next(1);
        let err = apply(&dvfs, dep, 1200, 1200).unwrap_err();
        assert!(matches!(err, DvfsError::ScalingFailed { ref domain, .. } if domain == "vd_arm"));

        let group = dvfs.lock_group(dep).unwrap();
        assert_eq!(
            group.guard(sup).unwrap().cur_volt(),
            Some(Millivolts::new(1200))
        );
        assert_eq!(
            group.guard(dep).unwrap().cur_volt(),
            Some(Millivolts::new(1000))
        );
    }

    #[test]
    fn test_stall_reported() {
        // 100mV steps cannot respect a 50mV window once both sides must move.
        let coupling = Coupling::new(50, 50);
        let (dvfs, dep, _, _) = coupled(1000, 1000, coupling, 100);
        let err = apply(&dvfs, dep, 1200, 1200).unwrap_err();
        assert!(matches!(err, DvfsError::ScalingFailed { .. }));
    }

    #[test]
    fn test_coupled_targets_honor_window() {
        let (dvfs, dep, sup, _) = coupled(1000, 1100, Coupling::new(100, 100), 25);
        let group = dvfs.lock_group(dep).unwrap();

        let targets = group
            .targets(Demand::domain_min(dep, Millivolts::new(1300)))
            .unwrap();
        assert_eq!(
            targets,
            Targets::Coupled {
                dependent: Millivolts::new(1300),
                supplier: Millivolts::new(1200),
            }
        );

        let targets = group
            .targets(Demand::domain_min(sup, Millivolts::new(1300)))
            .unwrap();
        assert_eq!(
            targets,
            Targets::Coupled {
                dependent: Millivolts::new(1200),
                supplier: Millivolts::new(1300),
            }
        );
    }

    #[test]
    fn test_raise_only_keeps_higher_current() {
        let (dvfs, dep, _, _) = coupled(1200, 1200, Coupling::never_above(), 25);
        let group = dvfs.lock_group(dep).unwrap();
        let raised = group.raise_only(Targets::Coupled {
            dependent: Millivolts::new(1000),
            supplier: Millivolts::new(1300),
        });
        assert_eq!(
            raised,
            Targets::Coupled {
                dependent: Millivolts::new(1200),
                supplier: Millivolts::new(1300),
            }
        );
    }
}
