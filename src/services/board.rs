//! Simulated board assembly
//!
//! Builds the scaling engine and the SMP service from a board description,
//! backed by the simulated hardware. Every hardware change on the board is
//! recorded in one shared trace.

use crate::config::{Config, VoltageDomainConfig};
use crate::domain::{Khz, Millivolts};
use crate::dvfs::{ClockNodeSpec, Dvfs, NodeHandle, PowerDomainSpec, VoltageDomainSpec};
use crate::error::{AppError, ConfigError};
use crate::hw::{Delay, SimClock, SimPmu, SimRegulator, SimTrace, StdDelay};
use crate::services::SmpService;

use std::sync::Arc;

/// A simulated board: engine, SMP service and hardware trace
pub struct Board {
    dvfs: Dvfs,
    smp: SmpService<SimPmu>,
    trace: SimTrace,
    boot_cpu: u32,
}

impl Board {
    /// Build a board that sleeps for regulator settle times
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        Self::with_delay(config, Arc::new(StdDelay))
    }

    /// Build a board with a custom delay provider
    pub fn with_delay(config: &Config, delay: Arc<dyn Delay>) -> Result<Self, AppError> {
        let board = &config.board;
        board.validate()?;

        let trace = SimTrace::new();
        let mut dvfs = Dvfs::with_delay(delay.clone());

        for vd in &board.voltage_domains {
            dvfs.register_voltage_domain(voltage_domain_spec(vd, &trace))?;
        }

        for pd in &board.power_domains {
            let vd = dvfs
                .find_voltage_domain_by_name(&pd.voltage_domain)
                .ok_or_else(|| unknown("voltage domain", &pd.voltage_domain))?;
            dvfs.register_power_domain(PowerDomainSpec::new(&pd.name).with_status(pd.on), vd)?;
        }

        for clk in &board.clocks {
            let pd = dvfs
                .find_power_domain_by_name(&clk.power_domain)
                .ok_or_else(|| unknown("power domain", &clk.power_domain))?;
            let clock = SimClock::new(&clk.name, Khz::new(clk.rate_khz)).with_trace(trace.clone());
            let mut spec =
                ClockNodeSpec::new(&clk.name, clk.to_table()?, clock).with_enabled(clk.enabled);
            if let Some(limit) = clk.to_limit()? {
                spec = spec.with_limit(limit);
            }
            dvfs.register_clock_node(spec, pd)?;
        }

        for dep in &board.dependencies {
            let dependent = dvfs
                .find_voltage_domain_by_name(&dep.dependent)
                .ok_or_else(|| unknown("voltage domain", &dep.dependent))?;
            let supplier = dvfs
                .find_voltage_domain_by_name(&dep.supplier)
                .ok_or_else(|| unknown("voltage domain", &dep.supplier))?;
            dvfs.declare_dependency(dependent, supplier, dep.coupling())?;
        }

        let smp_config = &config.smp;
        let pmu = SimPmu::new(smp_config.first_domain + smp_config.cores)
            .with_latency(smp_config.gate_latency_polls)
            .with_trace(trace.clone());
        let smp = SmpService::new(pmu, smp_config.to_settings(), delay);

        log::debug!(
            "Board ready: {} voltage domains, {} power domains, {} clocks, {} cores",
            dvfs.voltage_domains().len(),
            dvfs.power_domains().len(),
            dvfs.clock_nodes().len(),
            smp_config.cores
        );

        Ok(Self {
            dvfs,
            smp,
            trace,
            boot_cpu: smp_config.boot_cpu,
        })
    }

    /// Get the scaling engine
    pub fn dvfs(&self) -> &Dvfs {
        &self.dvfs
    }

    /// Get the SMP service
    pub fn smp(&self) -> &SmpService<SimPmu> {
        &self.smp
    }

    /// Get the SMP service mutably
    pub fn smp_mut(&mut self) -> &mut SmpService<SimPmu> {
        &mut self.smp
    }

    /// Hardware events recorded so far
    pub fn trace(&self) -> &SimTrace {
        &self.trace
    }

    /// CPU that stays powered during preparation
    pub fn boot_cpu(&self) -> u32 {
        self.boot_cpu
    }

    /// Look up a clock node by name
    pub fn node(&self, name: &str) -> Result<NodeHandle, AppError> {
        self.dvfs
            .find_clock_node_by_name(name)
            .ok_or_else(|| AppError::NodeNotFound(name.to_string()))
    }
}

fn voltage_domain_spec(vd: &VoltageDomainConfig, trace: &SimTrace) -> VoltageDomainSpec {
    let mut spec = VoltageDomainSpec::new(&vd.name);

    if let Some(reg) = &vd.regulator {
        let mut regulator = SimRegulator::new(
            &reg.name,
            Millivolts::new(reg.min_mv),
            Millivolts::new(reg.max_mv),
            reg.step_mv,
        )
        .with_voltage(Millivolts::new(reg.initial_mv.unwrap_or(reg.min_mv)))
        .with_trace(trace.clone());
        if let Some(ramp) = reg.ramp_uv_per_us {
            regulator = regulator.with_ramp_delay(ramp);
        }
        spec = spec.with_regulator(regulator);
    } else {
        log::warn!("{}: no regulator, frequency-only operation", vd.name);
    }

    if let Some(volt) = vd.suspend_volt() {
        spec = spec.with_suspend_volt(volt);
    }
    spec
}

fn unknown(kind: &'static str, name: &str) -> ConfigError {
    ConfigError::UnknownReference {
        kind,
        name: name.to_string(),
    }
}
