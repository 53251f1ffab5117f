//! Configuration system
//!
//! Handles the TOML board description, general settings and CLI argument
//! merging. Without a config file the built-in default board is used.

pub mod builder;
pub mod file;

pub use builder::ConfigBuilder;
pub use file::ConfigFile;

use crate::domain::{FreqVoltTable, Khz, Millivolts, RateLimit};
use crate::dvfs::Coupling;
use crate::error::{ConfigError, DomainError};
use crate::services::SmpSettings;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,
    /// Rails, power domains and clocks
    pub board: BoardConfig,
    /// Secondary CPU settings
    pub smp: SmpConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,
    /// Plan changes without applying them
    pub dry_run: bool,
}

/// Board description
///
/// A missing `[board]` section selects the built-in board; a present one
/// starts empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardConfig {
    #[serde(rename = "voltage_domain", default)]
    pub voltage_domains: Vec<VoltageDomainConfig>,
    #[serde(rename = "power_domain", default)]
    pub power_domains: Vec<PowerDomainConfig>,
    #[serde(rename = "clock", default)]
    pub clocks: Vec<ClockConfig>,
    #[serde(rename = "dependency", default)]
    pub dependencies: Vec<DependencyConfig>,
}

/// One rail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoltageDomainConfig {
    pub name: String,
    /// Omit for a rail without voltage control
    pub regulator: Option<RegulatorConfig>,
    pub suspend_mv: Option<u32>,
}

/// Linear-range regulator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegulatorConfig {
    pub name: String,
    pub min_mv: u32,
    pub max_mv: u32,
    pub step_mv: u32,
    /// Output at power-up; defaults to `min_mv`
    pub initial_mv: Option<u32>,
    /// Slew rate used to compute settle times
    pub ramp_uv_per_us: Option<u32>,
}

/// One power domain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerDomainConfig {
    pub name: String,
    pub voltage_domain: String,
    #[serde(default = "default_true")]
    pub on: bool,
}

/// One scalable clock
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockConfig {
    pub name: String,
    pub power_domain: String,
    /// Rate at power-up
    pub rate_khz: u32,
    pub table: Vec<FreqVoltConfig>,
    pub limit: Option<LimitConfig>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Table entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FreqVoltConfig {
    pub khz: u32,
    pub mv: u32,
}

/// Rate clamp
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LimitConfig {
    pub min_khz: u32,
    pub max_khz: u32,
}

/// Dependency edge between two rails
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyConfig {
    pub dependent: String,
    pub supplier: String,
    /// How far the dependent rail may sit above the supplier
    #[serde(default)]
    pub max_above_mv: u32,
    /// How far it may sit below; omit for no bound
    pub max_below_mv: Option<u32>,
}

/// Secondary CPU configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmpConfig {
    pub cores: u32,
    pub boot_cpu: u32,
    pub first_domain: u32,
    pub timeout_us: u64,
    pub poll_interval_us: u64,
    /// Simulated PMU: polls before a toggle is visible
    pub gate_latency_polls: u32,
}

fn default_true() -> bool {
    true
}

impl Default for SmpConfig {
    fn default() -> Self {
        Self {
            cores: 4,
            boot_cpu: 0,
            first_domain: 0,
            timeout_us: 10_000,
            poll_interval_us: 10,
            gate_latency_polls: 3,
        }
    }
}

impl SmpConfig {
    /// Convert to service settings
    pub fn to_settings(&self) -> SmpSettings {
        SmpSettings {
            cores: self.cores,
            first_domain: self.first_domain,
            timeout: Duration::from_micros(self.timeout_us),
            poll_interval: Duration::from_micros(self.poll_interval_us),
        }
    }
}

impl VoltageDomainConfig {
    /// Suspend voltage as a domain value
    pub fn suspend_volt(&self) -> Option<Millivolts> {
        self.suspend_mv.map(Millivolts::new)
    }
}

impl ClockConfig {
    /// Convert the table to a domain object
    pub fn to_table(&self) -> Result<FreqVoltTable, DomainError> {
        let pairs: Vec<(u32, u32)> = self.table.iter().map(|e| (e.khz, e.mv)).collect();
        FreqVoltTable::from_pairs(&pairs)
    }

    /// Convert the limit to a domain object
    pub fn to_limit(&self) -> Result<Option<RateLimit>, DomainError> {
        self.limit
            .map(|l| RateLimit::new(Khz::new(l.min_khz), Khz::new(l.max_khz)))
            .transpose()
    }
}

impl DependencyConfig {
    /// Convert to a coupling window
    pub fn coupling(&self) -> Coupling {
        Coupling::new(self.max_above_mv, self.max_below_mv.unwrap_or(u32::MAX))
    }
}

impl RegulatorConfig {
    /// Check the range is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.step_mv == 0 || self.min_mv > self.max_mv {
            return Err(ConfigError::InvalidValue {
                key: format!("regulator.{}", self.name),
                message: format!(
                    "range {}-{}mV with step {}mV is empty",
                    self.min_mv, self.max_mv, self.step_mv
                ),
            });
        }
        Ok(())
    }
}

impl BoardConfig {
    /// Check every regulator range is usable and every reference resolves
    pub fn validate(&self) -> Result<(), ConfigError> {
        let vd_exists = |name: &str| self.voltage_domains.iter().any(|v| v.name == name);
        let pd_exists = |name: &str| self.power_domains.iter().any(|p| p.name == name);

        for vd in &self.voltage_domains {
            if let Some(reg) = &vd.regulator {
                reg.validate()?;
            }
        }
        for pd in &self.power_domains {
            if !vd_exists(&pd.voltage_domain) {
                return Err(ConfigError::UnknownReference {
                    kind: "voltage domain",
                    name: pd.voltage_domain.clone(),
                });
            }
        }
        for clk in &self.clocks {
            if !pd_exists(&clk.power_domain) {
                return Err(ConfigError::UnknownReference {
                    kind: "power domain",
                    name: clk.power_domain.clone(),
                });
            }
            clk.to_table().map_err(|e| ConfigError::InvalidValue {
                key: format!("clock.{}.table", clk.name),
                message: e.to_string(),
            })?;
            clk.to_limit().map_err(|e| ConfigError::InvalidValue {
                key: format!("clock.{}.limit", clk.name),
                message: e.to_string(),
            })?;
        }
        for dep in &self.dependencies {
            for name in [&dep.dependent, &dep.supplier] {
                if !vd_exists(name) {
                    return Err(ConfigError::UnknownReference {
                        kind: "voltage domain",
                        name: name.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn table(pairs: &[(u32, u32)]) -> Vec<FreqVoltConfig> {
    pairs
        .iter()
        .map(|&(khz, mv)| FreqVoltConfig { khz, mv })
        .collect()
}

impl Default for BoardConfig {
    /// Quad-core board with an ARM rail coupled to a logic rail
    fn default() -> Self {
        Self {
            voltage_domains: vec![
                VoltageDomainConfig {
                    name: "vd_arm".to_string(),
                    regulator: Some(RegulatorConfig {
                        name: "vdd_arm".to_string(),
                        min_mv: 850,
                        max_mv: 1400,
                        step_mv: 25,
                        initial_mv: Some(1000),
                        ramp_uv_per_us: Some(12_500),
                    }),
                    suspend_mv: Some(900),
                },
                VoltageDomainConfig {
                    name: "vd_logic".to_string(),
                    regulator: Some(RegulatorConfig {
                        name: "vdd_logic".to_string(),
                        min_mv: 900,
                        max_mv: 1300,
                        step_mv: 25,
                        initial_mv: Some(1100),
                        ramp_uv_per_us: None,
                    }),
                    suspend_mv: Some(1000),
                },
            ],
            power_domains: vec![
                PowerDomainConfig {
                    name: "pd_cpu".to_string(),
                    voltage_domain: "vd_arm".to_string(),
                    on: true,
                },
                PowerDomainConfig {
                    name: "pd_gpu".to_string(),
                    voltage_domain: "vd_logic".to_string(),
                    on: true,
                },
                PowerDomainConfig {
                    name: "pd_ddr".to_string(),
                    voltage_domain: "vd_logic".to_string(),
                    on: true,
                },
            ],
            clocks: vec![
                ClockConfig {
                    name: "cpu".to_string(),
                    power_domain: "pd_cpu".to_string(),
                    rate_khz: 816_000,
                    table: table(&[
                        (312_000, 950),
                        (504_000, 1000),
                        (816_000, 1000),
                        (1_008_000, 1075),
                        (1_200_000, 1150),
                        (1_416_000, 1250),
                        (1_608_000, 1350),
                    ]),
                    limit: None,
                    enabled: true,
                },
                ClockConfig {
                    name: "gpu".to_string(),
                    power_domain: "pd_gpu".to_string(),
                    rate_khz: 266_000,
                    table: table(&[
                        (133_000, 1000),
                        (266_000, 1050),
                        (400_000, 1100),
                        (600_000, 1250),
                    ]),
                    limit: None,
                    enabled: true,
                },
                ClockConfig {
                    name: "ddr".to_string(),
                    power_domain: "pd_ddr".to_string(),
                    rate_khz: 400_000,
                    table: table(&[(200_000, 1050), (300_000, 1050), (400_000, 1100), (533_000, 1150)]),
                    limit: Some(LimitConfig {
                        min_khz: 200_000,
                        max_khz: 533_000,
                    }),
                    enabled: true,
                },
            ],
            dependencies: vec![DependencyConfig {
                dependent: "vd_arm".to_string(),
                supplier: "vd_logic".to_string(),
                max_above_mv: 150,
                max_below_mv: Some(200),
            }],
        }
    }
}
