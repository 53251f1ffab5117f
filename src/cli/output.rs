//! Output formatting utilities
//!
//! Provides table and JSON output formatting for CLI commands.

use crate::cli::args::OutputFormat;
use crate::domain::{FreqVolt, Khz, Millivolts};
use crate::dvfs::{DomainStatus, LinkRole, NodeStatus, ScalingPlan};
use crate::hw::SimEvent;
use serde::Serialize;
use std::io::{self, Write};

/// Format and print output based on the selected format
pub fn print_output<T: Serialize + TableDisplay>(data: &T, format: OutputFormat) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();

    match format {
        OutputFormat::Table => {
            writeln!(handle, "{}", data.to_table())?;
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string());
            writeln!(handle, "{}", json)?;
        }
        OutputFormat::Compact => {
            writeln!(handle, "{}", data.to_compact())?;
        }
    }

    Ok(())
}

/// Trait for types that can be displayed as a table
pub trait TableDisplay {
    /// Format as a table string
    fn to_table(&self) -> String;

    /// Format as a compact single line
    fn to_compact(&self) -> String {
        self.to_table().replace('\n', " | ")
    }
}

fn volt_or_dash(volt: Option<Millivolts>) -> String {
    volt.map_or_else(|| "-".to_string(), |v| v.to_string())
}

impl TableDisplay for DomainStatus {
    fn to_table(&self) -> String {
        let mut output = format!(
            "{} ({})\n  Voltage: {} (requested {})\n",
            self.name,
            self.regulator.as_deref().unwrap_or("no regulator"),
            volt_or_dash(self.voltage),
            volt_or_dash(self.requested)
        );

        if let (Some(min), Some(max)) = (self.min_supported, self.max_supported) {
            output.push_str(&format!("  Range: {} - {}\n", min, max));
        }
        if let Some(volt) = self.suspend_voltage {
            output.push_str(&format!("  Suspend: {}\n", volt));
        }
        if let Some(mode) = self.mode {
            output.push_str(&format!("  Mode: {}\n", mode));
        }
        if let Some(dep) = &self.dependency {
            let relation = match dep.role {
                LinkRole::Dependent => "depends on",
                LinkRole::Supplier => "supplies",
            };
            output.push_str(&format!(
                "  Dependency: {} {} within {}\n",
                relation, dep.partner, dep.coupling
            ));
        }
        for pd in &self.power_domains {
            output.push_str(&format!(
                "  {} [{}]: {}\n",
                pd.name,
                if pd.on { "on" } else { "off" },
                pd.clocks.join(", ")
            ));
        }

        output
    }

    fn to_compact(&self) -> String {
        format!("{}={}", self.name, volt_or_dash(self.voltage))
    }
}

impl TableDisplay for NodeStatus {
    fn to_table(&self) -> String {
        let mut line = format!(
            "{:<8} {:>12} {:>8}  {}/{}",
            self.name, self.set_freq, self.set_volt, self.power_domain, self.voltage_domain
        );
        if !self.enabled {
            line.push_str("  (disabled)");
        }
        if let Some(limit) = self.limit {
            line.push_str(&format!("  limit {}", limit));
        }
        line
    }

    fn to_compact(&self) -> String {
        format!("{}={}@{}", self.name, self.set_freq, self.set_volt)
    }
}

/// Whole-board status
#[derive(Debug, Clone, Serialize)]
pub struct BoardStatus {
    pub domains: Vec<DomainStatus>,
    pub clocks: Vec<NodeStatus>,
    pub cores: u32,
    pub online_cpus: Vec<u32>,
}

impl TableDisplay for BoardStatus {
    fn to_table(&self) -> String {
        let mut output = String::from("Voltage Domains:\n");
        for domain in &self.domains {
            output.push_str(&domain.to_table());
        }

        output.push_str("\nClocks:\n");
        for clock in &self.clocks {
            output.push_str(&format!("  {}\n", clock.to_table()));
        }

        output.push_str(&format!(
            "\nCores online: {:?} of {}",
            self.online_cpus, self.cores
        ));
        output
    }

    fn to_compact(&self) -> String {
        self.domains
            .iter()
            .map(|d| d.to_compact())
            .chain(self.clocks.iter().map(|c| c.to_compact()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Frequency/voltage table of one clock
#[derive(Debug, Clone, Serialize)]
pub struct TableOutput {
    pub node: String,
    pub current: Khz,
    pub entries: Vec<FreqVolt>,
}

impl TableDisplay for TableOutput {
    fn to_table(&self) -> String {
        let mut output = format!("{}\n  Frequency      Voltage\n", self.node);
        output.push_str("  ──────────────────────\n");
        for entry in &self.entries {
            let marker = if entry.freq == self.current { '*' } else { ' ' };
            output.push_str(&format!(
                "{} {:<14} {}\n",
                marker,
                entry.freq.to_string(),
                entry.volt
            ));
        }
        output
    }

    fn to_compact(&self) -> String {
        let entries: Vec<String> = self
            .entries
            .iter()
            .map(|e| format!("{}:{}", e.freq.as_khz(), e.volt.as_mv()))
            .collect();
        format!("{} {}", self.node, entries.join(","))
    }
}

/// Outcome of one rate request
#[derive(Debug, Clone, Serialize)]
pub struct ScaleStep {
    pub node: String,
    pub requested: Khz,
    /// Present in dry-run mode
    pub plan: Option<ScalingPlan>,
    /// Node state after the request
    pub status: Option<NodeStatus>,
    pub error: Option<String>,
}

/// Result of a scale command
#[derive(Debug, Clone, Serialize)]
pub struct ScaleReport {
    pub dry_run: bool,
    pub steps: Vec<ScaleStep>,
    pub domains: Vec<DomainStatus>,
    /// Hardware changes, only with `--trace`
    pub trace: Vec<SimEvent>,
}

impl ScaleReport {
    /// Whether every request succeeded
    pub fn all_ok(&self) -> bool {
        self.steps.iter().all(|s| s.error.is_none())
    }
}

impl TableDisplay for ScaleReport {
    fn to_table(&self) -> String {
        let mut output = String::new();
        for step in &self.steps {
            match (&step.error, &step.plan, &step.status) {
                (Some(err), _, _) => {
                    output.push_str(&format!("✗ {} -> {}: {}\n", step.node, step.requested, err))
                }
                (None, Some(plan), _) => {
                    output.push_str(&format!(
                        "[DRY RUN] {}: {} / {} -> {} / {}\n",
                        plan.node, plan.from_freq, plan.from_volt, plan.to_freq, plan.to_volt
                    ));
                    for domain in &plan.domains {
                        output.push_str(&format!(
                            "    {}: {} -> {}\n",
                            domain.name,
                            volt_or_dash(domain.from),
                            volt_or_dash(domain.to)
                        ));
                    }
                }
                (None, None, Some(status)) => output.push_str(&format!(
                    "✓ {}: {} / {}\n",
                    status.name, status.set_freq, status.set_volt
                )),
                (None, None, None) => {}
            }
        }

        if !self.domains.is_empty() {
            let rails: Vec<String> = self.domains.iter().map(|d| d.to_compact()).collect();
            output.push_str(&format!("Rails: {}\n", rails.join(" ")));
        }

        if !self.trace.is_empty() {
            output.push_str("\nHardware trace:\n");
            for (i, event) in self.trace.iter().enumerate() {
                output.push_str(&format!("  {:>3}. {}\n", i + 1, event));
            }
        }
        output
    }

    fn to_compact(&self) -> String {
        self.steps
            .iter()
            .map(|s| match (&s.error, &s.status) {
                (Some(_), _) => format!("{}:failed", s.node),
                (None, Some(status)) => status.to_compact(),
                (None, None) => format!("{}:{}", s.node, s.requested.as_khz()),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Result of a boot command
#[derive(Debug, Clone, Serialize)]
pub struct BootReport {
    pub boot_cpu: u32,
    pub booted: Vec<u32>,
    pub online_cpus: Vec<u32>,
}

impl TableDisplay for BootReport {
    fn to_table(&self) -> String {
        format!(
            "Boot CPU: {}\n  Powered on: {:?}\n  Online: {:?}",
            self.boot_cpu, self.booted, self.online_cpus
        )
    }

    fn to_compact(&self) -> String {
        format!("online={:?}", self.online_cpus)
    }
}

/// Simple message output
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub message: String,
    pub success: bool,
}

impl TableDisplay for Message {
    fn to_table(&self) -> String {
        if self.success {
            format!("✓ {}", self.message)
        } else {
            format!("✗ {}", self.message)
        }
    }
}
