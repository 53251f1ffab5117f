//! Secondary CPU bring-up
//!
//! Each core sits in its own PMU power domain. Cores are powered off during
//! preparation and powered on one at a time when booted.

use crate::error::SmpError;
use crate::hw::{Delay, PowerGate};

use std::sync::Arc;
use std::time::Duration;

/// Core count and gate polling parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmpSettings {
    /// Number of cores
    pub cores: u32,
    /// PMU power domain of core 0; core `n` uses `first_domain + n`
    pub first_domain: u32,
    /// Longest wait for a domain to report its new state
    pub timeout: Duration,
    /// Time between two state polls
    pub poll_interval: Duration,
}

impl Default for SmpSettings {
    fn default() -> Self {
        Self {
            cores: 4,
            first_domain: 0,
            timeout: Duration::from_millis(10),
            poll_interval: Duration::from_micros(10),
        }
    }
}

/// Service powering secondary cores up and down through a PMU gate
pub struct SmpService<G: PowerGate> {
    gate: G,
    settings: SmpSettings,
    delay: Arc<dyn Delay>,
}

impl<G: PowerGate> SmpService<G> {
    /// Create a new SMP service
    pub fn new(gate: G, settings: SmpSettings, delay: Arc<dyn Delay>) -> Self {
        Self {
            gate,
            settings,
            delay,
        }
    }

    /// Get the settings
    pub fn settings(&self) -> &SmpSettings {
        &self.settings
    }

    /// Get the underlying gate
    pub fn gate(&self) -> &G {
        &self.gate
    }

    /// Power off every core except `boot_cpu`
    pub fn prepare_cpus(&mut self, boot_cpu: u32) -> Result<(), SmpError> {
        self.check_cpu(boot_cpu)?;
        for cpu in (0..self.settings.cores).filter(|c| *c != boot_cpu) {
            self.set_power_domain(self.settings.first_domain + cpu, false)?;
        }
        log::info!(
            "Prepared {} cores, cpu{} stays up",
            self.settings.cores,
            boot_cpu
        );
        Ok(())
    }

    /// Power on a secondary core
    pub fn boot_secondary(&mut self, cpu: u32) -> Result<(), SmpError> {
        self.check_cpu(cpu)?;
        self.set_power_domain(self.settings.first_domain + cpu, true)?;
        log::info!("cpu{} powered on", cpu);
        Ok(())
    }

    /// Cores whose power domain currently reports on
    pub fn online_cpus(&self) -> Result<Vec<u32>, SmpError> {
        let mut online = Vec::new();
        for cpu in 0..self.settings.cores {
            if self.gate.is_on(self.settings.first_domain + cpu)? {
                online.push(cpu);
            }
        }
        Ok(online)
    }

    /// Request a power domain state and wait until the gate reports it
    ///
    /// # Errors
    /// Returns `SmpError::Timeout` when the state is not reported within the
    /// configured timeout. The request is not retried.
    pub fn set_power_domain(&mut self, domain: u32, on: bool) -> Result<(), SmpError> {
        self.gate.set_on(domain, on)?;

        let interval = self.settings.poll_interval.max(Duration::from_micros(1));
        let interval_us = u32::try_from(interval.as_micros()).unwrap_or(u32::MAX);
        let mut waited = Duration::ZERO;
        loop {
            if self.gate.is_on(domain)? == on {
                log::debug!("pd{} reports {} after {:?}", domain, on_off(on), waited);
                return Ok(());
            }
            if waited >= self.settings.timeout {
                log::error!("pd{} stuck, wanted {}", domain, on_off(on));
                return Err(SmpError::Timeout { domain, on, waited });
            }
            self.delay.delay_us(interval_us);
            waited += interval;
        }
    }

    fn check_cpu(&self, cpu: u32) -> Result<(), SmpError> {
        if cpu >= self.settings.cores {
            return Err(SmpError::InvalidCpu {
                cpu,
                cores: self.settings.cores,
            });
        }
        Ok(())
    }
}

fn on_off(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDelay, MockGate, RecordedEvent, Recorder};
    use std::sync::atomic::Ordering;

    fn settings() -> SmpSettings {
        SmpSettings {
            cores: 4,
            first_domain: 0,
            timeout: Duration::from_micros(100),
            poll_interval: Duration::from_micros(10),
        }
    }

    #[test]
    fn test_boot_secondary_powers_on_core() {
        let mut smp = SmpService::new(MockGate::new(4), settings(), Arc::new(MockDelay::default()));
        smp.boot_secondary(2).unwrap();
        assert_eq!(smp.online_cpus().unwrap(), vec![2]);
    }

    #[test]
    fn test_boot_secondary_rejects_unknown_cpu() {
        let recorder = Recorder::new();
        let mut smp = SmpService::new(
            MockGate::new(8).with_recorder(recorder.clone()),
            settings(),
            Arc::new(MockDelay::default()),
        );
        assert_eq!(
            smp.boot_secondary(4),
            Err(SmpError::InvalidCpu { cpu: 4, cores: 4 })
        );
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn test_prepare_skips_boot_cpu() {
        let recorder = Recorder::new();
        let mut smp = SmpService::new(
            MockGate::new(4).with_recorder(recorder.clone()),
            settings(),
            Arc::new(MockDelay::default()),
        );
        smp.prepare_cpus(1).unwrap();

        let domains: Vec<u32> = recorder
            .events()
            .into_iter()
            .filter_map(|e| match e {
                RecordedEvent::Gate { domain, on: false } => Some(domain),
                _ => None,
            })
            .collect();
        assert_eq!(domains, vec![0, 2, 3]);
    }

    #[test]
    fn test_stuck_domain_times_out() {
        let gate = MockGate::new(4).with_stuck(3);
        let polls = gate.poll_counter();
        let delay = Arc::new(MockDelay::default());
        let mut smp = SmpService::new(gate, settings(), delay.clone());

        let err = smp.boot_secondary(3).unwrap_err();
        assert_eq!(
            err,
            SmpError::Timeout {
                domain: 3,
                on: true,
                waited: Duration::from_micros(100),
            }
        );
        assert_eq!(polls.load(Ordering::SeqCst), 11);
        assert_eq!(delay.total_us(), 100);
    }

    #[test]
    fn test_first_domain_offset() {
        let settings = SmpSettings {
            first_domain: 4,
            ..settings()
        };
        let mut smp = SmpService::new(MockGate::new(8), settings, Arc::new(MockDelay::default()));
        smp.boot_secondary(1).unwrap();
        assert!(smp.gate().is_on(5).unwrap());
        assert_eq!(smp.online_cpus().unwrap(), vec![1]);
    }
}
