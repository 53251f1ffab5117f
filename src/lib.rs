//! dvfsctl - voltage and frequency scaling engine
//!
//! This library coordinates clock-rate changes with voltage-rail changes
//! across coupled voltage domains, and sequences secondary-CPU power-on
//! through a PMU gate. Hardware is reached only through capability traits;
//! a simulated backend drives the CLI and the integration tests.
//!
//! # Modules
//!
//! - [`cli`]: Command-line interface definitions
//! - [`commands`]: Command handlers
//! - [`config`]: Board configuration
//! - [`domain`]: Domain models with validation
//! - [`dvfs`]: The scaling engine
//! - [`error`]: Error types
//! - [`hw`]: Hardware capability traits and the simulated backend
//! - [`services`]: SMP bring-up and board assembly

pub mod cli;
pub mod commands;
pub mod config;
pub mod domain;
pub mod dvfs;
pub mod error;
pub mod hw;
pub mod services;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use dvfs::Dvfs;
pub use error::{AppError, Result};
