//! Service layer
//!
//! Services wrap the engine and the PMU for the command handlers:
//! secondary CPU bring-up and simulated board assembly.

pub mod board;
pub mod smp;

pub use board::Board;
pub use smp::{SmpService, SmpSettings};
