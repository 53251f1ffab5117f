//! Hardware abstraction layer
//!
//! Capability traits the engine calls into, plus a simulated backend used by
//! the CLI and the integration tests.

pub mod sim;
pub mod traits;

pub use sim::{SimClock, SimEvent, SimPmu, SimRegulator, SimTrace};
pub use traits::{ClockRate, Delay, DirectTarget, DvfsTarget, PowerGate, Regulator, StdDelay};
