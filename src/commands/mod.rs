//! Command handlers
//!
//! Each command handler builds the simulated board from configuration and
//! orchestrates the execution of one CLI command.

pub mod board;
pub mod boot;
pub mod scale;
pub mod status;
pub mod table;

pub use board::run_board;
pub use boot::run_boot;
pub use scale::run_scale;
pub use status::run_status;
pub use table::run_table;
