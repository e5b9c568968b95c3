//! Traits at the edges of the engine.

pub mod config_port;
pub mod leg_port;
pub mod progress_port;
pub mod report_port;
