//! Concrete adapter implementations for ports.

pub mod csv_leg_adapter;
pub mod csv_ledger_report;
pub mod ini_config_adapter;
pub mod json_summary_report;
