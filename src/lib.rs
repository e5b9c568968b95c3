//! tradeaudit: reconciles broker order and execution exports into a trade
//! ledger and audits it.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod job;
pub mod cli;
