//! Core engine: pure computation over in-memory legs.

pub mod analysis;
pub mod config_validation;
pub mod equity;
pub mod error;
pub mod instrument;
pub mod leg;
pub mod ledger;
pub mod metrics;
pub mod normalize;
pub mod pattern;
pub mod reconcile;
pub mod session;
pub mod temporal;

#[cfg(test)]
pub(crate) mod testing;
