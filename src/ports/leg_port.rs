//! Source of order and execution legs.

use crate::domain::error::AuditError;
use crate::domain::leg::{ExecutionLeg, OrderLeg};
use std::collections::HashSet;

pub trait LegPort {
    /// Identifier stamped on every leg this port yields.
    fn source_id(&self) -> &str;

    fn load_orders(&self) -> Result<Vec<OrderLeg>, AuditError>;

    fn load_executions(&self) -> Result<Vec<ExecutionLeg>, AuditError>;
}

/// Loads and concatenates legs from several ports, in port order.
///
/// Source ids must be distinct: legs are reconciled per source, so two ports
/// sharing an id would merge into one account.
pub fn load_all(
    ports: &[&dyn LegPort],
) -> Result<(Vec<OrderLeg>, Vec<ExecutionLeg>), AuditError> {
    let mut ids = HashSet::new();
    for port in ports {
        if !ids.insert(port.source_id()) {
            return Err(AuditError::LegLoad {
                path: port.source_id().to_string(),
                reason: "source id is used by more than one account".to_string(),
            });
        }
    }

    let mut orders = Vec::new();
    let mut executions = Vec::new();
    for port in ports {
        let o = port.load_orders()?;
        let e = port.load_executions()?;
        tracing::info!(
            "loaded {} order(s) and {} execution(s) from {}",
            o.len(),
            e.len(),
            port.source_id()
        );
        orders.extend(o);
        executions.extend(e);
    }
    Ok((orders, executions))
}
