//! Two-file CSV leg input.
//!
//! `orders.csv`:
//! `order_id,symbol,side,direction,volume,take_profit,stop_loss,opened_at,comment`
//!
//! `executions.csv`:
//! `order_id,price,executed_at,profit`
//!
//! Volumes may use the `executed / requested` form and decimals may use a
//! comma. Timestamps are `YYYY-MM-DD HH:MM[:SS]`, `YYYY.MM.DD HH:MM[:SS]`
//! or ISO-8601 with a `T`; an empty cell means no timestamp.

use crate::domain::error::AuditError;
use crate::domain::leg::{ExecutionLeg, LegDirection, OrderLeg, Side, parse_decimal, parse_volume};
use crate::ports::leg_port::LegPort;
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const TIMESTAMP_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y.%m.%d %H:%M:%S",
    "%Y.%m.%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

#[derive(Debug, Deserialize)]
struct OrderRow {
    order_id: String,
    #[serde(default)]
    symbol: String,
    side: String,
    direction: String,
    #[serde(default)]
    volume: String,
    #[serde(default)]
    take_profit: String,
    #[serde(default)]
    stop_loss: String,
    #[serde(default)]
    opened_at: String,
    #[serde(default)]
    comment: String,
}

#[derive(Debug, Deserialize)]
struct ExecutionRow {
    order_id: String,
    #[serde(default)]
    price: String,
    #[serde(default)]
    executed_at: String,
    #[serde(default)]
    profit: String,
}

pub struct CsvLegAdapter {
    orders_path: PathBuf,
    executions_path: PathBuf,
    source_id: String,
}

impl CsvLegAdapter {
    pub fn new(
        orders_path: impl Into<PathBuf>,
        executions_path: impl Into<PathBuf>,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            orders_path: orders_path.into(),
            executions_path: executions_path.into(),
            source_id: source_id.into(),
        }
    }

    /// Uses the orders file stem as the source id.
    pub fn from_paths(orders_path: impl Into<PathBuf>, executions_path: impl Into<PathBuf>) -> Self {
        let orders_path = orders_path.into();
        let source_id = orders_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| orders_path.display().to_string());
        Self::new(orders_path, executions_path, source_id)
    }

    /// One adapter per (orders, executions) pair. Accounts are named by file
    /// stem unless two stems clash, in which case the clashing accounts use
    /// their full orders path.
    pub fn for_accounts(pairs: &[(PathBuf, PathBuf)]) -> Vec<Self> {
        let mut adapters: Vec<Self> = pairs
            .iter()
            .map(|(o, e)| Self::from_paths(o.clone(), e.clone()))
            .collect();
        let mut seen: HashMap<String, usize> = HashMap::new();
        for adapter in &adapters {
            *seen.entry(adapter.source_id.clone()).or_default() += 1;
        }
        for adapter in &mut adapters {
            if seen[&adapter.source_id] > 1 {
                adapter.source_id = adapter.orders_path.display().to_string();
            }
        }
        adapters
    }

    fn load_error(path: &Path, reason: impl Into<String>) -> AuditError {
        AuditError::LegLoad {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }

    fn reader(path: &Path) -> Result<csv::Reader<std::fs::File>, AuditError> {
        csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(path)
            .map_err(|e| Self::load_error(path, e.to_string()))
    }

    fn order_from_row(&self, row: OrderRow, line: usize) -> Result<OrderLeg, AuditError> {
        let path = self.orders_path.as_path();
        let order_id = parse_order_id(&row.order_id)
            .ok_or_else(|| Self::load_error(path, format!("line {line}: invalid order_id '{}'", row.order_id)))?;
        if row.symbol.is_empty() {
            return Err(AuditError::insufficient(
                &self.source_id,
                format!("order {order_id} has no symbol"),
            ));
        }
        let volume = parse_volume(&row.volume).ok_or_else(|| {
            AuditError::insufficient(
                &self.source_id,
                format!("order {order_id} has no usable volume ('{}')", row.volume),
            )
        })?;
        let side = Side::parse(&row.side)
            .ok_or_else(|| Self::load_error(path, format!("line {line}: invalid side '{}'", row.side)))?;
        let direction = LegDirection::parse(&row.direction).ok_or_else(|| {
            Self::load_error(path, format!("line {line}: invalid direction '{}'", row.direction))
        })?;
        let opened_at = parse_timestamp(&row.opened_at)
            .map_err(|raw| Self::load_error(path, format!("line {line}: invalid opened_at '{raw}'")))?;

        let mut order = OrderLeg {
            source: self.source_id.clone(),
            order_id,
            symbol: row.symbol.to_uppercase(),
            side,
            direction,
            volume,
            take_profit: parse_decimal(&row.take_profit).filter(|p| *p > 0.0),
            stop_loss: parse_decimal(&row.stop_loss).filter(|p| *p > 0.0),
            opened_at,
            comment: row.comment,
        };
        order.apply_comment_targets();
        Ok(order)
    }

    fn execution_from_row(&self, row: ExecutionRow, line: usize) -> Result<ExecutionLeg, AuditError> {
        let path = self.executions_path.as_path();
        let order_id = parse_order_id(&row.order_id)
            .ok_or_else(|| Self::load_error(path, format!("line {line}: invalid order_id '{}'", row.order_id)))?;
        let profit = parse_decimal(&row.profit).ok_or_else(|| {
            AuditError::insufficient(
                &self.source_id,
                format!("execution of order {order_id} has no profit"),
            )
        })?;
        let executed_at = parse_timestamp(&row.executed_at)
            .map_err(|raw| Self::load_error(path, format!("line {line}: invalid executed_at '{raw}'")))?;

        Ok(ExecutionLeg {
            source: self.source_id.clone(),
            order_id,
            price: parse_decimal(&row.price),
            executed_at,
            profit,
        })
    }
}

impl LegPort for CsvLegAdapter {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn load_orders(&self) -> Result<Vec<OrderLeg>, AuditError> {
        let mut rdr = Self::reader(&self.orders_path)?;
        let mut orders = Vec::new();
        for (i, result) in rdr.deserialize::<OrderRow>().enumerate() {
            let line = i + 2;
            let row = result.map_err(|e| {
                Self::load_error(&self.orders_path, format!("line {line}: {e}"))
            })?;
            orders.push(self.order_from_row(row, line)?);
        }
        Ok(orders)
    }

    fn load_executions(&self) -> Result<Vec<ExecutionLeg>, AuditError> {
        let mut rdr = Self::reader(&self.executions_path)?;
        let mut executions = Vec::new();
        for (i, result) in rdr.deserialize::<ExecutionRow>().enumerate() {
            let line = i + 2;
            let row = result.map_err(|e| {
                Self::load_error(&self.executions_path, format!("line {line}: {e}"))
            })?;
            executions.push(self.execution_from_row(row, line)?);
        }
        Ok(executions)
    }
}

fn parse_order_id(raw: &str) -> Option<u64> {
    raw.trim().parse().ok()
}

/// `Ok(None)` for an empty cell, `Err(raw)` when no known format matches.
fn parse_timestamp(raw: &str) -> Result<Option<NaiveDateTime>, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(Some)
        .ok_or_else(|| raw.to_string())
}
