//! Order and execution legs as exported by a broker, and their 1:1 join.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use super::error::AuditError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn parse(value: &str) -> Option<Side> {
        match value.trim().to_lowercase().as_str() {
            "buy" | "b" | "long" => Some(Side::Buy),
            "sell" | "s" | "short" => Some(Side::Sell),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a leg opens (`in`) or closes (`out`) a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegDirection {
    In,
    Out,
}

impl LegDirection {
    pub fn parse(value: &str) -> Option<LegDirection> {
        match value.trim().to_lowercase().as_str() {
            "in" | "open" => Some(LegDirection::In),
            "out" | "close" => Some(LegDirection::Out),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLeg {
    pub source: String,
    pub order_id: u64,
    pub symbol: String,
    pub side: Side,
    pub direction: LegDirection,
    pub volume: f64,
    pub take_profit: Option<f64>,
    pub stop_loss: Option<f64>,
    pub opened_at: Option<NaiveDateTime>,
    pub comment: String,
}

impl OrderLeg {
    /// Fills a missing TP or SL from a `tp <price>` / `sl <price>` comment token.
    pub fn apply_comment_targets(&mut self) {
        match price_from_comment(&self.comment) {
            Some((CommentTag::TakeProfit, price)) if self.take_profit.is_none() => {
                self.take_profit = Some(price)
            }
            Some((CommentTag::StopLoss, price)) if self.stop_loss.is_none() => {
                self.stop_loss = Some(price)
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLeg {
    pub source: String,
    pub order_id: u64,
    pub price: Option<f64>,
    pub executed_at: Option<NaiveDateTime>,
    /// Realized profit, net of fees.
    pub profit: f64,
}

/// An order joined to its execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub order: OrderLeg,
    pub execution: ExecutionLeg,
}

impl Leg {
    pub fn source(&self) -> &str {
        &self.order.source
    }

    pub fn order_id(&self) -> u64 {
        self.order.order_id
    }

    pub fn symbol(&self) -> &str {
        &self.order.symbol
    }

    pub fn volume(&self) -> f64 {
        self.order.volume
    }

    pub fn profit(&self) -> f64 {
        self.execution.profit
    }

    pub fn price(&self) -> Option<f64> {
        self.execution.price
    }

    pub fn is_opening(&self) -> bool {
        self.order.direction == LegDirection::In
    }

    pub fn is_closing(&self) -> bool {
        self.order.direction == LegDirection::Out
    }

    pub fn opened_at(&self) -> Option<NaiveDateTime> {
        self.order.opened_at
    }

    /// Time the leg settled: the execution timestamp, else the order timestamp.
    pub fn settled_at(&self) -> Option<NaiveDateTime> {
        self.execution.executed_at.or(self.order.opened_at)
    }
}

#[derive(Debug, Clone, Default)]
pub struct JoinOutcome {
    pub legs: Vec<Leg>,
    pub orphan_executions: usize,
    pub unexecuted_orders: usize,
    /// Exact duplicate records removed, per source.
    pub duplicates: BTreeMap<String, usize>,
}

/// Joins every order to the execution sharing its (source, order id) key.
///
/// Orders keep their input order. Exact duplicate orders and repeated
/// execution keys are dropped and counted per source.
pub fn join_legs(
    orders: Vec<OrderLeg>,
    executions: Vec<ExecutionLeg>,
) -> Result<JoinOutcome, AuditError> {
    let mut outcome = JoinOutcome::default();

    let mut by_key: HashMap<(String, u64), ExecutionLeg> = HashMap::new();
    for execution in executions {
        if !execution.profit.is_finite() {
            return Err(AuditError::insufficient(
                &execution.source,
                format!("execution {} has no profit", execution.order_id),
            ));
        }
        let key = (execution.source.clone(), execution.order_id);
        if by_key.contains_key(&key) {
            *outcome.duplicates.entry(key.0).or_default() += 1;
            continue;
        }
        by_key.insert(key, execution);
    }

    let mut seen: HashMap<(String, u64), Vec<usize>> = HashMap::new();
    let mut kept: Vec<OrderLeg> = Vec::new();
    for order in orders {
        validate_order(&order)?;
        let same_id = seen
            .entry((order.source.clone(), order.order_id))
            .or_default();
        if same_id.iter().any(|&k| kept[k] == order) {
            *outcome.duplicates.entry(order.source).or_default() += 1;
            continue;
        }
        same_id.push(kept.len());
        kept.push(order);
    }

    for order in kept {
        let key = (order.source.clone(), order.order_id);
        match by_key.remove(&key) {
            Some(execution) => outcome.legs.push(Leg { order, execution }),
            None => {
                tracing::debug!(
                    "order {} in {} has no execution, dropped",
                    order.order_id,
                    order.source
                );
                outcome.unexecuted_orders += 1;
            }
        }
    }

    outcome.orphan_executions = by_key.len();
    if outcome.orphan_executions > 0 {
        tracing::warn!(
            "{} execution(s) without a matching order were dropped",
            outcome.orphan_executions
        );
    }

    Ok(outcome)
}

fn validate_order(order: &OrderLeg) -> Result<(), AuditError> {
    if order.symbol.trim().is_empty() {
        return Err(AuditError::insufficient(
            &order.source,
            format!("order {} has no symbol", order.order_id),
        ));
    }
    if !order.volume.is_finite() || order.volume < 0.0 {
        return Err(AuditError::insufficient(
            &order.source,
            format!("order {} has no usable volume", order.order_id),
        ));
    }
    Ok(())
}

/// Parses a broker volume cell.
///
/// Accepts `"0.56"`, `"0,56"` and the `"executed / requested"` form, in
/// which case the executed part is returned.
pub fn parse_volume(raw: &str) -> Option<f64> {
    let executed = raw.split('/').next()?.trim();
    parse_decimal(executed)
}

/// Parses a decimal that may use a comma separator.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().replace(',', ".");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentTag {
    TakeProfit,
    StopLoss,
}

/// Extracts a `tp <price>` / `sl <price>` token from a free-text comment.
pub fn price_from_comment(comment: &str) -> Option<(CommentTag, f64)> {
    let lower = comment.to_lowercase();
    let bytes = lower.as_bytes();
    for i in 0..bytes.len().saturating_sub(1) {
        let tag = match lower.get(i..i + 2) {
            Some("tp") => CommentTag::TakeProfit,
            Some("sl") => CommentTag::StopLoss,
            _ => continue,
        };
        let rest = &lower[i + 2..];
        let start = match rest.find(|c: char| c.is_ascii_digit()) {
            Some(s) => s,
            None => continue,
        };
        let number: String = rest[start..]
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
            .collect();
        if let Some(price) = parse_decimal(number.trim_end_matches(['.', ','])) {
            return Some((tag, price));
        }
    }
    None
}
