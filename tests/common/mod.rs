#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use tradeaudit::domain::error::AuditError;
use tradeaudit::domain::leg::{ExecutionLeg, LegDirection, OrderLeg, Side};
use tradeaudit::ports::leg_port::LegPort;

/// Minute resolution timestamps in January 2024 (the 1st is a Monday).
pub fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, day)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

pub fn opposite(side: Side) -> Side {
    match side {
        Side::Buy => Side::Sell,
        Side::Sell => Side::Buy,
    }
}

/// Builds one account's order and execution legs.
#[derive(Clone)]
pub struct Account {
    pub source: String,
    pub orders: Vec<OrderLeg>,
    pub executions: Vec<ExecutionLeg>,
}

impl Account {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            orders: Vec::new(),
            executions: Vec::new(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn push(
        mut self,
        id: u64,
        symbol: &str,
        side: Side,
        direction: LegDirection,
        volume: f64,
        price: f64,
        time: Option<NaiveDateTime>,
        opened_at: Option<NaiveDateTime>,
        profit: f64,
    ) -> Self {
        self.orders.push(OrderLeg {
            source: self.source.clone(),
            order_id: id,
            symbol: symbol.to_string(),
            side,
            direction,
            volume,
            take_profit: None,
            stop_loss: None,
            opened_at,
            comment: String::new(),
        });
        self.executions.push(ExecutionLeg {
            source: self.source.clone(),
            order_id: id,
            price: Some(price),
            executed_at: time,
            profit,
        });
        self
    }

    pub fn open(self, id: u64, symbol: &str, side: Side, volume: f64, price: f64, time: NaiveDateTime) -> Self {
        self.push(id, symbol, side, LegDirection::In, volume, price, Some(time), Some(time), 0.0)
    }

    /// A closing leg; `side` is the side of the position being closed.
    #[allow(clippy::too_many_arguments)]
    pub fn close(
        self,
        id: u64,
        symbol: &str,
        side: Side,
        volume: f64,
        price: f64,
        time: NaiveDateTime,
        profit: f64,
    ) -> Self {
        self.push(
            id,
            symbol,
            opposite(side),
            LegDirection::Out,
            volume,
            price,
            Some(time),
            Some(time),
            profit,
        )
    }

    /// Opens at `opened` and closes `minutes` later.
    pub fn round_trip(
        self,
        id: u64,
        symbol: &str,
        side: Side,
        opened: NaiveDateTime,
        minutes: i64,
        profit: f64,
    ) -> Self {
        let closed = opened + chrono::Duration::minutes(minutes);
        self.open(id, symbol, side, 1.0, 1.0, opened)
            .close(id + 1, symbol, side, 1.0, 1.0, closed, profit)
    }

    pub fn into_legs(self) -> (Vec<OrderLeg>, Vec<ExecutionLeg>) {
        (self.orders, self.executions)
    }

    pub fn port(self) -> MockLegPort {
        MockLegPort {
            source: self.source.clone(),
            account: self,
            error: None,
        }
    }
}

pub struct MockLegPort {
    pub source: String,
    pub account: Account,
    pub error: Option<String>,
}

impl MockLegPort {
    pub fn failing(source: &str, reason: &str) -> Self {
        Self {
            source: source.to_string(),
            account: Account::new(source),
            error: Some(reason.to_string()),
        }
    }
}

impl LegPort for MockLegPort {
    fn source_id(&self) -> &str {
        &self.source
    }

    fn load_orders(&self) -> Result<Vec<OrderLeg>, AuditError> {
        if let Some(reason) = &self.error {
            return Err(AuditError::LegLoad {
                path: self.source.clone(),
                reason: reason.clone(),
            });
        }
        Ok(self.account.orders.clone())
    }

    fn load_executions(&self) -> Result<Vec<ExecutionLeg>, AuditError> {
        Ok(self.account.executions.clone())
    }
}
