//! Ledger fixtures shared by the aggregation tests.

use chrono::{NaiveDate, NaiveDateTime};

use super::equity::EquityCalculator;
use super::instrument::InstrumentTable;
use super::leg::{ExecutionLeg, Leg, LegDirection, OrderLeg, Side};
use super::ledger::{LedgerEntry, TradeGroup, build_groups, chronological_order};
use super::normalize::{PipMethod, PipValue};
use super::reconcile::{MatchKey, MatchTier};

pub fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    // 2024-01-01 is a Monday.
    NaiveDate::from_ymd_opt(2024, 1, day)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

struct Draft {
    leg: Leg,
    key: Option<MatchKey>,
    tier: Option<MatchTier>,
    pips: Option<PipValue>,
}

/// Builds a ledger from whole trades without going through reconciliation.
pub struct LedgerBuilder {
    drafts: Vec<Draft>,
    next_id: u64,
}

fn leg(id: u64, symbol: &str, side: Side, direction: LegDirection, time: Option<NaiveDateTime>, profit: f64) -> Leg {
    Leg {
        order: OrderLeg {
            source: "fixture".into(),
            order_id: id,
            symbol: symbol.into(),
            side,
            direction,
            volume: 1.0,
            take_profit: None,
            stop_loss: None,
            opened_at: time,
            comment: String::new(),
        },
        execution: ExecutionLeg {
            source: "fixture".into(),
            order_id: id,
            price: None,
            executed_at: time,
            profit,
        },
    }
}

impl LedgerBuilder {
    pub fn new() -> Self {
        Self {
            drafts: Vec::new(),
            next_id: 1,
        }
    }

    /// One opening and one closing per entry of `exits` (`(time, profit, pips)`).
    pub fn scaled_trade(
        mut self,
        symbol: &str,
        side: Side,
        opened: Option<NaiveDateTime>,
        exits: &[(Option<NaiveDateTime>, f64, f64)],
    ) -> Self {
        let open_id = self.next_id;
        self.next_id += 1;
        let key = MatchKey::new("fixture", symbol, open_id);
        self.drafts.push(Draft {
            leg: leg(open_id, symbol, side, LegDirection::In, opened, 0.0),
            key: Some(key.clone()),
            tier: Some(MatchTier::Opening),
            pips: None,
        });
        for &(time, profit, pips) in exits {
            let id = self.next_id;
            self.next_id += 1;
            let mut closing = leg(id, symbol, side, LegDirection::Out, time, profit);
            // Closing order timestamps sit at the open so ledger order follows the opening.
            closing.order.opened_at = opened;
            self.drafts.push(Draft {
                leg: closing,
                key: Some(key.clone()),
                tier: Some(MatchTier::Accumulated),
                pips: Some(PipValue {
                    value: pips,
                    method: PipMethod::Exact,
                }),
            });
        }
        self
    }

    pub fn trade(
        self,
        symbol: &str,
        side: Side,
        opened: NaiveDateTime,
        closed: NaiveDateTime,
        profit: f64,
        pips: f64,
    ) -> Self {
        self.scaled_trade(symbol, side, Some(opened), &[(Some(closed), profit, pips)])
    }

    pub fn loose_closing(mut self, symbol: &str, time: Option<NaiveDateTime>, profit: f64) -> Self {
        let id = self.next_id;
        self.next_id += 1;
        self.drafts.push(Draft {
            leg: leg(id, symbol, Side::Sell, LegDirection::Out, time, profit),
            key: None,
            tier: None,
            pips: Some(PipValue {
                value: 0.0,
                method: PipMethod::Approximate,
            }),
        });
        self
    }

    pub fn build(self, initial_balance: f64) -> (Vec<LedgerEntry>, Vec<TradeGroup>) {
        let table = InstrumentTable::standard();
        let legs: Vec<Leg> = self.drafts.iter().map(|d| d.leg.clone()).collect();
        let order = chronological_order(&legs);
        let mut calc = EquityCalculator::new(initial_balance).unwrap();
        let mut drafts: Vec<Option<Draft>> = self.drafts.into_iter().map(Some).collect();

        let entries: Vec<LedgerEntry> = order
            .into_iter()
            .map(|i| {
                let d = drafts[i].take().unwrap();
                let pips = d.pips.map_or(0.0, |p| p.value);
                LedgerEntry {
                    class: table.classify(d.leg.symbol()),
                    equity: calc.step(d.leg.profit(), pips),
                    leg: d.leg,
                    match_key: d.key,
                    tier: d.tier,
                    pips: d.pips,
                }
            })
            .collect();
        let groups = build_groups(&entries);
        (entries, groups)
    }
}

fn sample_order(id: u64, symbol: &str, side: Side, direction: LegDirection, volume: f64, hour: u32) -> OrderLeg {
    OrderLeg {
        source: "march.csv".into(),
        order_id: id,
        symbol: symbol.into(),
        side,
        direction,
        volume,
        take_profit: None,
        stop_loss: None,
        opened_at: Some(at(1, hour, 0)),
        comment: String::new(),
    }
}

fn sample_execution(id: u64, price: f64, profit: f64, hour: u32) -> ExecutionLeg {
    ExecutionLeg {
        source: "march.csv".into(),
        order_id: id,
        price: Some(price),
        executed_at: Some(at(1, hour, 0)),
        profit,
    }
}

/// A EURUSD buy scaled out in two legs (+15 pips) and a losing XAUUSD sell (-10 points).
pub fn sample_legs() -> (Vec<OrderLeg>, Vec<ExecutionLeg>) {
    let orders = vec![
        sample_order(1, "EURUSD", Side::Buy, LegDirection::In, 1.0, 8),
        sample_order(2, "EURUSD", Side::Sell, LegDirection::Out, 0.6, 9),
        sample_order(3, "EURUSD", Side::Sell, LegDirection::Out, 0.4, 10),
        sample_order(4, "XAUUSD", Side::Sell, LegDirection::In, 0.1, 11),
        sample_order(5, "XAUUSD", Side::Buy, LegDirection::Out, 0.1, 12),
    ];
    let executions = vec![
        sample_execution(1, 1.10000, 0.0, 8),
        sample_execution(2, 1.10050, 30.0, 9),
        sample_execution(3, 1.10105, 40.0, 10),
        sample_execution(4, 2000.00, 0.0, 11),
        sample_execution(5, 2010.00, -100.0, 12),
    ];
    (orders, executions)
}
