//! Summary scalars and per-symbol / per-class breakdowns.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::instrument::InstrumentClass;
use super::ledger::{LedgerView, Outcome, TradeGroup};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Every trade group, including openings never closed.
    pub operations: usize,
    /// Groups with at least one closing leg.
    pub trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub neutrals: usize,
    /// Percent of decided trades won. Neutrals are left out.
    pub win_rate: f64,
    pub initial_balance: f64,
    pub final_balance: f64,
    pub linear_profit: f64,
    pub compounded_profit: f64,
    pub profit_difference: f64,
    pub return_pct: f64,
    pub total_pips: f64,
    pub average_pips: f64,
    pub pips_lost: f64,
    pub average_pips_lost: f64,
    pub max_drawdown_pct: f64,
    pub max_drawdown_amount: f64,
    pub legs_in_drawdown: usize,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    pub average_win: f64,
    /// Positive magnitude.
    pub average_loss: f64,
    /// Closing legs beyond the first in each trade.
    pub partial_exits: usize,
}

fn ratio(numerator: f64, count: usize) -> f64 {
    if count > 0 {
        numerator / count as f64
    } else {
        0.0
    }
}

impl Summary {
    pub fn compute(view: &LedgerView<'_>, initial_balance: f64) -> Self {
        let mut wins = 0usize;
        let mut losses = 0usize;
        let mut neutrals = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut pips_lost = 0.0_f64;
        let mut partial_exits = 0usize;
        let mut streak = (0usize, 0usize);
        let mut max_streak = (0usize, 0usize);

        let trades: Vec<&TradeGroup> = view.complete_groups().collect();
        for group in &trades {
            partial_exits += group.closings.len() - 1;
            match group.outcome() {
                Outcome::Win => {
                    wins += 1;
                    total_wins += group.profit;
                    streak = (streak.0 + 1, 0);
                }
                Outcome::Loss => {
                    losses += 1;
                    total_losses += group.profit.abs();
                    pips_lost += group.pips;
                    streak = (0, streak.1 + 1);
                }
                Outcome::Neutral => {
                    neutrals += 1;
                    streak = (0, 0);
                }
            }
            max_streak = (max_streak.0.max(streak.0), max_streak.1.max(streak.1));
        }

        let mut linear_profit = 0.0_f64;
        let mut compounded_profit = 0.0_f64;
        let mut total_pips = 0.0_f64;
        let mut max_drawdown_pct = 0.0_f64;
        let mut max_drawdown_amount = 0.0_f64;
        let mut legs_in_drawdown = 0usize;
        let mut final_balance = initial_balance;

        for entry in view.member_entries() {
            linear_profit += entry.leg.profit();
            compounded_profit += entry.equity.compounded_profit;
            total_pips += entry.pip_count();
            max_drawdown_pct = max_drawdown_pct.max(entry.equity.drawdown_pct);
            max_drawdown_amount = max_drawdown_amount.max(entry.equity.drawdown_amount);
            if entry.equity.drawdown_pct > 0.0 {
                legs_in_drawdown += 1;
            }
            final_balance = entry.equity.balance;
        }

        let return_pct = if initial_balance > 0.0 {
            compounded_profit / initial_balance * 100.0
        } else {
            0.0
        };

        Summary {
            operations: view.groups.len(),
            trades: trades.len(),
            wins,
            losses,
            neutrals,
            win_rate: ratio(wins as f64 * 100.0, wins + losses),
            initial_balance,
            final_balance,
            linear_profit,
            compounded_profit,
            profit_difference: compounded_profit - linear_profit,
            return_pct,
            total_pips,
            average_pips: ratio(total_pips, trades.len()),
            pips_lost,
            average_pips_lost: ratio(pips_lost, losses),
            max_drawdown_pct,
            max_drawdown_amount,
            legs_in_drawdown,
            max_consecutive_wins: max_streak.0,
            max_consecutive_losses: max_streak.1,
            average_win: ratio(total_wins, wins),
            average_loss: ratio(total_losses, losses),
            partial_exits,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Breakdown {
    pub trades: usize,
    pub total_profit: f64,
    pub average_profit: f64,
    pub total_pips: f64,
    pub average_pips: f64,
}

impl Breakdown {
    fn add(&mut self, group: &TradeGroup) {
        self.trades += 1;
        self.total_profit += group.profit;
        self.total_pips += group.pips;
        self.average_profit = ratio(self.total_profit, self.trades);
        self.average_pips = ratio(self.total_pips, self.trades);
    }
}

pub fn by_symbol(view: &LedgerView<'_>) -> BTreeMap<String, Breakdown> {
    let mut out: BTreeMap<String, Breakdown> = BTreeMap::new();
    for group in view.complete_groups() {
        out.entry(group.symbol(view.entries).to_string())
            .or_default()
            .add(group);
    }
    out
}

pub fn by_class(view: &LedgerView<'_>) -> BTreeMap<InstrumentClass, Breakdown> {
    let mut out: BTreeMap<InstrumentClass, Breakdown> = BTreeMap::new();
    for group in view.complete_groups() {
        out.entry(group.class(view.entries)).or_default().add(group);
    }
    out
}
