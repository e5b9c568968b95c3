//! Compounded equity curve and drawdown.

use serde::{Deserialize, Serialize};

use super::error::AuditError;

/// Running-drawdown decay applied on a profitable leg.
const RUNNING_DRAWDOWN_DECAY: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    /// This leg's profit rebased on the balance before it.
    pub compounded_profit: f64,
    pub cumulative_profit: f64,
    pub balance: f64,
    pub cumulative_pips: f64,
    pub drawdown_pct: f64,
    pub drawdown_amount: f64,
    pub running_drawdown_pct: f64,
}

/// Single forward pass over a chronologically sorted ledger.
#[derive(Debug, Clone)]
pub struct EquityCalculator {
    initial_balance: f64,
    balance: f64,
    peak: f64,
    cumulative_profit: f64,
    cumulative_pips: f64,
    running_drawdown: f64,
}

impl EquityCalculator {
    pub fn new(initial_balance: f64) -> Result<Self, AuditError> {
        if !initial_balance.is_finite() || initial_balance <= 0.0 {
            return Err(AuditError::InvalidInitialBalance {
                value: initial_balance,
            });
        }
        Ok(Self {
            initial_balance,
            balance: initial_balance,
            peak: initial_balance,
            cumulative_profit: 0.0,
            cumulative_pips: 0.0,
            running_drawdown: 0.0,
        })
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    /// Advances the curve by one leg.
    ///
    /// The leg's return is measured against the initial balance and then
    /// applied to the current one.
    pub fn step(&mut self, profit: f64, pips: f64) -> EquityPoint {
        let return_pct = profit / self.initial_balance * 100.0;
        let compounded = return_pct / 100.0 * self.balance;

        self.balance += compounded;
        self.cumulative_profit += compounded;
        self.cumulative_pips += pips;
        self.peak = self.peak.max(self.balance);

        let (drawdown_pct, drawdown_amount) = if self.balance < self.peak {
            let amount = self.peak - self.balance;
            (amount / self.peak * 100.0, amount)
        } else {
            (0.0, 0.0)
        };

        if drawdown_pct > self.running_drawdown {
            self.running_drawdown = drawdown_pct;
        } else if profit > 0.0 {
            self.running_drawdown =
                drawdown_pct.max(self.running_drawdown * RUNNING_DRAWDOWN_DECAY);
        }

        EquityPoint {
            compounded_profit: compounded,
            cumulative_profit: self.cumulative_profit,
            balance: self.balance,
            cumulative_pips: self.cumulative_pips,
            drawdown_pct,
            drawdown_amount,
            running_drawdown_pct: self.running_drawdown,
        }
    }
}

/// Runs the calculator over `(profit, pips)` pairs already in chronological order.
pub fn equity_curve(
    initial_balance: f64,
    legs: impl IntoIterator<Item = (f64, f64)>,
) -> Result<Vec<EquityPoint>, AuditError> {
    let mut calc = EquityCalculator::new(initial_balance)?;
    Ok(legs
        .into_iter()
        .map(|(profit, pips)| calc.step(profit, pips))
        .collect())
}
