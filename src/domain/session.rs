//! Trading-session breakdowns, globally and per symbol.

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::ledger::{LedgerView, Outcome};

/// Fixed UTC hour ranges: Asia 0-7, Europe 8-15, Americas 16-23.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Session {
    Asia,
    Europe,
    Americas,
}

impl Session {
    pub const ALL: [Session; 3] = [Session::Asia, Session::Europe, Session::Americas];

    pub fn from_hour(hour: u32) -> Session {
        match hour {
            0..=7 => Session::Asia,
            8..=15 => Session::Europe,
            _ => Session::Americas,
        }
    }

    pub fn of(at: NaiveDateTime) -> Session {
        Self::from_hour(at.hour())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Session::Asia => "asia",
            Session::Europe => "europe",
            Session::Americas => "americas",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub session: Session,
    /// Trades opened in this session.
    pub openings: usize,
    pub wins: usize,
    pub losses: usize,
    /// Percent of decided trades opened here that ended in profit.
    pub win_rate: f64,
    /// Profit of closing legs settled in this session.
    pub closing_profit: f64,
    pub take_profits: usize,
    pub stop_losses: usize,
}

impl SessionStats {
    fn new(session: Session) -> Self {
        SessionStats {
            session,
            openings: 0,
            wins: 0,
            losses: 0,
            win_rate: 0.0,
            closing_profit: 0.0,
            take_profits: 0,
            stop_losses: 0,
        }
    }

    fn finish(&mut self) {
        let decided = self.wins + self.losses;
        self.win_rate = if decided > 0 {
            self.wins as f64 / decided as f64 * 100.0
        } else {
            0.0
        };
    }
}

fn table() -> Vec<SessionStats> {
    Session::ALL.into_iter().map(SessionStats::new).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionTables {
    pub global: Vec<SessionStats>,
    pub by_symbol: BTreeMap<String, Vec<SessionStats>>,
}

pub fn aggregate(view: &LedgerView<'_>) -> SessionTables {
    let entries = view.entries;
    let mut global = table();
    let mut by_symbol: BTreeMap<String, Vec<SessionStats>> = BTreeMap::new();

    for entry in view.member_entries().filter(|e| e.leg.is_closing()) {
        if let Some(at) = entry.leg.settled_at() {
            let s = Session::of(at).index();
            let symbol = by_symbol
                .entry(entry.leg.symbol().to_string())
                .or_insert_with(table);
            global[s].closing_profit += entry.leg.profit();
            symbol[s].closing_profit += entry.leg.profit();
        }
    }

    for group in &view.groups {
        let symbol = by_symbol
            .entry(group.symbol(entries).to_string())
            .or_insert_with(table);
        let outcome = group.outcome();

        if let Some(opened) = group.opened_at(entries) {
            let s = Session::of(opened).index();
            for stats in [&mut global[s], &mut symbol[s]] {
                stats.openings += 1;
                if group.is_complete() {
                    match outcome {
                        Outcome::Win => stats.wins += 1,
                        Outcome::Loss => stats.losses += 1,
                        Outcome::Neutral => {}
                    }
                }
            }
        }

        if let Some(closed) = group.closed_at(entries) {
            let s = Session::of(closed).index();
            for stats in [&mut global[s], &mut symbol[s]] {
                match outcome {
                    Outcome::Win => stats.take_profits += 1,
                    Outcome::Loss => stats.stop_losses += 1,
                    Outcome::Neutral => {}
                }
            }
        }
    }

    global.iter_mut().for_each(SessionStats::finish);
    by_symbol
        .values_mut()
        .flat_map(|t| t.iter_mut())
        .for_each(SessionStats::finish);

    SessionTables { global, by_symbol }
}
