//! The enriched ledger, its trade groups, and filtered views over both.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::equity::EquityPoint;
use super::instrument::InstrumentClass;
use super::leg::Leg;
use super::normalize::{PipMethod, PipValue};
use super::reconcile::{MatchKey, MatchTier};

/// One reconciled leg with everything derived for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub leg: Leg,
    pub class: InstrumentClass,
    pub match_key: Option<MatchKey>,
    pub tier: Option<MatchTier>,
    /// Set on closing legs only.
    pub pips: Option<PipValue>,
    pub equity: EquityPoint,
}

impl LedgerEntry {
    pub fn pip_count(&self) -> f64 {
        self.pips.map_or(0.0, |p| p.value)
    }

    pub fn is_approximated(&self) -> bool {
        self.pips.is_some_and(|p| p.method == PipMethod::Approximate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Win,
    Loss,
    Neutral,
}

impl Outcome {
    pub fn from_profit(profit: f64) -> Outcome {
        if profit > 0.0 {
            Outcome::Win
        } else if profit < 0.0 {
            Outcome::Loss
        } else {
            Outcome::Neutral
        }
    }
}

/// One opening leg and every closing leg carrying its key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeGroup {
    pub key: MatchKey,
    /// Ledger index of the opening leg.
    pub opening: usize,
    /// Ledger indices of the closing legs, in ledger order.
    pub closings: Vec<usize>,
    /// Raw profit summed over every leg of the group.
    pub profit: f64,
    pub pips: f64,
}

impl TradeGroup {
    pub fn outcome(&self) -> Outcome {
        Outcome::from_profit(self.profit)
    }

    pub fn is_complete(&self) -> bool {
        !self.closings.is_empty()
    }

    /// The closing leg that settled last. Legs without a timestamp lose to
    /// timestamped ones; ties go to the higher order id.
    pub fn final_closing(&self, entries: &[LedgerEntry]) -> Option<usize> {
        self.closings
            .iter()
            .copied()
            .max_by_key(|&i| (entries[i].leg.settled_at(), entries[i].leg.order_id()))
    }

    pub fn opened_at(&self, entries: &[LedgerEntry]) -> Option<NaiveDateTime> {
        entries[self.opening].leg.opened_at()
    }

    pub fn closed_at(&self, entries: &[LedgerEntry]) -> Option<NaiveDateTime> {
        self.final_closing(entries)
            .and_then(|i| entries[i].leg.settled_at())
    }

    /// Minutes from opening to final close, when both ends are timestamped.
    pub fn duration_minutes(&self, entries: &[LedgerEntry]) -> Option<f64> {
        let opened = self.opened_at(entries)?;
        let closed = self.closed_at(entries)?;
        Some((closed - opened).num_seconds() as f64 / 60.0)
    }

    pub fn symbol<'a>(&self, entries: &'a [LedgerEntry]) -> &'a str {
        entries[self.opening].leg.symbol()
    }

    pub fn class(&self, entries: &[LedgerEntry]) -> InstrumentClass {
        entries[self.opening].class
    }
}

/// Ledger order: by opening timestamp, untimed legs last, then source and order id.
pub fn chronological_order(legs: &[Leg]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..legs.len()).collect();
    order.sort_by(|&a, &b| {
        let (la, lb) = (&legs[a], &legs[b]);
        (la.opened_at().is_none(), la.opened_at(), la.source(), la.order_id()).cmp(&(
            lb.opened_at().is_none(),
            lb.opened_at(),
            lb.source(),
            lb.order_id(),
        ))
    });
    order
}

/// Groups ledger entries by match key. Groups come out in the ledger
/// order of their opening leg.
pub fn build_groups(entries: &[LedgerEntry]) -> Vec<TradeGroup> {
    let mut groups: Vec<TradeGroup> = Vec::new();
    let mut by_key: BTreeMap<&MatchKey, usize> = BTreeMap::new();

    for (i, entry) in entries.iter().enumerate() {
        if entry.tier != Some(MatchTier::Opening) {
            continue;
        }
        if let Some(key) = &entry.match_key {
            by_key.insert(key, groups.len());
            groups.push(TradeGroup {
                key: key.clone(),
                opening: i,
                closings: Vec::new(),
                profit: entry.leg.profit(),
                pips: 0.0,
            });
        }
    }

    for (i, entry) in entries.iter().enumerate() {
        if !entry.leg.is_closing() {
            continue;
        }
        let Some(&g) = entry.match_key.as_ref().and_then(|k| by_key.get(k)) else {
            continue;
        };
        let group = &mut groups[g];
        group.closings.push(i);
        group.profit += entry.leg.profit();
        group.pips += entry.pip_count();
    }

    groups
}

/// Post-analysis restriction to a symbol set and an inclusive date range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewFilter {
    /// Empty means every symbol.
    pub symbols: Vec<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl ViewFilter {
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty() && self.date_from.is_none() && self.date_to.is_none()
    }

    pub fn accepts_symbol(&self, symbol: &str) -> bool {
        self.symbols.is_empty() || self.symbols.iter().any(|s| s.eq_ignore_ascii_case(symbol))
    }

    /// Untimed legs only pass when no date bound is set.
    pub fn accepts_time(&self, at: Option<NaiveDateTime>) -> bool {
        if self.date_from.is_none() && self.date_to.is_none() {
            return true;
        }
        let Some(date) = at.map(|t| t.date()) else {
            return false;
        };
        self.date_from.is_none_or(|from| date >= from) && self.date_to.is_none_or(|to| date <= to)
    }
}

/// A selection of the ledger that aggregations run over.
#[derive(Debug, Clone)]
pub struct LedgerView<'a> {
    pub entries: &'a [LedgerEntry],
    pub groups: Vec<&'a TradeGroup>,
    /// Closing legs that belong to no group.
    pub loose: Vec<usize>,
    /// Every selected ledger index, ascending.
    pub members: Vec<usize>,
}

impl<'a> LedgerView<'a> {
    pub fn full(entries: &'a [LedgerEntry], groups: &'a [TradeGroup]) -> Self {
        Self::filtered(entries, groups, &ViewFilter::default())
    }

    /// Groups are selected by their opening leg; loose closings by their own
    /// symbol and settlement time.
    pub fn filtered(
        entries: &'a [LedgerEntry],
        groups: &'a [TradeGroup],
        filter: &ViewFilter,
    ) -> Self {
        let selected: Vec<&TradeGroup> = groups
            .iter()
            .filter(|g| {
                let opening = &entries[g.opening].leg;
                filter.accepts_symbol(opening.symbol()) && filter.accepts_time(opening.settled_at())
            })
            .collect();

        let loose: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.leg.is_closing() && e.match_key.is_none())
            .filter(|(_, e)| {
                filter.accepts_symbol(e.leg.symbol()) && filter.accepts_time(e.leg.settled_at())
            })
            .map(|(i, _)| i)
            .collect();

        let mut members: BTreeSet<usize> = loose.iter().copied().collect();
        for g in &selected {
            members.insert(g.opening);
            members.extend(g.closings.iter().copied());
        }

        LedgerView {
            entries,
            groups: selected,
            loose,
            members: members.into_iter().collect(),
        }
    }

    pub fn member_entries(&self) -> impl Iterator<Item = &'a LedgerEntry> + '_ {
        self.members.iter().map(|&i| &self.entries[i])
    }

    pub fn complete_groups(&self) -> impl Iterator<Item = &'a TradeGroup> + '_ {
        self.groups.iter().copied().filter(|g| g.is_complete())
    }
}
