//! The full analysis pipeline and its result.
//!
//! join → filter → reconcile → normalize → equity pass → aggregates and
//! pattern mining. Each stage runs once, in order, on the calling thread.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::equity::EquityCalculator;
use super::error::AuditError;
use super::instrument::{InstrumentClass, InstrumentFilter, InstrumentTable};
use super::leg::{ExecutionLeg, Leg, OrderLeg, join_legs};
use super::ledger::{LedgerEntry, LedgerView, TradeGroup, ViewFilter, build_groups, chronological_order};
use super::metrics::{self, Breakdown, Summary};
use super::normalize::normalize;
use super::pattern::{self, PatternConfig, PatternReport};
use super::reconcile::{MatchTier, reconcile};
use super::session::{self, SessionTables};
use super::temporal::{self, TemporalTables};
use crate::ports::progress_port::ProgressPort;

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub initial_balance: f64,
    /// Applied before reconciliation, so it changes matching candidates.
    pub instrument_filter: Option<InstrumentFilter>,
    pub instruments: InstrumentTable,
    pub patterns: PatternConfig,
    /// Applied by callers after the run; see [`AnalysisResult::view`].
    pub view: ViewFilter,
}

impl AnalysisConfig {
    pub fn new(initial_balance: f64) -> Self {
        AnalysisConfig {
            initial_balance,
            instrument_filter: None,
            instruments: InstrumentTable::standard(),
            patterns: PatternConfig::default(),
            view: ViewFilter::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceStats {
    /// Legs that entered reconciliation.
    pub legs: usize,
    /// Distinct trade groups with at least one closing leg.
    pub trades: usize,
    /// Legs dropped by the instrument filter.
    pub excluded: usize,
    pub duplicates: usize,
}

/// Anomalies the run absorbed instead of failing on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataQuality {
    pub accumulated_matches: usize,
    pub one_to_one_matches: usize,
    pub nearest_matches: usize,
    pub unmatched_closings: usize,
    pub approximated_pips: usize,
    pub missing_timestamps: usize,
    pub orphan_executions: usize,
    pub unexecuted_orders: usize,
    pub duplicates: usize,
}

/// Everything recomputed when the ledger is viewed through a filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregates {
    pub summary: Summary,
    pub by_symbol: BTreeMap<String, Breakdown>,
    pub by_class: BTreeMap<InstrumentClass, Breakdown>,
    pub temporal: TemporalTables,
    pub sessions: SessionTables,
}

impl Aggregates {
    pub fn compute(view: &LedgerView<'_>, initial_balance: f64) -> Self {
        Aggregates {
            summary: Summary::compute(view, initial_balance),
            by_symbol: metrics::by_symbol(view),
            by_class: metrics::by_class(view),
            temporal: temporal::aggregate(view),
            sessions: session::aggregate(view),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub initial_balance: f64,
    pub table_version: u32,
    /// Chronological.
    pub entries: Vec<LedgerEntry>,
    pub groups: Vec<TradeGroup>,
    pub aggregates: Aggregates,
    pub patterns: PatternReport,
    pub sources: BTreeMap<String, SourceStats>,
    pub quality: DataQuality,
}

impl AnalysisResult {
    /// Re-aggregates over a subset of the ledger. Equity points are reused as computed.
    pub fn view(&self, filter: &ViewFilter) -> Aggregates {
        let view = LedgerView::filtered(&self.entries, &self.groups, filter);
        Aggregates::compute(&view, self.initial_balance)
    }
}

pub fn run_analysis(
    orders: Vec<OrderLeg>,
    executions: Vec<ExecutionLeg>,
    config: &AnalysisConfig,
    progress: &dyn ProgressPort,
) -> Result<AnalysisResult, AuditError> {
    let mut calc = EquityCalculator::new(config.initial_balance)?;
    let table = &config.instruments;
    let mut quality = DataQuality::default();
    let mut sources: BTreeMap<String, SourceStats> = BTreeMap::new();

    progress.report(5, "joining legs");
    let joined = join_legs(orders, executions)?;
    quality.orphan_executions = joined.orphan_executions;
    quality.unexecuted_orders = joined.unexecuted_orders;
    for (source, count) in &joined.duplicates {
        sources.entry(source.clone()).or_default().duplicates = *count;
        quality.duplicates += count;
    }

    progress.report(20, "classifying instruments");
    let mut legs: Vec<Leg> = Vec::with_capacity(joined.legs.len());
    let mut classes: Vec<InstrumentClass> = Vec::with_capacity(joined.legs.len());
    for mut leg in joined.legs {
        let class = table.classify(leg.symbol());
        let stats = sources.entry(leg.source().to_string()).or_default();
        if config.instrument_filter.is_some_and(|f| !f.accepts(class)) {
            stats.excluded += 1;
            continue;
        }
        stats.legs += 1;
        leg.order.apply_comment_targets();
        legs.push(leg);
        classes.push(class);
    }
    tracing::info!("{} leg(s) entering reconciliation", legs.len());

    progress.report(40, "reconciling");
    let reconciliation = reconcile(&legs);
    let stats = reconciliation.stats;
    quality.accumulated_matches = stats.accumulated;
    quality.one_to_one_matches = stats.one_to_one;
    quality.nearest_matches = stats.nearest;
    quality.unmatched_closings = stats.unmatched_closings;
    if stats.nearest > 0 {
        tracing::warn!("{} closing leg(s) matched by nearest order id", stats.nearest);
    }

    progress.report(55, "normalizing");
    let pips: Vec<_> = legs
        .iter()
        .enumerate()
        .map(|(i, leg)| {
            if !leg.is_closing() {
                return None;
            }
            let opening = reconciliation.matches[i]
                .as_ref()
                .map(|m| &legs[m.opening]);
            Some(normalize(leg, opening, classes[i], table))
        })
        .collect();

    progress.report(70, "computing equity");
    let order = chronological_order(&legs);
    let mut matches = reconciliation.matches;
    let mut slots: Vec<Option<Leg>> = legs.into_iter().map(Some).collect();
    let mut entries: Vec<LedgerEntry> = Vec::with_capacity(order.len());
    for i in order {
        let Some(leg) = slots[i].take() else {
            continue;
        };
        let pip_value = pips[i];
        let step = calc.step(leg.profit(), pip_value.map_or(0.0, |p| p.value));
        let matched = matches[i].take();
        entries.push(LedgerEntry {
            leg,
            class: classes[i],
            match_key: matched.as_ref().map(|m| m.key.clone()),
            tier: matched.map(|m| m.tier),
            pips: pip_value,
            equity: step,
        });
    }

    for entry in &entries {
        if entry.is_approximated() {
            quality.approximated_pips += 1;
        }
        let timed = if entry.leg.is_closing() {
            entry.leg.settled_at().is_some()
        } else {
            entry.leg.opened_at().is_some()
        };
        if !timed {
            quality.missing_timestamps += 1;
        }
    }
    if quality.approximated_pips > 0 {
        tracing::warn!("{} pip value(s) approximated from profit", quality.approximated_pips);
    }
    if quality.missing_timestamps > 0 {
        tracing::warn!("{} leg(s) lack the timestamp needed for time buckets", quality.missing_timestamps);
    }

    let groups = build_groups(&entries);
    let mut complete: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for group in groups.iter().filter(|g| g.is_complete()) {
        complete
            .entry(entries[group.opening].leg.source())
            .or_default()
            .insert(group.key.as_str());
    }
    for (source, keys) in complete {
        sources.entry(source.to_string()).or_default().trades = keys.len();
    }

    progress.report(80, "aggregating");
    let view = LedgerView::full(&entries, &groups);
    let aggregates = Aggregates::compute(&view, config.initial_balance);

    progress.report(90, "mining patterns");
    let patterns = pattern::mine(&view, &config.patterns);

    tracing::info!(
        "analysis complete: {} trades, final balance {:.2}",
        aggregates.summary.trades,
        calc.balance()
    );
    progress.report(100, "done");

    Ok(AnalysisResult {
        initial_balance: config.initial_balance,
        table_version: table.version,
        entries,
        groups,
        aggregates,
        patterns,
        sources,
        quality,
    })
}

/// Whether every trade group holds exactly one opening leg. Always true for
/// ledgers produced by [`run_analysis`].
pub fn groups_are_well_formed(entries: &[LedgerEntry], groups: &[TradeGroup]) -> bool {
    groups.iter().all(|g| {
        let members = entries
            .iter()
            .filter(|e| e.match_key.as_ref() == Some(&g.key));
        let openings = members
            .clone()
            .filter(|e| e.tier == Some(MatchTier::Opening))
            .count();
        openings == 1 && members.count() == g.closings.len() + 1
    })
}
