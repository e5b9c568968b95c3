//! Behavioral pattern mining over trade groups.
//!
//! Every complete, timed trade is described by four categorical features. Itemsets
//! of one to three features that are frequent enough and lean towards take
//! profit or stop loss become rules. A rule's link to the outcome is tested
//! by shuffling outcome labels across trades, and the resulting p-values are
//! corrected with Benjamini-Hochberg.

use chrono::Timelike;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use super::leg::Side;
use super::ledger::{LedgerEntry, LedgerView, Outcome, TradeGroup};
use super::session::Session;

pub const MIN_PERMUTATIONS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HourBucket {
    #[serde(rename = "00-04")]
    Night,
    #[serde(rename = "05-09")]
    Morning,
    #[serde(rename = "10-14")]
    Midday,
    #[serde(rename = "15-19")]
    Afternoon,
    #[serde(rename = "20-23")]
    Evening,
}

impl HourBucket {
    pub fn from_hour(hour: u32) -> HourBucket {
        match hour {
            0..=4 => HourBucket::Night,
            5..=9 => HourBucket::Morning,
            10..=14 => HourBucket::Midday,
            15..=19 => HourBucket::Afternoon,
            _ => HourBucket::Evening,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            HourBucket::Night => "00-04",
            HourBucket::Morning => "05-09",
            HourBucket::Midday => "10-14",
            HourBucket::Afternoon => "15-19",
            HourBucket::Evening => "20-23",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DurationBucket {
    #[serde(rename = "<30m")]
    UnderHalfHour,
    #[serde(rename = "30-120m")]
    UpToTwoHours,
    #[serde(rename = "2-6h")]
    UpToSixHours,
    #[serde(rename = "6-12h")]
    UpToTwelveHours,
    #[serde(rename = "12-24h")]
    UpToADay,
    #[serde(rename = ">24h")]
    OverADay,
}

impl DurationBucket {
    pub fn from_minutes(minutes: f64) -> DurationBucket {
        if minutes < 30.0 {
            DurationBucket::UnderHalfHour
        } else if minutes < 120.0 {
            DurationBucket::UpToTwoHours
        } else if minutes < 360.0 {
            DurationBucket::UpToSixHours
        } else if minutes < 720.0 {
            DurationBucket::UpToTwelveHours
        } else if minutes < 1440.0 {
            DurationBucket::UpToADay
        } else {
            DurationBucket::OverADay
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DurationBucket::UnderHalfHour => "<30m",
            DurationBucket::UpToTwoHours => "30-120m",
            DurationBucket::UpToSixHours => "2-6h",
            DurationBucket::UpToTwelveHours => "6-12h",
            DurationBucket::UpToADay => "12-24h",
            DurationBucket::OverADay => ">24h",
        }
    }
}

/// A categorical predicate on a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Item {
    Direction(Side),
    Session(Session),
    Hour(HourBucket),
    Duration(DurationBucket),
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Direction(side) => write!(f, "direction={side}"),
            Item::Session(session) => write!(f, "session={session}"),
            Item::Hour(bucket) => write!(f, "hour={}", bucket.label()),
            Item::Duration(bucket) => write!(f, "duration={}", bucket.label()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    TakeProfit,
    StopLoss,
}

impl Target {
    fn outcome(self) -> Outcome {
        match self {
            Target::TakeProfit => Outcome::Win,
            Target::StopLoss => Outcome::Loss,
        }
    }

    /// Neutral trades reach neither target.
    fn hit(self, outcome: Outcome) -> bool {
        outcome == self.outcome()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternConfig {
    pub min_support: f64,
    pub min_confidence: f64,
    pub permutations: usize,
    /// Rules matching fewer trades are reported with p = 1, untested.
    pub min_observations: usize,
    pub top_k: usize,
    pub seed: u64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        PatternConfig {
            min_support: 0.03,
            min_confidence: 0.55,
            permutations: MIN_PERMUTATIONS,
            min_observations: 10,
            top_k: 10,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRule {
    pub items: Vec<Item>,
    pub target: Target,
    /// Trades matching every item.
    pub count: usize,
    /// Matching trades that reached the target.
    pub hits: usize,
    pub support: f64,
    pub confidence: f64,
    pub lift: f64,
    pub p_value: f64,
    pub q_value: f64,
    pub tested: bool,
}

impl PatternRule {
    pub fn describe(&self) -> String {
        self.items
            .iter()
            .map(Item::to_string)
            .collect::<Vec<_>>()
            .join(" & ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternReport {
    /// Complete trades with all four features, neutral ones included.
    pub population: usize,
    pub baseline_take_profit: f64,
    pub baseline_stop_loss: f64,
    pub permutations: usize,
    pub seed: u64,
    /// Rules that passed the support and confidence thresholds.
    pub candidates: usize,
    pub take_profit: Vec<PatternRule>,
    pub stop_loss: Vec<PatternRule>,
}

/// The four features of a complete, fully timed trade.
pub fn features(group: &TradeGroup, entries: &[LedgerEntry]) -> Option<[Item; 4]> {
    if !group.is_complete() {
        return None;
    }
    let opened = group.opened_at(entries)?;
    let minutes = group.duration_minutes(entries).filter(|m| *m >= 0.0)?;
    Some([
        Item::Direction(entries[group.opening].leg.order.side),
        Item::Session(Session::of(opened)),
        Item::Hour(HourBucket::from_hour(opened.hour())),
        Item::Duration(DurationBucket::from_minutes(minutes)),
    ])
}

/// Every subset of one to three items, kept in feature order.
fn itemsets(row: &[Item; 4]) -> impl Iterator<Item = Vec<Item>> + '_ {
    (1u8..15).filter(|mask| mask.count_ones() <= 3).map(move |mask| {
        (0..4)
            .filter(|bit| mask & (1 << bit) != 0)
            .map(|bit| row[bit])
            .collect()
    })
}

pub fn mine(view: &LedgerView<'_>, config: &PatternConfig) -> PatternReport {
    let mut rows: Vec<[Item; 4]> = Vec::new();
    let mut outcomes: Vec<Outcome> = Vec::new();
    for group in &view.groups {
        if let Some(row) = features(group, view.entries) {
            rows.push(row);
            outcomes.push(group.outcome());
        }
    }

    let population = rows.len();
    let mut report = PatternReport {
        population,
        baseline_take_profit: 0.0,
        baseline_stop_loss: 0.0,
        permutations: config.permutations,
        seed: config.seed,
        candidates: 0,
        take_profit: Vec::new(),
        stop_loss: Vec::new(),
    };
    if population == 0 {
        return report;
    }

    let rate = |target: Target| {
        outcomes.iter().filter(|o| target.hit(**o)).count() as f64 / population as f64
    };
    report.baseline_take_profit = rate(Target::TakeProfit);
    report.baseline_stop_loss = rate(Target::StopLoss);

    let mut occurrences: BTreeMap<Vec<Item>, Vec<usize>> = BTreeMap::new();
    for (r, row) in rows.iter().enumerate() {
        for set in itemsets(row) {
            occurrences.entry(set).or_default().push(r);
        }
    }

    let shuffles = permuted_labels(&outcomes, config.permutations, config.seed);

    let mut rules: Vec<PatternRule> = Vec::new();
    for (items, matched) in &occurrences {
        let count = matched.len();
        let support = count as f64 / population as f64;
        if support < config.min_support {
            continue;
        }
        for (target, baseline) in [
            (Target::TakeProfit, report.baseline_take_profit),
            (Target::StopLoss, report.baseline_stop_loss),
        ] {
            let hits = matched.iter().filter(|&&r| target.hit(outcomes[r])).count();
            let confidence = hits as f64 / count as f64;
            if confidence < config.min_confidence || baseline <= 0.0 {
                continue;
            }

            let tested = count >= config.min_observations;
            let p_value = if tested {
                permutation_p_value(matched, hits, target, &shuffles)
            } else {
                1.0
            };

            rules.push(PatternRule {
                items: items.clone(),
                target,
                count,
                hits,
                support,
                confidence,
                lift: confidence / baseline,
                p_value,
                q_value: 1.0,
                tested,
            });
        }
    }

    report.candidates = rules.len();
    benjamini_hochberg(&mut rules);
    rules.sort_by(rank);

    for rule in rules {
        let list = match rule.target {
            Target::TakeProfit => &mut report.take_profit,
            Target::StopLoss => &mut report.stop_loss,
        };
        if list.len() < config.top_k {
            list.push(rule);
        }
    }

    tracing::info!(
        "mined {} candidate rule(s) over {} trades",
        report.candidates,
        population
    );
    report
}

/// Shuffled copies of the outcome labels, shared by every rule.
fn permuted_labels(outcomes: &[Outcome], reps: usize, seed: u64) -> Vec<Vec<Outcome>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut labels = outcomes.to_vec();
    (0..reps)
        .map(|_| {
            labels.shuffle(&mut rng);
            labels.clone()
        })
        .collect()
}

/// `(shuffles at least as confident as observed + 1) / (shuffles + 1)`.
///
/// The denominator of the confidence is the same under every shuffle, so
/// hit counts are compared directly.
fn permutation_p_value(
    matched: &[usize],
    hits: usize,
    target: Target,
    shuffles: &[Vec<Outcome>],
) -> f64 {
    let extreme = shuffles
        .iter()
        .filter(|labels| {
            let permuted = matched.iter().filter(|&&r| target.hit(labels[r])).count();
            permuted >= hits
        })
        .count();
    (extreme + 1) as f64 / (shuffles.len() + 1) as f64
}

/// Step-up false discovery rate adjustment over every rule at once.
pub fn benjamini_hochberg(rules: &mut [PatternRule]) {
    let m = rules.len();
    if m == 0 {
        return;
    }
    let mut order: Vec<usize> = (0..m).collect();
    order.sort_by(|&a, &b| rules[a].p_value.total_cmp(&rules[b].p_value));

    let mut running = 1.0_f64;
    for rank in (0..m).rev() {
        let i = order[rank];
        let adjusted = rules[i].p_value * m as f64 / (rank + 1) as f64;
        running = running.min(adjusted);
        rules[i].q_value = running.min(1.0);
    }
}

fn rank(a: &PatternRule, b: &PatternRule) -> Ordering {
    a.p_value
        .total_cmp(&b.p_value)
        .then(a.q_value.total_cmp(&b.q_value))
        .then(b.lift.total_cmp(&a.lift))
        .then(b.support.total_cmp(&a.support))
        .then_with(|| a.items.cmp(&b.items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::testing::{LedgerBuilder, at};

    fn rule(p: f64) -> PatternRule {
        PatternRule {
            items: vec![Item::Direction(Side::Buy)],
            target: Target::TakeProfit,
            count: 10,
            hits: 6,
            support: 0.5,
            confidence: 0.6,
            lift: 1.0,
            p_value: p,
            q_value: 1.0,
            tested: true,
        }
    }

    #[test]
    fn bucket_boundaries() {
        assert_eq!(HourBucket::from_hour(4), HourBucket::Night);
        assert_eq!(HourBucket::from_hour(5), HourBucket::Morning);
        assert_eq!(HourBucket::from_hour(14), HourBucket::Midday);
        assert_eq!(HourBucket::from_hour(19), HourBucket::Afternoon);
        assert_eq!(HourBucket::from_hour(23), HourBucket::Evening);
        assert_eq!(DurationBucket::from_minutes(29.9), DurationBucket::UnderHalfHour);
        assert_eq!(DurationBucket::from_minutes(30.0), DurationBucket::UpToTwoHours);
        assert_eq!(DurationBucket::from_minutes(120.0), DurationBucket::UpToSixHours);
        assert_eq!(DurationBucket::from_minutes(719.0), DurationBucket::UpToTwelveHours);
        assert_eq!(DurationBucket::from_minutes(1000.0), DurationBucket::UpToADay);
        assert_eq!(DurationBucket::from_minutes(1440.0), DurationBucket::OverADay);
    }

    #[test]
    fn fourteen_itemsets_per_trade() {
        let row = [
            Item::Direction(Side::Buy),
            Item::Session(Session::Asia),
            Item::Hour(HourBucket::Night),
            Item::Duration(DurationBucket::UnderHalfHour),
        ];
        let sets: Vec<Vec<Item>> = itemsets(&row).collect();
        assert_eq!(sets.len(), 14);
        assert!(sets.iter().all(|s| (1..=3).contains(&s.len())));
    }

    #[test]
    fn item_display() {
        assert_eq!(Item::Direction(Side::Sell).to_string(), "direction=sell");
        assert_eq!(Item::Hour(HourBucket::Midday).to_string(), "hour=10-14");
        assert_eq!(Item::Duration(DurationBucket::OverADay).to_string(), "duration=>24h");
    }

    #[test]
    fn bh_adjusts_and_stays_monotone() {
        let mut rules = vec![rule(0.01), rule(0.04), rule(0.03), rule(1.0)];
        benjamini_hochberg(&mut rules);
        // Sorted p: 0.01, 0.03, 0.04, 1.0 with m = 4.
        assert!((rules[0].q_value - 0.04).abs() < 1e-12);
        assert!((rules[2].q_value - 0.0533333333333).abs() < 1e-9);
        assert!((rules[1].q_value - 0.0533333333333).abs() < 1e-9);
        assert_eq!(rules[3].q_value, 1.0);
    }

    #[test]
    fn small_rules_are_untested() {
        let mut b = LedgerBuilder::new();
        for day in 1..=4 {
            b = b.trade("EURUSD", Side::Buy, at(day, 9, 0), at(day, 9, 10), 10.0, 1.0);
        }
        b = b.trade("EURUSD", Side::Sell, at(5, 20, 0), at(6, 21, 0), -10.0, -1.0);
        let (entries, groups) = b.build(10_000.0);
        let report = mine(&LedgerView::full(&entries, &groups), &PatternConfig::default());

        assert_eq!(report.population, 5);
        assert!((report.baseline_take_profit - 0.8).abs() < 1e-12);
        assert!(!report.take_profit.is_empty());
        assert!(report.take_profit.iter().all(|r| !r.tested && r.p_value == 1.0));
    }

    #[test]
    fn support_and_lift_are_exact() {
        let mut b = LedgerBuilder::new();
        for day in 1..=10 {
            let profit = if day % 2 == 0 { 5.0 } else { -5.0 };
            b = b.trade("EURUSD", Side::Buy, at(day, 9, 0), at(day, 9, 10), profit, 1.0);
        }
        let (entries, groups) = b.build(10_000.0);
        let config = PatternConfig {
            min_confidence: 0.5,
            ..PatternConfig::default()
        };
        let report = mine(&LedgerView::full(&entries, &groups), &config);

        let rule = report
            .take_profit
            .iter()
            .find(|r| r.items == vec![Item::Direction(Side::Buy)])
            .unwrap();
        assert_eq!(rule.support, 1.0);
        assert_eq!(rule.confidence, 0.5);
        assert_eq!(rule.lift, 1.0);
        assert!(report.take_profit.iter().all(|r| r.support <= 1.0));
    }

    #[test]
    fn strong_pattern_is_significant_and_reproducible() {
        let mut b = LedgerBuilder::new();
        for i in 0..20 {
            let day = i + 1;
            b = b.trade("EURUSD", Side::Buy, at(day, 9, 0), at(day, 9, 10), 10.0, 1.0);
            b = b.trade("EURUSD", Side::Sell, at(day, 21, 0), at(day + 1, 22, 0), -10.0, -1.0);
        }
        let (entries, groups) = b.build(10_000.0);
        let view = LedgerView::full(&entries, &groups);
        let config = PatternConfig::default();

        let first = mine(&view, &config);
        let second = mine(&view, &config);
        assert_eq!(first, second);

        let top = &first.take_profit[0];
        assert_eq!(top.confidence, 1.0);
        assert!(top.tested);
        assert!(top.p_value < 0.01);
        assert!(top.q_value < 0.05);
        assert!(first.take_profit.len() <= config.top_k);
        assert_eq!(first.stop_loss[0].confidence, 1.0);
    }

    #[test]
    fn neutral_trades_count_in_support_but_reach_no_target() {
        let mut b = LedgerBuilder::new();
        for day in 1..=10 {
            let profit = match day {
                1..=4 => 10.0,
                5 | 6 => -10.0,
                _ => 0.0,
            };
            b = b.trade("EURUSD", Side::Buy, at(day, 9, 0), at(day, 9, 10), profit, 1.0);
        }
        let (entries, groups) = b.build(10_000.0);
        let config = PatternConfig {
            min_confidence: 0.2,
            ..PatternConfig::default()
        };
        let report = mine(&LedgerView::full(&entries, &groups), &config);

        assert_eq!(report.population, 10);
        assert!((report.baseline_take_profit - 0.4).abs() < 1e-12);
        assert!((report.baseline_stop_loss - 0.2).abs() < 1e-12);

        let buy = vec![Item::Direction(Side::Buy)];
        let tp = report.take_profit.iter().find(|r| r.items == buy).unwrap();
        assert_eq!(tp.count, 10);
        assert_eq!(tp.hits, 4);
        assert!((tp.support - 1.0).abs() < 1e-12);
        assert!((tp.confidence - 0.4).abs() < 1e-12);

        let sl = report.stop_loss.iter().find(|r| r.items == buy).unwrap();
        assert_eq!(sl.hits, 2);
        assert!((sl.confidence - 0.2).abs() < 1e-12);
    }
}
