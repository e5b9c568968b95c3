//! Hour / weekday / month breakdowns of closing legs, plus trade durations.

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use super::ledger::{LedgerView, Outcome};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    /// Hour 0-23, weekday 0-6 (Monday first) or month 1-12.
    pub slot: u32,
    /// Trades whose final closing leg settled here.
    pub trades: usize,
    pub profit: f64,
    pub gains: f64,
    /// Positive magnitude.
    pub losses: f64,
    pub take_profits: usize,
    pub stop_losses: usize,
}

impl Bucket {
    fn add_leg(&mut self, profit: f64) {
        self.profit += profit;
        if profit > 0.0 {
            self.gains += profit;
        } else {
            self.losses += -profit;
        }
    }

    fn add_trade(&mut self, outcome: Outcome) {
        self.trades += 1;
        match outcome {
            Outcome::Win => self.take_profits += 1,
            Outcome::Loss => self.stop_losses += 1,
            Outcome::Neutral => {}
        }
    }
}

fn buckets(range: std::ops::Range<u32>) -> Vec<Bucket> {
    range
        .map(|slot| Bucket {
            slot,
            ..Bucket::default()
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalTables {
    pub by_hour: Vec<Bucket>,
    pub by_weekday: Vec<Bucket>,
    pub by_month: Vec<Bucket>,
    /// Trade openings per hour of day.
    pub openings_by_hour: Vec<usize>,
    pub mean_duration_minutes: Option<f64>,
    pub median_duration_minutes: Option<f64>,
    /// Closing legs left out for lack of a timestamp.
    pub untimed_closings: usize,
}

impl TemporalTables {
    fn new() -> Self {
        TemporalTables {
            by_hour: buckets(0..24),
            by_weekday: buckets(0..7),
            by_month: buckets(1..13),
            openings_by_hour: vec![0; 24],
            mean_duration_minutes: None,
            median_duration_minutes: None,
            untimed_closings: 0,
        }
    }

    fn slots(&mut self, at: NaiveDateTime) -> [&mut Bucket; 3] {
        let hour = at.hour() as usize;
        let weekday = at.weekday().num_days_from_monday() as usize;
        let month = at.month0() as usize;
        [
            &mut self.by_hour[hour],
            &mut self.by_weekday[weekday],
            &mut self.by_month[month],
        ]
    }
}

pub fn aggregate(view: &LedgerView<'_>) -> TemporalTables {
    let mut tables = TemporalTables::new();
    let entries = view.entries;

    for entry in view.member_entries().filter(|e| e.leg.is_closing()) {
        match entry.leg.settled_at() {
            Some(at) => {
                for bucket in tables.slots(at) {
                    bucket.add_leg(entry.leg.profit());
                }
            }
            None => tables.untimed_closings += 1,
        }
    }

    let mut durations: Vec<f64> = Vec::new();
    for group in &view.groups {
        if let Some(opened) = group.opened_at(entries) {
            tables.openings_by_hour[opened.hour() as usize] += 1;
        }
        if let Some(closed) = group.closed_at(entries) {
            let outcome = group.outcome();
            for bucket in tables.slots(closed) {
                bucket.add_trade(outcome);
            }
        }
        if let Some(minutes) = group.duration_minutes(entries).filter(|m| *m >= 0.0) {
            durations.push(minutes);
        }
    }

    if tables.untimed_closings > 0 {
        tracing::warn!(
            "{} closing leg(s) without a timestamp left out of time buckets",
            tables.untimed_closings
        );
    }

    tables.mean_duration_minutes = mean(&durations);
    tables.median_duration_minutes = median(&mut durations);
    tables
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::leg::Side;
    use crate::domain::testing::{LedgerBuilder, at};

    #[test]
    fn scaled_exit_counts_once_at_final_leg() {
        let (entries, groups) = LedgerBuilder::new()
            .scaled_trade(
                "EURUSD",
                Side::Buy,
                Some(at(1, 9, 0)),
                &[
                    (Some(at(1, 10, 15)), 30.0, 3.0),
                    (Some(at(1, 14, 45)), -10.0, -1.0),
                ],
            )
            .build(10_000.0);
        let view = LedgerView::full(&entries, &groups);
        let t = aggregate(&view);

        assert_eq!(t.by_hour[10].trades, 0);
        assert_eq!(t.by_hour[10].profit, 30.0);
        assert_eq!(t.by_hour[14].trades, 1);
        assert_eq!(t.by_hour[14].take_profits, 1);
        assert_eq!(t.by_hour[14].profit, -10.0);
        assert_eq!(t.by_hour[14].losses, 10.0);
        assert_eq!(t.by_weekday[0].trades, 1);
        assert_eq!(t.by_month[0].slot, 1);
        assert_eq!(t.by_month[0].gains, 30.0);
        assert_eq!(t.openings_by_hour[9], 1);
    }

    #[test]
    fn durations_mean_and_median() {
        let (entries, groups) = LedgerBuilder::new()
            .trade("EURUSD", Side::Buy, at(1, 9, 0), at(1, 9, 10), 1.0, 1.0)
            .trade("EURUSD", Side::Buy, at(2, 9, 0), at(2, 9, 20), 1.0, 1.0)
            .trade("EURUSD", Side::Buy, at(3, 9, 0), at(3, 10, 30), 1.0, 1.0)
            .build(10_000.0);
        let view = LedgerView::full(&entries, &groups);
        let t = aggregate(&view);

        assert_eq!(t.mean_duration_minutes, Some(40.0));
        assert_eq!(t.median_duration_minutes, Some(20.0));
    }

    #[test]
    fn untimed_closings_are_skipped() {
        let (entries, groups) = LedgerBuilder::new()
            .trade("EURUSD", Side::Buy, at(1, 9, 0), at(1, 10, 0), 5.0, 1.0)
            .loose_closing("GBPUSD", None, 3.0)
            .build(10_000.0);
        let view = LedgerView::full(&entries, &groups);
        let t = aggregate(&view);

        assert_eq!(t.untimed_closings, 1);
        let total: f64 = t.by_hour.iter().map(|b| b.profit).sum();
        assert_eq!(total, 5.0);
    }

    #[test]
    fn empty_view_has_full_tables() {
        let (entries, groups) = LedgerBuilder::new().build(10_000.0);
        let t = aggregate(&LedgerView::full(&entries, &groups));
        assert_eq!(t.by_hour.len(), 24);
        assert_eq!(t.by_weekday.len(), 7);
        assert_eq!(t.by_month.len(), 12);
        assert_eq!(t.mean_duration_minutes, None);
    }
}
