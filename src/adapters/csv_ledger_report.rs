//! Enriched ledger export, one CSV row per reconciled leg.

use crate::domain::analysis::{Aggregates, AnalysisResult};
use crate::domain::error::AuditError;
use crate::domain::ledger::LedgerEntry;
use crate::domain::normalize::PipMethod;
use crate::domain::reconcile::MatchTier;
use crate::ports::report_port::ReportPort;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::fs;
use std::path::Path;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Serialize)]
struct LedgerRow<'a> {
    source: &'a str,
    order_id: u64,
    symbol: &'a str,
    class: &'a str,
    side: &'a str,
    direction: &'a str,
    volume: f64,
    price: Option<f64>,
    opened_at: String,
    executed_at: String,
    profit: String,
    match_key: &'a str,
    tier: &'a str,
    pips: String,
    pip_method: &'a str,
    compounded_profit: String,
    cumulative_profit: String,
    balance: String,
    cumulative_pips: String,
    drawdown_pct: String,
    drawdown_amount: String,
    running_drawdown_pct: String,
}

fn money(value: f64) -> String {
    format!("{value:.2}")
}

fn timestamp(at: Option<NaiveDateTime>) -> String {
    at.map(|t| t.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_default()
}

fn tier_name(tier: Option<MatchTier>) -> &'static str {
    match tier {
        Some(MatchTier::Opening) => "opening",
        Some(MatchTier::Accumulated) => "accumulated",
        Some(MatchTier::OneToOne) => "one_to_one",
        Some(MatchTier::Nearest) => "nearest",
        None => "unmatched",
    }
}

impl<'a> LedgerRow<'a> {
    fn from_entry(entry: &'a LedgerEntry) -> Self {
        let leg = &entry.leg;
        let eq = &entry.equity;
        LedgerRow {
            source: leg.source(),
            order_id: leg.order_id(),
            symbol: leg.symbol(),
            class: entry.class.as_str(),
            side: leg.order.side.as_str(),
            direction: if leg.is_opening() { "in" } else { "out" },
            volume: leg.volume(),
            price: leg.price(),
            opened_at: timestamp(leg.opened_at()),
            executed_at: timestamp(leg.execution.executed_at),
            profit: money(leg.profit()),
            match_key: entry.match_key.as_ref().map_or("", |k| k.as_str()),
            tier: tier_name(entry.tier),
            pips: entry.pips.map(|p| money(p.value)).unwrap_or_default(),
            pip_method: match entry.pips.map(|p| p.method) {
                Some(PipMethod::Exact) => "exact",
                Some(PipMethod::Approximate) => "approximate",
                None => "",
            },
            compounded_profit: money(eq.compounded_profit),
            cumulative_profit: money(eq.cumulative_profit),
            balance: money(eq.balance),
            cumulative_pips: money(eq.cumulative_pips),
            drawdown_pct: money(eq.drawdown_pct),
            drawdown_amount: money(eq.drawdown_amount),
            running_drawdown_pct: money(eq.running_drawdown_pct),
        }
    }
}

/// Writes every ledger entry in chronological order. Numbers are rounded to
/// two decimals here; the ledger itself stays unrounded.
pub struct CsvLedgerReport;

impl ReportPort for CsvLedgerReport {
    fn write(
        &self,
        result: &AnalysisResult,
        _aggregates: &Aggregates,
        output_path: &str,
    ) -> Result<(), AuditError> {
        let path = Path::new(output_path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let report_err = |e: csv::Error| AuditError::Report {
            reason: format!("{output_path}: {e}"),
        };
        let mut wtr = csv::Writer::from_path(path).map_err(report_err)?;
        for entry in &result.entries {
            wtr.serialize(LedgerRow::from_entry(entry)).map_err(report_err)?;
        }
        wtr.flush()?;

        tracing::info!("wrote {} ledger row(s) to {}", result.entries.len(), output_path);
        Ok(())
    }
}
