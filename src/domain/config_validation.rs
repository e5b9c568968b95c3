//! Configuration validation and typed config construction.
//!
//! Every field is checked before a run starts.

use crate::domain::analysis::AnalysisConfig;
use crate::domain::error::AuditError;
use crate::domain::instrument::{InstrumentClass, InstrumentFilter, InstrumentTable};
use crate::domain::ledger::ViewFilter;
use crate::domain::leg::parse_decimal;
use crate::domain::pattern::{MIN_PERMUTATIONS, PatternConfig};
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

const ANALYSIS: &str = "analysis";
const PATTERNS: &str = "patterns";
const INSTRUMENTS: &str = "instruments";

pub fn validate_analysis_config(config: &dyn ConfigPort) -> Result<(), AuditError> {
    validate_initial_balance(config)?;
    validate_instrument_filter(config)?;
    validate_dates(config)?;
    validate_patterns(config)?;
    validate_instruments(config)?;
    Ok(())
}

fn validate_initial_balance(config: &dyn ConfigPort) -> Result<(), AuditError> {
    let raw = config
        .get_string(ANALYSIS, "initial_balance")
        .ok_or_else(|| AuditError::ConfigMissing {
            section: ANALYSIS.to_string(),
            key: "initial_balance".to_string(),
        })?;
    let value = parse_decimal(&raw).ok_or_else(|| {
        AuditError::invalid_config(ANALYSIS, "initial_balance", "must be a number")
    })?;
    if !value.is_finite() || value <= 0.0 {
        return Err(AuditError::InvalidInitialBalance { value });
    }
    Ok(())
}

fn validate_instrument_filter(config: &dyn ConfigPort) -> Result<(), AuditError> {
    if let Some(raw) = config.get_string(ANALYSIS, "instrument_filter") {
        if !raw.trim().is_empty() && InstrumentFilter::parse(&raw).is_none() {
            return Err(AuditError::invalid_config(
                ANALYSIS,
                "instrument_filter",
                format!("unknown filter '{}'", raw.trim()),
            ));
        }
    }
    Ok(())
}

fn parse_date(config: &dyn ConfigPort, key: &str) -> Result<Option<NaiveDate>, AuditError> {
    match config.get_string(ANALYSIS, key) {
        Some(raw) if !raw.trim().is_empty() => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                AuditError::invalid_config(ANALYSIS, key, "invalid date format (expected YYYY-MM-DD)")
            }),
        _ => Ok(None),
    }
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), AuditError> {
    let from = parse_date(config, "date_from")?;
    let to = parse_date(config, "date_to")?;
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(AuditError::invalid_config(
                ANALYSIS,
                "date_from",
                "date_from must not be after date_to",
            ));
        }
    }
    Ok(())
}

/// A value that is present must parse; absent keys fall back to defaults.
fn validate_numeric(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    integer: bool,
) -> Result<(), AuditError> {
    let Some(raw) = config.get_string(section, key) else {
        return Ok(());
    };
    let parsed = if integer {
        raw.trim().parse::<i64>().is_ok()
    } else {
        parse_decimal(&raw).is_some()
    };
    if parsed {
        Ok(())
    } else {
        let expected = if integer { "an integer" } else { "a number" };
        Err(AuditError::invalid_config(
            section,
            key,
            format!("'{}' is not {expected}", raw.trim()),
        ))
    }
}

fn validate_fraction(config: &dyn ConfigPort, key: &str, default: f64) -> Result<(), AuditError> {
    let value = config.get_double(PATTERNS, key, default);
    if !(value > 0.0 && value <= 1.0) {
        return Err(AuditError::invalid_config(
            PATTERNS,
            key,
            format!("{key} must be in (0, 1]"),
        ));
    }
    Ok(())
}

fn validate_patterns(config: &dyn ConfigPort) -> Result<(), AuditError> {
    for key in ["min_support", "min_confidence"] {
        validate_numeric(config, PATTERNS, key, false)?;
    }
    for key in ["permutations", "min_observations", "top_k", "seed"] {
        validate_numeric(config, PATTERNS, key, true)?;
    }

    let defaults = PatternConfig::default();
    validate_fraction(config, "min_support", defaults.min_support)?;
    validate_fraction(config, "min_confidence", defaults.min_confidence)?;

    let permutations = config.get_int(PATTERNS, "permutations", defaults.permutations as i64);
    if permutations < MIN_PERMUTATIONS as i64 {
        return Err(AuditError::invalid_config(
            PATTERNS,
            "permutations",
            format!("permutations must be at least {MIN_PERMUTATIONS}"),
        ));
    }
    for key in ["min_observations", "top_k"] {
        if config.get_int(PATTERNS, key, 1) < 1 {
            return Err(AuditError::invalid_config(
                PATTERNS,
                key,
                format!("{key} must be at least 1"),
            ));
        }
    }
    if config.get_int(PATTERNS, "seed", 0) < 0 {
        return Err(AuditError::invalid_config(
            PATTERNS,
            "seed",
            "seed must be non-negative",
        ));
    }
    Ok(())
}

fn validate_instruments(config: &dyn ConfigPort) -> Result<(), AuditError> {
    for class in InstrumentClass::ALL {
        let key = format!("{}_unit_value", class.as_str());
        if config.get_string(INSTRUMENTS, &key).is_some() {
            validate_numeric(config, INSTRUMENTS, &key, false)?;
            let value = config.get_double(INSTRUMENTS, &key, 0.0);
            if value <= 0.0 {
                return Err(AuditError::invalid_config(
                    INSTRUMENTS,
                    &key,
                    format!("{key} must be positive"),
                ));
            }
        }
    }
    Ok(())
}

/// Validates, then builds the typed config.
pub fn build_analysis_config(config: &dyn ConfigPort) -> Result<AnalysisConfig, AuditError> {
    validate_analysis_config(config)?;

    let initial_balance = config.get_double(ANALYSIS, "initial_balance", 0.0);
    let instrument_filter = config
        .get_string(ANALYSIS, "instrument_filter")
        .and_then(|raw| InstrumentFilter::parse(&raw));

    let view = ViewFilter {
        symbols: config
            .get_list(ANALYSIS, "symbols")
            .into_iter()
            .map(|s| s.to_uppercase())
            .collect(),
        date_from: parse_date(config, "date_from")?,
        date_to: parse_date(config, "date_to")?,
    };

    let defaults = PatternConfig::default();
    let patterns = PatternConfig {
        min_support: config.get_double(PATTERNS, "min_support", defaults.min_support),
        min_confidence: config.get_double(PATTERNS, "min_confidence", defaults.min_confidence),
        permutations: config.get_int(PATTERNS, "permutations", defaults.permutations as i64)
            as usize,
        min_observations: config.get_int(
            PATTERNS,
            "min_observations",
            defaults.min_observations as i64,
        ) as usize,
        top_k: config.get_int(PATTERNS, "top_k", defaults.top_k as i64) as usize,
        seed: config.get_int(PATTERNS, "seed", defaults.seed as i64) as u64,
    };

    Ok(AnalysisConfig {
        initial_balance,
        instrument_filter,
        instruments: build_instrument_table(config),
        patterns,
        view,
    })
}

fn build_instrument_table(config: &dyn ConfigPort) -> InstrumentTable {
    let mut table = InstrumentTable::standard();
    for class in InstrumentClass::ALL {
        let keywords = config.get_list(INSTRUMENTS, &format!("{}_keywords", class.as_str()));
        table.add_keywords(class, &keywords);

        let key = format!("{}_unit_value", class.as_str());
        if config.get_string(INSTRUMENTS, &key).is_some() {
            table.set_unit_value(class, config.get_double(INSTRUMENTS, &key, 1.0));
        }
    }
    table
}
