//! Machine-readable summary of a run: aggregates, patterns and data quality.

use crate::domain::analysis::{Aggregates, AnalysisResult, DataQuality, SourceStats};
use crate::domain::error::AuditError;
use crate::domain::pattern::PatternReport;
use crate::ports::report_port::ReportPort;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Serialize)]
struct SummaryDocument<'a> {
    initial_balance: f64,
    instrument_table_version: u32,
    aggregates: &'a Aggregates,
    patterns: &'a PatternReport,
    sources: &'a BTreeMap<String, SourceStats>,
    data_quality: &'a DataQuality,
}

pub struct JsonSummaryReport;

impl ReportPort for JsonSummaryReport {
    fn write(
        &self,
        result: &AnalysisResult,
        aggregates: &Aggregates,
        output_path: &str,
    ) -> Result<(), AuditError> {
        let doc = SummaryDocument {
            initial_balance: result.initial_balance,
            instrument_table_version: result.table_version,
            aggregates,
            patterns: &result.patterns,
            sources: &result.sources,
            data_quality: &result.quality,
        };

        let path = Path::new(output_path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut out = BufWriter::new(fs::File::create(path)?);
        serde_json::to_writer_pretty(&mut out, &doc).map_err(|e| AuditError::Report {
            reason: format!("{output_path}: {e}"),
        })?;
        out.flush()?;

        tracing::info!("wrote summary to {}", output_path);
        Ok(())
    }
}
