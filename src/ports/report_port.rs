//! Report writing port.

use crate::domain::analysis::{AnalysisResult, Aggregates};
use crate::domain::error::AuditError;

/// Port for writing an analysis somewhere.
pub trait ReportPort {
    /// `aggregates` may come from a filtered view rather than `result.aggregates`.
    fn write(
        &self,
        result: &AnalysisResult,
        aggregates: &Aggregates,
        output_path: &str,
    ) -> Result<(), AuditError>;
}
