//! Domain error types.

/// Top-level error type for tradeaudit.
///
/// Only a handful of conditions are hard failures; everything else the
/// engine meets in broker exports is counted in
/// [`DataQuality`](crate::domain::analysis::DataQuality) instead.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("insufficient data in {source_id}: {reason}")]
    InsufficientData { source_id: String, reason: String },

    #[error("initial balance must be positive, got {value}")]
    InvalidInitialBalance { value: f64 },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("failed to load legs from {path}: {reason}")]
    LegLoad { path: String, reason: String },

    #[error("report error: {reason}")]
    Report { reason: String },

    #[error("analysis job failed: {reason}")]
    Job { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AuditError {
    pub fn insufficient(source: &str, reason: impl Into<String>) -> Self {
        AuditError::InsufficientData {
            source_id: source.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_config(section: &str, key: &str, reason: impl Into<String>) -> Self {
        AuditError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&AuditError> for std::process::ExitCode {
    fn from(err: &AuditError) -> Self {
        let code: u8 = match err {
            AuditError::Io(_) => 1,
            AuditError::ConfigParse { .. }
            | AuditError::ConfigMissing { .. }
            | AuditError::ConfigInvalid { .. }
            | AuditError::InvalidInitialBalance { .. } => 2,
            AuditError::LegLoad { .. } => 3,
            AuditError::Report { .. } | AuditError::Job { .. } => 4,
            AuditError::InsufficientData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
