//! Progress reporting injected into the analysis pipeline.

pub trait ProgressPort {
    fn report(&self, percent: u8, stage: &str);
}

/// Discards every report.
pub struct NoProgress;

impl ProgressPort for NoProgress {
    fn report(&self, _percent: u8, _stage: &str) {}
}
