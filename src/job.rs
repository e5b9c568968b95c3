//! Background analysis jobs.
//!
//! A submitted job runs [`run_analysis`] on its own worker thread. The
//! caller polls [`JobHandle::status`] or blocks on [`JobHandle::wait`].

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crate::domain::analysis::{AnalysisConfig, AnalysisResult, run_analysis};
use crate::domain::error::AuditError;
use crate::domain::leg::{ExecutionLeg, OrderLeg};
use crate::ports::progress_port::ProgressPort;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Running { percent: u8, stage: String },
    Completed,
    Failed(String),
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed(_))
    }
}

type SharedStatus = Arc<Mutex<JobStatus>>;

fn set_status(shared: &SharedStatus, status: JobStatus) {
    *shared.lock().unwrap_or_else(PoisonError::into_inner) = status;
}

/// Forwards engine progress into the shared status slot.
struct StatusProgress {
    shared: SharedStatus,
}

impl ProgressPort for StatusProgress {
    fn report(&self, percent: u8, stage: &str) {
        tracing::debug!("job progress {}% ({})", percent, stage);
        set_status(
            &self.shared,
            JobStatus::Running {
                percent,
                stage: stage.to_string(),
            },
        );
    }
}

pub struct AnalysisJob;

impl AnalysisJob {
    pub fn submit(
        orders: Vec<OrderLeg>,
        executions: Vec<ExecutionLeg>,
        config: AnalysisConfig,
    ) -> JobHandle {
        let shared: SharedStatus = Arc::new(Mutex::new(JobStatus::Queued));
        let progress = StatusProgress {
            shared: Arc::clone(&shared),
        };

        let worker = thread::spawn(move || {
            let outcome = run_analysis(orders, executions, &config, &progress);
            match &outcome {
                Ok(_) => set_status(&progress.shared, JobStatus::Completed),
                Err(e) => set_status(&progress.shared, JobStatus::Failed(e.to_string())),
            }
            outcome
        });

        JobHandle {
            status: shared,
            worker,
        }
    }
}

pub struct JobHandle {
    status: SharedStatus,
    worker: JoinHandle<Result<AnalysisResult, AuditError>>,
}

impl JobHandle {
    pub fn status(&self) -> JobStatus {
        let status = self
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if !status.is_terminal() && self.worker.is_finished() {
            // Only a panic leaves the worker finished without a terminal status.
            return JobStatus::Failed("worker panicked".to_string());
        }
        status
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Blocks until the worker is done.
    pub fn wait(self) -> Result<AnalysisResult, AuditError> {
        match self.worker.join() {
            Ok(outcome) => outcome,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "worker panicked".to_string());
                set_status(&self.status, JobStatus::Failed(reason.clone()));
                Err(AuditError::Job { reason })
            }
        }
    }
}
