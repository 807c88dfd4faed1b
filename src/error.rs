//! Error taxonomy for the per-recording analysis stages.
//!
//! Stage functions return [`AnalysisError`] so the batch coordinator can
//! decide per variant whether a recording is skipped, failed or retried.
//! Application plumbing (CSV/JSON writers, the CLI) uses `anyhow` instead.
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T, E = AnalysisError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum AnalysisError {
    /// No recording file exists for the requested subject/session/task.
    #[error("recording not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Stimulus annotations do not share a single duration.
    #[error("unsupported design: stimulus durations must all be equal, found {durations:?} s")]
    UnsupportedDesign { durations: Vec<f64> },

    /// Degenerate design or signal; coefficients would be undefined.
    #[error("numerical failure: {context}")]
    NumericalFailure { context: String },

    /// Recording content is inconsistent (channel pairing, shapes, …).
    #[error("invalid recording: {0}")]
    InvalidRecording(String),

    /// ROI references a channel that is not part of the analysis.
    #[error("invalid ROI: {0}")]
    InvalidRoi(String),

    /// Per-recording deadline expired between stages.
    #[error("analysis timed out after {:.1} s", elapsed.as_secs_f64())]
    Timeout { elapsed: Duration },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Container parse errors surfaced by the dataset reader.
    #[error("{0:#}")]
    Format(#[from] anyhow::Error),
}

impl AnalysisError {
    pub(crate) fn numerical(context: impl Into<String>) -> Self {
        Self::NumericalFailure { context: context.into() }
    }

    /// `NotFound` is the only variant the batch treats as a skip rather
    /// than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
