//! Cooperative per-recording time budget.
//!
//! Stages call [`Deadline::check`] at safe points (between stages, once per
//! GLM channel). Nothing is interrupted mid-computation.
use std::time::{Duration, Instant};

use crate::error::{AnalysisError, Result};

#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    /// Starts now; `None` never expires.
    pub fn new(budget: Option<Duration>) -> Self {
        Self { start: Instant::now(), budget }
    }

    pub fn unlimited() -> Self {
        Self::new(None)
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn is_expired(&self) -> bool {
        self.budget.is_some_and(|b| self.elapsed() >= b)
    }

    /// `Err(Timeout)` once the budget is spent.
    pub fn check(&self) -> Result<()> {
        if self.is_expired() {
            Err(AnalysisError::Timeout { elapsed: self.elapsed() })
        } else {
            Ok(())
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::unlimited()
    }
}
