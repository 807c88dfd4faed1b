//! `execution_report.json`: provenance of a batch run.
//!
//! One entry per requested recording with the resolved file, its SHA-256,
//! wall-clock start/end (RFC 3339) and outcome, plus the tool version and
//! the full configuration that produced the outputs.
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::batch::{BatchSummary, Outcome};
use crate::config::BatchConfig;
use crate::error::AnalysisError;
use crate::group::GroupStage;

pub const REPORT_JSON: &str = "execution_report.json";

/// Hex SHA-256 of a file, streamed in 8 KiB blocks.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    pub subject: String,
    pub session: Option<String>,
    pub task: String,
    pub path: Option<PathBuf>,
    pub sha256: Option<String>,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GroupEntry {
    Completed { subjects: usize, observations: usize, fixed_effects: usize, converged: bool },
    Skipped { subjects: usize, required: usize },
    Failed { error: String },
    NotRequested,
}

impl GroupEntry {
    fn from_stage(stage: Option<&Result<GroupStage, AnalysisError>>) -> Self {
        match stage {
            None => Self::NotRequested,
            Some(Err(e)) => Self::Failed { error: e.to_string() },
            Some(Ok(GroupStage::Skipped { subjects, required })) => {
                Self::Skipped { subjects: *subjects, required: *required }
            }
            Some(Ok(GroupStage::Completed(a))) => Self::Completed {
                subjects: a.fit.n_groups(),
                observations: a.fit.n_obs,
                fixed_effects: a.rows.len(),
                converged: a.fit.converged,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub tool: &'static str,
    pub version: &'static str,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub config: BatchConfig,
    pub files: Vec<FileEntry>,
    pub group_roi: GroupEntry,
    pub group_channels: GroupEntry,
}

impl ExecutionReport {
    pub fn new(cfg: &BatchConfig, summary: &BatchSummary, started: DateTime<Utc>) -> Self {
        let files = summary
            .runs
            .iter()
            .map(|run| {
                let sha256 = run.path.as_deref().and_then(|p| match hash_file(p) {
                    Ok(h) => Some(h),
                    Err(e) => {
                        log::warn!("Could not hash {}: {e}", p.display());
                        None
                    }
                });
                FileEntry {
                    subject: run.key.subject.clone(),
                    session: run.key.session.clone(),
                    task: run.key.task.clone(),
                    path: run.path.clone(),
                    sha256,
                    started: run.started,
                    finished: run.finished,
                    outcome: run.outcome.clone(),
                }
            })
            .collect();

        Self {
            tool: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            started,
            finished: Utc::now(),
            config: cfg.clone(),
            files,
            group_roi: GroupEntry::from_stage(summary.group.as_ref()),
            group_channels: GroupEntry::from_stage(summary.channel_group.as_ref()),
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("writing {}", path.display()))
    }
}
