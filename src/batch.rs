//! Batch coordinator: every requested recording, then the group stage.
//!
//! Recordings run on a bounded rayon pool. Each worker owns its recording
//! and returns its rows; the coordinator collects results in request order
//! and concatenates them once. The group model only starts after every
//! recording has reached a terminal [`Outcome`].
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::analyze_recording;
use crate::config::BatchConfig;
use crate::dataset::BidsDataset;
use crate::deadline::Deadline;
use crate::error::AnalysisError;
use crate::glm::GlmRow;
use crate::group::{self, summary, GroupStage};
use crate::output::{self, RowFilter};
use crate::recording::{unique_keys, RecordingKey, RecordingSource};
use crate::report::{ExecutionReport, REPORT_JSON};
use crate::roi::RoiRow;

/// Terminal state of one recording.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Completed { glm_rows: usize, roi_rows: usize },
    /// Nothing to analyse (no file for the key).
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone)]
pub struct RecordingRun {
    pub key: RecordingKey,
    /// Backing file, when the source has one.
    pub path: Option<PathBuf>,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub outcome: Outcome,
    /// Every GLM row, nuisance terms included.
    pub glm_rows: Vec<GlmRow>,
    pub roi_rows: Vec<RoiRow>,
}

#[derive(Debug)]
pub struct BatchSummary {
    /// In request order.
    pub runs: Vec<RecordingRun>,
    /// Pooled ROI rows of every completed recording.
    pub roi_rows: Vec<RoiRow>,
    pub group: Option<Result<GroupStage, AnalysisError>>,
    /// Only when the channel model was requested.
    pub channel_group: Option<Result<GroupStage, AnalysisError>>,
}

impl BatchSummary {
    pub fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.runs.iter().filter(|r| pred(&r.outcome)).count()
    }
}

/// Analyse one recording and write its GLM table.
fn process_one<S>(source: &S, key: &RecordingKey, cfg: &BatchConfig) -> RecordingRun
where
    S: RecordingSource + ?Sized,
{
    let started = Utc::now();
    let deadline = Deadline::new(cfg.recording_timeout());
    log::info!("Processing {key}");

    let analysed = source.load(key).and_then(|raw| {
        deadline.check()?;
        analyze_recording(&raw, &key.subject, &cfg.analysis, &[], &deadline)
    });

    let filter = RowFilter { export_drifts: cfg.export_drifts, export_shorts: cfg.export_shorts };
    let (outcome, glm_rows, roi_rows) = match analysed {
        Ok(first) => {
            let path = output::glm_csv_path(&cfg.output, key);
            match output::write_glm_csv(&path, &first.glm_rows, filter) {
                Ok(_) => {
                    let kept = |kind| filter.keeps(kind);
                    let outcome = Outcome::Completed {
                        glm_rows: first.glm_rows.iter().filter(|r| kept(r.kind)).count(),
                        roi_rows: first.roi_rows.iter().filter(|r| kept(r.kind)).count(),
                    };
                    (outcome, first.glm_rows, first.roi_rows)
                }
                Err(e) => {
                    log::error!("Failed to write results for {key}: {e:#}");
                    (Outcome::Failed { error: format!("{e:#}") }, vec![], vec![])
                }
            }
        }
        Err(e) if e.is_not_found() => {
            log::warn!("Skipping {key}: {e}");
            (Outcome::Skipped { reason: e.to_string() }, vec![], vec![])
        }
        Err(e) => {
            log::error!("Failed {key}: {e}");
            (Outcome::Failed { error: e.to_string() }, vec![], vec![])
        }
    };

    RecordingRun {
        key: key.clone(),
        path: source.locate(key),
        started,
        finished: Utc::now(),
        outcome,
        glm_rows,
        roi_rows,
    }
}

/// Write the fixed-effect table (and optionally the text summary) of a
/// completed group stage. Otherwise remove what an earlier run left under
/// those names.
fn write_group(
    stage: &Result<GroupStage, AnalysisError>,
    csv: &str,
    stats: Option<&str>,
    cfg: &BatchConfig,
) -> Result<()> {
    match stage {
        Ok(GroupStage::Completed(analysis)) => {
            output::write_group_csv(&cfg.output.join(csv), analysis)?;
            if let Some(stats) = stats {
                output::write_text(&cfg.output.join(stats), &summary::render(analysis))?;
            }
            return Ok(());
        }
        Ok(GroupStage::Skipped { .. }) => {}
        Err(e) => log::error!("Group model failed: {e}"),
    }
    for name in std::iter::once(csv).chain(stats) {
        remove_stale(&cfg.output.join(name))?;
    }
    Ok(())
}

fn remove_stale(path: &Path) -> Result<()> {
    if path.is_file() {
        log::info!("Removing stale {}", path.display());
        fs::remove_file(path).with_context(|| format!("removing {}", path.display()))?;
    }
    Ok(())
}

/// Run every key of `source` selected by `keys`, then the group stage.
///
/// Repeated keys run once, at their first position.
pub fn run_keys<S>(source: &S, keys: &[RecordingKey], cfg: &BatchConfig) -> Result<BatchSummary>
where
    S: RecordingSource + ?Sized,
{
    let requested = keys.len();
    let started = Utc::now();
    fs::create_dir_all(&cfg.output).with_context(|| format!("creating {}", cfg.output.display()))?;

    let keys = unique_keys(keys);
    if keys.len() != requested {
        log::warn!("Ignoring {} repeated recording keys", requested - keys.len());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(cfg.jobs)
        .build()
        .context("building worker pool")?;
    log::info!("Analysing {} recordings on {} threads", keys.len(), pool.current_num_threads());

    let runs: Vec<RecordingRun> =
        pool.install(|| keys.par_iter().map(|k| process_one(source, k, cfg)).collect());

    let roi_rows: Vec<RoiRow> = runs.iter().flat_map(|r| r.roi_rows.iter().cloned()).collect();
    let filter = RowFilter { export_drifts: cfg.export_drifts, export_shorts: cfg.export_shorts };
    output::write_roi_csv(&cfg.output.join(output::ROI_CSV), &roi_rows, filter)?;

    let group = group::fit_roi_model(&roi_rows, cfg.min_group_subjects);
    write_group(&group, output::GROUP_ROI_CSV, Some(output::STATS_TXT), cfg)?;

    let channel_group = if cfg.channel_group_model {
        let glm_rows: Vec<GlmRow> = runs.iter().flat_map(|r| r.glm_rows.iter().cloned()).collect();
        let stage = group::fit_channel_model(&glm_rows, cfg.min_group_subjects);
        write_group(&stage, output::GROUP_CHANNELS_CSV, None, cfg)?;
        Some(stage)
    } else {
        remove_stale(&cfg.output.join(output::GROUP_CHANNELS_CSV))?;
        None
    };

    let summary = BatchSummary { runs, roi_rows, group: Some(group), channel_group };
    log::info!(
        "Done: {} completed, {} skipped, {} failed",
        summary.count(|o| matches!(o, Outcome::Completed { .. })),
        summary.count(|o| matches!(o, Outcome::Skipped { .. })),
        summary.count(|o| matches!(o, Outcome::Failed { .. })),
    );

    ExecutionReport::new(cfg, &summary, started).write(&cfg.output.join(REPORT_JSON))?;
    Ok(summary)
}

/// Scan the BIDS dataset at `cfg.input` and run the whole batch.
pub fn run_batch(cfg: &BatchConfig) -> Result<BatchSummary> {
    let dataset = BidsDataset::new(&cfg.input).with_selection(
        cfg.subjects.clone(),
        cfg.sessions.clone(),
        cfg.tasks.clone(),
    );
    let keys = dataset.scan().with_context(|| format!("scanning {}", cfg.input.display()))?;
    if keys.is_empty() {
        log::warn!("No recordings selected under {}", cfg.input.display());
    }
    run_keys(&dataset, &keys, cfg)
}
