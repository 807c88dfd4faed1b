//! CSV/text artefacts of a batch run.
//!
//! ```text
//! <out>/sub-<s>/[ses-<x>/]nirs/<stem>_glm.csv   per recording
//! <out>/roi.csv                                 pooled ROI estimates
//! <out>/group_roi.csv  <out>/stats.txt          when the group model ran
//! <out>/group_channels.csv                      optional channel model
//! ```
//!
//! In `*_glm.csv` and `roi.csv`, `theta` and `se` are both in µM: the
//! standard error is scaled together with the estimate, so `t = theta / se`
//! holds on the written values and `se` must not be rescaled downstream.
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::dataset::nirs_dir;
use crate::design::RegressorKind;
use crate::glm::GlmRow;
use crate::group::GroupAnalysis;
use crate::recording::{Chromophore, RecordingKey};
use crate::roi::RoiRow;

pub const ROI_CSV: &str = "roi.csv";
pub const GROUP_ROI_CSV: &str = "group_roi.csv";
pub const GROUP_CHANNELS_CSV: &str = "group_channels.csv";
pub const STATS_TXT: &str = "stats.txt";

/// Which nuisance rows survive into exported tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowFilter {
    pub export_drifts: bool,
    pub export_shorts: bool,
}

impl RowFilter {
    pub fn keeps(&self, kind: RegressorKind) -> bool {
        match kind {
            RegressorKind::Condition => true,
            RegressorKind::Drift | RegressorKind::Constant => self.export_drifts,
            RegressorKind::ShortChannelNuisance => self.export_shorts,
        }
    }
}

pub fn glm_csv_path(out_root: &Path, key: &RecordingKey) -> PathBuf {
    nirs_dir(out_root, key).join(format!("{}_glm.csv", key.bids_stem()))
}

#[derive(Serialize)]
struct GlmRecord<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    #[serde(rename = "Condition")]
    condition: &'a str,
    #[serde(rename = "Chroma")]
    chroma: Chromophore,
    ch_name: &'a str,
    /// µM.
    theta: f64,
    /// µM, same scale as `theta`.
    se: f64,
    t: f64,
    p_value: f64,
    df: f64,
}

#[derive(Serialize)]
struct RoiRecord<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    #[serde(rename = "ROI")]
    roi: &'a str,
    #[serde(rename = "Condition")]
    condition: &'a str,
    #[serde(rename = "Chroma")]
    chroma: Chromophore,
    theta: f64,
    se: f64,
    t: f64,
    p_value: f64,
    df: f64,
}

fn create_writer(path: &Path) -> Result<csv::Writer<fs::File>> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))
}

/// Write the per-recording table; returns the number of rows written.
pub fn write_glm_csv(path: &Path, rows: &[GlmRow], filter: RowFilter) -> Result<usize> {
    let mut w = create_writer(path)?;
    let mut n = 0;
    for r in rows.iter().filter(|r| filter.keeps(r.kind)) {
        w.serialize(GlmRecord {
            id: &r.subject,
            condition: &r.condition,
            chroma: r.chroma,
            ch_name: &r.ch_name,
            theta: r.theta,
            se: r.se,
            t: r.t,
            p_value: r.p_value,
            df: r.df,
        })?;
        n += 1;
    }
    w.flush()?;
    Ok(n)
}

pub fn write_roi_csv(path: &Path, rows: &[RoiRow], filter: RowFilter) -> Result<usize> {
    let mut w = create_writer(path)?;
    let mut n = 0;
    for r in rows.iter().filter(|r| filter.keeps(r.kind)) {
        w.serialize(RoiRecord {
            id: &r.subject,
            roi: &r.roi,
            condition: &r.condition,
            chroma: r.chroma,
            theta: r.theta,
            se: r.se,
            t: r.t,
            p_value: r.p_value,
            df: r.df,
        })?;
        n += 1;
    }
    w.flush()?;
    Ok(n)
}

/// Fixed-effect table; the first column is named after the term (`ROI` or
/// `ch_name`).
pub fn write_group_csv(path: &Path, analysis: &GroupAnalysis) -> Result<()> {
    let mut w = create_writer(path)?;
    w.write_record([analysis.term_label, "Condition", "Chroma", "Coef.", "Std.Err.", "z", "P>|z|"])?;
    for r in &analysis.rows {
        w.write_record([
            r.term.clone(),
            r.condition.clone(),
            r.chroma.to_string(),
            r.estimate.to_string(),
            r.se.to_string(),
            r.z.to_string(),
            r.p_value.to_string(),
        ])?;
    }
    w.flush()?;
    Ok(())
}

pub fn write_text(path: &Path, text: &str) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, text).with_context(|| format!("writing {}", path.display()))
}
