//! First-level design matrix.
//!
//! Column layout is fixed:
//!
//! ```text
//! [ conditions (sorted by label) | drift_1 … drift_k | constant | short regressors ]
//! ```
//!
//! Every column carries a [`RegressorKind`] so later stages can filter
//! nuisance terms without looking at names.
pub mod drift;
pub mod hrf;

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::{AnalysisConfig, ShortRegressorMode};
use crate::error::{AnalysisError, Result};
use crate::recording::Recording;

/// Role of a design-matrix column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegressorKind {
    Condition,
    Drift,
    Constant,
    ShortChannelNuisance,
}

impl RegressorKind {
    pub fn is_nuisance(self) -> bool {
        self != Self::Condition
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Regressor {
    pub name: String,
    pub kind: RegressorKind,
}

impl Regressor {
    fn new(name: impl Into<String>, kind: RegressorKind) -> Self {
        Self { name: name.into(), kind }
    }
}

#[derive(Debug, Clone)]
pub struct DesignMatrix {
    /// `[T, K]`.
    pub matrix: Array2<f64>,
    /// One entry per column, in column order.
    pub regressors: Vec<Regressor>,
    /// Seconds from the first sample.
    pub frame_times: Vec<f64>,
}

impl DesignMatrix {
    #[inline]
    pub fn n_frames(&self) -> usize {
        self.matrix.nrows()
    }

    #[inline]
    pub fn n_regressors(&self) -> usize {
        self.matrix.ncols()
    }

    pub fn names(&self) -> Vec<&str> {
        self.regressors.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.regressors.iter().position(|r| r.name == name)
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.index_of(name).map(|j| self.matrix.column(j))
    }

    /// Number of columns of the given kind.
    pub fn count(&self, kind: RegressorKind) -> usize {
        self.regressors.iter().filter(|r| r.kind == kind).count()
    }
}

/// Build the design matrix for the long channels of one recording.
///
/// `short` is appended as nuisance regressors when `cfg.short_regression`
/// is set and it has at least one channel.
///
/// # Errors
///
/// [`AnalysisError::InvalidRecording`] if `short` does not have the same
/// number of frames as `long`.
pub fn build_design_matrix(
    long: &Recording,
    stim_duration: f64,
    short: Option<&Recording>,
    cfg: &AnalysisConfig,
) -> Result<DesignMatrix> {
    let frame_times = long.times();
    let n = frame_times.len();
    let mut columns: Vec<(Regressor, Vec<f64>)> = Vec::new();

    let mut by_label: BTreeMap<&str, Vec<(f64, f64)>> = BTreeMap::new();
    for a in long.annotations() {
        by_label.entry(a.description.as_str()).or_default().push((a.onset, stim_duration));
    }
    for (label, events) in &by_label {
        let reg = hrf::condition_regressor(events, &frame_times, cfg.hrf, cfg.oversampling);
        columns.push((Regressor::new(*label, RegressorKind::Condition), reg));
    }

    for (k, col) in drift::drift_columns(cfg.drift, &frame_times).into_iter().enumerate() {
        columns.push((Regressor::new(format!("drift_{}", k + 1), RegressorKind::Drift), col));
    }
    columns.push((Regressor::new("constant", RegressorKind::Constant), vec![1.0; n]));

    if let Some(short) = short.filter(|s| cfg.short_regression && s.n_channels() > 0) {
        if short.n_times() != n {
            return Err(AnalysisError::InvalidRecording(format!(
                "short channels have {} samples, long channels {n}",
                short.n_times()
            )));
        }
        match cfg.short_mode {
            ShortRegressorMode::PerChannel => {
                for (i, row) in short.data.rows().into_iter().enumerate() {
                    let name = format!("short{i}");
                    columns.push((Regressor::new(name, RegressorKind::ShortChannelNuisance), row.to_vec()));
                }
            }
            ShortRegressorMode::Mean => {
                let mean = short.data.mean_axis(ndarray::Axis(0)).map(|m| m.to_vec()).unwrap_or_default();
                columns.push((Regressor::new("short_mean", RegressorKind::ShortChannelNuisance), mean));
            }
        }
    }

    let mut matrix = Array2::<f64>::zeros((n, columns.len()));
    for (j, (_, col)) in columns.iter().enumerate() {
        matrix.column_mut(j).assign(&ArrayView1::from(col.as_slice()));
    }
    log::debug!("    Design matrix {n} × {}", columns.len());

    Ok(DesignMatrix {
        matrix,
        regressors: columns.into_iter().map(|(r, _)| r).collect(),
        frame_times,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriftModel;
    use crate::recording::{Annotation, Channel, Chromophore};

    fn haemo(n_pairs: usize, n_t: usize, distance: f64, labels: &[&str]) -> Recording {
        let mut channels = Vec::new();
        for p in 0..n_pairs {
            channels.push(Channel::haemo(&format!("S{}_D1", p + 1), Chromophore::Hbo, distance));
            channels.push(Channel::haemo(&format!("S{}_D1", p + 1), Chromophore::Hbr, distance));
        }
        let data = Array2::from_shape_fn((channels.len(), n_t), |(c, t)| ((c + 1) * t) as f64 * 1e-3);
        let annotations = labels
            .iter()
            .enumerate()
            .map(|(i, l)| Annotation::new(10.0 + 20.0 * i as f64, 5.0, *l))
            .collect();
        Recording::new(data, 0.6, channels, annotations).unwrap()
    }

    #[test]
    fn column_order_is_conditions_drifts_constant_shorts() {
        let long = haemo(2, 60, 0.03, &["B", "A", "B"]);
        let short = haemo(1, 60, 0.008, &["B", "A", "B"]);
        let dm = build_design_matrix(&long, 5.0, Some(&short), &AnalysisConfig::default()).unwrap();
        assert_eq!(dm.names(), vec!["A", "B", "drift_1", "drift_2", "constant", "short0", "short1"]);
        assert_eq!(dm.count(RegressorKind::ShortChannelNuisance), 2);
        assert_eq!(dm.n_frames(), 60);
        assert!(dm.column("constant").unwrap().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn short_mean_mode_adds_one_column() {
        let long = haemo(1, 60, 0.03, &["A"]);
        let short = haemo(1, 60, 0.008, &["A"]);
        let cfg = AnalysisConfig { short_mode: ShortRegressorMode::Mean, ..Default::default() };
        let dm = build_design_matrix(&long, 5.0, Some(&short), &cfg).unwrap();
        assert_eq!(dm.names(), vec!["A", "drift_1", "drift_2", "constant", "short_mean"]);
        let col = dm.column("short_mean").unwrap();
        // Mean of rows 1 and 2 (scale factors 1 and 2) → 1.5 · t · 1e-3.
        approx::assert_abs_diff_eq!(col[10], 1.5 * 10.0 * 1e-3, epsilon = 1e-12);
    }

    #[test]
    fn short_regression_disabled_or_absent() {
        let long = haemo(1, 60, 0.03, &["A"]);
        let short = haemo(1, 60, 0.008, &["A"]);
        let cfg = AnalysisConfig { short_regression: false, ..Default::default() };
        let dm = build_design_matrix(&long, 5.0, Some(&short), &cfg).unwrap();
        assert_eq!(dm.count(RegressorKind::ShortChannelNuisance), 0);
        let dm = build_design_matrix(&long, 5.0, None, &AnalysisConfig::default()).unwrap();
        assert_eq!(dm.n_regressors(), 4);
    }

    #[test]
    fn short_length_mismatch_rejected() {
        let long = haemo(1, 60, 0.03, &["A"]);
        let short = haemo(1, 59, 0.008, &["A"]);
        let err = build_design_matrix(&long, 5.0, Some(&short), &AnalysisConfig::default()).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidRecording(_)));
    }

    #[test]
    fn condition_regressor_responds_after_onset() {
        let long = haemo(1, 60, 0.03, &["A"]);
        let dm = build_design_matrix(&long, 5.0, None, &AnalysisConfig::default()).unwrap();
        let a = dm.column("A").unwrap();
        // Onset at 10 s = frame 6; peak a few seconds later.
        assert!(a.iter().take(6).all(|v| v.abs() < 1e-9));
        assert!(a.iter().skip(8).take(6).any(|&v| v > 0.1));
    }

    #[test]
    fn cosine_drift_kind_tags() {
        let long = haemo(1, 60, 0.03, &["A"]);
        let cfg = AnalysisConfig { drift: DriftModel::Cosine { high_pass: 0.0101 }, ..Default::default() };
        let dm = build_design_matrix(&long, 5.0, None, &cfg).unwrap();
        // floor(2 · 60 · 0.0101 / 0.6) = 2
        assert_eq!(dm.count(RegressorKind::Drift), 2);
        assert_eq!(dm.count(RegressorKind::Constant), 1);
        assert!(dm.regressors.iter().skip(1).all(|r| r.kind.is_nuisance()));
    }
}
