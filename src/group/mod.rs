//! Group-level mixed model over pooled first-level estimates.
//!
//! One fixed effect per distinct `(term, condition, chromophore)` cell (no
//! intercept) and a random intercept per subject; the equivalent of
//! `theta ~ -1 + ROI:Condition:Chroma, groups = ID`. The channel variant
//! uses HbO channel estimates with the channel name as the term.
//!
//! Nuisance rows are dropped first; the model only runs when enough
//! distinct subjects contribute.
pub mod lmm;
pub mod summary;

use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::Result;
use crate::glm::GlmRow;
use crate::recording::Chromophore;
use crate::roi::RoiRow;
use crate::stats::z_two_sided;

pub use lmm::{fit_random_intercept, MixedModelFit};

/// One first-level estimate entering the group model.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub subject: String,
    /// ROI name or channel name.
    pub term: String,
    pub condition: String,
    pub chroma: Chromophore,
    pub value: f64,
}

/// Fixed-effect estimate of one cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupRow {
    pub term: String,
    pub condition: String,
    pub chroma: Chromophore,
    pub estimate: f64,
    pub se: f64,
    pub z: f64,
    pub p_value: f64,
}

#[derive(Debug, Clone)]
pub struct GroupAnalysis {
    /// Column label of the term, `"ROI"` or `"ch_name"`.
    pub term_label: &'static str,
    pub rows: Vec<GroupRow>,
    pub fit: MixedModelFit,
    /// Subject labels in group-index order.
    pub subjects: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum GroupStage {
    Completed(GroupAnalysis),
    /// Too few subjects; no group output.
    Skipped { subjects: usize, required: usize },
}

impl GroupStage {
    pub fn analysis(&self) -> Option<&GroupAnalysis> {
        match self {
            Self::Completed(a) => Some(a),
            Self::Skipped { .. } => None,
        }
    }
}

/// Group model over ROI estimates (condition rows only).
pub fn fit_roi_model(rows: &[RoiRow], min_subjects: usize) -> Result<GroupStage> {
    let obs = rows
        .iter()
        .filter(|r| !r.kind.is_nuisance())
        .map(|r| Observation {
            subject: r.subject.clone(),
            term: r.roi.clone(),
            condition: r.condition.clone(),
            chroma: r.chroma,
            value: r.theta,
        })
        .collect();
    fit_observations(obs, min_subjects, "ROI")
}

/// Channel-level group model over HbO condition rows.
pub fn fit_channel_model(rows: &[GlmRow], min_subjects: usize) -> Result<GroupStage> {
    let obs = rows
        .iter()
        .filter(|r| !r.kind.is_nuisance() && r.chroma == Chromophore::Hbo)
        .map(|r| Observation {
            subject: r.subject.clone(),
            term: r.ch_name.clone(),
            condition: r.condition.clone(),
            chroma: r.chroma,
            value: r.theta,
        })
        .collect();
    fit_observations(obs, min_subjects, "ch_name")
}

/// Fit the cell-means mixed model on arbitrary observations.
pub fn fit_observations(
    obs: Vec<Observation>,
    min_subjects: usize,
    term_label: &'static str,
) -> Result<GroupStage> {
    let before = obs.len();
    let obs: Vec<Observation> = obs.into_iter().filter(|o| o.value.is_finite()).collect();
    if obs.len() < before {
        log::warn!("Group model: ignoring {} non-finite estimates", before - obs.len());
    }

    let subjects: Vec<String> = obs
        .iter()
        .map(|o| o.subject.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if subjects.len() < min_subjects {
        log::warn!(
            "Group model skipped: {} subject(s) contributed, at least {min_subjects} required",
            subjects.len()
        );
        return Ok(GroupStage::Skipped { subjects: subjects.len(), required: min_subjects });
    }

    let cells: BTreeMap<(String, String, Chromophore), usize> = obs
        .iter()
        .map(|o| (o.term.clone(), o.condition.clone(), o.chroma))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .enumerate()
        .map(|(j, key)| (key, j))
        .collect();
    let group_of: BTreeMap<&str, usize> =
        subjects.iter().enumerate().map(|(g, s)| (s.as_str(), g)).collect();

    let (n, p) = (obs.len(), cells.len());
    let mut x = DMatrix::<f64>::zeros(n, p);
    let mut y = DVector::<f64>::zeros(n);
    let mut groups = Vec::with_capacity(n);
    for (i, o) in obs.iter().enumerate() {
        let key = (o.term.clone(), o.condition.clone(), o.chroma);
        if let Some(&j) = cells.get(&key) {
            x[(i, j)] = 1.0;
        }
        y[i] = o.value;
        groups.push(group_of.get(o.subject.as_str()).copied().unwrap_or(0));
    }

    log::info!("Group model: {n} observations, {p} fixed effects, {} subjects", subjects.len());
    let fit = fit_random_intercept(&x, &y, &groups)?;
    if !fit.converged {
        log::warn!("Group model: variance search did not converge");
    }

    let rows = cells
        .into_iter()
        .map(|((term, condition, chroma), j)| {
            let (estimate, se) = (fit.beta[j], fit.se[j]);
            let z = estimate / se;
            GroupRow { term, condition, chroma, estimate, se, z, p_value: z_two_sided(z) }
        })
        .collect();

    Ok(GroupStage::Completed(GroupAnalysis { term_label, rows, fit, subjects }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::RegressorKind;

    fn roi_row(subject: &str, condition: &str, kind: RegressorKind, chroma: Chromophore, theta: f64) -> RoiRow {
        RoiRow {
            subject: subject.into(),
            roi: "AllChannels".into(),
            condition: condition.into(),
            kind,
            chroma,
            theta,
            se: 0.1,
            t: 0.0,
            p_value: 1.0,
            df: 50.0,
        }
    }

    fn pooled(n_subjects: usize) -> Vec<RoiRow> {
        let mut rows = Vec::new();
        for s in 0..n_subjects {
            let id = format!("{:02}", s + 1);
            let off = 0.3 * s as f64 - 0.4;
            for (k, cond) in ["A", "B"].iter().enumerate() {
                let e = 0.05 * ((s * 5 + k) as f64).cos();
                rows.push(roi_row(&id, cond, RegressorKind::Condition, Chromophore::Hbo, 1.0 + k as f64 + off + e));
                rows.push(roi_row(&id, cond, RegressorKind::Condition, Chromophore::Hbr, -0.5 + off - e));
            }
            rows.push(roi_row(&id, "drift_1", RegressorKind::Drift, Chromophore::Hbo, 100.0));
            rows.push(roi_row(&id, "constant", RegressorKind::Constant, Chromophore::Hbo, -100.0));
        }
        rows
    }

    #[test]
    fn one_fixed_effect_per_cell_nuisance_excluded() {
        let stage = fit_roi_model(&pooled(4), 3).unwrap();
        let a = stage.analysis().expect("group model should run");
        assert_eq!(a.rows.len(), 4);
        assert_eq!(a.fit.n_obs, 16);
        assert_eq!(a.fit.n_groups(), 4);
        assert!(a.rows.iter().all(|r| r.condition == "A" || r.condition == "B"));
        assert_eq!(
            (a.rows[0].condition.as_str(), a.rows[0].chroma),
            ("A", Chromophore::Hbo)
        );
        // Balanced cells: estimate is the cell mean.
        let mean_a_hbo: f64 = pooled(4)
            .iter()
            .filter(|r| r.condition == "A" && r.chroma == Chromophore::Hbo)
            .map(|r| r.theta)
            .sum::<f64>()
            / 4.0;
        approx::assert_abs_diff_eq!(a.rows[0].estimate, mean_a_hbo, epsilon = 1e-8);
        assert!(a.rows.iter().all(|r| r.se > 0.0 && (0.0..=1.0).contains(&r.p_value)));
    }

    #[test]
    fn two_subjects_skip_the_stage() {
        match fit_roi_model(&pooled(2), 3).unwrap() {
            GroupStage::Skipped { subjects, required } => {
                assert_eq!((subjects, required), (2, 3));
            }
            GroupStage::Completed(_) => panic!("group model must not run with two subjects"),
        }
    }

    #[test]
    fn channel_model_uses_hbo_only() {
        let mut rows = Vec::new();
        for s in 0..3 {
            for ch in ["S1_D1", "S2_D1"] {
                for chroma in [Chromophore::Hbo, Chromophore::Hbr] {
                    rows.push(GlmRow {
                        subject: format!("{s}"),
                        condition: "A".into(),
                        kind: RegressorKind::Condition,
                        chroma,
                        ch_name: format!("{ch} {chroma}"),
                        theta: 1.0 + 0.1 * s as f64 + if ch == "S1_D1" { 0.0 } else { 0.37 },
                        se: 0.1,
                        t: 10.0,
                        p_value: 0.0,
                        df: 40.0,
                        mse: 0.0,
                    });
                }
            }
        }
        // Make the data non-degenerate within subject.
        rows[0].theta += 0.02;
        let stage = fit_channel_model(&rows, 3).unwrap();
        let a = stage.analysis().unwrap();
        assert_eq!(a.term_label, "ch_name");
        assert_eq!(a.rows.len(), 2);
        assert!(a.rows.iter().all(|r| r.chroma == Chromophore::Hbo && r.term.ends_with("hbo")));
    }
}
