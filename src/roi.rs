//! Region-of-interest aggregation of channel estimates.
//!
//! For each ROI, design column and chromophore:
//!
//! ```text
//! beta = Σ wᵢ βᵢ      se = sqrt(Σ wᵢ² seᵢ²)      df = min dfᵢ      Σ wᵢ = 1
//! ```
//!
//! Channels dropped by the GLM are left out of every ROI they belong to;
//! an ROI (or a chromophore within it) with no fitted member produces no row.
use serde::{Deserialize, Serialize};

use crate::config::RoiWeighting;
use crate::design::RegressorKind;
use crate::error::{AnalysisError, Result};
use crate::glm::{ChannelEstimate, GlmResults, MICROMOLAR};
use crate::recording::Chromophore;
use crate::stats::t_two_sided;

/// Named set of long-channel indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoiDefinition {
    pub name: String,
    pub channels: Vec<usize>,
}

impl RoiDefinition {
    pub fn new(name: impl Into<String>, channels: Vec<usize>) -> Self {
        Self { name: name.into(), channels }
    }

    /// The default single ROI spanning every channel.
    pub fn all_channels(n_channels: usize) -> Self {
        Self::new("AllChannels", (0..n_channels).collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoiRow {
    pub subject: String,
    pub roi: String,
    pub condition: String,
    pub kind: RegressorKind,
    pub chroma: Chromophore,
    pub theta: f64,
    pub se: f64,
    pub t: f64,
    pub p_value: f64,
    pub df: f64,
}

/// Normalised weights for `members` at column `j`.
fn weights(members: &[&ChannelEstimate], j: usize, weighting: RoiWeighting) -> Vec<f64> {
    let raw: Vec<f64> = match weighting {
        RoiWeighting::Equal => vec![1.0; members.len()],
        RoiWeighting::InverseVariance => members
            .iter()
            .map(|c| {
                let v = c.se[j] * c.se[j];
                if v > 0.0 && v.is_finite() { 1.0 / v } else { 0.0 }
            })
            .collect(),
    };
    let sum: f64 = raw.iter().sum();
    if sum > 0.0 {
        raw.iter().map(|w| w / sum).collect()
    } else {
        // Every member has zero or undefined variance: fall back to equal.
        vec![1.0 / members.len() as f64; members.len()]
    }
}

/// Combine channel estimates into one row per (ROI, regressor, chromophore).
///
/// Rows come out ROI-major, then regressor order, HbO before HbR.
///
/// # Errors
///
/// * [`AnalysisError::InvalidRoi`] if an ROI lists a channel index outside
///   the analysed recording.
/// * [`AnalysisError::NumericalFailure`] if a combined standard error is
///   zero or not finite.
pub fn aggregate(
    glm: &GlmResults,
    rois: &[RoiDefinition],
    weighting: RoiWeighting,
    subject: &str,
) -> Result<Vec<RoiRow>> {
    let mut out = Vec::new();
    for roi in rois {
        if let Some(&bad) = roi.channels.iter().find(|&&i| i >= glm.n_channels) {
            return Err(AnalysisError::InvalidRoi(format!(
                "{} references channel {bad}, recording has {}",
                roi.name, glm.n_channels
            )));
        }

        for (j, reg) in glm.regressors.iter().enumerate() {
            for chroma in [Chromophore::Hbo, Chromophore::Hbr] {
                let members: Vec<&ChannelEstimate> = roi
                    .channels
                    .iter()
                    .filter_map(|&i| glm.channel(i))
                    .filter(|c| c.chroma == chroma)
                    .collect();
                if members.is_empty() {
                    continue;
                }
                let w = weights(&members, j, weighting);
                let beta: f64 = members.iter().zip(&w).map(|(c, w)| w * c.beta[j]).sum();
                let var: f64 = members.iter().zip(&w).map(|(c, w)| (w * c.se[j]).powi(2)).sum();
                let se = var.sqrt();
                let df = members.iter().map(|c| c.df).min().unwrap_or(0) as f64;
                let t = beta / se;
                if !(se.is_finite() && se > 0.0 && t.is_finite()) {
                    return Err(AnalysisError::numerical(format!(
                        "{} {} {chroma}: standard error {se:e}",
                        roi.name, reg.name
                    )));
                }

                out.push(RoiRow {
                    subject: subject.to_string(),
                    roi: roi.name.clone(),
                    condition: reg.name.clone(),
                    kind: reg.kind,
                    chroma,
                    theta: beta * MICROMOLAR,
                    se: se * MICROMOLAR,
                    t,
                    p_value: t_two_sided(t, df),
                    df,
                });
            }
        }
    }
    Ok(out)
}
