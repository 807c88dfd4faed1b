//! Channel-wise first-level GLM.
//!
//! Every long channel is regressed on the full design independently.
//! With [`NoiseModel::Ar1`] the fit is done twice: OLS, lag-1 residual
//! autocorrelation, prewhitening of both sides, refit. Coefficients are
//! kept in mol/L internally; [`GlmResults::rows`] reports micromolar.
pub mod ar;
pub mod ols;

use nalgebra::{DMatrix, DVector};

use crate::config::{AnalysisConfig, ChannelFailurePolicy, NoiseModel};
use crate::deadline::Deadline;
use crate::design::{DesignMatrix, Regressor, RegressorKind};
use crate::error::{AnalysisError, Result};
use crate::recording::{Chromophore, Recording};
use crate::stats::t_two_sided;

pub use ols::{ols, OlsFit};

/// mol/L → µmol/L.
pub const MICROMOLAR: f64 = 1e6;

/// One (channel, regressor) estimate. `theta` and `se` are both in µM, so
/// `t == theta / se`.
#[derive(Debug, Clone, PartialEq)]
pub struct GlmRow {
    pub subject: String,
    /// Regressor name (condition label for condition rows).
    pub condition: String,
    pub kind: RegressorKind,
    pub chroma: Chromophore,
    pub ch_name: String,
    pub theta: f64,
    pub se: f64,
    pub t: f64,
    pub p_value: f64,
    pub df: f64,
    pub mse: f64,
}

/// Fit of one channel, native units.
#[derive(Debug, Clone)]
pub struct ChannelEstimate {
    /// Row of the channel in the long-channel recording.
    pub index: usize,
    pub name: String,
    pub chroma: Chromophore,
    /// One per design column.
    pub beta: Vec<f64>,
    pub se: Vec<f64>,
    pub df: usize,
    pub mse: f64,
    /// Lag-1 coefficient used for whitening (`0` for OLS).
    pub rho: f64,
}

#[derive(Debug, Clone)]
pub struct GlmResults {
    pub regressors: Vec<Regressor>,
    /// Channels in the analysed recording, including dropped ones.
    pub n_channels: usize,
    /// Successfully fitted channels, in channel order.
    pub channels: Vec<ChannelEstimate>,
}

impl GlmResults {
    pub fn channel(&self, index: usize) -> Option<&ChannelEstimate> {
        self.channels.iter().find(|c| c.index == index)
    }

    /// Channel indices that were dropped by [`ChannelFailurePolicy::DropChannel`].
    pub fn dropped(&self) -> Vec<usize> {
        (0..self.n_channels).filter(|&i| self.channel(i).is_none()).collect()
    }

    /// Long-format table: channel-major, regressor order within a channel.
    pub fn rows(&self, subject: &str) -> Vec<GlmRow> {
        let mut out = Vec::with_capacity(self.channels.len() * self.regressors.len());
        for ch in &self.channels {
            for (j, reg) in self.regressors.iter().enumerate() {
                let t = ch.beta[j] / ch.se[j];
                out.push(GlmRow {
                    subject: subject.to_string(),
                    condition: reg.name.clone(),
                    kind: reg.kind,
                    chroma: ch.chroma,
                    ch_name: ch.name.clone(),
                    theta: ch.beta[j] * MICROMOLAR,
                    se: ch.se[j] * MICROMOLAR,
                    t,
                    p_value: t_two_sided(t, ch.df as f64),
                    df: ch.df as f64,
                    mse: ch.mse,
                });
            }
        }
        out
    }
}

/// Fit one signal against `x` with the configured noise model.
///
/// Returns the final fit and the AR coefficient that produced it. A fit
/// with no residual variance (flat or saturated optode) has no usable
/// standard error and is reported as [`AnalysisError::NumericalFailure`].
pub fn fit_channel(x: &DMatrix<f64>, y: &DVector<f64>, noise: NoiseModel) -> Result<(OlsFit, f64)> {
    let first = ols(x, y)?;
    let (fit, rho) = match noise {
        NoiseModel::Ols => (first, 0.0),
        NoiseModel::Ar1 => {
            let rho = ar::lag1_autocorrelation(&first.residuals);
            let (xw, yw) = ar::whiten(x, y, rho);
            (ols(&xw, &yw)?, rho)
        }
    };
    if !(fit.rss.is_finite() && fit.rss > 0.0) {
        return Err(AnalysisError::numerical(format!("no residual variance (rss = {:e})", fit.rss)));
    }
    if fit.se().iter().any(|s| !(s.is_finite() && *s > 0.0)) {
        return Err(AnalysisError::numerical("standard error is zero or not finite"));
    }
    Ok((fit, rho))
}

/// Fit every channel of `long` against `design`.
///
/// # Errors
///
/// * [`AnalysisError::NumericalFailure`] for a degenerate channel under
///   [`ChannelFailurePolicy::AbortRecording`], or when every channel fails.
/// * [`AnalysisError::Timeout`] when `deadline` expires between channels.
pub fn run_glm(
    long: &Recording,
    design: &DesignMatrix,
    cfg: &AnalysisConfig,
    deadline: &Deadline,
) -> Result<GlmResults> {
    if long.n_times() != design.n_frames() {
        return Err(AnalysisError::InvalidRecording(format!(
            "{} samples for a {}-frame design",
            long.n_times(),
            design.n_frames()
        )));
    }
    let (t, k) = design.matrix.dim();
    let x = DMatrix::from_fn(t, k, |i, j| design.matrix[[i, j]]);

    let mut channels = Vec::with_capacity(long.n_channels());
    for (index, (row, info)) in long.data.rows().into_iter().zip(&long.channels).enumerate() {
        deadline.check()?;
        let chroma = info.chromophore().ok_or_else(|| {
            AnalysisError::InvalidRecording(format!("channel {} is not a concentration channel", info.name))
        })?;
        let y = DVector::from_iterator(t, row.iter().copied());

        match fit_channel(&x, &y, cfg.noise_model) {
            Ok((fit, rho)) => {
                let se = fit.se();
                channels.push(ChannelEstimate {
                    index,
                    name: info.name.clone(),
                    chroma,
                    beta: fit.beta.iter().copied().collect(),
                    se: se.iter().copied().collect(),
                    df: fit.df,
                    mse: fit.sigma2(),
                    rho,
                });
            }
            Err(e) => match cfg.channel_failure {
                ChannelFailurePolicy::AbortRecording => {
                    return Err(AnalysisError::numerical(format!("channel {}: {e}", info.name)));
                }
                ChannelFailurePolicy::DropChannel => {
                    log::warn!("    Dropping channel {}: {e}", info.name);
                }
            },
        }
    }

    if channels.is_empty() {
        return Err(AnalysisError::numerical("no channel could be fitted"));
    }
    Ok(GlmResults {
        regressors: design.regressors.clone(),
        n_channels: long.n_channels(),
        channels,
    })
}
