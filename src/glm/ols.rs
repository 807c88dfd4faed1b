//! Ordinary least squares through the thin SVD of the design.
//!
//! ```text
//! X = U S Vᵀ      β = V S⁻¹ Uᵀ y      (XᵀX)⁻¹ = V S⁻² Vᵀ
//! ```
//!
//! Rank is decided with the usual `max(T, K) · ε · s_max` threshold; a
//! rank-deficient design is an error, never a pseudo-inverse fit.
use nalgebra::{DMatrix, DVector};

use crate::error::{AnalysisError, Result};

#[derive(Debug, Clone)]
pub struct OlsFit {
    pub beta: DVector<f64>,
    pub residuals: DVector<f64>,
    /// Diagonal of `(XᵀX)⁻¹`.
    pub xtx_inv_diag: DVector<f64>,
    pub rss: f64,
    /// `T - K`.
    pub df: usize,
}

impl OlsFit {
    /// Residual variance `RSS / df`.
    pub fn sigma2(&self) -> f64 {
        self.rss / self.df as f64
    }

    /// Standard error of every coefficient.
    pub fn se(&self) -> DVector<f64> {
        let s2 = self.sigma2();
        self.xtx_inv_diag.map(|d| (s2 * d).sqrt())
    }
}

pub fn ols(x: &DMatrix<f64>, y: &DVector<f64>) -> Result<OlsFit> {
    let (t, k) = x.shape();
    if y.len() != t {
        return Err(AnalysisError::numerical(format!("{} samples for a {t}-row design", y.len())));
    }
    if t <= k {
        return Err(AnalysisError::numerical(format!(
            "{t} samples for {k} regressors leaves no residual degrees of freedom"
        )));
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(AnalysisError::numerical("non-finite value in design or signal"));
    }

    let svd = x.clone().svd(true, true);
    let s = &svd.singular_values;
    let s_max = s.iter().copied().fold(0.0, f64::max);
    let tol = t.max(k) as f64 * f64::EPSILON * s_max;
    let rank = s.iter().filter(|&&v| v > tol).count();
    if rank < k {
        return Err(AnalysisError::numerical(format!("design has rank {rank} < {k} columns")));
    }

    let (Some(u), Some(v_t)) = (svd.u.as_ref(), svd.v_t.as_ref()) else {
        return Err(AnalysisError::numerical("SVD did not return singular vectors"));
    };
    let uty = u.transpose() * y;
    let scaled = DVector::from_iterator(k, uty.iter().zip(s.iter()).map(|(a, sv)| a / sv));
    let beta = v_t.transpose() * scaled;

    let residuals = y - x * &beta;
    let rss = residuals.norm_squared();
    let xtx_inv_diag = DVector::from_fn(k, |j, _| {
        (0..k).map(|i| (v_t[(i, j)] / s[i]).powi(2)).sum::<f64>()
    });

    Ok(OlsFit { beta, residuals, xtx_inv_diag, rss, df: t - k })
}
