//! Lag-1 autoregressive prewhitening.
use nalgebra::{DMatrix, DVector};

/// Bound on |ρ| so the whitened system stays well conditioned.
pub const RHO_LIMIT: f64 = 0.99;

/// `Σ r_t r_{t-1} / Σ r_t²`, clamped to `±RHO_LIMIT`; `0` for a zero signal.
pub fn lag1_autocorrelation(r: &DVector<f64>) -> f64 {
    let denom = r.norm_squared();
    if denom <= 0.0 || r.len() < 2 {
        return 0.0;
    }
    let num: f64 = r.as_slice().windows(2).map(|w| w[0] * w[1]).sum();
    (num / denom).clamp(-RHO_LIMIT, RHO_LIMIT)
}

/// `z_t - ρ z_{t-1}` applied to every column of `x` and to `y`; row 0 is
/// left unchanged.
pub fn whiten(x: &DMatrix<f64>, y: &DVector<f64>, rho: f64) -> (DMatrix<f64>, DVector<f64>) {
    let (t, k) = x.shape();
    let xw = DMatrix::from_fn(t, k, |i, j| if i == 0 { x[(0, j)] } else { x[(i, j)] - rho * x[(i - 1, j)] });
    let yw = DVector::from_fn(t, |i, _| if i == 0 { y[0] } else { y[i] - rho * y[i - 1] });
    (xw, yw)
}
