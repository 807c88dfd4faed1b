//! Two-sided p-values.
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

/// `P(|T| ≥ |t|)` for Student's t with `df` degrees of freedom.
///
/// `NaN` when `t` is `NaN` or `df` is not positive.
pub fn t_two_sided(t: f64, df: f64) -> f64 {
    if t.is_nan() {
        return f64::NAN;
    }
    StudentsT::new(0.0, 1.0, df)
        .map(|d| (2.0 * d.cdf(-t.abs())).min(1.0))
        .unwrap_or(f64::NAN)
}

/// `P(|Z| ≥ |z|)` for a standard normal.
pub fn z_two_sided(z: f64) -> f64 {
    if z.is_nan() {
        return f64::NAN;
    }
    Normal::new(0.0, 1.0)
        .map(|d| (2.0 * d.cdf(-z.abs())).min(1.0))
        .unwrap_or(f64::NAN)
}
