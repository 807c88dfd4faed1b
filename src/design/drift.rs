//! Low-frequency drift regressors.
//!
//! Both bases return drift columns only; the constant column is appended by
//! the caller so it always sits between the drifts and the short-channel
//! regressors.
use crate::config::DriftModel;

/// Drift columns for `frame_times`, each of length `frame_times.len()`.
pub fn drift_columns(model: DriftModel, frame_times: &[f64]) -> Vec<Vec<f64>> {
    match model {
        DriftModel::Polynomial { order } => polynomial(order, frame_times),
        DriftModel::Cosine { high_pass } => cosine(high_pass, frame_times),
    }
}

/// `(t / t_max)^k` for `k = 1..=order`, each made orthogonal to the
/// constant and to every lower order (classical Gram–Schmidt without
/// renormalisation).
fn polynomial(order: usize, frame_times: &[f64]) -> Vec<Vec<f64>> {
    let n = frame_times.len();
    let t_max = frame_times.iter().copied().fold(0.0, f64::max);
    let scale = if t_max > 0.0 { 1.0 / t_max } else { 1.0 };

    let mut basis: Vec<Vec<f64>> = vec![vec![1.0; n]];
    for k in 1..=order {
        let mut col: Vec<f64> = frame_times.iter().map(|t| (t * scale).powi(k as i32)).collect();
        for b in &basis {
            let bb = dot(b, b);
            if bb > 0.0 {
                let c = dot(&col, b) / bb;
                col.iter_mut().zip(b).for_each(|(v, bv)| *v -= c * bv);
            }
        }
        basis.push(col);
    }
    basis.split_off(1)
}

/// Discrete cosine basis up to `high_pass` Hz: `floor(2 · n · high_pass · dt)`
/// columns `sqrt(2/n) · cos(π/n · (k + ½) · j)`.
fn cosine(high_pass: f64, frame_times: &[f64]) -> Vec<Vec<f64>> {
    let n = frame_times.len();
    if n < 2 {
        return vec![];
    }
    let dt = (frame_times[n - 1] - frame_times[0]) / (n - 1) as f64;
    let order = (2.0 * n as f64 * high_pass * dt).floor().max(0.0) as usize;
    let norm = (2.0 / n as f64).sqrt();
    (1..=order)
        .map(|j| {
            (0..n)
                .map(|k| {
                    norm * (std::f64::consts::PI / n as f64 * (k as f64 + 0.5) * j as f64).cos()
                })
                .collect()
        })
        .collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(n: usize, sfreq: f64) -> Vec<f64> {
        (0..n).map(|k| k as f64 / sfreq).collect()
    }

    #[test]
    fn polynomial_columns_are_mutually_orthogonal_and_zero_mean() {
        let cols = polynomial(3, &frames(120, 0.6));
        assert_eq!(cols.len(), 3);
        for (i, a) in cols.iter().enumerate() {
            approx::assert_abs_diff_eq!(a.iter().sum::<f64>(), 0.0, epsilon = 1e-9);
            for b in &cols[i + 1..] {
                approx::assert_abs_diff_eq!(dot(a, b), 0.0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn first_order_is_centred_ramp() {
        let t = frames(5, 1.0); // 0..4, t_max = 4
        let cols = polynomial(1, &t);
        let want = [-0.5, -0.25, 0.0, 0.25, 0.5];
        for (g, w) in cols[0].iter().zip(want) {
            approx::assert_abs_diff_eq!(*g, w, epsilon = 1e-12);
        }
    }

    #[test]
    fn order_zero_has_no_drifts() {
        assert!(polynomial(0, &frames(10, 1.0)).is_empty());
    }

    #[test]
    fn cosine_count_follows_high_pass() {
        // 600 frames at 0.6 Hz; floor(2 · 600 · 0.0101 / 0.6) = 20.
        let cols = drift_columns(DriftModel::Cosine { high_pass: 0.0101 }, &frames(600, 0.6));
        assert_eq!(cols.len(), 20);
        approx::assert_abs_diff_eq!(dot(&cols[0], &cols[0]), 1.0, epsilon = 1e-9);
        approx::assert_abs_diff_eq!(dot(&cols[0], &cols[1]), 0.0, epsilon = 1e-9);
    }
}
