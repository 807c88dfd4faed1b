//! Canonical haemodynamic response and stimulus regressors.
//!
//! The HRF is a difference of two gamma densities sampled on a fine grid
//! (`dt = 1 / (sfreq · oversampling)`) over 32 s and normalised to unit
//! sum, the construction used by nilearn's `glover_hrf` / `spm_hrf`:
//!
//! ```text
//! h(t) = Γpdf(t - dt; delay/disp, disp) - ratio · Γpdf(t - dt; under/u_disp, u_disp)
//! ```
//!
//! A condition regressor is the boxcar of its events on the same fine grid,
//! convolved with `h` and linearly interpolated back to the frame times.
use rustfft::{num_complex::Complex, FftPlanner};
use statrs::function::gamma::ln_gamma;

use crate::config::HrfModel;

/// Length of the HRF kernel in seconds.
pub const HRF_LENGTH: f64 = 32.0;

/// Events starting this many seconds before the first frame still count.
pub const MIN_ONSET: f64 = -24.0;

/// Gamma-difference parameters (seconds).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GammaDifference {
    pub delay: f64,
    pub undershoot: f64,
    pub dispersion: f64,
    pub u_dispersion: f64,
    pub ratio: f64,
}

impl From<HrfModel> for GammaDifference {
    fn from(model: HrfModel) -> Self {
        match model {
            HrfModel::Glover => Self {
                delay: 6.0,
                undershoot: 12.0,
                dispersion: 0.9,
                u_dispersion: 0.9,
                ratio: 0.35,
            },
            HrfModel::Spm => Self {
                delay: 6.0,
                undershoot: 16.0,
                dispersion: 1.0,
                u_dispersion: 1.0,
                ratio: 0.167,
            },
        }
    }
}

/// Gamma density with shape `k` and scale `theta`; zero for `x ≤ 0`.
fn gamma_pdf(x: f64, k: f64, theta: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    ((k - 1.0) * x.ln() - x / theta - ln_gamma(k) - k * theta.ln()).exp()
}

/// HRF sampled every `dt` seconds over [`HRF_LENGTH`], unit sum.
pub fn hrf_kernel(model: HrfModel, dt: f64) -> Vec<f64> {
    let p = GammaDifference::from(model);
    let n = (HRF_LENGTH / dt).round().max(2.0) as usize;
    let step = HRF_LENGTH / (n - 1) as f64;

    let mut h: Vec<f64> = (0..n)
        .map(|i| {
            let t = i as f64 * step - dt;
            gamma_pdf(t, p.delay / p.dispersion, p.dispersion)
                - p.ratio * gamma_pdf(t, p.undershoot / p.u_dispersion, p.u_dispersion)
        })
        .collect();
    let s: f64 = h.iter().sum();
    if s != 0.0 {
        h.iter_mut().for_each(|v| *v /= s);
    }
    h
}

/// Causal linear convolution `y[i] = Σ_j x[i-j] h[j]`, truncated to `x.len()`.
pub fn convolve_causal(x: &[f64], h: &[f64]) -> Vec<f64> {
    if x.is_empty() || h.is_empty() {
        return vec![0.0; x.len()];
    }
    let n_fft = (x.len() + h.len() - 1).next_power_of_two();
    let mut planner: FftPlanner<f64> = FftPlanner::new();
    let fwd = planner.plan_fft_forward(n_fft);

    let padded = |v: &[f64]| -> Vec<Complex<f64>> {
        v.iter()
            .map(|&re| Complex::new(re, 0.0))
            .chain(std::iter::repeat(Complex::default()))
            .take(n_fft)
            .collect()
    };
    let mut xf = padded(x);
    let mut hf = padded(h);
    fwd.process(&mut xf);
    fwd.process(&mut hf);
    for (a, b) in xf.iter_mut().zip(&hf) {
        *a *= b;
    }
    planner.plan_fft_inverse(n_fft).process(&mut xf);

    let inv = 1.0 / n_fft as f64;
    xf[..x.len()].iter().map(|c| c.re * inv).collect()
}

/// Linear interpolation of `(xs, ys)` at `at`; clamps outside the range.
pub fn interp_linear(xs: &[f64], ys: &[f64], at: &[f64]) -> Vec<f64> {
    at.iter()
        .map(|&t| {
            let i = xs.partition_point(|&x| x <= t);
            if i == 0 {
                ys[0]
            } else if i >= xs.len() {
                ys[ys.len() - 1]
            } else {
                let (x0, x1) = (xs[i - 1], xs[i]);
                let f = if x1 > x0 { (t - x0) / (x1 - x0) } else { 0.0 };
                ys[i - 1] + f * (ys[i] - ys[i - 1])
            }
        })
        .collect()
}

/// HRF-convolved boxcar for events `(onset, duration)` at `frame_times`.
///
/// `frame_times` must be evenly spaced. Overlapping events add up.
pub fn condition_regressor(
    events: &[(f64, f64)],
    frame_times: &[f64],
    model: HrfModel,
    oversampling: usize,
) -> Vec<f64> {
    let n = frame_times.len();
    if n == 0 {
        return vec![];
    }
    let tr = if n > 1 { (frame_times[n - 1] - frame_times[0]) / (n - 1) as f64 } else { 1.0 };
    let dt = tr / oversampling.max(1) as f64;

    let t0 = frame_times[0] + MIN_ONSET;
    let t_end = frame_times[n - 1] + tr;
    let n_hr = ((t_end - t0) / dt).ceil() as usize + 1;
    let hr_times: Vec<f64> = (0..n_hr).map(|i| t0 + i as f64 * dt).collect();

    // Onset/offset impulses, then cumulative sum → boxcar.
    let mut steps = vec![0.0; n_hr];
    for &(onset, duration) in events {
        if onset < t0 {
            continue;
        }
        let on = hr_times.partition_point(|&t| t < onset).min(n_hr - 1);
        let mut off = hr_times.partition_point(|&t| t < onset + duration).min(n_hr - 1);
        if off == on {
            off = (on + 1).min(n_hr - 1);
        }
        steps[on] += 1.0;
        if off != on {
            steps[off] -= 1.0;
        }
    }
    let mut acc = 0.0;
    let boxcar: Vec<f64> = steps
        .iter()
        .map(|s| {
            acc += s;
            acc
        })
        .collect();

    let conv = convolve_causal(&boxcar, &hrf_kernel(model, dt));
    interp_linear(&hr_times, &conv, frame_times)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_sums_to_one_and_peaks_near_five_seconds() {
        let dt = 0.02;
        let h = hrf_kernel(HrfModel::Glover, dt);
        approx::assert_abs_diff_eq!(h.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        let peak = h
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i as f64 * dt)
            .unwrap();
        assert!((4.0..6.5).contains(&peak), "peak at {peak} s");
        // Undershoot goes negative later on.
        assert!(h.iter().skip((12.0 / dt) as usize).any(|&v| v < 0.0));
    }

    #[test]
    fn fft_convolution_matches_direct() {
        let x = [1.0, 0.0, 2.0, -1.0, 0.5];
        let h = [0.5, 0.25, 0.125];
        let got = convolve_causal(&x, &h);
        for i in 0..x.len() {
            let mut want = 0.0;
            for j in 0..h.len().min(i + 1) {
                want += x[i - j] * h[j];
            }
            approx::assert_abs_diff_eq!(got[i], want, epsilon = 1e-12);
        }
    }

    #[test]
    fn interpolation_is_linear_and_clamped() {
        let xs = [0.0, 1.0, 2.0];
        let ys = [0.0, 10.0, 0.0];
        let got = interp_linear(&xs, &ys, &[-1.0, 0.5, 1.5, 3.0]);
        assert_eq!(got, vec![0.0, 5.0, 5.0, 0.0]);
    }

    #[test]
    fn long_block_plateaus_at_one() {
        let frames: Vec<f64> = (0..300).map(|k| k as f64 / 2.0).collect();
        let reg = condition_regressor(&[(10.0, 100.0)], &frames, HrfModel::Glover, 20);
        // Before the onset nothing happens.
        assert!(reg[..20].iter().all(|v| v.abs() < 1e-9));
        // Well inside the block the response saturates near 1.
        approx::assert_abs_diff_eq!(reg[160], 1.0, epsilon = 0.05);
        // Long after the block it returns to baseline.
        assert!(reg[290].abs() < 0.05);
    }
}
