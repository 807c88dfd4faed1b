//! FFT resampler for concentration time series.
//!
//! Same scheme as MNE's `raw.resample(sfreq)` (`method='fft'`):
//!   1. Reflect-limited padding on both sides, padded length a power of two.
//!   2. Real FFT of the padded signal.
//!   3. Nyquist bin doubled when downsampling, halved when upsampling.
//!   4. Spectrum scaled by `new_len / old_len`.
//!   5. Inverse FFT at the new padded length (truncating or zero-padding
//!      the half-spectrum).
//!   6. Resampled padding stripped from both ends.
//!
//! fNIRS pipelines typically go from 5–10 Hz down to well under 1 Hz, so
//! the downsampling branch is the one that matters in practice.
use ndarray::{Array2, ArrayView1};
use rustfft::{num_complex::Complex, FftPlanner};

/// Padding used by MNE's `npad='auto'`: grow to the next power of two.
///
/// ```text
/// min_add = min(n // 8, 100) * 2
/// total   = 2^ceil(log2(n + min_add)) - n
/// npads   = [total // 2, total - total // 2]
/// ```
pub fn auto_npad(n: usize) -> (usize, usize) {
    let min_add = (n / 8).min(100) * 2;
    let sum = n + min_add;
    let next_pow2 = 1usize << ((sum as f64).log2().ceil() as u32);
    let total = next_pow2 - n;
    (total / 2, total - total / 2)
}

/// Number of output samples: `round(n · dst / src)`.
pub fn resampled_len(n: usize, src_sfreq: f64, dst_sfreq: f64) -> usize {
    (n as f64 * dst_sfreq / src_sfreq).round() as usize
}

/// Resample every row of `data` (`[C, T]`) from `src_sfreq` to `dst_sfreq`.
pub fn resample(data: &Array2<f64>, src_sfreq: f64, dst_sfreq: f64) -> Array2<f64> {
    if (src_sfreq - dst_sfreq).abs() < 1e-9 {
        return data.clone();
    }
    let ratio = dst_sfreq / src_sfreq;
    let n_in = data.ncols();
    let n_out = resampled_len(n_in, src_sfreq, dst_sfreq);
    let (npad_l, npad_r) = auto_npad(n_in);

    let mut planner: FftPlanner<f64> = FftPlanner::new();
    let mut out = Array2::<f64>::zeros((data.nrows(), n_out));
    for (ch, row) in data.rows().into_iter().enumerate() {
        let row: Vec<f64> = row.to_vec();
        let y = resample_1d(&mut planner, &row, ratio, npad_l, npad_r);
        out.row_mut(ch).assign(&ArrayView1::from(&y));
    }
    out
}

/// Resample one signal by `ratio` with explicit (possibly asymmetric) padding.
///
/// Padding beyond `x.len() - 1` samples is clamped; the stripped edge is
/// computed from the padding actually applied.
pub fn resample_1d(
    planner: &mut FftPlanner<f64>,
    x: &[f64],
    ratio: f64,
    npad_l: usize,
    npad_r: usize,
) -> Vec<f64> {
    let n_in = x.len();
    if n_in == 0 {
        return vec![];
    }
    let n_out = (ratio * n_in as f64).round() as usize;

    let pad_l = npad_l.min(n_in - 1);
    let pad_r = npad_r.min(n_in - 1);
    let old_len = n_in + pad_l + pad_r;

    // Odd reflection about the end samples.
    let first = x[0];
    let last = x[n_in - 1];
    let mut buf: Vec<Complex<f64>> = Vec::with_capacity(old_len);
    buf.extend((1..=pad_l).rev().map(|i| Complex::new(2.0 * first - x[i], 0.0)));
    buf.extend(x.iter().map(|&v| Complex::new(v, 0.0)));
    buf.extend((1..=pad_r).map(|i| Complex::new(2.0 * last - x[n_in - 1 - i], 0.0)));

    let new_len = ((ratio * old_len as f64).round() as usize).max(1);
    let shorter = new_len < old_len;
    let use_len = if shorter { new_len } else { old_len };

    planner.plan_fft_forward(old_len).process(&mut buf);
    let mut half: Vec<Complex<f64>> = buf[..old_len / 2 + 1].to_vec();

    if use_len % 2 == 0 {
        let nyq = use_len / 2;
        if nyq < half.len() {
            half[nyq] *= if shorter { 2.0 } else { 0.5 };
        }
    }
    let scale = new_len as f64 / old_len as f64;
    half.iter_mut().for_each(|v| *v *= scale);

    // Rebuild a Hermitian spectrum of length `new_len` from the half-spectrum.
    let new_half = new_len / 2 + 1;
    let mut spec = vec![Complex::<f64>::default(); new_len];
    let n_copy = half.len().min(new_half);
    spec[..n_copy].copy_from_slice(&half[..n_copy]);
    for i in 1..new_half {
        let mirror = new_len - i;
        if mirror >= new_half {
            spec[mirror] = spec[i].conj();
        }
    }

    planner.plan_fft_inverse(new_len).process(&mut spec);
    let inv = 1.0 / new_len as f64;

    let cut_l = ((ratio * pad_l as f64).round() as usize).min(new_len);
    let end = (cut_l + n_out).min(new_len);
    let mut y: Vec<f64> = spec[cut_l..end].iter().map(|c| c.re * inv).collect();
    y.resize(n_out, *y.last().unwrap_or(&0.0));
    y
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_rate_is_identity() {
        let data = Array2::from_shape_fn((2, 64), |(c, t)| (c * 64 + t) as f64);
        let out = resample(&data, 10.0, 10.0);
        assert_eq!(out, data);
    }

    #[test]
    fn output_length_follows_ratio() {
        for (src, dst, n) in [(10.0, 0.6, 6000_usize), (7.8125, 0.6, 3125), (5.0, 1.0, 999)] {
            let out = resample(&Array2::zeros((1, n)), src, dst);
            assert_eq!(out.ncols(), resampled_len(n, src, dst), "src={src} dst={dst} n={n}");
        }
    }

    #[test]
    fn dc_level_preserved_when_downsampling() {
        let data = Array2::from_elem((1, 3000), 2.5);
        let out = resample(&data, 10.0, 0.6);
        for &v in out.iter() {
            approx::assert_abs_diff_eq!(v, 2.5, epsilon = 1e-9);
        }
    }

    #[test]
    fn slow_sine_survives_downsampling() {
        // 0.05 Hz sine, well below the 0.3 Hz Nyquist of the target rate.
        let src = 10.0;
        let data = Array2::from_shape_fn((1, 4000), |(_, t)| {
            (2.0 * std::f64::consts::PI * 0.05 * t as f64 / src).sin()
        });
        let out = resample(&data, src, 0.6);
        // Compare away from the edges.
        for k in 20..out.ncols() - 20 {
            let expect = (2.0 * std::f64::consts::PI * 0.05 * k as f64 / 0.6).sin();
            approx::assert_abs_diff_eq!(out[[0, k]], expect, epsilon = 2e-2);
        }
    }

    #[test]
    fn auto_npad_reaches_power_of_two() {
        assert_eq!(auto_npad(15360), (512, 512));
        assert_eq!(auto_npad(30720), (1024, 1024));
        let (l, r) = auto_npad(600);
        assert!((600 + l + r).is_power_of_two());
    }
}
