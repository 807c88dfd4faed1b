//! Raw intensity → optical density.
//!
//! Matches `mne.preprocessing.nirs.optical_density`:
//!   x  = |intensity|, zeros replaced by the smallest positive sample
//!   od = -ln(x / mean(x))      per channel
use ndarray::Array2;

use crate::error::{AnalysisError, Result};
use crate::recording::{Measure, Recording};

/// Convert every wavelength channel of `raw` to optical density.
pub fn optical_density(raw: &Recording) -> Result<Recording> {
    let mut data = Array2::<f64>::zeros(raw.data.dim());

    for (ch, (row, info)) in raw.data.rows().into_iter().zip(&raw.channels).enumerate() {
        if !matches!(info.measure, Measure::Wavelength(_)) {
            return Err(AnalysisError::InvalidRecording(format!(
                "channel {} is not a light-intensity channel",
                info.name
            )));
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(AnalysisError::numerical(format!("non-finite intensity in {}", info.name)));
        }

        let floor = row
            .iter()
            .map(|v| v.abs())
            .filter(|&v| v > 0.0)
            .fold(f64::INFINITY, f64::min);
        if !floor.is_finite() {
            return Err(AnalysisError::numerical(format!(
                "channel {} has no positive intensity",
                info.name
            )));
        }

        let abs: Vec<f64> = row.iter().map(|v| if *v == 0.0 { floor } else { v.abs() }).collect();
        let mean = abs.iter().sum::<f64>() / abs.len() as f64;
        for (dst, x) in data.row_mut(ch).iter_mut().zip(&abs) {
            *dst = -(x / mean).ln();
        }
    }

    Ok(Recording {
        data,
        sfreq: raw.sfreq,
        channels: raw.channels.clone(),
        annotations: raw.annotations.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{Channel, Chromophore};

    fn single(values: Vec<f64>) -> Recording {
        let n = values.len();
        Recording::new(
            Array2::from_shape_vec((1, n), values).unwrap(),
            10.0,
            vec![Channel::intensity("S1_D1", 760.0, 0.03)],
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn constant_intensity_is_zero_od() {
        let od = optical_density(&single(vec![3.0; 50])).unwrap();
        for &v in od.data.iter() {
            approx::assert_abs_diff_eq!(v, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn od_is_negative_log_ratio() {
        let od = optical_density(&single(vec![1.0, 2.0, 3.0])).unwrap();
        // mean = 2
        approx::assert_abs_diff_eq!(od.data[[0, 0]], 2.0_f64.ln(), epsilon = 1e-12);
        approx::assert_abs_diff_eq!(od.data[[0, 1]], 0.0, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(od.data[[0, 2]], -(1.5_f64).ln(), epsilon = 1e-12);
    }

    #[test]
    fn zeros_take_smallest_positive_value() {
        let od = optical_density(&single(vec![0.0, 2.0, 4.0])).unwrap();
        // x = [2, 2, 4], mean = 8/3
        approx::assert_abs_diff_eq!(od.data[[0, 0]], od.data[[0, 1]], epsilon = 1e-12);
    }

    #[test]
    fn all_zero_channel_fails() {
        let err = optical_density(&single(vec![0.0; 10])).unwrap_err();
        assert!(matches!(err, AnalysisError::NumericalFailure { .. }));
    }

    #[test]
    fn haemo_input_rejected() {
        let rec = Recording::new(
            Array2::ones((1, 4)),
            1.0,
            vec![Channel::haemo("S1_D1", Chromophore::Hbo, 0.03)],
            vec![],
        )
        .unwrap();
        assert!(matches!(optical_density(&rec), Err(AnalysisError::InvalidRecording(_))));
    }
}
