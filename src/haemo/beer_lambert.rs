//! Optical density → haemoglobin concentration (modified Beer–Lambert law).
//!
//! For every source–detector pair measured at two wavelengths λ₁ < λ₂:
//!
//! ```text
//! EL   = 0.2303 · ε · d · ppf        ε: 2×2, rows λ, columns [HbO, HbR] (cm⁻¹/M)
//! [ΔHbO, ΔHbR]ᵀ = EL⁻¹ · [OD(λ₁), OD(λ₂)]ᵀ · 1e-3      (mol/L)
//! ```
//!
//! `d` is the source–detector distance in metres. Same convention as
//! `mne.preprocessing.nirs.beer_lambert_law`.
use nalgebra::{Matrix2, Vector2};
use ndarray::Array2;

use crate::error::{AnalysisError, Result};
use crate::recording::{Channel, Chromophore, Recording};

/// Molar extinction coefficients of haemoglobin in water (Prahl),
/// `(wavelength nm, HbO cm⁻¹/M, HbR cm⁻¹/M)`.
const EXTINCTION: [(f64, f64, f64); 26] = [
    (650.0, 368.0, 3750.12),
    (660.0, 319.6, 3226.56),
    (670.0, 294.0, 2795.12),
    (680.0, 277.6, 2407.92),
    (690.0, 276.0, 2051.96),
    (700.0, 290.0, 1794.28),
    (710.0, 314.0, 1540.48),
    (720.0, 348.0, 1325.88),
    (730.0, 390.0, 1102.2),
    (740.0, 446.0, 1115.88),
    (750.0, 518.0, 1405.24),
    (760.0, 586.0, 1548.52),
    (770.0, 652.0, 1311.88),
    (780.0, 710.0, 1075.44),
    (790.0, 756.0, 882.76),
    (800.0, 816.0, 761.72),
    (810.0, 864.0, 717.08),
    (820.0, 916.0, 693.76),
    (830.0, 974.0, 693.04),
    (840.0, 1022.0, 692.36),
    (850.0, 1058.0, 691.32),
    (860.0, 1092.0, 694.32),
    (870.0, 1124.0, 705.84),
    (880.0, 1154.0, 726.44),
    (890.0, 1192.0, 743.6),
    (900.0, 1198.0, 761.84),
];

/// Natural-log conversion of the decadic extinction table, per cm → per mm.
const LN10_PER_10: f64 = 0.2303;

/// `(ε_HbO, ε_HbR)` at `wavelength` by linear interpolation of the table.
pub fn extinction(wavelength: f64) -> Option<(f64, f64)> {
    let (lo, hi) = (EXTINCTION[0].0, EXTINCTION[EXTINCTION.len() - 1].0);
    if !(lo..=hi).contains(&wavelength) {
        return None;
    }
    let i = EXTINCTION
        .windows(2)
        .position(|w| wavelength <= w[1].0)
        .unwrap_or(EXTINCTION.len() - 2);
    let (w0, o0, r0) = EXTINCTION[i];
    let (w1, o1, r1) = EXTINCTION[i + 1];
    let f = (wavelength - w0) / (w1 - w0);
    Some((o0 + f * (o1 - o0), r0 + f * (r1 - r0)))
}

/// The 2×2 inverse path-length–absorption matrix for one pair.
fn inverse_el(wavelengths: [f64; 2], distance: f64, ppf: f64) -> Result<Matrix2<f64>> {
    let mut el = Matrix2::zeros();
    for (row, &w) in wavelengths.iter().enumerate() {
        let (hbo, hbr) = extinction(w).ok_or_else(|| {
            AnalysisError::InvalidRecording(format!("no extinction coefficients at {w} nm"))
        })?;
        el[(row, 0)] = hbo * LN10_PER_10 * distance * ppf;
        el[(row, 1)] = hbr * LN10_PER_10 * distance * ppf;
    }
    el.try_inverse().ok_or_else(|| {
        AnalysisError::numerical(format!(
            "singular Beer-Lambert matrix at {} / {} nm, distance {distance} m",
            wavelengths[0], wavelengths[1]
        ))
    })
}

/// Group wavelength channels by pair, preserving first-seen order.
fn pairs(od: &Recording) -> Result<Vec<(String, [usize; 2])>> {
    let mut order: Vec<(String, Vec<usize>)> = Vec::new();
    for (i, ch) in od.channels.iter().enumerate() {
        if ch.wavelength().is_none() {
            return Err(AnalysisError::InvalidRecording(format!(
                "channel {} has no wavelength",
                ch.name
            )));
        }
        match order.iter_mut().find(|(p, _)| *p == ch.pair) {
            Some((_, idx)) => idx.push(i),
            None => order.push((ch.pair.clone(), vec![i])),
        }
    }

    order
        .into_iter()
        .map(|(pair, idx)| {
            let [a, b] = idx[..] else {
                return Err(AnalysisError::InvalidRecording(format!(
                    "pair {pair} has {} wavelengths, expected 2",
                    idx.len()
                )));
            };
            let (wa, wb) = (od.channels[a].wavelength(), od.channels[b].wavelength());
            match wa.partial_cmp(&wb) {
                Some(std::cmp::Ordering::Less) => Ok((pair, [a, b])),
                Some(std::cmp::Ordering::Greater) => Ok((pair, [b, a])),
                _ => Err(AnalysisError::InvalidRecording(format!(
                    "pair {pair} measured twice at the same wavelength"
                ))),
            }
        })
        .collect()
}

/// Convert an optical-density recording into HbO/HbR concentration.
///
/// Output rows come in pair order, HbO before HbR.
pub fn beer_lambert(od: &Recording, ppf: f64) -> Result<Recording> {
    let pairs = pairs(od)?;
    let n_t = od.n_times();
    let mut data = Array2::<f64>::zeros((pairs.len() * 2, n_t));
    let mut channels = Vec::with_capacity(pairs.len() * 2);

    for (p, (pair, [lo, hi])) in pairs.iter().enumerate() {
        let distance = od.channels[*lo].distance;
        let wavelengths = [
            od.channels[*lo].wavelength().unwrap_or_default(),
            od.channels[*hi].wavelength().unwrap_or_default(),
        ];
        let iel = inverse_el(wavelengths, distance, ppf)?;

        for t in 0..n_t {
            let c = iel * Vector2::new(od.data[[*lo, t]], od.data[[*hi, t]]) * 1e-3;
            data[[2 * p, t]] = c[0];
            data[[2 * p + 1, t]] = c[1];
        }
        channels.push(Channel::haemo(pair, Chromophore::Hbo, distance));
        channels.push(Channel::haemo(pair, Chromophore::Hbr, distance));
    }

    Ok(Recording {
        data,
        sfreq: od.sfreq,
        channels,
        annotations: od.annotations.clone(),
    })
}
