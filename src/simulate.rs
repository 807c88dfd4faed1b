//! Synthetic raw-intensity recordings with a known haemodynamic response.
//!
//! The forward model is the inverse of the conditioning chain: a
//! concentration time course per pair (HRF-convolved blocks, a shared slow
//! systemic oscillation and white noise) goes through the modified
//! Beer–Lambert law to optical density and then to intensity
//! `I = I₀ · exp(-OD)`. Short pairs carry only the systemic part, so short
//! regression has something to remove.
use ndarray::Array2;

use crate::config::HrfModel;
use crate::design::hrf::condition_regressor;
use crate::error::{AnalysisError, Result};
use crate::haemo::extinction;
use crate::recording::{Annotation, Channel, Recording};

/// One simulated condition.
#[derive(Debug, Clone, PartialEq)]
pub struct SimCondition {
    pub label: String,
    /// HbO amplitude in µM per unit of the condition regressor; HbR gets
    /// `hbr_ratio` of it.
    pub hbo_amplitude: f64,
}

impl SimCondition {
    pub fn new(label: impl Into<String>, hbo_amplitude: f64) -> Self {
        Self { label: label.into(), hbo_amplitude }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Simulation {
    /// Raw sampling rate, Hz.
    pub sfreq: f64,
    pub duration_secs: f64,
    pub stim_duration: f64,
    pub events_per_condition: usize,
    pub conditions: Vec<SimCondition>,
    pub hbr_ratio: f64,
    pub long_pairs: usize,
    pub short_pairs: usize,
    pub long_distance: f64,
    pub short_distance: f64,
    pub wavelengths: [f64; 2],
    pub ppf: f64,
    /// Systemic oscillation amplitude (µM) at 0.1 Hz, in every channel.
    pub systemic: f64,
    /// White-noise standard deviation, µM.
    pub noise: f64,
    /// Constant added to every response amplitude, µM (subject effect).
    pub offset: f64,
    pub seed: u64,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            sfreq: 10.0,
            duration_secs: 300.0,
            stim_duration: 5.0,
            events_per_condition: 6,
            conditions: vec![SimCondition::new("A", 2.0)],
            hbr_ratio: -0.3,
            long_pairs: 1,
            short_pairs: 1,
            long_distance: 0.03,
            short_distance: 0.008,
            wavelengths: [760.0, 850.0],
            ppf: 6.0,
            systemic: 0.5,
            noise: 0.05,
            offset: 0.0,
            seed: 1,
        }
    }
}

/// SplitMix64 stream; approximate standard normals by summing uniforms.
struct Noise(u64);

impl Noise {
    fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    fn uniform(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Irwin–Hall with 12 terms: mean 0, variance 1.
    fn normal(&mut self) -> f64 {
        (0..12).map(|_| self.uniform()).sum::<f64>() - 6.0
    }
}

impl Simulation {
    pub fn n_times(&self) -> usize {
        (self.duration_secs * self.sfreq).round() as usize
    }

    /// Events of every condition, interleaved and evenly spaced after a
    /// 20 s lead-in, ending 20 s before the end of the recording.
    pub fn annotations(&self) -> Vec<Annotation> {
        let total = self.events_per_condition * self.conditions.len();
        if total == 0 {
            return vec![];
        }
        let span = (self.duration_secs - 40.0).max(0.0);
        let step = span / total as f64;
        (0..total)
            .map(|i| {
                let cond = &self.conditions[i % self.conditions.len()];
                Annotation::new(20.0 + i as f64 * step, self.stim_duration, cond.label.clone())
            })
            .collect()
    }

    /// Build the raw-intensity recording.
    pub fn recording(&self) -> Result<Recording> {
        let n = self.n_times();
        let times: Vec<f64> = (0..n).map(|k| k as f64 / self.sfreq).collect();
        let annotations = self.annotations();

        // Task response per condition, µM per unit amplitude.
        let responses: Vec<(f64, Vec<f64>)> = self
            .conditions
            .iter()
            .map(|c| {
                let events: Vec<(f64, f64)> = annotations
                    .iter()
                    .filter(|a| a.description == c.label)
                    .map(|a| (a.onset, a.duration))
                    .collect();
                (c.hbo_amplitude + self.offset, condition_regressor(&events, &times, HrfModel::Glover, 4))
            })
            .collect();
        let systemic: Vec<f64> = times
            .iter()
            .map(|t| self.systemic * (2.0 * std::f64::consts::PI * 0.1 * t).sin())
            .collect();

        let eps = self
            .wavelengths
            .iter()
            .map(|&w| {
                extinction(w).ok_or_else(|| {
                    AnalysisError::InvalidRecording(format!("no extinction coefficients at {w} nm"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut rng = Noise(self.seed);
        let n_pairs = self.long_pairs + self.short_pairs;
        let mut data = Array2::<f64>::zeros((2 * n_pairs, n));
        let mut channels = Vec::with_capacity(2 * n_pairs);

        for p in 0..n_pairs {
            let is_long = p < self.long_pairs;
            let distance = if is_long { self.long_distance } else { self.short_distance };
            let pair = if is_long { format!("S{}_D{}", p + 1, p + 1) } else { format!("S{}_D{}", p + 1, p + 101) };

            for k in 0..n {
                let task: f64 = if is_long { responses.iter().map(|(amp, r)| amp * r[k]).sum() } else { 0.0 };
                let hbo = (task + systemic[k] + self.noise * rng.normal()) * 1e-6;
                let hbr = (self.hbr_ratio * task - 0.5 * systemic[k] + self.noise * rng.normal()) * 1e-6;
                for (w, (e_hbo, e_hbr)) in eps.iter().enumerate() {
                    let od = (e_hbo * hbo + e_hbr * hbr) * 0.2303 * distance * self.ppf * 1e3;
                    data[[2 * p + w, k]] = (-od).exp();
                }
            }
            for &w in &self.wavelengths {
                channels.push(Channel::intensity(&pair, w, distance));
            }
        }

        Recording::new(data, self.sfreq, channels, annotations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_and_annotations() {
        let sim = Simulation {
            conditions: vec![SimCondition::new("A", 1.0), SimCondition::new("B", 2.0)],
            events_per_condition: 3,
            ..Default::default()
        };
        let rec = sim.recording().unwrap();
        assert_eq!(rec.n_channels(), 4);
        assert_eq!(rec.n_times(), 3000);
        assert_eq!(rec.channel_names(), vec!["S1_D1 760", "S1_D1 850", "S2_D102 760", "S2_D102 850"]);
        assert_eq!(rec.annotations.len(), 6);
        assert_eq!(rec.annotations[1].description, "B");
        approx::assert_abs_diff_eq!(rec.stimulus_duration().unwrap(), 5.0);
        assert!(rec.data.iter().all(|v| v.is_finite() && *v > 0.0));
    }

    #[test]
    fn same_seed_same_data() {
        let a = Simulation::default().recording().unwrap();
        let b = Simulation::default().recording().unwrap();
        assert_eq!(a.data, b.data);
        let c = Simulation { seed: 2, ..Default::default() }.recording().unwrap();
        assert_ne!(a.data, c.data);
    }
}
