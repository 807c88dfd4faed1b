//! In-memory fNIRS recording and the capability trait that produces it.
//!
//! A [`Recording`] is a `[C, T]` `f64` matrix with its sampling rate,
//! channel descriptors and stimulus annotations. The same type carries raw
//! intensity (one row per source–detector pair and wavelength) and
//! haemoglobin concentration (one row per pair and chromophore); the
//! [`Measure`] of each channel tells which.
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use crate::error::{AnalysisError, Result};

/// Tolerance used when comparing stimulus durations, in seconds.
const DURATION_TOL: f64 = 1e-9;

// ── Channel description ──────────────────────────────────────────────────

/// Haemoglobin species.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chromophore {
    /// Oxygenated haemoglobin.
    Hbo,
    /// Deoxygenated haemoglobin.
    Hbr,
}

impl Chromophore {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hbo => "hbo",
            Self::Hbr => "hbr",
        }
    }
}

impl fmt::Display for Chromophore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a channel row measures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Measure {
    /// Light intensity (or optical density) at a wavelength in nm.
    Wavelength(f64),
    /// Concentration change of a chromophore, mol/L.
    Haemo(Chromophore),
}

/// Source–detector separation class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Separation {
    Short,
    Long,
    /// Between the short and long windows; excluded from the analysis.
    Intermediate,
}

/// One row of a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Full channel name, e.g. `"S1_D1 760"` or `"S1_D1 hbo"`.
    pub name: String,
    /// Source–detector pair, e.g. `"S1_D1"`.
    pub pair: String,
    /// Source–detector distance in metres.
    pub distance: f64,
    pub measure: Measure,
}

impl Channel {
    /// Raw-intensity channel named `"<pair> <wavelength>"`.
    pub fn intensity(pair: &str, wavelength: f64, distance: f64) -> Self {
        Self {
            name: format!("{pair} {}", wavelength.round() as i64),
            pair: pair.to_string(),
            distance,
            measure: Measure::Wavelength(wavelength),
        }
    }

    /// Concentration channel named `"<pair> hbo"` / `"<pair> hbr"`.
    pub fn haemo(pair: &str, chroma: Chromophore, distance: f64) -> Self {
        Self {
            name: format!("{pair} {chroma}"),
            pair: pair.to_string(),
            distance,
            measure: Measure::Haemo(chroma),
        }
    }

    pub fn chromophore(&self) -> Option<Chromophore> {
        match self.measure {
            Measure::Haemo(c) => Some(c),
            Measure::Wavelength(_) => None,
        }
    }

    pub fn wavelength(&self) -> Option<f64> {
        match self.measure {
            Measure::Wavelength(w) => Some(w),
            Measure::Haemo(_) => None,
        }
    }

    /// Classify by distance: `d ≤ short_max` → short,
    /// `long_min ≤ d ≤ long_max` → long, anything else intermediate.
    pub fn separation(&self, short_max: f64, long_min: f64, long_max: f64) -> Separation {
        if self.distance <= short_max {
            Separation::Short
        } else if self.distance >= long_min && self.distance <= long_max {
            Separation::Long
        } else {
            Separation::Intermediate
        }
    }
}

/// Pair part of an MNE-style channel name (`"S1_D1 760"` → `"S1_D1"`).
pub fn pair_of(name: &str) -> &str {
    name.split_whitespace().next().unwrap_or(name)
}

// ── Annotations ──────────────────────────────────────────────────────────

/// One stimulus event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Seconds from the first sample.
    pub onset: f64,
    /// Seconds.
    pub duration: f64,
    /// Condition label.
    pub description: String,
}

impl Annotation {
    pub fn new(onset: f64, duration: f64, description: impl Into<String>) -> Self {
        Self { onset, duration, description: description.into() }
    }
}

// ── Recording ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Recording {
    /// `[C, T]` samples.
    pub data: Array2<f64>,
    /// Sampling rate in Hz.
    pub sfreq: f64,
    pub channels: Vec<Channel>,
    pub annotations: Vec<Annotation>,
}

impl Recording {
    /// Build a recording, checking that shapes agree and the rate is usable.
    pub fn new(
        data: Array2<f64>,
        sfreq: f64,
        channels: Vec<Channel>,
        annotations: Vec<Annotation>,
    ) -> Result<Self> {
        if channels.len() != data.nrows() {
            return Err(AnalysisError::InvalidRecording(format!(
                "{} channel descriptors for {} data rows",
                channels.len(),
                data.nrows()
            )));
        }
        if !(sfreq.is_finite() && sfreq > 0.0) {
            return Err(AnalysisError::InvalidRecording(format!("sampling rate {sfreq} Hz")));
        }
        Ok(Self { data, sfreq, channels, annotations })
    }

    #[inline]
    pub fn n_channels(&self) -> usize {
        self.data.nrows()
    }

    #[inline]
    pub fn n_times(&self) -> usize {
        self.data.ncols()
    }

    /// Total duration in seconds.
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        self.n_times() as f64 / self.sfreq
    }

    /// Frame times `k / sfreq` in seconds.
    pub fn times(&self) -> Vec<f64> {
        (0..self.n_times()).map(|k| k as f64 / self.sfreq).collect()
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name.as_str()).collect()
    }

    /// The single stimulus duration shared by every annotation.
    ///
    /// Fails with [`AnalysisError::UnsupportedDesign`] when durations differ
    /// or when there is nothing to model.
    pub fn stimulus_duration(&self) -> Result<f64> {
        let durations: Vec<f64> = self.annotations.iter().map(|a| a.duration).collect();
        let Some(&first) = durations.first() else {
            return Err(AnalysisError::UnsupportedDesign { durations });
        };
        if durations.iter().any(|d| (d - first).abs() > DURATION_TOL) {
            let mut distinct = durations.clone();
            distinct.sort_by(f64::total_cmp);
            distinct.dedup_by(|a, b| (*a - *b).abs() <= DURATION_TOL);
            return Err(AnalysisError::UnsupportedDesign { durations: distinct });
        }
        Ok(first)
    }

    /// Copy of the recording restricted to `picks` (row indices, in order).
    pub fn pick(&self, picks: &[usize]) -> Recording {
        let mut data = Array2::<f64>::zeros((picks.len(), self.n_times()));
        for (dst, &src) in picks.iter().enumerate() {
            data.row_mut(dst).assign(&self.data.row(src));
        }
        Recording {
            data,
            sfreq: self.sfreq,
            channels: picks.iter().map(|&i| self.channels[i].clone()).collect(),
            annotations: self.annotations.clone(),
        }
    }

    /// Row indices of channels matching `pred`.
    pub fn picks_where(&self, pred: impl Fn(&Channel) -> bool) -> Vec<usize> {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, c)| pred(c))
            .map(|(i, _)| i)
            .collect()
    }

    /// Resample every channel to `sfreq`; annotations are kept as-is.
    pub fn resample(&self, sfreq: f64) -> Result<Recording> {
        if (self.sfreq - sfreq).abs() < 1e-6 {
            return Ok(self.clone());
        }
        if !(sfreq.is_finite() && sfreq > 0.0) {
            return Err(AnalysisError::InvalidRecording(format!("target rate {sfreq} Hz")));
        }
        let data = crate::resample::resample(&self.data, self.sfreq, sfreq);
        if data.ncols() == 0 {
            return Err(AnalysisError::InvalidRecording(format!(
                "{} samples at {} Hz leave nothing at {sfreq} Hz",
                self.n_times(),
                self.sfreq
            )));
        }
        Ok(Recording {
            data,
            sfreq,
            channels: self.channels.clone(),
            annotations: self.annotations.clone(),
        })
    }
}

// ── Source capability ────────────────────────────────────────────────────

/// Identity of one recording in a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordingKey {
    pub subject: String,
    pub session: Option<String>,
    pub task: String,
}

impl RecordingKey {
    pub fn new(subject: &str, session: Option<&str>, task: &str) -> Self {
        Self {
            subject: subject.to_string(),
            session: session.map(str::to_string),
            task: task.to_string(),
        }
    }

    /// BIDS entity prefix, e.g. `sub-01_ses-02_task-tapping`.
    pub fn bids_stem(&self) -> String {
        match &self.session {
            Some(ses) => format!("sub-{}_ses-{ses}_task-{}", self.subject, self.task),
            None => format!("sub-{}_task-{}", self.subject, self.task),
        }
    }
}

/// Drop repeated keys, keeping the first occurrence of each in order.
pub fn unique_keys<'a>(keys: impl IntoIterator<Item = &'a RecordingKey>) -> Vec<RecordingKey> {
    let mut seen = HashSet::new();
    keys.into_iter().filter(|k| seen.insert(*k)).cloned().collect()
}

impl fmt::Display for RecordingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.bids_stem())
    }
}

/// Anything that can hand out raw-intensity recordings.
///
/// The analysis stages only ever see [`Recording`]; which container format
/// or library produced it stays behind this trait.
pub trait RecordingSource: Sync {
    /// Load one recording. Must fail with [`AnalysisError::NotFound`] when
    /// nothing exists for `key`.
    fn load(&self, key: &RecordingKey) -> Result<Recording>;

    /// Every recording the source can provide.
    fn scan(&self) -> Result<Vec<RecordingKey>>;

    /// Backing file of `key`, when there is one (used for provenance).
    fn locate(&self, _key: &RecordingKey) -> Option<PathBuf> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec_with(durations: &[f64]) -> Recording {
        let annotations = durations
            .iter()
            .enumerate()
            .map(|(i, &d)| Annotation::new(10.0 * i as f64, d, "A"))
            .collect();
        Recording::new(
            Array2::zeros((1, 100)),
            10.0,
            vec![Channel::haemo("S1_D1", Chromophore::Hbo, 0.03)],
            annotations,
        )
        .unwrap()
    }

    #[test]
    fn uniform_duration_is_returned() {
        let r = rec_with(&[5.0, 5.0, 5.0]);
        approx::assert_abs_diff_eq!(r.stimulus_duration().unwrap(), 5.0);
    }

    #[test]
    fn mixed_durations_are_rejected() {
        let r = rec_with(&[5.0, 2.0, 5.0]);
        match r.stimulus_duration() {
            Err(AnalysisError::UnsupportedDesign { durations }) => {
                assert_eq!(durations, vec![2.0, 5.0]);
            }
            other => panic!("expected UnsupportedDesign, got {other:?}"),
        }
    }

    #[test]
    fn no_annotations_is_unsupported() {
        let r = rec_with(&[]);
        assert!(matches!(r.stimulus_duration(), Err(AnalysisError::UnsupportedDesign { .. })));
    }

    #[test]
    fn shape_mismatch_rejected() {
        let err = Recording::new(Array2::zeros((2, 10)), 10.0, vec![], vec![]).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidRecording(_)));
    }

    #[test]
    fn separation_windows() {
        let ch = |d| Channel::haemo("S1_D1", Chromophore::Hbo, d);
        assert_eq!(ch(0.008).separation(0.01, 0.015, 0.045), Separation::Short);
        assert_eq!(ch(0.012).separation(0.01, 0.015, 0.045), Separation::Intermediate);
        assert_eq!(ch(0.03).separation(0.01, 0.015, 0.045), Separation::Long);
        assert_eq!(ch(0.06).separation(0.01, 0.015, 0.045), Separation::Intermediate);
    }

    #[test]
    fn pick_keeps_order_and_annotations() {
        let data = Array2::from_shape_fn((3, 4), |(c, t)| (c * 10 + t) as f64);
        let channels = (0..3)
            .map(|i| Channel::intensity(&format!("S{i}_D1"), 760.0, 0.03))
            .collect();
        let r = Recording::new(data, 1.0, channels, vec![Annotation::new(0.0, 1.0, "A")]).unwrap();
        let p = r.pick(&[2, 0]);
        assert_eq!(p.channel_names(), vec!["S2_D1 760", "S0_D1 760"]);
        assert_eq!(p.data[[0, 3]], 23.0);
        assert_eq!(p.annotations.len(), 1);
    }

    #[test]
    fn bids_stem_with_and_without_session() {
        assert_eq!(RecordingKey::new("01", None, "tapping").bids_stem(), "sub-01_task-tapping");
        assert_eq!(
            RecordingKey::new("01", Some("2"), "tapping").bids_stem(),
            "sub-01_ses-2_task-tapping"
        );
        assert_eq!(pair_of("S3_D4 850"), "S3_D4");
    }
}
