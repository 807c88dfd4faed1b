//! Analysis and batch configuration.
//!
//! [`AnalysisConfig`] holds every tunable parameter of the per-recording
//! chain (conditioning → design → GLM → ROI). [`BatchConfig`] wraps it with
//! the dataset selection, output toggles and scheduling knobs. Both are
//! plain values: build one, then pass it by reference into the stage entry
//! points. Nothing reads process-global state.
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Canonical haemodynamic response function used for condition regressors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HrfModel {
    /// Glover (1999): peak 6 s, undershoot 12 s, dispersions 0.9, ratio 0.35.
    Glover,
    /// SPM canonical: peak 6 s, undershoot 16 s, dispersions 1.0, ratio 1/6.
    Spm,
}

/// Low-frequency drift basis appended after the condition regressors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftModel {
    /// Polynomials `t¹ … t^order`, orthogonalised against lower orders.
    Polynomial { order: usize },
    /// Discrete cosine basis below `high_pass` Hz.
    Cosine { high_pass: f64 },
}

/// Serial-correlation handling in the channel GLM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseModel {
    /// Plain ordinary least squares.
    Ols,
    /// OLS, then lag-1 prewhitening of signal and design, then refit.
    Ar1,
}

/// How short-separation channels enter the design matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortRegressorMode {
    /// One column `short{i}` per short channel.
    PerChannel,
    /// A single column `short_mean` averaging every short channel.
    Mean,
}

/// Channel weights inside a region of interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoiWeighting {
    /// Arithmetic mean.
    Equal,
    /// Weights proportional to `1 / se²`.
    InverseVariance,
}

/// What the GLM does with a channel whose fit is degenerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelFailurePolicy {
    /// Fail the whole recording.
    AbortRecording,
    /// Log, drop the channel and continue with the rest.
    DropChannel,
}

/// Per-recording analysis parameters.
///
/// All fields are `pub`, so override only what you need:
///
/// ```
/// use nirs_glm::{AnalysisConfig, NoiseModel};
///
/// let cfg = AnalysisConfig {
///     target_sfreq: 1.0,
///     noise_model:  NoiseModel::Ols,
///     ..AnalysisConfig::default()
/// };
/// assert!(cfg.short_regression);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Sampling rate in Hz after conditioning.
    ///
    /// The resampler is skipped when the recording is already at this rate
    /// (within 1 µHz).
    ///
    /// Default: `0.6` Hz.
    pub target_sfreq: f64,

    /// Partial pathlength factor of the modified Beer–Lambert law.
    ///
    /// Default: `6.0`.
    pub ppf: f64,

    /// Channels at or below this source–detector distance (metres) are
    /// short-separation nuisance channels.
    ///
    /// Default: `0.01` m.
    pub short_max_distance: f64,

    /// Lower bound (metres) of the long-separation window.
    ///
    /// Default: `0.015` m.
    pub long_min_distance: f64,

    /// Upper bound (metres) of the long-separation window. Channels beyond
    /// it are dropped.
    ///
    /// Default: `0.045` m.
    pub long_max_distance: f64,

    /// Default: [`HrfModel::Glover`].
    pub hrf: HrfModel,

    /// Sub-samples per frame used when convolving the stimulus boxcar with
    /// the HRF.
    ///
    /// Default: `50`.
    pub oversampling: usize,

    /// Default: second-order polynomial.
    pub drift: DriftModel,

    /// Append short-channel signals as nuisance regressors.
    ///
    /// Default: `true`.
    pub short_regression: bool,

    /// Default: [`ShortRegressorMode::PerChannel`].
    pub short_mode: ShortRegressorMode,

    /// Default: [`NoiseModel::Ar1`].
    pub noise_model: NoiseModel,

    /// Default: [`RoiWeighting::Equal`].
    pub roi_weighting: RoiWeighting,

    /// Default: [`ChannelFailurePolicy::AbortRecording`].
    pub channel_failure: ChannelFailurePolicy,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            target_sfreq: 0.6,
            ppf: 6.0,
            short_max_distance: 0.01,
            long_min_distance: 0.015,
            long_max_distance: 0.045,
            hrf: HrfModel::Glover,
            oversampling: 50,
            drift: DriftModel::Polynomial { order: 2 },
            short_regression: true,
            short_mode: ShortRegressorMode::PerChannel,
            noise_model: NoiseModel::Ar1,
            roi_weighting: RoiWeighting::Equal,
            channel_failure: ChannelFailurePolicy::AbortRecording,
        }
    }
}

/// Subject or task selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    /// Everything found by scanning the dataset.
    All,
    /// Exactly these labels (without the `sub-` / `task-` prefix).
    List(Vec<String>),
}

impl Selector {
    /// `[]` and `["all"]` both mean [`Selector::All`].
    pub fn from_labels(labels: Vec<String>) -> Self {
        if labels.is_empty() || (labels.len() == 1 && labels[0] == "all") {
            Self::All
        } else {
            Self::List(labels)
        }
    }
}

/// Session selection. Datasets without `ses-*` directories use `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionSelector {
    All,
    None,
    List(Vec<String>),
}

impl SessionSelector {
    /// `[]` → `None`, `["all"]` → `All`, `["none"]` → `None`.
    pub fn from_labels(labels: Vec<String>) -> Self {
        match labels.as_slice() {
            [] => Self::None,
            [one] if one == "none" => Self::None,
            [one] if one == "all" => Self::All,
            _ => Self::List(labels),
        }
    }
}

/// Batch run: which recordings, where results go, how work is scheduled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// BIDS dataset root.
    ///
    /// Default: `/bids_dataset`.
    pub input: PathBuf,

    /// Derivatives root for every artefact the batch writes.
    ///
    /// Default: `/bids_dataset/derivatives/fnirs-apps-glm-pipeline`.
    pub output: PathBuf,

    pub subjects: Selector,
    pub sessions: SessionSelector,
    pub tasks: Selector,

    /// Keep drift and constant rows in the per-recording CSV.
    ///
    /// Default: `false`.
    pub export_drifts: bool,

    /// Keep short-channel rows in the per-recording CSV.
    ///
    /// Default: `false`.
    pub export_shorts: bool,

    /// Also fit the HbO channel-level group model (`group_channels.csv`).
    ///
    /// Default: `false`.
    pub channel_group_model: bool,

    /// Minimum number of contributing subjects before the group model
    /// runs. Below it the stage is skipped with a warning.
    ///
    /// Default: `3`.
    pub min_group_subjects: usize,

    /// Worker threads; `0` lets rayon pick the available parallelism.
    ///
    /// Default: `0`.
    pub jobs: usize,

    /// Per-recording wall-clock budget in seconds. `None` disables it.
    ///
    /// Default: `None`.
    pub recording_timeout_secs: Option<f64>,

    pub analysis: AnalysisConfig,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("/bids_dataset"),
            output: PathBuf::from("/bids_dataset/derivatives/fnirs-apps-glm-pipeline"),
            subjects: Selector::All,
            sessions: SessionSelector::None,
            tasks: Selector::All,
            export_drifts: false,
            export_shorts: false,
            channel_group_model: false,
            min_group_subjects: 3,
            jobs: 0,
            recording_timeout_secs: None,
            analysis: AnalysisConfig::default(),
        }
    }
}

impl BatchConfig {
    /// The per-recording timeout as a [`Duration`], if any.
    pub fn recording_timeout(&self) -> Option<Duration> {
        self.recording_timeout_secs
            .filter(|s| s.is_finite() && *s > 0.0)
            .map(Duration::from_secs_f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_pipeline_surface() {
        let cfg = BatchConfig::default();
        assert!(cfg.analysis.short_regression);
        assert!(!cfg.export_drifts);
        assert!(!cfg.export_shorts);
        assert_eq!(cfg.min_group_subjects, 3);
        approx::assert_abs_diff_eq!(cfg.analysis.target_sfreq, 0.6);
    }

    #[test]
    fn selector_all_keyword() {
        assert_eq!(Selector::from_labels(vec![]), Selector::All);
        assert_eq!(Selector::from_labels(vec!["all".into()]), Selector::All);
        assert_eq!(
            Selector::from_labels(vec!["01".into(), "02".into()]),
            Selector::List(vec!["01".into(), "02".into()])
        );
    }

    #[test]
    fn session_selector_keywords() {
        assert_eq!(SessionSelector::from_labels(vec![]), SessionSelector::None);
        assert_eq!(SessionSelector::from_labels(vec!["none".into()]), SessionSelector::None);
        assert_eq!(SessionSelector::from_labels(vec!["all".into()]), SessionSelector::All);
    }

    #[test]
    fn zero_timeout_is_disabled() {
        let cfg = BatchConfig { recording_timeout_secs: Some(0.0), ..BatchConfig::default() };
        assert!(cfg.recording_timeout().is_none());
        let cfg = BatchConfig { recording_timeout_secs: Some(2.5), ..BatchConfig::default() };
        assert_eq!(cfg.recording_timeout(), Some(Duration::from_millis(2500)));
    }
}
