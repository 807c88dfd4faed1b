//! # nirs-glm: fNIRS first- and group-level GLM in pure Rust
//!
//! `nirs-glm` takes raw fNIRS light-intensity recordings laid out as a BIDS
//! dataset, fits a channel-wise General Linear Model per recording,
//! aggregates channels into regions of interest and fits a random-intercept
//! mixed model across participants. Conversion steps follow MNE-Python and
//! the design matrix follows nilearn / MNE-NIRS conventions.
//!
//! ## Pipeline overview
//!
//! ```text
//! sub-01_task-tapping_nirs.safetensors
//!   │
//!   ├─ haemo::optical_density()    -ln(I / mean I)
//!   ├─ haemo::beer_lambert()       modified Beer–Lambert, ppf 6 → HbO / HbR
//!   ├─ resample                    FFT → target_sfreq (default 0.6 Hz)
//!   ├─ short / long split          ≤ 1 cm short, 1.5–4.5 cm long
//!   ├─ design::build_design_matrix HRF ⊛ boxcar, drifts, constant, shorts
//!   ├─ glm::run_glm                OLS or AR(1)-prewhitened, per channel
//!   └─ roi::aggregate              "AllChannels", equal weights
//!        │
//!        └─→ GlmRow / RoiRow (beta, se in µM)
//!
//! pooled RoiRow of every subject
//!   └─ group::fit_roi_model        theta ~ -1 + ROI:Condition:Chroma, groups = ID
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use nirs_glm::{run_batch, BatchConfig};
//!
//! let cfg = BatchConfig {
//!     input:  "/data/bids".into(),
//!     output: "/data/bids/derivatives/glm".into(),
//!     ..BatchConfig::default()
//! };
//! let summary = run_batch(&cfg).unwrap();
//! println!("{} recordings", summary.runs.len());
//! ```
//!
//! ## Analysing one recording
//!
//! ```no_run
//! use nirs_glm::{analyze_recording, AnalysisConfig, Deadline};
//! use nirs_glm::io::read_recording;
//! use std::path::Path;
//!
//! let raw = read_recording(Path::new("sub-01_task-tapping_nirs.safetensors")).unwrap();
//! let first = analyze_recording(&raw, "01", &AnalysisConfig::default(), &[], &Deadline::unlimited())
//!     .unwrap();
//! for row in &first.roi_rows {
//!     println!("{} {} {}: {:.3} µM", row.roi, row.condition, row.chroma, row.theta);
//! }
//! ```

pub mod batch;
pub mod config;
pub mod dataset;
pub mod deadline;
pub mod design;
pub mod error;
pub mod glm;
pub mod group;
pub mod haemo;
pub mod io;
pub mod output;
pub mod recording;
pub mod report;
pub mod resample;
pub mod roi;
pub mod simulate;
pub mod stats;

// ── Crate-root re-exports ─────────────────────────────────────────────────

// config
pub use config::{
    AnalysisConfig, BatchConfig, ChannelFailurePolicy, DriftModel, HrfModel, NoiseModel, RoiWeighting,
    Selector, SessionSelector, ShortRegressorMode,
};

// data model and sources
pub use dataset::BidsDataset;
pub use recording::{Annotation, Channel, Chromophore, Recording, RecordingKey, RecordingSource};

// errors
pub use error::{AnalysisError, Result};

// stages
pub use deadline::Deadline;
pub use design::{build_design_matrix, DesignMatrix, Regressor, RegressorKind};
pub use glm::{run_glm, GlmResults, GlmRow};
pub use group::{fit_channel_model, fit_roi_model, GroupAnalysis, GroupRow, GroupStage};
pub use haemo::{condition, Conditioned};
pub use roi::{aggregate, RoiDefinition, RoiRow};

// batch
pub use batch::{run_batch, run_keys, BatchSummary, Outcome};

/// Everything the first-level chain produced for one recording.
#[derive(Debug, Clone)]
pub struct FirstLevel {
    pub design: DesignMatrix,
    pub glm: GlmResults,
    /// Every (channel, regressor) row, nuisance terms included.
    pub glm_rows: Vec<GlmRow>,
    pub roi_rows: Vec<RoiRow>,
}

/// Run the **first-level chain** on one raw-intensity recording.
///
/// 1. Check that every stimulus shares one duration.
/// 2. Optical density, Beer–Lambert, resample, short/long split
///    ([`condition`]).
/// 3. Design matrix for the long channels ([`build_design_matrix`]), with
///    short channels as nuisance regressors when enabled.
/// 4. Channel-wise GLM ([`run_glm`]).
/// 5. ROI aggregation ([`aggregate`]); an empty `rois` means the single
///    `"AllChannels"` ROI.
///
/// `deadline` is checked between stages and once per GLM channel.
///
/// # Errors
///
/// Any [`AnalysisError`] of the stages; nothing is written to disk.
pub fn analyze_recording(
    raw: &Recording,
    subject: &str,
    cfg: &AnalysisConfig,
    rois: &[RoiDefinition],
    deadline: &Deadline,
) -> Result<FirstLevel> {
    let cond = condition(raw, cfg)?;
    deadline.check()?;

    let short = cfg.short_regression.then_some(&cond.short);
    let design = build_design_matrix(&cond.long, cond.stim_duration, short, cfg)?;
    deadline.check()?;

    let glm = run_glm(&cond.long, &design, cfg, deadline)?;
    let glm_rows = glm.rows(subject);

    let default_roi;
    let rois = if rois.is_empty() {
        default_roi = [RoiDefinition::all_channels(cond.long.n_channels())];
        &default_roi[..]
    } else {
        rois
    };
    let roi_rows = aggregate(&glm, rois, cfg.roi_weighting, subject)?;

    Ok(FirstLevel { design, glm, glm_rows, roi_rows })
}
