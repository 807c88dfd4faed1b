//! Signal conditioning: raw intensity → haemoglobin → target rate → split.
//!
//! - [`optical_density`]: `-ln(I / mean(I))` per channel.
//! - [`beer_lambert`]: modified Beer–Lambert law per source–detector pair.
//!
//! [`condition`] chains both with resampling and the short/long split, and
//! validates the stimulus design first so a recording with mixed durations
//! never gets as far as a design matrix.
pub mod beer_lambert;
pub mod optical_density;

pub use beer_lambert::{beer_lambert, extinction};
pub use optical_density::optical_density;

use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result};
use crate::recording::{Recording, Separation};

/// Output of the conditioning stage.
#[derive(Debug, Clone)]
pub struct Conditioned {
    /// Long-separation concentration channels (signal of interest).
    pub long: Recording,
    /// Short-separation concentration channels (nuisance). May be empty.
    pub short: Recording,
    /// The single stimulus duration shared by every annotation, seconds.
    pub stim_duration: f64,
}

/// Run the full conditioning chain on a raw-intensity recording.
///
/// # Errors
///
/// * [`AnalysisError::UnsupportedDesign`] if annotation durations differ.
/// * [`AnalysisError::InvalidRecording`] if pairs are malformed or no long
///   channel survives the split.
/// * [`AnalysisError::NumericalFailure`] for unusable intensities.
pub fn condition(raw: &Recording, cfg: &AnalysisConfig) -> Result<Conditioned> {
    let stim_duration = raw.stimulus_duration()?;

    let od = optical_density(raw)?;
    let haemo = beer_lambert(&od, cfg.ppf)?;
    log::info!("    Resampling to {} Hz", cfg.target_sfreq);
    let haemo = haemo.resample(cfg.target_sfreq)?;

    let class =
        |i: usize| haemo.channels[i].separation(cfg.short_max_distance, cfg.long_min_distance, cfg.long_max_distance);
    let all: Vec<usize> = (0..haemo.n_channels()).collect();
    let short: Vec<usize> = all.iter().copied().filter(|&i| class(i) == Separation::Short).collect();
    let long: Vec<usize> = all.iter().copied().filter(|&i| class(i) == Separation::Long).collect();

    let dropped = haemo.n_channels() - short.len() - long.len();
    if dropped > 0 {
        log::warn!("    Dropping {dropped} channels outside the short/long distance windows");
    }
    if long.is_empty() {
        return Err(AnalysisError::InvalidRecording("no long-separation channels".into()));
    }
    log::debug!("    {} long, {} short channels", long.len(), short.len());

    Ok(Conditioned {
        long: haemo.pick(&long),
        short: haemo.pick(&short),
        stim_duration,
    })
}
