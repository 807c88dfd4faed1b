mod common;
use common::single_condition;
use nirs_glm::haemo::{condition, optical_density};
use nirs_glm::simulate::{SimCondition, Simulation};
use nirs_glm::{AnalysisConfig, AnalysisError, Annotation, Channel, Chromophore, Recording};
use ndarray::Array2;
use std::f64::consts::PI;

#[test]
fn constant_intensity_has_zero_optical_density() {
    let raw = Recording::new(
        Array2::from_elem((2, 50), 3.7),
        10.0,
        vec![Channel::intensity("S1_D1", 760.0, 0.03), Channel::intensity("S1_D1", 850.0, 0.03)],
        vec![Annotation::new(1.0, 1.0, "A")],
    )
    .unwrap();
    let od = optical_density(&raw).unwrap();
    assert!(od.data.iter().all(|v| v.abs() < 1e-12));
}

#[test]
fn conditioned_layout() {
    let raw = single_condition(1);
    let cond = condition(&raw, &AnalysisConfig::default()).unwrap();

    assert_eq!(cond.long.channel_names(), vec!["S1_D1 hbo", "S1_D1 hbr"]);
    assert_eq!(cond.short.channel_names(), vec!["S2_D102 hbo", "S2_D102 hbr"]);
    approx::assert_abs_diff_eq!(cond.long.sfreq, 0.6);
    // 300 s at 10 Hz → 180 frames at 0.6 Hz.
    assert_eq!(cond.long.n_times(), 180);
    assert_eq!(cond.short.n_times(), 180);
    approx::assert_abs_diff_eq!(cond.stim_duration, 5.0);
    assert_eq!(cond.long.annotations.len(), 3);
}

#[test]
fn recovers_systemic_oscillation_in_molar() {
    // No task response and no noise: every pair carries only the 0.1 Hz
    // systemic signal (0.5 µM HbO, -0.25 µM HbR).
    let raw = Simulation {
        conditions: vec![SimCondition::new("A", 0.0)],
        events_per_condition: 2,
        noise: 0.0,
        ..Simulation::default()
    }
    .recording()
    .unwrap();
    let cond = condition(&raw, &AnalysisConfig::default()).unwrap();

    for rec in [&cond.long, &cond.short] {
        let times = rec.times();
        for (row, ch) in rec.data.rows().into_iter().zip(&rec.channels) {
            let scale = match ch.chromophore().unwrap() {
                Chromophore::Hbo => 0.5e-6,
                Chromophore::Hbr => -0.25e-6,
            };
            for k in 10..times.len() - 10 {
                let want = scale * (2.0 * PI * 0.1 * times[k]).sin();
                approx::assert_abs_diff_eq!(row[k], want, epsilon = 0.02e-6);
            }
        }
    }
}

#[test]
fn mixed_durations_are_rejected_before_conversion() {
    let mut raw = single_condition(1);
    raw.annotations[1].duration = 10.0;
    let err = condition(&raw, &AnalysisConfig::default()).unwrap_err();
    match err {
        AnalysisError::UnsupportedDesign { durations } => assert_eq!(durations, vec![5.0, 10.0]),
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn no_long_channels_is_invalid() {
    let raw = Simulation { long_pairs: 0, short_pairs: 2, ..Simulation::default() }.recording().unwrap();
    assert!(matches!(
        condition(&raw, &AnalysisConfig::default()),
        Err(AnalysisError::InvalidRecording(_))
    ));
}

#[test]
fn intermediate_pairs_are_dropped() {
    let mut raw = Simulation { long_pairs: 2, ..Simulation::default() }.recording().unwrap();
    // Second long pair moved to 12 mm: neither short nor long.
    for ch in raw.channels.iter_mut().filter(|c| c.pair == "S2_D2") {
        ch.distance = 0.012;
    }
    let cond = condition(&raw, &AnalysisConfig::default()).unwrap();
    assert_eq!(cond.long.channel_names(), vec!["S1_D1 hbo", "S1_D1 hbr"]);
    assert_eq!(cond.short.n_channels(), 2);
}
