mod common;
use common::two_conditions;
use nirs_glm::group::summary;
use nirs_glm::{
    analyze_recording, fit_channel_model, fit_roi_model, AnalysisConfig, Chromophore, Deadline, GlmRow,
    GroupStage, RoiRow, ShortRegressorMode,
};

const OFFSETS: [f64; 4] = [-0.3, -0.1, 0.1, 0.3];

fn pooled(n_subjects: usize) -> (Vec<RoiRow>, Vec<GlmRow>) {
    let cfg = AnalysisConfig { short_mode: ShortRegressorMode::Mean, ..AnalysisConfig::default() };
    let mut roi = Vec::new();
    let mut glm = Vec::new();
    for s in 0..n_subjects {
        let raw = two_conditions(100 + s as u64, OFFSETS[s % OFFSETS.len()]);
        let id = format!("{:02}", s + 1);
        let first = analyze_recording(&raw, &id, &cfg, &[], &Deadline::unlimited()).unwrap();
        roi.extend(first.roi_rows);
        glm.extend(first.glm_rows);
    }
    (roi, glm)
}

#[test]
fn four_subjects_two_conditions() {
    let (roi, _) = pooled(4);
    let conditions: Vec<&RoiRow> = roi.iter().filter(|r| !r.kind.is_nuisance()).collect();
    assert_eq!(conditions.len(), 16);

    let stage = fit_roi_model(&roi, 3).unwrap();
    let analysis = stage.analysis().expect("group model should run");
    assert_eq!(analysis.term_label, "ROI");
    assert_eq!(analysis.rows.len(), 4);
    assert_eq!(analysis.fit.n_obs, 16);
    assert_eq!(analysis.fit.n_groups(), 4);
    assert_eq!(analysis.subjects, vec!["01", "02", "03", "04"]);

    // Cells in sorted order: (AllChannels, A, hbo), (A, hbr), (B, hbo), (B, hbr).
    let labels: Vec<(&str, Chromophore)> =
        analysis.rows.iter().map(|r| (r.condition.as_str(), r.chroma)).collect();
    assert_eq!(
        labels,
        vec![("A", Chromophore::Hbo), ("A", Chromophore::Hbr), ("B", Chromophore::Hbo), ("B", Chromophore::Hbr)]
    );

    // Offsets average to zero, so the fixed effects sit at the simulated
    // amplitudes.
    approx::assert_abs_diff_eq!(analysis.rows[0].estimate, 2.0, epsilon = 0.15);
    approx::assert_abs_diff_eq!(analysis.rows[2].estimate, 1.0, epsilon = 0.15);
    approx::assert_abs_diff_eq!(analysis.rows[1].estimate, -0.6, epsilon = 0.15);
    for r in &analysis.rows {
        assert!(r.se > 0.0 && r.se.is_finite());
        approx::assert_relative_eq!(r.z, r.estimate / r.se, max_relative = 1e-9);
        assert!((0.0..=1.0).contains(&r.p_value));
    }
    assert!(analysis.fit.group_var >= 0.0);
    assert!(analysis.fit.scale > 0.0);
}

#[test]
fn fixed_effects_equal_cell_means_when_balanced() {
    let (roi, _) = pooled(4);
    let stage = fit_roi_model(&roi, 3).unwrap();
    let analysis = stage.analysis().unwrap();
    for row in &analysis.rows {
        let cell: Vec<f64> = roi
            .iter()
            .filter(|r| r.condition == row.condition && r.chroma == row.chroma)
            .map(|r| r.theta)
            .collect();
        assert_eq!(cell.len(), 4);
        let mean = cell.iter().sum::<f64>() / 4.0;
        approx::assert_abs_diff_eq!(row.estimate, mean, epsilon = 1e-8);
    }
}

#[test]
fn too_few_subjects_skip_the_group_stage() {
    let (roi, _) = pooled(2);
    match fit_roi_model(&roi, 3).unwrap() {
        GroupStage::Skipped { subjects, required } => {
            assert_eq!(subjects, 2);
            assert_eq!(required, 3);
        }
        GroupStage::Completed(_) => panic!("two subjects must not be modelled"),
    }
}

#[test]
fn channel_model_uses_hbo_channels_only() {
    let (_, glm) = pooled(3);
    let stage = fit_channel_model(&glm, 3).unwrap();
    let analysis = stage.analysis().unwrap();
    assert_eq!(analysis.term_label, "ch_name");
    assert!(analysis.rows.iter().all(|r| r.chroma == Chromophore::Hbo));
    assert!(analysis.rows.iter().all(|r| r.term == "S1_D1 hbo"));
    assert_eq!(analysis.rows.len(), 2);
}

#[test]
fn summary_lists_every_fixed_effect() {
    let (roi, _) = pooled(3);
    let stage = fit_roi_model(&roi, 3).unwrap();
    let text = summary::render(stage.analysis().unwrap());
    assert!(text.contains("Mixed Linear Model Regression Results"));
    for term in ["A", "B"] {
        assert!(text.contains(&summary::term_name("ROI", "AllChannels", term, "hbo")));
    }
    assert!(text.contains("Group Var"));
}
