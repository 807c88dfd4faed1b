//! Plain-text summary of a group fit, laid out like a statsmodels
//! `MixedLM` results table.
use std::fmt::Write;

use super::GroupAnalysis;

const Z_975: f64 = 1.959_963_984_540_054;

/// Fixed-effect label in formula notation, e.g.
/// `ROI[AllChannels]:Condition[A]:Chroma[hbo]`.
pub fn term_name(label: &str, term: &str, condition: &str, chroma: &str) -> String {
    format!("{label}[{term}]:Condition[{condition}]:Chroma[{chroma}]")
}

pub fn render(analysis: &GroupAnalysis) -> String {
    let fit = &analysis.fit;
    let names: Vec<String> = analysis
        .rows
        .iter()
        .map(|r| term_name(analysis.term_label, &r.term, &r.condition, r.chroma.as_str()))
        .collect();
    let name_w = names.iter().map(String::len).max().unwrap_or(0).max(10);
    let width = name_w + 56;
    let rule = |c: char| c.to_string().repeat(width);

    let sizes = &fit.group_sizes;
    let min = sizes.iter().copied().min().unwrap_or(0);
    let max = sizes.iter().copied().max().unwrap_or(0);
    let mean = if sizes.is_empty() { 0.0 } else { fit.n_obs as f64 / sizes.len() as f64 };

    let mut s = String::new();
    let title = "Mixed Linear Model Regression Results";
    let _ = writeln!(s, "{title:^width$}");
    let _ = writeln!(s, "{}", rule('='));
    let _ = writeln!(s, "{:<20}{:<16}{:<24}{}", "Model:", "MixedLM", "Dependent Variable:", "theta");
    let _ = writeln!(s, "{:<20}{:<16}{:<24}{}", "No. Observations:", fit.n_obs, "Method:", "REML");
    let _ = writeln!(s, "{:<20}{:<16}{:<24}{:.4}", "No. Groups:", sizes.len(), "Scale:", fit.scale);
    let _ = writeln!(s, "{:<20}{:<16}{:<24}{:.4}", "Min. group size:", min, "Log-Likelihood:", fit.log_reml);
    let _ = writeln!(
        s,
        "{:<20}{:<16}{:<24}{}",
        "Max. group size:",
        max,
        "Converged:",
        if fit.converged { "Yes" } else { "No" }
    );
    let _ = writeln!(s, "{:<20}{:.1}", "Mean group size:", mean);
    let _ = writeln!(s, "{}", rule('-'));
    let _ = writeln!(
        s,
        "{:<name_w$} {:>9} {:>9} {:>7} {:>7} {:>9} {:>9}",
        "", "Coef.", "Std.Err.", "z", "P>|z|", "[0.025", "0.975]"
    );
    let _ = writeln!(s, "{}", rule('-'));
    for (name, r) in names.iter().zip(&analysis.rows) {
        let _ = writeln!(
            s,
            "{:<name_w$} {:>9.3} {:>9.3} {:>7.3} {:>7.3} {:>9.3} {:>9.3}",
            name,
            r.estimate,
            r.se,
            r.z,
            r.p_value,
            r.estimate - Z_975 * r.se,
            r.estimate + Z_975 * r.se
        );
    }
    let _ = writeln!(s, "{:<name_w$} {:>9.3}", "Group Var", fit.group_var);
    let _ = writeln!(s, "{}", rule('='));
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::{GroupRow, MixedModelFit};
    use crate::recording::Chromophore;

    #[test]
    fn table_lists_every_fixed_effect() {
        let analysis = GroupAnalysis {
            term_label: "ROI",
            rows: vec![GroupRow {
                term: "AllChannels".into(),
                condition: "A".into(),
                chroma: Chromophore::Hbo,
                estimate: 1.25,
                se: 0.5,
                z: 2.5,
                p_value: 0.0124,
            }],
            fit: MixedModelFit {
                beta: vec![1.25],
                se: vec![0.5],
                group_var: 0.3,
                scale: 0.2,
                log_reml: -3.5,
                n_obs: 4,
                group_sizes: vec![1, 1, 1, 1],
                converged: true,
            },
            subjects: vec!["01".into(), "02".into(), "03".into(), "04".into()],
        };
        let text = render(&analysis);
        assert!(text.contains("Mixed Linear Model Regression Results"));
        assert!(text.contains("ROI[AllChannels]:Condition[A]:Chroma[hbo]"));
        assert!(text.contains("No. Groups:"));
        assert!(text.contains("Group Var"));
        assert!(text.contains("1.250"));
    }
}
