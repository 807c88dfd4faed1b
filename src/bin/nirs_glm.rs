use anyhow::{bail, Result};
use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;

use nirs_glm::{
    run_batch, AnalysisConfig, BatchConfig, DriftModel, NoiseModel, Outcome, Selector, SessionSelector,
};

#[derive(Clone, Copy, ValueEnum)]
enum Noise {
    Ols,
    Ar1,
}

#[derive(Parser)]
#[command(name = "nirs-glm", version, about = "fNIRS first-level and group-level GLM over a BIDS dataset")]
struct Args {
    /// BIDS dataset root
    #[arg(long, default_value = "/bids_dataset")]
    input_datasets: PathBuf,

    /// Where derivatives are written
    #[arg(long, default_value = "/bids_dataset/derivatives/fnirs-apps-glm-pipeline")]
    output_location: PathBuf,

    /// Participant labels without `sub-` (default: all)
    #[arg(long, num_args = 1..)]
    subject_label: Vec<String>,

    /// Session labels without `ses-`; `all` scans, default none
    #[arg(long, num_args = 1..)]
    session_label: Vec<String>,

    /// Task labels without `task-` (default: all)
    #[arg(long, num_args = 1..)]
    task_label: Vec<String>,

    /// Include short-channel regressors
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    short_regression: bool,

    /// Target sampling rate in Hz
    #[arg(long, default_value_t = 0.6)]
    sample_rate: f64,

    /// Keep drift and constant rows in the GLM tables
    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    export_drifts: bool,

    /// Keep short-channel rows in the GLM tables
    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    export_shorts: bool,

    /// Also fit the HbO channel-level group model
    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    channel_model: bool,

    /// Minimum number of subjects for the group model
    #[arg(long, default_value_t = 3)]
    min_group_subjects: usize,

    /// Worker threads (0 = all cores)
    #[arg(long, default_value_t = 0)]
    jobs: usize,

    /// Per-recording time budget in seconds
    #[arg(long)]
    timeout_secs: Option<f64>,

    /// Serial-correlation model of the channel GLM
    #[arg(long, value_enum, default_value_t = Noise::Ar1)]
    noise_model: Noise,

    /// Polynomial drift order
    #[arg(long, default_value_t = 2)]
    drift_order: usize,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if !(args.sample_rate.is_finite() && args.sample_rate > 0.0) {
        bail!("--sample-rate must be positive, got {}", args.sample_rate);
    }

    let cfg = BatchConfig {
        input: args.input_datasets,
        output: args.output_location,
        subjects: Selector::from_labels(args.subject_label),
        sessions: SessionSelector::from_labels(args.session_label),
        tasks: Selector::from_labels(args.task_label),
        export_drifts: args.export_drifts,
        export_shorts: args.export_shorts,
        channel_group_model: args.channel_model,
        min_group_subjects: args.min_group_subjects,
        jobs: args.jobs,
        recording_timeout_secs: args.timeout_secs,
        analysis: AnalysisConfig {
            target_sfreq: args.sample_rate,
            short_regression: args.short_regression,
            noise_model: match args.noise_model {
                Noise::Ols => NoiseModel::Ols,
                Noise::Ar1 => NoiseModel::Ar1,
            },
            drift: DriftModel::Polynomial { order: args.drift_order },
            ..AnalysisConfig::default()
        },
    };

    let summary = run_batch(&cfg)?;
    let failed = summary.count(|o| matches!(o, Outcome::Failed { .. }));
    println!(
        "{} recordings: {} completed, {} skipped, {failed} failed → {}",
        summary.runs.len(),
        summary.count(|o| matches!(o, Outcome::Completed { .. })),
        summary.count(|o| matches!(o, Outcome::Skipped { .. })),
        cfg.output.display()
    );

    Ok(())
}
