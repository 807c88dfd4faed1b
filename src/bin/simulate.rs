//! Write a synthetic BIDS dataset of raw-intensity recordings.
//!
//! ```text
//! simulate --output /tmp/bids --subjects 5 --task tapping
//! nirs-glm --input-datasets /tmp/bids --output-location /tmp/bids/derivatives/glm
//! ```
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;

use nirs_glm::dataset::{nirs_dir, RECORDING_SUFFIX};
use nirs_glm::io::write_recording;
use nirs_glm::simulate::{SimCondition, Simulation};
use nirs_glm::RecordingKey;

#[derive(Parser)]
#[command(name = "simulate", version, about = "Generate a synthetic fNIRS BIDS dataset")]
struct Args {
    /// Dataset root to create
    #[arg(long)]
    output: PathBuf,

    #[arg(long, default_value_t = 5)]
    subjects: usize,

    #[arg(long, default_value = "tapping")]
    task: String,

    /// Condition labels with their HbO amplitude in µM, e.g. `Tapping=2.0`
    #[arg(long, num_args = 1.., default_values_t = ["Control=0.0".to_string(), "Tapping=2.0".to_string()])]
    condition: Vec<String>,

    /// Events per condition
    #[arg(long, default_value_t = 8)]
    events: usize,

    /// Stimulus duration in seconds
    #[arg(long, default_value_t = 5.0)]
    stim_duration: f64,

    /// Recording length in seconds
    #[arg(long, default_value_t = 400.0)]
    duration: f64,

    #[arg(long, default_value_t = 4)]
    long_pairs: usize,

    #[arg(long, default_value_t = 2)]
    short_pairs: usize,

    /// White-noise standard deviation in µM
    #[arg(long, default_value_t = 0.1)]
    noise: f64,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn parse_condition(s: &str) -> Result<SimCondition> {
    let (label, amp) = s.split_once('=').with_context(|| format!("expected LABEL=AMPLITUDE, got '{s}'"))?;
    let amp: f64 = amp.parse().with_context(|| format!("bad amplitude in '{s}'"))?;
    Ok(SimCondition::new(label, amp))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if args.subjects == 0 {
        bail!("--subjects must be at least 1");
    }
    let conditions = args.condition.iter().map(|c| parse_condition(c)).collect::<Result<Vec<_>>>()?;

    for s in 0..args.subjects {
        let key = RecordingKey::new(&format!("{:02}", s + 1), None, &args.task);
        // Between-subject spread of the response, ±0.25 µM.
        let offset = 0.5 * (s as f64 / args.subjects.max(2).saturating_sub(1) as f64 - 0.5);
        let sim = Simulation {
            duration_secs: args.duration,
            stim_duration: args.stim_duration,
            events_per_condition: args.events,
            conditions: conditions.clone(),
            long_pairs: args.long_pairs,
            short_pairs: args.short_pairs,
            noise: args.noise,
            offset,
            seed: args.seed.wrapping_add(s as u64),
            ..Simulation::default()
        };
        let rec = sim.recording()?;

        let dir = nirs_dir(&args.output, &key);
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        let path = dir.join(format!("{}{RECORDING_SUFFIX}", key.bids_stem()));
        write_recording(&rec, &path)?;
        log::info!(
            "{key}: {} channels × {} samples at {} Hz → {}",
            rec.n_channels(),
            rec.n_times(),
            rec.sfreq,
            path.display()
        );
    }

    Ok(())
}
