/// Shared helpers: synthetic recordings and an in-memory recording source.
use nirs_glm::simulate::{SimCondition, Simulation};
use nirs_glm::{AnalysisError, Recording, RecordingKey, RecordingSource};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[allow(unused)]
/// One long and one short pair at 10 Hz, condition "A" with three 5 s
/// stimuli, 2 µM HbO response.
pub fn single_condition(seed: u64) -> Recording {
    Simulation { events_per_condition: 3, seed, ..Simulation::default() }
        .recording()
        .unwrap()
}

#[allow(unused)]
/// Conditions "A" (2 µM) and "B" (1 µM), `offset` µM added to both.
pub fn two_conditions(seed: u64, offset: f64) -> Recording {
    Simulation {
        conditions: vec![SimCondition::new("A", 2.0), SimCondition::new("B", 1.0)],
        events_per_condition: 4,
        duration_secs: 360.0,
        offset,
        seed,
        ..Simulation::default()
    }
    .recording()
    .unwrap()
}

#[allow(unused)]
/// Recordings held in memory, keyed like a dataset.
#[derive(Default)]
pub struct MemorySource {
    pub recordings: BTreeMap<RecordingKey, Recording>,
}

#[allow(unused)]
impl MemorySource {
    pub fn insert(&mut self, subject: &str, task: &str, rec: Recording) -> RecordingKey {
        let key = RecordingKey::new(subject, None, task);
        self.recordings.insert(key.clone(), rec);
        key
    }
}

impl RecordingSource for MemorySource {
    fn load(&self, key: &RecordingKey) -> Result<Recording, AnalysisError> {
        self.recordings
            .get(key)
            .cloned()
            .ok_or_else(|| AnalysisError::NotFound { path: PathBuf::from(key.bids_stem()) })
    }

    fn scan(&self) -> Result<Vec<RecordingKey>, AnalysisError> {
        Ok(self.recordings.keys().cloned().collect())
    }
}

#[allow(unused)]
/// Data rows of a CSV file, header excluded.
pub fn csv_rows(path: &std::path::Path) -> Vec<csv::StringRecord> {
    let mut r = csv::Reader::from_path(path)
        .unwrap_or_else(|e| panic!("reading {}: {e}", path.display()));
    r.records().map(|rec| rec.unwrap()).collect()
}

#[allow(unused)]
pub fn csv_header(path: &std::path::Path) -> Vec<String> {
    let mut r = csv::Reader::from_path(path).unwrap();
    r.headers().unwrap().iter().map(str::to_string).collect()
}
