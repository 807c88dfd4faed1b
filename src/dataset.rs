//! BIDS-style dataset on disk.
//!
//! ```text
//! <root>/sub-<s>/[ses-<x>/]nirs/sub-<s>[_ses-<x>]_task-<t>_nirs.safetensors
//! ```
//!
//! `all` selectors are resolved by scanning directories and file names;
//! explicit lists are crossed as given, so a missing file only shows up as
//! [`AnalysisError::NotFound`] when it is loaded.
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{Selector, SessionSelector};
use crate::error::{AnalysisError, Result};
use crate::io::read_recording;
use crate::recording::{unique_keys, Recording, RecordingKey, RecordingSource};

/// File suffix of a raw recording container.
pub const RECORDING_SUFFIX: &str = "_nirs.safetensors";

/// `sub-<s>/[ses-<x>/]nirs` relative to a dataset or derivatives root.
pub fn nirs_dir(root: &Path, key: &RecordingKey) -> PathBuf {
    let mut dir = root.join(format!("sub-{}", key.subject));
    if let Some(ses) = &key.session {
        dir.push(format!("ses-{ses}"));
    }
    dir.join("nirs")
}

#[derive(Debug, Clone)]
pub struct BidsDataset {
    pub root: PathBuf,
    pub subjects: Selector,
    pub sessions: SessionSelector,
    pub tasks: Selector,
}

impl BidsDataset {
    /// Every recording under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            subjects: Selector::All,
            sessions: SessionSelector::None,
            tasks: Selector::All,
        }
    }

    pub fn with_selection(mut self, subjects: Selector, sessions: SessionSelector, tasks: Selector) -> Self {
        self.subjects = subjects;
        self.sessions = sessions;
        self.tasks = tasks;
        self
    }

    pub fn path_for(&self, key: &RecordingKey) -> PathBuf {
        nirs_dir(&self.root, key).join(format!("{}{RECORDING_SUFFIX}", key.bids_stem()))
    }

    /// Labels of `<dir>/<prefix><label>` subdirectories, sorted.
    fn labels_with_prefix(dir: &Path, prefix: &str) -> Result<Vec<String>> {
        if !dir.is_dir() {
            return Ok(vec![]);
        }
        let mut out = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(label) = entry.file_name().to_str().and_then(|n| n.strip_prefix(prefix)) {
                out.push(label.to_string());
            }
        }
        out.sort();
        Ok(out)
    }

    /// Task labels of recordings present for `(subject, session)`.
    fn scan_tasks(&self, subject: &str, session: Option<&str>) -> Result<Vec<String>> {
        let dir_key = RecordingKey::new(subject, session, "");
        let dir = nirs_dir(&self.root, &dir_key);
        if !dir.is_dir() {
            return Ok(vec![]);
        }
        let prefix = match session {
            Some(ses) => format!("sub-{subject}_ses-{ses}_task-"),
            None => format!("sub-{subject}_task-"),
        };
        let mut out = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(task) = name.strip_prefix(&prefix).and_then(|n| n.strip_suffix(RECORDING_SUFFIX)) {
                out.push(task.to_string());
            }
        }
        out.sort();
        Ok(out)
    }
}

impl RecordingSource for BidsDataset {
    fn load(&self, key: &RecordingKey) -> Result<Recording> {
        let path = self.path_for(key);
        if !path.is_file() {
            return Err(AnalysisError::NotFound { path });
        }
        read_recording(&path).map_err(AnalysisError::Format)
    }

    fn scan(&self) -> Result<Vec<RecordingKey>> {
        let subjects = match &self.subjects {
            Selector::All => Self::labels_with_prefix(&self.root, "sub-")?,
            Selector::List(l) => l.clone(),
        };

        let mut keys = Vec::new();
        for sub in &subjects {
            let sessions: Vec<Option<String>> = match &self.sessions {
                SessionSelector::None => vec![None],
                SessionSelector::List(l) => l.iter().cloned().map(Some).collect(),
                SessionSelector::All => {
                    Self::labels_with_prefix(&self.root.join(format!("sub-{sub}")), "ses-")?
                        .into_iter()
                        .map(Some)
                        .collect()
                }
            };
            for ses in &sessions {
                let tasks = match &self.tasks {
                    Selector::All => self.scan_tasks(sub, ses.as_deref())?,
                    Selector::List(l) => l.clone(),
                };
                if tasks.is_empty() {
                    let ses = ses.as_ref().map(|s| format!(" ses-{s}")).unwrap_or_default();
                    log::warn!("No recordings found for sub-{sub}{ses}");
                }
                keys.extend(tasks.iter().map(|t| RecordingKey::new(sub, ses.as_deref(), t)));
            }
        }
        Ok(unique_keys(&keys))
    }

    fn locate(&self, key: &RecordingKey) -> Option<PathBuf> {
        Some(self.path_for(key)).filter(|p| p.is_file())
    }
}
