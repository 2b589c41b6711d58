//! Durable storage for step artifacts.
//!
//! One text file per completed step, named by the step's two-digit key
//! (`05_first_translation.txt`). The naming convention is itself a resume
//! index: `completed_ordinals` cross-checks the session file's step counter
//! against what actually exists on disk.

use anyhow::{Context, Result};
use glob::glob;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::WorkflowError;
use crate::workflow::Step;

pub struct Storage {
    artifacts_dir: PathBuf,
}

impl Storage {
    pub fn new(artifacts_dir: PathBuf) -> Self {
        Self { artifacts_dir }
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.artifacts_dir).with_context(|| {
            format!(
                "failed to create artifacts dir {}",
                self.artifacts_dir.display()
            )
        })?;
        fs::create_dir_all(self.debug_dir()).context("failed to create debug dir")?;
        Ok(())
    }

    pub fn artifact_path(&self, step: Step) -> PathBuf {
        self.artifacts_dir.join(format!("{}.txt", step.key()))
    }

    fn debug_dir(&self) -> PathBuf {
        self.artifacts_dir.join("debug")
    }

    pub fn write_artifact(&self, step: Step, text: &str) -> Result<(), WorkflowError> {
        let path = self.artifact_path(step);
        fs::write(&path, text).map_err(|source| WorkflowError::ArtifactWriteFailed {
            path,
            source,
        })
    }

    pub fn read_artifact(&self, step: Step) -> Option<String> {
        fs::read_to_string(self.artifact_path(step)).ok()
    }

    /// Back up an artifact before a continuation splice overwrites it.
    pub fn backup_artifact(&self, step: Step) -> Result<()> {
        let path = self.artifact_path(step);
        if path.exists() {
            let backup = path.with_extension("txt.bak");
            fs::copy(&path, &backup)
                .with_context(|| format!("failed to back up {}", path.display()))?;
        }
        Ok(())
    }

    /// Save raw provider output for manual inspection when extraction had to
    /// fall back to heuristics.
    pub fn write_debug(&self, name: &str, text: &str) {
        let path = self.debug_dir().join(name);
        if let Err(e) = fs::create_dir_all(self.debug_dir()).and_then(|_| fs::write(&path, text)) {
            tracing::warn!(path = %path.display(), error = %e, "debug artifact write failed");
        }
    }

    /// Ordinals of all steps whose artifact exists on disk, by scanning for
    /// files matching the `NN_*.txt` convention.
    pub fn completed_ordinals(&self) -> BTreeSet<u32> {
        let pattern = self
            .artifacts_dir
            .join("[0-9][0-9]_*.txt")
            .to_string_lossy()
            .into_owned();

        let mut ordinals = BTreeSet::new();
        if let Ok(paths) = glob(&pattern) {
            for path in paths.flatten() {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    if let Ok(n) = stem[..2].parse::<u32>() {
                        ordinals.insert(n);
                    }
                }
            }
        }
        ordinals
    }

    /// The most advanced artifact present on disk, in the given priority
    /// order. Used for the best-effort save on fatal failure.
    pub fn most_advanced_artifact(&self, priority: &[Step]) -> Option<(Step, String)> {
        priority
            .iter()
            .find_map(|step| self.read_artifact(*step).map(|text| (*step, text)))
    }

    pub fn artifacts_dir(&self) -> &Path {
        &self.artifacts_dir
    }
}
