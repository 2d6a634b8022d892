//! Filesystem-backed artifact store.
//!
//! Every run owns a directory under `.conclave/runs/<run_id>/`; phase
//! artifacts live in per-phase subdirectories keyed by
//! `(run_id, phase_id, label)` so concurrent reviewer writes within a
//! phase never touch the same file. Content is opaque at this layer.

use crate::error::StoreError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const STATE_DIR: &str = ".conclave";
const RUNS_DIR: &str = "runs";
const RUN_FILE: &str = "run.json";

/// Addressable handle for a stored artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub run_id: String,
    pub phase_id: String,
    pub label: String,
}

impl std::fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.run_id, self.phase_id, self.label)
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Open (or lazily create on first write) a store rooted at `base`.
    pub fn open(base: &Path) -> Self {
        Self {
            root: base.join(STATE_DIR).join(RUNS_DIR),
        }
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root.join(run_id)
    }

    fn artifact_path(&self, aref: &ArtifactRef) -> PathBuf {
        self.run_dir(&aref.run_id)
            .join(&aref.phase_id)
            .join(&aref.label)
    }

    pub fn put(
        &self,
        run_id: &str,
        phase_id: &str,
        label: &str,
        content: &str,
    ) -> Result<ArtifactRef, StoreError> {
        let aref = ArtifactRef {
            run_id: run_id.to_string(),
            phase_id: phase_id.to_string(),
            label: label.to_string(),
        };
        let path = self.artifact_path(&aref);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(StoreError::CreateDir)?;
        }
        fs::write(&path, content).map_err(|e| StoreError::WriteArtifact {
            label: aref.to_string(),
            source: e,
        })?;
        Ok(aref)
    }

    pub fn get(&self, aref: &ArtifactRef) -> Result<String, StoreError> {
        let path = self.artifact_path(aref);
        if !path.exists() {
            return Err(StoreError::MissingArtifact(aref.to_string()));
        }
        fs::read_to_string(&path).map_err(|e| StoreError::ReadArtifact { path, source: e })
    }

    /// Like `get`, but rejects blank content. Used where a caller needs a
    /// real document (a reviewer cannot review an empty artifact).
    pub fn get_nonempty(&self, aref: &ArtifactRef) -> Result<String, StoreError> {
        let content = self.get(aref)?;
        if content.trim().is_empty() {
            return Err(StoreError::EmptyArtifact(aref.to_string()));
        }
        Ok(content)
    }

    pub fn put_json<T: Serialize>(
        &self,
        run_id: &str,
        phase_id: &str,
        label: &str,
        value: &T,
    ) -> Result<ArtifactRef, StoreError> {
        let json = serde_json::to_string_pretty(value)?;
        self.put(run_id, phase_id, label, &json)
    }

    pub fn get_json<T: DeserializeOwned>(&self, aref: &ArtifactRef) -> Result<T, StoreError> {
        let content = self.get(aref)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Persist the run record. Called by exactly one writer (the workflow
    /// engine), keeping the append-only phase history race-free.
    pub fn save_run<R: Serialize>(&self, run_id: &str, run: &R) -> Result<(), StoreError> {
        let dir = self.run_dir(run_id);
        fs::create_dir_all(&dir).map_err(StoreError::CreateDir)?;
        let json = serde_json::to_string_pretty(run)?;
        let path = dir.join(RUN_FILE);
        fs::write(&path, json).map_err(|e| StoreError::WriteArtifact {
            label: RUN_FILE.to_string(),
            source: e,
        })
    }

    pub fn load_run<R: DeserializeOwned>(&self, run_id: &str) -> Result<R, StoreError> {
        let path = self.run_dir(run_id).join(RUN_FILE);
        if !path.exists() {
            return Err(StoreError::RunNotFound(run_id.to_string()));
        }
        let content =
            fs::read_to_string(&path).map_err(|e| StoreError::ReadArtifact { path, source: e })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Ids of all persisted runs, newest directories last.
    pub fn list_runs(&self) -> Result<Vec<String>, StoreError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        let entries = fs::read_dir(&self.root).map_err(|e| StoreError::ReadArtifact {
            path: self.root.clone(),
            source: e,
        })?;
        for entry in entries.flatten() {
            if entry.path().join(RUN_FILE).exists() {
                ids.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}
