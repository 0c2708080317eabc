//! Run storage API.

use crate::types::{RunManifest, RunReport};
use crate::{ResultsError, ResultsResult};
use std::fs;
use std::path::{Path, PathBuf};

/// Directory of runs, one sub-directory per run id holding
/// `manifest.json` and `report.json`.
#[derive(Clone, Debug)]
pub struct RunStore {
    root_dir: PathBuf,
}

impl RunStore {
    pub fn new(root_dir: PathBuf) -> ResultsResult<Self> {
        if !root_dir.exists() {
            fs::create_dir_all(&root_dir)?;
        }
        Ok(Self { root_dir })
    }

    /// Store next to a project file, under `.optim/runs`.
    pub fn for_project(project_path: &Path) -> ResultsResult<Self> {
        let project_dir = project_path
            .parent()
            .ok_or_else(|| ResultsError::InvalidPath {
                message: "project path has no parent directory".to_string(),
            })?;
        Self::new(project_dir.join(".optim").join("runs"))
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root_dir.join(run_id)
    }

    pub fn has_run(&self, run_id: &str) -> bool {
        self.run_dir(run_id).join("manifest.json").exists()
    }

    pub fn save_run(&self, manifest: &RunManifest, report: &RunReport) -> ResultsResult<()> {
        let run_dir = self.run_dir(&manifest.run_id);
        fs::create_dir_all(&run_dir)?;

        // report first so a manifest always points at a complete run
        fs::write(
            run_dir.join("report.json"),
            serde_json::to_string_pretty(report)?,
        )?;
        fs::write(
            run_dir.join("manifest.json"),
            serde_json::to_string_pretty(manifest)?,
        )?;
        Ok(())
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, run_id: &str, file: &str) -> ResultsResult<T> {
        let path = self.run_dir(run_id).join(file);
        if !path.exists() {
            return Err(ResultsError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn load_manifest(&self, run_id: &str) -> ResultsResult<RunManifest> {
        self.read_json(run_id, "manifest.json")
    }

    pub fn load_report(&self, run_id: &str) -> ResultsResult<RunReport> {
        self.read_json(run_id, "report.json")
    }

    /// All stored runs, oldest first.
    pub fn list_all_runs(&self) -> ResultsResult<Vec<RunManifest>> {
        let mut runs = Vec::new();
        if !self.root_dir.exists() {
            return Ok(runs);
        }
        for entry in fs::read_dir(&self.root_dir)? {
            let entry = entry?;
            if entry.path().is_dir() {
                let run_id = entry.file_name().to_string_lossy().to_string();
                if let Ok(manifest) = self.load_manifest(&run_id) {
                    runs.push(manifest);
                }
            }
        }
        runs.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(runs)
    }

    pub fn list_runs(&self, beamline_id: &str) -> ResultsResult<Vec<RunManifest>> {
        let mut runs = self.list_all_runs()?;
        runs.retain(|m| m.beamline_id == beamline_id);
        Ok(runs)
    }

    pub fn delete_run(&self, run_id: &str) -> ResultsResult<()> {
        let run_dir = self.run_dir(run_id);
        if run_dir.exists() {
            fs::remove_dir_all(run_dir)?;
        }
        Ok(())
    }
}
