//! Record of the steps a training attempt has already completed.
//!
//! The record is a JSON array of step identifiers, rewritten in full (write to a
//! sibling temp file, then rename) every time it is persisted.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Result, TrainError};

pub struct CheckpointStore {
    path: PathBuf,
    completed: Vec<String>,
}

impl CheckpointStore {
    /// Start an empty record at `path` and persist it right away.
    pub fn create_for_attempt(path: &Path) -> Result<Self> {
        let store = Self {
            path: path.to_path_buf(),
            completed: Vec::new(),
        };
        store.persist()?;
        Ok(store)
    }

    /// Reload the record of a previous attempt.
    ///
    /// A missing or unreadable record is fatal: resuming blindly could skip work that
    /// never happened.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            TrainError::ResumeState(format!("checkpoint file {} not found ({e})", path.display()))
        })?;
        let completed: Vec<String> = serde_json::from_str(&text).map_err(|e| {
            TrainError::ResumeState(format!("checkpoint file {} is corrupt ({e})", path.display()))
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            completed,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn completed(&self) -> &[String] {
        &self.completed
    }

    pub fn is_pending(&self, step: &str) -> bool {
        !self.completed.iter().any(|s| s == step)
    }

    /// Record `step` in memory; call `persist` to make it durable.
    pub fn mark_completed(&mut self, step: &str) -> &mut Self {
        if self.is_pending(step) {
            self.completed.push(step.to_string());
        }
        self
    }

    pub fn persist(&self) -> Result<()> {
        let json = serde_json::to_string(&self.completed)
            .map_err(|e| TrainError::Config(format!("serialize checkpoint: {e}")))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let write = |tmp: &Path| -> std::io::Result<()> {
            let mut file = File::create(tmp)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()
        };
        write(&tmp).map_err(|e| TrainError::storage("write checkpoint", &tmp, e))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| TrainError::storage("replace checkpoint", &self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_persists_an_empty_record() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("checkpoint.json");
        CheckpointStore::create_for_attempt(&path).expect("create");
        assert_eq!(fs::read_to_string(&path).expect("read"), "[]");
    }

    #[test]
    fn completed_steps_survive_a_reload() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("checkpoint.json");
        let mut store = CheckpointStore::create_for_attempt(&path).expect("create");
        store.mark_completed("tm_cleanup").persist().expect("persist");
        store.mark_completed("__db_map").persist().expect("persist");

        let reloaded = CheckpointStore::load_from_file(&path).expect("load");
        assert!(!reloaded.is_pending("tm_cleanup"));
        assert!(!reloaded.is_pending("__db_map"));
        assert!(reloaded.is_pending("preprocess"));
        assert_eq!(reloaded.completed(), ["tm_cleanup", "__db_map"]);
        assert!(!tmp.path().join("checkpoint.json.tmp").exists());
    }

    #[test]
    fn persist_replaces_a_leftover_temp_file() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("checkpoint.json");
        let leftover = tmp.path().join("checkpoint.json.tmp");
        let mut store = CheckpointStore::create_for_attempt(&path).expect("create");
        fs::write(&leftover, "[\"half-written").expect("write");

        store.mark_completed("preprocess").persist().expect("persist");
        assert_eq!(fs::read_to_string(&path).expect("read"), r#"["preprocess"]"#);
        assert!(!leftover.exists());
    }

    #[test]
    fn mark_completed_is_not_persisted_by_itself() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("checkpoint.json");
        let mut store = CheckpointStore::create_for_attempt(&path).expect("create");
        store.mark_completed("aligner");
        store.mark_completed("aligner");
        assert_eq!(store.completed(), ["aligner"]);

        let reloaded = CheckpointStore::load_from_file(&path).expect("load");
        assert!(reloaded.is_pending("aligner"));
    }

    #[test]
    fn missing_record_is_a_resume_error() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let err = CheckpointStore::load_from_file(&tmp.path().join("checkpoint.json"))
            .err()
            .expect("missing checkpoint must fail");
        assert!(matches!(err, TrainError::ResumeState(_)));
    }

    #[test]
    fn corrupt_record_is_a_resume_error() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("checkpoint.json");
        fs::write(&path, "{not json").expect("write");
        let err = CheckpointStore::load_from_file(&path)
            .err()
            .expect("corrupt checkpoint must fail");
        assert!(matches!(err, TrainError::ResumeState(_)));
    }

    #[test]
    fn unwritable_location_is_a_storage_error() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("missing-dir").join("checkpoint.json");
        let err = CheckpointStore::create_for_attempt(&path)
            .err()
            .expect("unwritable checkpoint must fail");
        assert!(matches!(err, TrainError::Storage { .. }));
    }
}
