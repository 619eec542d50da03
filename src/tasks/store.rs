use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ShowError, ShowResult};
use crate::models::tasks::Checkpoint;

/// Checkpoint file format version - increment when format changes
const CHECKPOINT_VERSION: u32 = 1;

/// Where resumable operations park their partial state between runs.
pub trait CheckpointStore: Send + Sync {
    fn save(&self, checkpoint: &Checkpoint) -> ShowResult<()>;
    fn load(&self, task_id: &str) -> ShowResult<Option<Checkpoint>>;
    fn clear(&self, task_id: &str) -> ShowResult<()>;
}

#[derive(Default)]
pub struct MemoryCheckpointStore {
    checkpoints: Mutex<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn save(&self, checkpoint: &Checkpoint) -> ShowResult<()> {
        self.checkpoints
            .lock()
            .expect("checkpoint store poisoned")
            .insert(checkpoint.task_id.clone(), checkpoint.clone());
        Ok(())
    }

    fn load(&self, task_id: &str) -> ShowResult<Option<Checkpoint>> {
        Ok(self
            .checkpoints
            .lock()
            .expect("checkpoint store poisoned")
            .get(task_id)
            .cloned())
    }

    fn clear(&self, task_id: &str) -> ShowResult<()> {
        self.checkpoints
            .lock()
            .expect("checkpoint store poisoned")
            .remove(task_id);
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct CheckpointFile {
    version: u32,
    checkpoint: Checkpoint,
}

/// One JSON file per task under `dir`, so a restarted process can resume.
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> ShowResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            ShowError::Io(format!(
                "Failed to create checkpoint dir {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `{readable id}-{id hash}.checkpoint.json`. The hash keeps ids that
    /// sanitize to the same text apart.
    fn path_for(&self, task_id: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(task_id.as_bytes());
        let hash = format!("{:x}", hasher.finalize());
        let safe: String = task_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir
            .join(format!("{}-{}.checkpoint.json", safe, &hash[..16]))
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn save(&self, checkpoint: &Checkpoint) -> ShowResult<()> {
        let path = self.path_for(&checkpoint.task_id);
        let file = CheckpointFile {
            version: CHECKPOINT_VERSION,
            checkpoint: checkpoint.clone(),
        };
        // Write then rename so a crash mid-write leaves the previous checkpoint
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(&file)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn load(&self, task_id: &str) -> ShowResult<Option<Checkpoint>> {
        let path = self.path_for(task_id);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        let file: CheckpointFile = serde_json::from_slice(&bytes)?;
        if file.version != CHECKPOINT_VERSION {
            log::warn!(
                "[tasks] ignoring checkpoint {} (version {}, expected {})",
                path.display(),
                file.version,
                CHECKPOINT_VERSION
            );
            return Ok(None);
        }
        if file.checkpoint.task_id != task_id {
            log::warn!(
                "[tasks] ignoring checkpoint {} (belongs to task {})",
                path.display(),
                file.checkpoint.task_id
            );
            return Ok(None);
        }
        Ok(Some(file.checkpoint))
    }

    fn clear(&self, task_id: &str) -> ShowResult<()> {
        let path = self.path_for(task_id);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn checkpoint(id: &str, index: usize) -> Checkpoint {
        Checkpoint {
            task_id: id.to_string(),
            operation: "render".to_string(),
            last_processed_index: index,
            partial_results: json!({ "sum": index }),
        }
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileCheckpointStore::new(dir.path()).unwrap();
            store.save(&checkpoint("task/1", 4)).unwrap();
        }
        let store = FileCheckpointStore::new(dir.path()).unwrap();
        assert_eq!(store.load("task/1").unwrap(), Some(checkpoint("task/1", 4)));
        store.clear("task/1").unwrap();
        assert_eq!(store.load("task/1").unwrap(), None);
    }

    #[test]
    fn file_store_ignores_other_versions() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path()).unwrap();
        let stale = json!({ "version": 0, "checkpoint": checkpoint("t", 1) });
        fs::write(store.path_for("t"), serde_json::to_vec(&stale).unwrap()).unwrap();
        assert_eq!(store.load("t").unwrap(), None);
    }

    #[test]
    fn ids_that_sanitize_alike_keep_separate_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path()).unwrap();
        store.save(&checkpoint("job/1", 4)).unwrap();
        assert_eq!(store.load("job_1").unwrap(), None);

        store.save(&checkpoint("job_1", 7)).unwrap();
        store.clear("job_1").unwrap();
        assert_eq!(store.load("job/1").unwrap(), Some(checkpoint("job/1", 4)));
    }

    #[test]
    fn checkpoint_for_another_task_is_not_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path()).unwrap();
        let foreign = json!({
            "version": CHECKPOINT_VERSION,
            "checkpoint": checkpoint("other", 3),
        });
        fs::write(store.path_for("mine"), serde_json::to_vec(&foreign).unwrap()).unwrap();
        assert_eq!(store.load("mine").unwrap(), None);
    }

    #[test]
    fn memory_store_overwrites() {
        let store = MemoryCheckpointStore::new();
        store.save(&checkpoint("t", 1)).unwrap();
        store.save(&checkpoint("t", 6)).unwrap();
        assert_eq!(store.load("t").unwrap().unwrap().last_processed_index, 6);
    }
}
