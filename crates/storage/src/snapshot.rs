use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use snafu::ResultExt;

use super::error::{
    CreateDirectorySnafu, DeserializeJsonSnafu, ReadFileSnafu, RenameFileSnafu,
    SerializeJsonSnafu, StorageResult, WriteFileSnafu,
};

/// JSON file backing a snapshot store.
pub const SNAPSHOT_FILE_NAME: &str = "workspace.json";

/// Whole-state persistence: one snapshot value in, one snapshot value out.
pub trait SnapshotStore<T>: Send + Sync
where
    T: Serialize + DeserializeOwned,
{
    /// Returns `None` when nothing has been saved yet.
    fn load(&self) -> StorageResult<Option<T>>;
    fn save(&self, snapshot: &T) -> StorageResult<()>;
}

/// Stores the snapshot as pretty JSON, replacing the file atomically on save.
#[derive(Debug, Clone)]
pub struct JsonFileSnapshotStore {
    path: PathBuf,
}

impl JsonFileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_directory(directory: impl AsRef<Path>) -> Self {
        Self::new(directory.as_ref().join(SNAPSHOT_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T> SnapshotStore<T> for JsonFileSnapshotStore
where
    T: Serialize + DeserializeOwned,
{
    fn load(&self) -> StorageResult<Option<T>> {
        if !self.path.exists() {
            tracing::info!(path = ?self.path, "snapshot file not found, starting empty");
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path).context(ReadFileSnafu {
            stage: "read-snapshot-file",
            path: self.path.clone(),
        })?;

        let snapshot = serde_json::from_str(&content).context(DeserializeJsonSnafu {
            stage: "parse-snapshot-json",
        })?;
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &T) -> StorageResult<()> {
        write_json_atomically(&self.path, snapshot)?;
        tracing::debug!(path = ?self.path, "saved workspace snapshot");
        Ok(())
    }
}

/// Writes `value` as pretty JSON to a temporary sibling of `path` and renames it into
/// place, creating missing parent directories first.
pub fn write_json_atomically<T>(path: &Path, value: &T) -> StorageResult<()>
where
    T: Serialize + ?Sized,
{
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context(CreateDirectorySnafu {
            stage: "create-parent-directory",
            path: parent.to_path_buf(),
        })?;
    }

    let content = serde_json::to_string_pretty(value).context(SerializeJsonSnafu {
        stage: "serialize-json-file",
    })?;

    let temp_path = path.with_extension("json.tmp");
    std::fs::write(&temp_path, content).context(WriteFileSnafu {
        stage: "write-temporary-file",
        path: temp_path.clone(),
    })?;

    std::fs::rename(&temp_path, path).context(RenameFileSnafu {
        stage: "rename-temporary-file",
        from: temp_path,
        to: path.to_path_buf(),
    })?;
    Ok(())
}

/// Keeps the serialized snapshot in memory.
///
/// Values still go through JSON so a save/load pair behaves exactly like a reload.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    slot: Mutex<Option<String>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(&self) -> Option<String> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<T> SnapshotStore<T> for MemorySnapshotStore
where
    T: Serialize + DeserializeOwned,
{
    fn load(&self) -> StorageResult<Option<T>> {
        let Some(content) = self.raw() else {
            return Ok(None);
        };

        let snapshot = serde_json::from_str(&content).context(DeserializeJsonSnafu {
            stage: "parse-memory-snapshot",
        })?;
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &T) -> StorageResult<()> {
        let content = serde_json::to_string(snapshot).context(SerializeJsonSnafu {
            stage: "serialize-memory-snapshot",
        })?;
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(content);
        Ok(())
    }
}
