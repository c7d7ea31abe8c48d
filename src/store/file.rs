use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tempfile::NamedTempFile;

use super::{Collection, RecordStore};
use crate::error::{FlowGuardError, Result};

/// Stores each collection as a JSON file inside one shared directory.
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the target, so a reader in the sibling process sees either the old
/// or the new contents, never a partial file.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The shared directory holding the collection files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of a collection's file.
    pub fn path(&self, collection: Collection) -> PathBuf {
        self.dir.join(collection.file_name())
    }
}

impl RecordStore for FileStore {
    fn read(&self, collection: Collection) -> Result<Option<Vec<u8>>> {
        match std::fs::read(self.path(collection)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, collection: Collection, bytes: &[u8]) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            FlowGuardError::StorageUnavailable(format!("{}: {}", self.dir.display(), e))
        })?;

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path(collection)).map_err(|e| e.error)?;
        Ok(())
    }

    fn modified(&self, collection: Collection) -> Option<SystemTime> {
        std::fs::metadata(self.path(collection))
            .and_then(|m| m.modified())
            .ok()
    }
}
