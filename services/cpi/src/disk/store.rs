use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use warden_cpi_id::{DiskCid, IdError, IdGenerator};

use crate::store_path::child_path;
use crate::system::FileSystem;

/// Mode for disk directories.
const DISK_DIR_MODE: u32 = 0o755;

/// Errors from disk store operations.
#[derive(Debug, Error)]
pub enum DiskError {
    #[error("generating disk id: {0}")]
    IdGeneration(#[source] IdError),

    #[error("creating disk directory '{}': {source}", .path.display())]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("writing disk metadata '{}': {source}", .path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("disk '{0}' not found")]
    NotFound(DiskCid),

    #[error("deleting disk '{}': {source}", .path.display())]
    Delete {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Disk metadata persisted next to the disk directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskMeta {
    pub id: DiskCid,
    pub size_mb: u64,
}

/// A persistent disk on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disk {
    id: DiskCid,
    path: PathBuf,
}

impl Disk {
    pub fn id(&self) -> &DiskCid {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Store of persistent disk directories.
pub struct DiskStore {
    dir_path: PathBuf,
    fs: Arc<dyn FileSystem>,
    id_gen: Arc<dyn IdGenerator>,
}

impl DiskStore {
    pub fn new(
        dir_path: impl Into<PathBuf>,
        fs: Arc<dyn FileSystem>,
        id_gen: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            dir_path: dir_path.into(),
            fs,
            id_gen,
        }
    }

    /// Create a new empty disk.
    pub fn create(&self, size_mb: u64) -> Result<Disk, DiskError> {
        let id = self.id_gen.generate().map_err(DiskError::IdGeneration)?;
        let path = self.dir_path.join(&id);

        self.fs
            .mkdir_all(&path, DISK_DIR_MODE)
            .map_err(|source| DiskError::DirectoryCreate {
                path: path.clone(),
                source,
            })?;

        let id = DiskCid::new(id);
        let meta_path = self.meta_path(&id);
        let meta = DiskMeta {
            id: id.clone(),
            size_mb,
        };
        let encoded = serde_json::to_vec_pretty(&meta).map_err(|e| DiskError::Metadata {
            path: meta_path.clone(),
            source: io::Error::other(e),
        })?;
        self.fs
            .write_file(&meta_path, &encoded)
            .map_err(|source| DiskError::Metadata {
                path: meta_path,
                source,
            })?;

        info!(disk_id = %id, size_mb, path = %path.display(), "Created disk");

        Ok(Disk { id, path })
    }

    /// Resolve an existing disk.
    pub fn lookup(&self, id: &DiskCid) -> Result<Disk, DiskError> {
        let path = child_path(&self.dir_path, id.as_str())
            .filter(|path| self.fs.is_dir(path))
            .ok_or_else(|| DiskError::NotFound(id.clone()))?;

        Ok(Disk {
            id: id.clone(),
            path,
        })
    }

    pub fn exists(&self, id: &DiskCid) -> bool {
        self.lookup(id).is_ok()
    }

    /// Read the metadata recorded at creation, if any.
    pub fn meta(&self, id: &DiskCid) -> Option<DiskMeta> {
        child_path(&self.dir_path, id.as_str())?;
        let bytes = self.fs.read_file(&self.meta_path(id)).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!(disk_id = %id, error = %e, "Ignoring unreadable disk metadata");
                None
            }
        }
    }

    /// Remove a disk and its metadata. A missing disk is not an error.
    pub fn delete(&self, id: &DiskCid) -> Result<(), DiskError> {
        let Some(path) = child_path(&self.dir_path, id.as_str()) else {
            debug!(disk_id = %id, "Ignoring delete of unaddressable disk");
            return Ok(());
        };

        debug!(disk_id = %id, path = %path.display(), "Deleting disk");

        self.fs
            .remove_all(&path)
            .map_err(|source| DiskError::Delete {
                path: path.clone(),
                source,
            })?;

        let meta_path = self.meta_path(id);
        self.fs
            .remove_all(&meta_path)
            .map_err(|source| DiskError::Delete {
                path: meta_path,
                source,
            })
    }

    fn meta_path(&self, id: &DiskCid) -> PathBuf {
        self.dir_path.join(format!("{id}.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::OsFileSystem;
    use tempfile::tempdir;
    use warden_cpi_id::UuidGenerator;

    fn store(root: &Path) -> DiskStore {
        DiskStore::new(root, Arc::new(OsFileSystem), Arc::new(UuidGenerator))
    }

    #[test]
    fn test_create_and_lookup() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        let disk = store.create(1024).unwrap();

        assert!(disk.path().is_dir());
        assert_eq!(store.lookup(disk.id()).unwrap(), disk);
        assert_eq!(
            store.meta(disk.id()),
            Some(DiskMeta {
                id: disk.id().clone(),
                size_mb: 1024
            })
        );
    }

    #[test]
    fn test_create_generates_distinct_ids() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        let a = store.create(1).unwrap();
        let b = store.create(1).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_delete_removes_metadata_and_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let disk = store.create(10).unwrap();

        store.delete(disk.id()).unwrap();
        store.delete(disk.id()).unwrap();

        assert!(!store.exists(disk.id()));
        assert!(store.meta(disk.id()).is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_unaddressable_ids_do_not_exist() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        assert!(!store.exists(&DiskCid::new("..")));
        assert!(store.delete(&DiskCid::new("../..")).is_ok());
        assert!(dir.path().exists());
    }
}
