//! Filesystem abstraction.

use std::fs::{self, DirBuilder, Permissions};
use std::io;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};

use tracing::debug;

/// Filesystem operations used by the stores and actions.
pub trait FileSystem: Send + Sync {
    /// Create `path` and any missing parents. The leaf directory ends up
    /// with exactly `mode`, regardless of the process umask.
    fn mkdir_all(&self, path: &Path, mode: u32) -> io::Result<()>;

    /// Recursively remove `path`. A missing path is not an error.
    fn remove_all(&self, path: &Path) -> io::Result<()>;

    /// Remove the empty directory `path`. A missing path is not an error;
    /// a non-empty or busy directory is.
    fn remove_dir(&self, path: &Path) -> io::Result<()>;

    /// Entries of the directory `path`, sorted.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Whether `path` exists and is a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Whether anything exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Write `contents` to `path`, replacing any previous file.
    fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Read the whole file at `path`.
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// [`FileSystem`] backed by the host operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl OsFileSystem {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for OsFileSystem {
    fn mkdir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
        debug!(path = %path.display(), mode = format!("{:o}", mode), "Making dir");

        DirBuilder::new().recursive(true).mode(mode).create(path)?;
        // DirBuilder is subject to the umask
        fs::set_permissions(path, Permissions::from_mode(mode))
    }

    fn remove_all(&self, path: &Path) -> io::Result<()> {
        debug!(path = %path.display(), "Removing all");

        let metadata = match fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };

        let result = if metadata.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };

        match result {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        debug!(path = %path.display(), "Removing dir");

        match fs::remove_dir(path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<io::Result<Vec<_>>>()?;
        entries.sort();
        Ok(entries)
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        debug!(path = %path.display(), bytes = contents.len(), "Writing file");
        fs::write(path, contents)
    }

    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_mkdir_all_sets_mode_on_leaf() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a/b/c");

        OsFileSystem.mkdir_all(&path, 0o755).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
    }

    #[test]
    fn test_remove_all_tolerates_missing() {
        let dir = tempdir().unwrap();
        OsFileSystem
            .remove_all(&dir.path().join("never-existed"))
            .unwrap();
    }

    #[test]
    fn test_remove_all_removes_tree_and_files() {
        let dir = tempdir().unwrap();
        let tree = dir.path().join("tree");
        fs::create_dir_all(tree.join("nested")).unwrap();
        fs::write(tree.join("nested/file"), b"x").unwrap();
        let file = dir.path().join("loose");
        fs::write(&file, b"y").unwrap();

        OsFileSystem.remove_all(&tree).unwrap();
        OsFileSystem.remove_all(&file).unwrap();

        assert!(!tree.exists());
        assert!(!file.exists());
    }

    #[test]
    fn test_remove_dir_is_not_recursive() {
        let dir = tempdir().unwrap();
        let parent = dir.path().join("parent");
        fs::create_dir_all(parent.join("child")).unwrap();

        assert!(OsFileSystem.remove_dir(&parent).is_err());
        OsFileSystem.remove_dir(&parent.join("child")).unwrap();
        OsFileSystem.remove_dir(&parent).unwrap();
        OsFileSystem.remove_dir(&parent).unwrap();
        assert!(!parent.exists());
    }

    #[test]
    fn test_read_dir_sorted() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("b")).unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();

        assert_eq!(
            OsFileSystem.read_dir(dir.path()).unwrap(),
            vec![dir.path().join("a"), dir.path().join("b")]
        );
        assert!(OsFileSystem.read_dir(&dir.path().join("missing")).is_err());
    }
}
