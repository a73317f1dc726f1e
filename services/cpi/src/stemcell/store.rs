use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};
use warden_cpi_id::{IdError, IdGenerator, StemcellCid};

use crate::store_path::child_path;
use crate::system::{Compressor, CompressorError, CompressorOptions, FileSystem};

/// Mode for stemcell directories.
const STEMCELL_DIR_MODE: u32 = 0o755;

/// Errors from stemcell store operations.
#[derive(Debug, Error)]
pub enum StemcellError {
    #[error("generating stemcell id: {0}")]
    IdGeneration(#[source] IdError),

    #[error("creating stemcell directory '{}': {source}", .path.display())]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(
        "unpacking stemcell '{}' to '{}': {source}",
        .image_path.display(),
        .stemcell_path.display()
    )]
    Unpack {
        image_path: PathBuf,
        stemcell_path: PathBuf,
        #[source]
        source: CompressorError,
    },

    #[error("stemcell '{0}' not found")]
    NotFound(StemcellCid),

    #[error("deleting stemcell directory '{}': {source}", .path.display())]
    Delete {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// An unpacked stemcell on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stemcell {
    id: StemcellCid,
    path: PathBuf,
}

impl Stemcell {
    pub fn id(&self) -> &StemcellCid {
        &self.id
    }

    /// Absolute directory holding the unpacked image.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Store of unpacked stemcells under a single root directory.
pub struct StemcellStore {
    dir_path: PathBuf,
    fs: Arc<dyn FileSystem>,
    id_gen: Arc<dyn IdGenerator>,
    compressor: Arc<dyn Compressor>,
}

impl StemcellStore {
    pub fn new(
        dir_path: impl Into<PathBuf>,
        fs: Arc<dyn FileSystem>,
        id_gen: Arc<dyn IdGenerator>,
        compressor: Arc<dyn Compressor>,
    ) -> Self {
        Self {
            dir_path: dir_path.into(),
            fs,
            id_gen,
            compressor,
        }
    }

    pub fn dir_path(&self) -> &Path {
        &self.dir_path
    }

    /// Unpack the image at `image_path` into a new stemcell directory.
    ///
    /// A failed unpack leaves the partially populated directory behind.
    pub fn import_from_path(&self, image_path: &Path) -> Result<Stemcell, StemcellError> {
        debug!(image_path = %image_path.display(), "Importing stemcell from path");

        let id = self.id_gen.generate().map_err(StemcellError::IdGeneration)?;
        let stemcell_path = self.dir_path.join(&id);

        self.fs
            .mkdir_all(&stemcell_path, STEMCELL_DIR_MODE)
            .map_err(|source| StemcellError::DirectoryCreate {
                path: stemcell_path.clone(),
                source,
            })?;

        self.compressor
            .decompress_file_to_dir(
                image_path,
                &stemcell_path,
                CompressorOptions { same_owner: true },
            )
            .map_err(|source| StemcellError::Unpack {
                image_path: image_path.to_path_buf(),
                stemcell_path: stemcell_path.clone(),
                source,
            })?;

        info!(
            image_path = %image_path.display(),
            stemcell_id = %id,
            path = %stemcell_path.display(),
            "Imported stemcell"
        );

        Ok(Stemcell {
            id: StemcellCid::new(id),
            path: stemcell_path,
        })
    }

    /// Resolve an existing stemcell. Never creates anything.
    pub fn lookup(&self, id: &StemcellCid) -> Result<Stemcell, StemcellError> {
        let path = child_path(&self.dir_path, id.as_str())
            .filter(|path| self.fs.is_dir(path))
            .ok_or_else(|| StemcellError::NotFound(id.clone()))?;

        Ok(Stemcell {
            id: id.clone(),
            path,
        })
    }

    /// Remove a stemcell directory. A stemcell that is already gone is not
    /// an error.
    pub fn delete(&self, id: &StemcellCid) -> Result<(), StemcellError> {
        let Some(path) = child_path(&self.dir_path, id.as_str()) else {
            debug!(stemcell_id = %id, "Ignoring delete of unaddressable stemcell");
            return Ok(());
        };

        debug!(stemcell_id = %id, path = %path.display(), "Deleting stemcell");

        self.fs
            .remove_all(&path)
            .map_err(|source| StemcellError::Delete { path, source })
    }
}
