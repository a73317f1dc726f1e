//! Tarball decompression.
//!
//! Stemcell images are gzipped tarballs (or plain tarballs) containing a
//! root filesystem. Entries are unpacked in archive order.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from archive decompression.
#[derive(Debug, Error)]
pub enum CompressorError {
    #[error("opening archive '{}': {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("reading archive: {0}")]
    Read(#[source] io::Error),

    #[error("unpacking entry '{}': {source}", .path.display())]
    Entry {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("archive contains no entries")]
    Empty,
}

/// Options for [`Compressor::decompress_file_to_dir`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CompressorOptions {
    /// Keep the uid/gid recorded in the archive instead of the current
    /// process owner.
    pub same_owner: bool,
}

/// Unpacks archive files into directories.
pub trait Compressor: Send + Sync {
    /// Unpack `archive` into the existing directory `dest`.
    fn decompress_file_to_dir(
        &self,
        archive: &Path,
        dest: &Path,
        options: CompressorOptions,
    ) -> Result<(), CompressorError>;
}

/// [`Compressor`] for `.tar` and `.tgz` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct TarballCompressor;

impl TarballCompressor {
    pub fn new() -> Self {
        Self
    }

    fn extract<R: Read>(
        &self,
        reader: R,
        dest: &Path,
        options: CompressorOptions,
    ) -> Result<(), CompressorError> {
        let mut archive = Archive::new(reader);
        archive.set_preserve_permissions(true);
        archive.set_preserve_ownerships(options.same_owner);
        archive.set_overwrite(true);

        let mut unpacked = 0usize;

        for entry in archive.entries().map_err(CompressorError::Read)? {
            let mut entry = entry.map_err(CompressorError::Read)?;
            let path = entry
                .path()
                .map_err(CompressorError::Read)?
                .into_owned();

            let inside = entry
                .unpack_in(dest)
                .map_err(|source| CompressorError::Entry {
                    path: path.clone(),
                    source,
                })?;

            if !inside {
                warn!(path = %path.display(), "Skipping entry outside destination");
                continue;
            }

            unpacked += 1;
        }

        if unpacked == 0 {
            return Err(CompressorError::Empty);
        }

        debug!(dest = %dest.display(), entries = unpacked, "Unpacked archive");
        Ok(())
    }
}

impl Compressor for TarballCompressor {
    fn decompress_file_to_dir(
        &self,
        archive: &Path,
        dest: &Path,
        options: CompressorOptions,
    ) -> Result<(), CompressorError> {
        debug!(
            archive = %archive.display(),
            dest = %dest.display(),
            same_owner = options.same_owner,
            "Decompressing file to dir"
        );

        let open = |path: &Path| {
            File::open(path).map_err(|source| CompressorError::Open {
                path: path.to_path_buf(),
                source,
            })
        };

        let gzip = is_gzip(&mut open(archive)?).map_err(CompressorError::Read)?;
        let reader = BufReader::new(open(archive)?);

        if gzip {
            self.extract(GzDecoder::new(reader), dest, options)
        } else {
            self.extract(reader, dest, options)
        }
    }
}

/// Check for the gzip magic bytes.
fn is_gzip(file: &mut File) -> io::Result<bool> {
    let mut magic = [0u8; 2];
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(magic == [0x1f, 0x8b]),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}
