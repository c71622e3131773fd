use super::{ArchiveWriter, Archiver};
use crate::error::{Error, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::trace;

/// gzip-compressed tar containers.
pub struct TarGzArchiver;

impl Archiver for TarGzArchiver {
    fn open(&self, path: &Path) -> Result<Box<dyn ArchiveWriter>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::options().write(true).create_new(true).open(path)?;
        Ok(Box::new(TarGzWriter {
            path: path.to_path_buf(),
            builder: tar::Builder::new(GzEncoder::new(file, Compression::default())),
        }))
    }
}

struct TarGzWriter {
    path: PathBuf,
    builder: tar::Builder<GzEncoder<File>>,
}

impl ArchiveWriter for TarGzWriter {
    fn add(&mut self, source: &Path, entry_name: &Path) -> Result<()> {
        // a path swapped for a link after the sweep is never followed
        let link = fs::symlink_metadata(source).map_err(|e| Error::ContentUnavailable {
            path: source.to_path_buf(),
            reason: e.to_string(),
        })?;
        if link.file_type().is_symlink() {
            return Err(Error::ContentUnavailable {
                path: source.to_path_buf(),
                reason: "replaced by a symlink".to_string(),
            });
        }
        let mut file = File::open(source).map_err(|e| Error::ContentUnavailable {
            path: source.to_path_buf(),
            reason: e.to_string(),
        })?;
        let metadata = file.metadata().map_err(|e| Error::ContentUnavailable {
            path: source.to_path_buf(),
            reason: e.to_string(),
        })?;
        if !metadata.is_file() {
            return Err(Error::ContentUnavailable {
                path: source.to_path_buf(),
                reason: "no longer a regular file".to_string(),
            });
        }
        self.builder.append_file(entry_name, &mut file)?;
        trace!("Added {} to {}", source.display(), self.path.display());
        Ok(())
    }

    fn seal(self: Box<Self>) -> Result<u64> {
        let TarGzWriter { path, builder } = *self;
        let file = builder.into_inner()?.finish()?;
        file.sync_all()?;
        let size = fs::metadata(&path)?.len();
        Ok(size)
    }
}
