use super::ColdStore;
use crate::error::{Error, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Stores objects as files below a directory. The storage class is ignored.
pub struct DirectoryColdStore {
    base: PathBuf,
}

impl DirectoryColdStore {
    pub fn new(base: impl AsRef<Path>) -> Self {
        Self {
            base: base.as_ref().to_path_buf(),
        }
    }

    pub fn object_path(&self, key: &str) -> PathBuf {
        self.base.join(key)
    }
}

impl ColdStore for DirectoryColdStore {
    fn put(&self, path: &Path, key: &str, _storage_class: &str) -> Result<()> {
        let target = self.object_path(key);
        debug!("Copying {} to {}", path.display(), target.display());
        let copy = || -> io::Result<()> {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(path, &target)?;
            Ok(())
        };
        copy().map_err(|e| Error::TransferFailed(format!("{}: {}", target.display(), e)))
    }

    fn delete(&self, key: &str) -> Result<()> {
        let target = self.object_path(key);
        fs::remove_file(&target)
            .map_err(|e| Error::RemoteDeleteFailed(format!("{}: {}", target.display(), e)))
    }
}
