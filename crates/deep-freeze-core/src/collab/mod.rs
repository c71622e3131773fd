//! Services the backup core drives but does not implement itself: the
//! archive container, encryption and the cold object store.

pub mod aws;
pub mod gpg;
pub mod local;
pub mod tar_gz;

use crate::error::{Error, Result};
use crate::storage::models::ClientRoot;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

pub use aws::AwsCliColdStore;
pub use gpg::GpgEncryptor;
pub use local::DirectoryColdStore;
pub use tar_gz::TarGzArchiver;

/// Opens archive containers.
pub trait Archiver: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn ArchiveWriter>>;
}

/// One open archive container.
pub trait ArchiveWriter {
    /// Add `source` under `entry_name`. A source that vanished or cannot be
    /// read fails with [`Error::ContentUnavailable`]; any other error means
    /// the container itself is broken.
    fn add(&mut self, source: &Path, entry_name: &Path) -> Result<()>;

    /// Finish the container and return its size in bytes.
    fn seal(self: Box<Self>) -> Result<u64>;
}

pub trait Encryptor: Send + Sync {
    /// Encrypt `plaintext` with the passphrase in `key_file`, returning the
    /// ciphertext path. Fails with [`Error::EncryptionFailed`].
    fn encrypt(&self, plaintext: &Path, key_file: &Path) -> Result<PathBuf>;
}

pub trait ColdStore: Send + Sync {
    /// Upload `path` under `key`. Fails with [`Error::TransferFailed`].
    fn put(&self, path: &Path, key: &str, storage_class: &str) -> Result<()>;

    /// Remove `key`. Any failure is reported as [`Error::RemoteDeleteFailed`].
    fn delete(&self, key: &str) -> Result<()>;
}

/// The trio used for one client root.
pub struct Collaborators {
    pub archiver: Box<dyn Archiver>,
    pub encryptor: Box<dyn Encryptor>,
    pub cold_store: Box<dyn ColdStore>,
}

/// Builds collaborators for a root; the coordinator asks once per run.
pub trait CollaboratorFactory {
    fn for_root(&self, client_root: &ClientRoot) -> Result<Collaborators>;
}

/// tar.gz + gpg, shipped with the aws CLI or to a local directory when the
/// root's cloud is `local`.
pub struct DefaultCollaborators;

impl CollaboratorFactory for DefaultCollaborators {
    fn for_root(&self, client_root: &ClientRoot) -> Result<Collaborators> {
        let cold_store: Box<dyn ColdStore> = match client_root.cloud.as_str() {
            "aws" => Box::new(AwsCliColdStore::new(
                &client_root.credentials,
                &client_root.region,
                &client_root.bucket,
            )),
            "local" => Box::new(DirectoryColdStore::new(&client_root.bucket)),
            other => {
                return Err(Error::Other(format!(
                    "Unsupported cloud provider '{}' for {}",
                    other,
                    client_root.label()
                )))
            }
        };
        Ok(Collaborators {
            archiver: Box::new(TarGzArchiver),
            encryptor: Box::new(GpgEncryptor::default()),
            cold_store,
        })
    }
}

/// Hex SHA-256 of a file.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
