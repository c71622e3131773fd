#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use deep_freeze_core::collab::{ColdStore, Collaborators, Encryptor, TarGzArchiver};
use deep_freeze_core::storage::models::{ClientRoot, FileRecord};
use deep_freeze_core::storage::{Database, NewClientRoot};
use deep_freeze_core::{AppConfig, BackupEngine, Error, Result, RunSummary, SilentReporter};
use tempfile::TempDir;

pub const CLIENT: &str = "host";

/// Appends `.enc` and copies the bytes through unchanged.
pub struct CopyEncryptor;

impl Encryptor for CopyEncryptor {
    fn encrypt(&self, plaintext: &Path, _key_file: &Path) -> Result<PathBuf> {
        let mut target = plaintext.as_os_str().to_os_string();
        target.push(".enc");
        let target = PathBuf::from(target);
        fs::copy(plaintext, &target).map_err(|e| Error::EncryptionFailed(e.to_string()))?;
        Ok(target)
    }
}

/// Encryptor whose key never works.
pub struct FailingEncryptor;

impl Encryptor for FailingEncryptor {
    fn encrypt(&self, plaintext: &Path, key_file: &Path) -> Result<PathBuf> {
        Err(Error::EncryptionFailed(format!(
            "cannot encrypt {} with {}",
            plaintext.display(),
            key_file.display()
        )))
    }
}

#[derive(Debug, Default)]
pub struct StoreState {
    pub puts: Vec<(String, String)>,
    pub deletes: Vec<String>,
    pub fail_puts: bool,
    pub fail_deletes: bool,
}

/// Cold store that only remembers what it was asked to do.
#[derive(Clone, Default)]
pub struct RecordingStore {
    pub state: Arc<Mutex<StoreState>>,
}

impl RecordingStore {
    pub fn put_keys(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .puts
            .iter()
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.state.lock().unwrap().deletes.clone()
    }

    pub fn set_fail_puts(&self, fail: bool) {
        self.state.lock().unwrap().fail_puts = fail;
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.state.lock().unwrap().fail_deletes = fail;
    }
}

impl ColdStore for RecordingStore {
    fn put(&self, path: &Path, key: &str, storage_class: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_puts {
            return Err(Error::TransferFailed(format!("refusing {}", key)));
        }
        assert!(path.exists(), "uploaded artifact must exist");
        state.puts.push((key.to_string(), storage_class.to_string()));
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_deletes {
            return Err(Error::RemoteDeleteFailed(format!("refusing {}", key)));
        }
        state.deletes.push(key.to_string());
        Ok(())
    }
}

pub fn collaborators(store: &RecordingStore) -> Collaborators {
    Collaborators {
        archiver: Box::new(TarGzArchiver),
        encryptor: Box::new(CopyEncryptor),
        cold_store: Box::new(store.clone()),
    }
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// A client root over a temp directory, backed by an in-memory index.
pub struct Fixture {
    pub tree: TempDir,
    pub work: TempDir,
    pub db: Database,
    pub client_root: ClientRoot,
    pub store: RecordingStore,
    pub collaborators: Collaborators,
    pub config: AppConfig,
    runs: i64,
}

impl Fixture {
    pub fn new() -> Self {
        let tree = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let mut db = Database::open_in_memory().unwrap();
        let root = tree.path().to_str().unwrap().to_string();

        let tx = db.transaction().unwrap();
        tx.add_client_root(&NewClientRoot {
            client: CLIENT,
            root: &root,
            key_file_path: "/etc/deep-freeze/key",
            cloud: "aws",
            region: "eu-north-1",
            credentials: "default",
            bucket: "cold-bucket",
        })
        .unwrap();
        let client_root = tx.get_client_root(CLIENT, &root).unwrap().unwrap();
        tx.commit().unwrap();

        let store = RecordingStore::default();
        let collaborators = collaborators(&store);
        let config = AppConfig {
            tmp_dir: work.path().to_path_buf(),
            ..AppConfig::default()
        };
        Self {
            tree,
            work,
            db,
            client_root,
            store,
            collaborators,
            config,
            runs: 0,
        }
    }

    pub fn root_str(&self) -> String {
        self.client_root.root_str().to_string()
    }

    pub fn write(&self, relative: &str, bytes: usize) {
        let path = self.tree.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, vec![b'x'; bytes]).unwrap();
    }

    pub fn remove(&self, relative: &str) {
        fs::remove_file(self.tree.path().join(relative)).unwrap();
    }

    /// Run a backup one minute after the previous one so archive names
    /// never collide.
    pub fn run(&mut self) -> RunSummary {
        self.run_with_max(self.config.max_archive_bytes as i64)
    }

    pub fn run_with_max(&mut self, max_unit_bytes: i64) -> RunSummary {
        self.runs += 1;
        let started = base_time() + Duration::minutes(self.runs);
        BackupEngine::new(&self.config)
            .with_max_unit_bytes(max_unit_bytes)
            .run_at(
                &mut self.db,
                &self.client_root,
                &self.collaborators,
                &SilentReporter,
                started,
            )
            .unwrap()
    }

    pub fn file(&mut self, relative: &str) -> FileRecord {
        let root = self.root_str();
        let tx = self.db.transaction().unwrap();
        let file = tx.find_file(CLIENT, &root, relative).unwrap().unwrap();
        tx.commit().unwrap();
        file
    }

    pub fn count(&self, sql: &str) -> i64 {
        self.db
            .connection()
            .query_row(sql, [], |row| row.get(0))
            .unwrap()
    }
}
