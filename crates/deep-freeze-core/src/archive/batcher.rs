use super::naming::ArchiveNamer;
use crate::collab::{self, ArchiveWriter, Collaborators};
use crate::error::{Error, Result};
use crate::progress::BackupReporter;
use crate::storage::models::{object_key_for, ClientRoot, MembershipStatus};
use crate::storage::Database;
use crate::supersession;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct BatchSettings {
    /// A unit is sealed once its running total reaches this many bytes.
    pub max_unit_bytes: i64,
    pub storage_class: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub units_uploaded: usize,
    pub units_failed: usize,
    pub files_archived: usize,
    pub files_skipped: usize,
    pub bytes_archived: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    Uploaded { archive_id: i64, files: usize, bytes: i64 },
    Failed { archive_id: i64, reason: String },
}

struct OpenUnit {
    archive_id: i64,
    name: String,
    local_path: PathBuf,
    writer: Box<dyn ArchiveWriter>,
    bytes: i64,
    files: usize,
}

/// Packs the files flagged for backup into size-bounded units and ships
/// each one through archiver, encryptor and cold store.
pub struct Batcher<'a> {
    client_root: &'a ClientRoot,
    collaborators: &'a Collaborators,
    settings: &'a BatchSettings,
    work_dir: &'a Path,
    reporter: &'a dyn BackupReporter,
    namer: ArchiveNamer,
    created: String,
}

impl<'a> Batcher<'a> {
    pub fn new(
        client_root: &'a ClientRoot,
        collaborators: &'a Collaborators,
        settings: &'a BatchSettings,
        work_dir: &'a Path,
        frozen_at: DateTime<Utc>,
        reporter: &'a dyn BackupReporter,
    ) -> Self {
        Self {
            client_root,
            collaborators,
            settings,
            work_dir,
            reporter,
            namer: ArchiveNamer::new(frozen_at, &client_root.client, client_root.root_str()),
            created: frozen_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    pub fn run(&mut self, db: &mut Database) -> Result<BatchSummary> {
        let files = {
            let tx = db.transaction()?;
            let files = tx.files_to_backup(&self.client_root.client, self.client_root.root_str())?;
            tx.commit()?;
            files
        };
        self.reporter.on_backup_start(files.len());
        let backup_start = Instant::now();

        let mut summary = BatchSummary::default();
        let mut unit: Option<OpenUnit> = None;

        for file in &files {
            let pending = match file.pending {
                Some(pending) => pending,
                None => continue,
            };

            if unit.is_none() {
                unit = Some(self.open_unit(db)?);
            }
            let Some(open) = unit.as_mut() else {
                continue;
            };

            let source = self.client_root.root.join(&file.relative_path);
            match open.writer.add(&source, Path::new(&file.relative_path)) {
                Ok(()) => {
                    let tx = db.transaction()?;
                    tx.add_membership(file.id, open.archive_id, pending.size, pending.modified)?;
                    tx.commit()?;
                    open.bytes += pending.size;
                    open.files += 1;
                    debug!("{} {} -> {}", file.relative_path, pending.size, open.name);
                    self.reporter.on_file_added(&file.relative_path, pending.size);
                }
                Err(err) if err.is_content_unavailable() => {
                    warn!("Failed to add {}: {}", file.relative_path, err);
                    summary.files_skipped += 1;
                    self.reporter.on_file_skipped(&file.relative_path, &err.to_string());
                }
                Err(err) => {
                    error!("Archive {} is unusable: {}", open.name, err);
                    self.reporter.on_unit_failed(&open.name, &err.to_string());
                    summary.units_failed += 1;
                    if let Some(broken) = unit.take() {
                        remove_temp(&broken.local_path);
                    }
                    continue;
                }
            }

            if open.bytes >= self.settings.max_unit_bytes {
                if let Some(full) = unit.take() {
                    self.flush(db, full, &mut summary)?;
                }
            }
        }

        if let Some(last) = unit.take() {
            if last.files > 0 {
                self.flush(db, last, &mut summary)?;
            } else {
                self.abandon(db, last)?;
            }
        }

        self.reporter.on_backup_complete(
            summary.units_uploaded,
            backup_start.elapsed().as_secs_f64(),
        );
        Ok(summary)
    }

    fn open_unit(&mut self, db: &mut Database) -> Result<OpenUnit> {
        let name = self.namer.next_name();
        let local_path = self.work_dir.join(&name);

        let tx = db.transaction()?;
        let archive_id = tx.new_archive(
            &self.client_root.client,
            self.client_root.root_str(),
            &self.client_root.cloud,
            &self.client_root.region,
            &self.client_root.bucket,
            &name,
            &self.created,
        )?;
        tx.commit()?;

        let writer = self.collaborators.archiver.open(&local_path)?;
        info!("New archive: {}", name);
        self.reporter.on_unit_open(&name);
        Ok(OpenUnit {
            archive_id,
            name,
            local_path,
            writer,
            bytes: 0,
            files: 0,
        })
    }

    fn abandon(&self, db: &mut Database, unit: OpenUnit) -> Result<()> {
        debug!("Discarding empty archive {}", unit.name);
        if let Err(err) = unit.writer.seal() {
            debug!("Sealing empty archive {} failed: {}", unit.name, err);
        }
        remove_temp(&unit.local_path);
        let tx = db.transaction()?;
        tx.delete_empty_archive(unit.archive_id)?;
        tx.commit()?;
        Ok(())
    }

    fn flush(
        &self,
        db: &mut Database,
        unit: OpenUnit,
        summary: &mut BatchSummary,
    ) -> Result<FlushOutcome> {
        let OpenUnit {
            archive_id,
            name,
            local_path,
            writer,
            bytes,
            files,
        } = unit;

        let outcome = match self.ship(writer, &local_path, &name) {
            Ok(shipped) => {
                let tx = db.transaction()?;
                tx.mark_archive_uploaded(archive_id, bytes, shipped.stored_size, shipped.digest.as_deref())?;
                tx.set_archive_memberships_status(
                    archive_id,
                    MembershipStatus::PendingUpload,
                    MembershipStatus::Uploaded,
                )?;
                supersession::adopt_uploaded_archive(&tx, archive_id)?;
                tx.commit()?;

                info!(
                    "Uploaded {} ({} files, {} bytes, {} stored)",
                    name, files, bytes, shipped.stored_size
                );
                summary.units_uploaded += 1;
                summary.files_archived += files;
                summary.bytes_archived += bytes;
                self.reporter.on_unit_flushed(&name, files, bytes);
                FlushOutcome::Uploaded {
                    archive_id,
                    files,
                    bytes,
                }
            }
            Err(err) => {
                // The archive and its members stay pending_upload; the next
                // run's preparation discards them.
                error!("Failed to ship {}: {}", name, err);
                summary.units_failed += 1;
                self.reporter.on_unit_failed(&name, &err.to_string());
                FlushOutcome::Failed {
                    archive_id,
                    reason: err.to_string(),
                }
            }
        };
        Ok(outcome)
    }

    /// Seal, encrypt and upload. Temporary artifacts are removed whatever
    /// the result.
    fn ship(&self, writer: Box<dyn ArchiveWriter>, local_path: &Path, name: &str) -> Result<Shipped> {
        let sealed = writer.seal();
        let encrypted = sealed.and_then(|container_size| {
            debug!("Sealed {} at {} bytes", name, container_size);
            self.collaborators
                .encryptor
                .encrypt(local_path, &self.client_root.key_file_path)
        });
        let encrypted_path = match encrypted {
            Ok(path) => path,
            Err(err) => {
                remove_temp(local_path);
                return Err(err);
            }
        };

        let result = self.upload(&encrypted_path, name);
        remove_temp(local_path);
        remove_temp(&encrypted_path);
        result
    }

    fn upload(&self, encrypted_path: &Path, name: &str) -> Result<Shipped> {
        let stored_size = fs::metadata(encrypted_path)
            .map_err(|e| {
                Error::EncryptionFailed(format!("{}: {}", encrypted_path.display(), e))
            })?
            .len() as i64;
        let digest = match collab::sha256_file(encrypted_path) {
            Ok(digest) => Some(digest),
            Err(err) => {
                warn!("Could not digest {}: {}", encrypted_path.display(), err);
                None
            }
        };
        self.collaborators.cold_store.put(
            encrypted_path,
            &object_key_for(name),
            &self.settings.storage_class,
        )?;
        Ok(Shipped {
            stored_size,
            digest,
        })
    }
}

struct Shipped {
    stored_size: i64,
    digest: Option<String>,
}

fn remove_temp(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!("Could not remove temporary {}: {}", path.display(), err),
    }
}
