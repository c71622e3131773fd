use crate::collab::ColdStore;
use crate::error::Result;
use crate::progress::BackupReporter;
use crate::storage::models::{ArchiveStatus, ClientRoot};
use crate::storage::Database;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use tracing::{error, info};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PurgeSummary {
    pub flagged: usize,
    pub deleted: usize,
    pub failed: usize,
}

/// Finds archives that no longer hold any file's current backup and removes
/// them from the cold store.
///
/// Archives that are only partly relevant are never flagged, however old.
pub struct PurgePlanner {
    retention: Duration,
}

impl PurgePlanner {
    pub fn new(retention_days: i64) -> Self {
        Self {
            retention: Duration::days(retention_days),
        }
    }

    /// Recompute relevance from memberships, then flag fully irrelevant
    /// archives older than the retention floor as `pending_deletion`.
    pub fn flag(
        &self,
        db: &mut Database,
        client_root: &ClientRoot,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let cutoff = (now - self.retention).to_rfc3339_opts(SecondsFormat::Secs, true);
        let tx = db.transaction()?;
        tx.recompute_relevant_sizes(&client_root.client, client_root.root_str())?;
        let flagged =
            tx.flag_archives_for_deletion(&client_root.client, client_root.root_str(), &cutoff)?;
        tx.commit()?;
        info!(
            "Flagged {} archives of {} for deletion (created before {})",
            flagged,
            client_root.label(),
            cutoff
        );
        Ok(flagged)
    }

    /// Delete every `pending_deletion` archive from the cold store. Metadata
    /// moves to `deleted` only after the store confirms; failures stay
    /// pending for the next purge.
    pub fn delete_flagged(
        &self,
        db: &mut Database,
        client_root: &ClientRoot,
        cold_store: &dyn ColdStore,
        reporter: &dyn BackupReporter,
    ) -> Result<(usize, usize)> {
        let pending = {
            let tx = db.transaction()?;
            let pending = tx.archives_for_root(
                &client_root.client,
                client_root.root_str(),
                ArchiveStatus::PendingDeletion,
            )?;
            tx.commit()?;
            pending
        };

        let mut deleted = 0usize;
        let mut failed = 0usize;
        for archive in &pending {
            match cold_store.delete(&archive.object_key()) {
                Ok(()) => {
                    let tx = db.transaction()?;
                    tx.mark_archive_deleted(archive.id)?;
                    tx.commit()?;
                    info!("Deleted archive {}", archive.archive_file_name);
                    reporter.on_archive_purged(&archive.archive_file_name);
                    deleted += 1;
                }
                Err(err) => {
                    error!(
                        "Could not delete {}, will retry next purge: {}",
                        archive.archive_file_name, err
                    );
                    failed += 1;
                }
            }
        }
        Ok((deleted, failed))
    }

    pub fn run(
        &self,
        db: &mut Database,
        client_root: &ClientRoot,
        cold_store: &dyn ColdStore,
        now: DateTime<Utc>,
        reporter: &dyn BackupReporter,
    ) -> Result<PurgeSummary> {
        let flagged = self.flag(db, client_root, now)?;
        let (deleted, failed) = self.delete_flagged(db, client_root, cold_store, reporter)?;
        Ok(PurgeSummary {
            flagged,
            deleted,
            failed,
        })
    }
}
