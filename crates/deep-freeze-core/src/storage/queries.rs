use super::models::*;
use super::sqlite::Tx;
use rusqlite::{params, OptionalExtension, Result, Row};
use tracing::debug;

const FILE_COLUMNS: &str = "file_id, client, root, relative_path, \
     size, modification, status, new_size, new_modification, new_status, \
     last_archive_id, last_seen_sweep, force_backup";

const ARCHIVE_COLUMNS: &str = "archive_id, client, root, cloud, region, bucket, \
     archive_file_name, total_size, relevant_size, stored_size, status, digest, created";

fn state_from_columns(
    size: Option<i64>,
    modified: Option<i64>,
    status: Option<FileStatus>,
) -> Option<FileState> {
    status.map(|status| FileState {
        size: size.unwrap_or(0),
        modified: modified.unwrap_or(0),
        status,
    })
}

fn file_from_row(row: &Row<'_>) -> Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        client: row.get(1)?,
        root: row.get(2)?,
        relative_path: row.get(3)?,
        committed: state_from_columns(row.get(4)?, row.get(5)?, row.get(6)?),
        pending: state_from_columns(row.get(7)?, row.get(8)?, row.get(9)?),
        last_archive_id: row.get(10)?,
        last_seen_sweep: row.get(11)?,
        force_backup: row.get(12)?,
    })
}

fn archive_from_row(row: &Row<'_>) -> Result<ArchiveRecord> {
    Ok(ArchiveRecord {
        id: row.get(0)?,
        client: row.get(1)?,
        root: row.get(2)?,
        cloud: row.get(3)?,
        region: row.get(4)?,
        bucket: row.get(5)?,
        archive_file_name: row.get(6)?,
        total_size: row.get(7)?,
        relevant_size: row.get(8)?,
        stored_size: row.get(9)?,
        status: row.get(10)?,
        digest: row.get(11)?,
        created: row.get(12)?,
    })
}

fn membership_from_row(row: &Row<'_>) -> Result<MembershipRecord> {
    Ok(MembershipRecord {
        file_id: row.get(0)?,
        archive_id: row.get(1)?,
        file_size: row.get(2)?,
        file_modification: row.get(3)?,
        status: row.get(4)?,
    })
}

/// Counts of rows discarded by run preparation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiscardedWork {
    pub memberships: usize,
    pub archives: usize,
    pub staged_files: usize,
}

impl Tx<'_> {
    // ── Sweeps ───────────────────────────────────────────────────

    pub fn begin_sweep(&self, client: &str, root: &str, started: &str) -> Result<i64> {
        self.execute(
            "INSERT INTO sweeps (client, root, started) VALUES (?1, ?2, ?3)",
            params![client, root, started],
        )?;
        let id = self.last_insert_rowid();
        debug!("Began sweep {} for {}:{}", id, client, root);
        Ok(id)
    }

    pub fn complete_sweep(&self, sweep_id: i64, files_seen: i64, completed: &str) -> Result<()> {
        self.execute(
            "UPDATE sweeps SET completed = ?1, files_seen = ?2 WHERE sweep_id = ?3",
            params![completed, files_seen, sweep_id],
        )?;
        Ok(())
    }

    pub fn get_sweep(&self, sweep_id: i64) -> Result<Option<Sweep>> {
        self.query_row(
            "SELECT sweep_id, client, root, started, completed, files_seen \
             FROM sweeps WHERE sweep_id = ?1",
            params![sweep_id],
            |row| {
                Ok(Sweep {
                    id: row.get(0)?,
                    client: row.get(1)?,
                    root: row.get(2)?,
                    started: row.get(3)?,
                    completed: row.get(4)?,
                    files_seen: row.get(5)?,
                })
            },
        )
        .optional()
    }

    // ── Files ────────────────────────────────────────────────────

    /// Stage an observation. Committed columns are never touched here.
    pub fn upsert_observed_file(
        &self,
        client: &str,
        root: &str,
        relative_path: &str,
        observed: FileState,
        sweep_id: i64,
    ) -> Result<()> {
        let mut stmt = self.prepare_cached(
            "INSERT INTO files \
             (client, root, relative_path, new_size, new_modification, new_status, \
              last_seen_sweep, force_backup) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0) \
             ON CONFLICT(client, root, relative_path) DO UPDATE SET \
                 new_size = excluded.new_size, \
                 new_modification = excluded.new_modification, \
                 new_status = excluded.new_status, \
                 last_seen_sweep = excluded.last_seen_sweep",
        )?;
        stmt.execute(params![
            client,
            root,
            relative_path,
            observed.size,
            observed.modified,
            observed.status,
            sweep_id
        ])?;
        Ok(())
    }

    pub fn get_file(&self, file_id: i64) -> Result<Option<FileRecord>> {
        self.query_row(
            &format!("SELECT {} FROM files WHERE file_id = ?1", FILE_COLUMNS),
            params![file_id],
            file_from_row,
        )
        .optional()
    }

    pub fn find_file(
        &self,
        client: &str,
        root: &str,
        relative_path: &str,
    ) -> Result<Option<FileRecord>> {
        self.query_row(
            &format!(
                "SELECT {} FROM files WHERE client = ?1 AND root = ?2 AND relative_path = ?3",
                FILE_COLUMNS
            ),
            params![client, root, relative_path],
            file_from_row,
        )
        .optional()
    }

    /// Files the sweep did not touch that were still considered live.
    pub fn files_missing_from_sweep(
        &self,
        client: &str,
        root: &str,
        sweep_id: i64,
    ) -> Result<Vec<FileRecord>> {
        let mut stmt = self.prepare(&format!(
            "SELECT {} FROM files \
             WHERE client = ?1 AND root = ?2 \
             AND (last_seen_sweep IS NULL OR last_seen_sweep != ?3) \
             AND (status IS NULL OR status = ?4) \
             ORDER BY file_id",
            FILE_COLUMNS
        ))?;
        let files = stmt
            .query_map(params![client, root, sweep_id, FileStatus::Present], file_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(files)
    }

    /// Drop the flag on unseen files whose deletion is already committed.
    /// Their bytes were released when they first vanished.
    pub fn clear_force_backup_on_absent(
        &self,
        client: &str,
        root: &str,
        sweep_id: i64,
    ) -> Result<usize> {
        let mut stmt = self.prepare_cached(
            "UPDATE files SET force_backup = 0 \
             WHERE client = ?1 AND root = ?2 \
             AND (last_seen_sweep IS NULL OR last_seen_sweep != ?3) \
             AND status = ?4 AND force_backup = 1",
        )?;
        let cleared = stmt.execute(params![client, root, sweep_id, FileStatus::Absent])?;
        Ok(cleared)
    }

    pub fn files_seen_in_sweep(
        &self,
        client: &str,
        root: &str,
        sweep_id: i64,
    ) -> Result<Vec<FileRecord>> {
        let mut stmt = self.prepare(&format!(
            "SELECT {} FROM files \
             WHERE client = ?1 AND root = ?2 AND last_seen_sweep = ?3 \
             ORDER BY file_id",
            FILE_COLUMNS
        ))?;
        let files = stmt
            .query_map(params![client, root, sweep_id], file_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(files)
    }

    pub fn files_to_backup(&self, client: &str, root: &str) -> Result<Vec<FileRecord>> {
        let mut stmt = self.prepare(&format!(
            "SELECT {} FROM files \
             WHERE client = ?1 AND root = ?2 AND force_backup = 1 AND new_status = ?3 \
             ORDER BY file_id",
            FILE_COLUMNS
        ))?;
        let files = stmt
            .query_map(params![client, root, FileStatus::Present], file_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(files)
    }

    pub fn set_force_backup(&self, file_id: i64, force: bool) -> Result<()> {
        let mut stmt =
            self.prepare_cached("UPDATE files SET force_backup = ?1 WHERE file_id = ?2")?;
        stmt.execute(params![force, file_id])?;
        Ok(())
    }

    /// Persist a record's committed/pending split, archive link and flag.
    pub fn store_file_state(&self, file: &FileRecord) -> Result<()> {
        let committed = file.committed;
        let pending = file.pending;
        let mut stmt = self.prepare_cached(
            "UPDATE files SET \
                 size = ?1, modification = ?2, status = ?3, \
                 new_size = ?4, new_modification = ?5, new_status = ?6, \
                 last_archive_id = ?7, force_backup = ?8 \
             WHERE file_id = ?9",
        )?;
        stmt.execute(params![
            committed.map(|s| s.size),
            committed.map(|s| s.modified),
            committed.map(|s| s.status),
            pending.map(|s| s.size),
            pending.map(|s| s.modified),
            pending.map(|s| s.status),
            file.last_archive_id,
            file.force_backup,
            file.id
        ])?;
        Ok(())
    }

    pub fn clear_staged_files(&self, client: &str, root: &str) -> Result<usize> {
        self.execute(
            "UPDATE files SET new_size = NULL, new_modification = NULL, new_status = NULL \
             WHERE client = ?1 AND root = ?2 AND new_status IS NOT NULL",
            params![client, root],
        )
    }

    // ── Archives ─────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub fn new_archive(
        &self,
        client: &str,
        root: &str,
        cloud: &str,
        region: &str,
        bucket: &str,
        archive_file_name: &str,
        created: &str,
    ) -> Result<i64> {
        self.execute(
            "INSERT INTO archives \
             (client, root, cloud, region, bucket, archive_file_name, \
              total_size, relevant_size, stored_size, status, created) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0, 0, ?7, ?8)",
            params![
                client,
                root,
                cloud,
                region,
                bucket,
                archive_file_name,
                ArchiveStatus::PendingUpload,
                created
            ],
        )?;
        Ok(self.last_insert_rowid())
    }

    pub fn get_archive(&self, archive_id: i64) -> Result<Option<ArchiveRecord>> {
        self.query_row(
            &format!("SELECT {} FROM archives WHERE archive_id = ?1", ARCHIVE_COLUMNS),
            params![archive_id],
            archive_from_row,
        )
        .optional()
    }

    pub fn archives_for_root(
        &self,
        client: &str,
        root: &str,
        status: ArchiveStatus,
    ) -> Result<Vec<ArchiveRecord>> {
        let mut stmt = self.prepare(&format!(
            "SELECT {} FROM archives WHERE client = ?1 AND root = ?2 AND status = ?3 \
             ORDER BY archive_id",
            ARCHIVE_COLUMNS
        ))?;
        let archives = stmt
            .query_map(params![client, root, status], archive_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(archives)
    }

    /// `total_size` is the sum of member file sizes so relevance reaches
    /// exactly zero once every member is superseded or deleted.
    pub fn mark_archive_uploaded(
        &self,
        archive_id: i64,
        total_size: i64,
        stored_size: i64,
        digest: Option<&str>,
    ) -> Result<()> {
        self.execute(
            "UPDATE archives SET status = ?1, total_size = ?2, relevant_size = ?2, \
             stored_size = ?3, digest = ?4 \
             WHERE archive_id = ?5",
            params![ArchiveStatus::Uploaded, total_size, stored_size, digest, archive_id],
        )?;
        Ok(())
    }

    pub fn subtract_relevant_size(&self, archive_id: i64, bytes: i64) -> Result<()> {
        let mut stmt = self.prepare_cached(
            "UPDATE archives SET relevant_size = MAX(0, relevant_size - ?1) \
             WHERE archive_id = ?2",
        )?;
        stmt.execute(params![bytes, archive_id])?;
        Ok(())
    }

    /// Rebuild relevance from the memberships that are still `uploaded`.
    pub fn recompute_relevant_sizes(&self, client: &str, root: &str) -> Result<usize> {
        self.execute(
            "UPDATE archives SET relevant_size = MIN(total_size, \
                 (SELECT IFNULL(SUM(m.file_size), 0) FROM membership m \
                  WHERE m.archive_id = archives.archive_id AND m.status = ?1)) \
             WHERE client = ?2 AND root = ?3 AND status = ?4",
            params![
                MembershipStatus::Uploaded,
                client,
                root,
                ArchiveStatus::Uploaded
            ],
        )
    }

    pub fn flag_archives_for_deletion(
        &self,
        client: &str,
        root: &str,
        created_before: &str,
    ) -> Result<usize> {
        self.execute(
            "UPDATE archives SET status = ?1 \
             WHERE client = ?2 AND root = ?3 AND status = ?4 \
             AND relevant_size = 0 AND created < ?5",
            params![
                ArchiveStatus::PendingDeletion,
                client,
                root,
                ArchiveStatus::Uploaded,
                created_before
            ],
        )
    }

    pub fn mark_archive_deleted(&self, archive_id: i64) -> Result<()> {
        self.execute(
            "UPDATE archives SET status = ?1 WHERE archive_id = ?2 AND status = ?3",
            params![
                ArchiveStatus::Deleted,
                archive_id,
                ArchiveStatus::PendingDeletion
            ],
        )?;
        Ok(())
    }

    pub fn delete_empty_archive(&self, archive_id: i64) -> Result<usize> {
        self.execute(
            "DELETE FROM archives WHERE archive_id = ?1 AND status = ?2 \
             AND NOT EXISTS (SELECT 1 FROM membership m WHERE m.archive_id = ?1)",
            params![archive_id, ArchiveStatus::PendingUpload],
        )
    }

    /// Drop every unit a previous run left half-finished for this root.
    pub fn discard_pending_uploads(&self, client: &str, root: &str) -> Result<DiscardedWork> {
        let memberships = self.execute(
            "DELETE FROM membership WHERE status = ?1 AND archive_id IN \
                 (SELECT archive_id FROM archives WHERE client = ?2 AND root = ?3)",
            params![MembershipStatus::PendingUpload, client, root],
        )?;
        // Members of a pending archive cannot be anything but pending; clear
        // stragglers so the archive row can go.
        self.execute(
            "DELETE FROM membership WHERE archive_id IN \
                 (SELECT archive_id FROM archives \
                  WHERE client = ?1 AND root = ?2 AND status = ?3)",
            params![client, root, ArchiveStatus::PendingUpload],
        )?;
        let archives = self.execute(
            "DELETE FROM archives WHERE client = ?1 AND root = ?2 AND status = ?3",
            params![client, root, ArchiveStatus::PendingUpload],
        )?;
        Ok(DiscardedWork {
            memberships,
            archives,
            staged_files: 0,
        })
    }

    // ── Membership ───────────────────────────────────────────────

    pub fn add_membership(
        &self,
        file_id: i64,
        archive_id: i64,
        file_size: i64,
        file_modification: i64,
    ) -> Result<()> {
        let mut stmt = self.prepare_cached(
            "INSERT INTO membership (file_id, archive_id, file_size, file_modification, status) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        stmt.execute(params![
            file_id,
            archive_id,
            file_size,
            file_modification,
            MembershipStatus::PendingUpload
        ])?;
        Ok(())
    }

    pub fn memberships_for_archive(&self, archive_id: i64) -> Result<Vec<MembershipRecord>> {
        let mut stmt = self.prepare(
            "SELECT file_id, archive_id, file_size, file_modification, status \
             FROM membership WHERE archive_id = ?1 ORDER BY file_id",
        )?;
        let rows = stmt
            .query_map(params![archive_id], membership_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn memberships_for_file(&self, file_id: i64) -> Result<Vec<MembershipRecord>> {
        let mut stmt = self.prepare(
            "SELECT file_id, archive_id, file_size, file_modification, status \
             FROM membership WHERE file_id = ?1 ORDER BY archive_id",
        )?;
        let rows = stmt
            .query_map(params![file_id], membership_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn set_archive_memberships_status(
        &self,
        archive_id: i64,
        from: MembershipStatus,
        to: MembershipStatus,
    ) -> Result<usize> {
        self.execute(
            "UPDATE membership SET status = ?1 WHERE archive_id = ?2 AND status = ?3",
            params![to, archive_id, from],
        )
    }

    /// Retire every `uploaded` record of a file except the one in `keep_archive_id`.
    pub fn retire_file_memberships(
        &self,
        file_id: i64,
        keep_archive_id: Option<i64>,
        to: MembershipStatus,
    ) -> Result<usize> {
        let mut stmt = self.prepare_cached(
            "UPDATE membership SET status = ?1 \
             WHERE file_id = ?2 AND status = ?3 AND (?4 IS NULL OR archive_id != ?4)",
        )?;
        stmt.execute(params![
            to,
            file_id,
            MembershipStatus::Uploaded,
            keep_archive_id
        ])
    }
}
