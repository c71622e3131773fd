use crate::archive::{BatchSettings, BatchSummary, Batcher};
use crate::collab::Collaborators;
use crate::config::AppConfig;
use crate::error::Result;
use crate::prepare::prepare_run;
use crate::progress::BackupReporter;
use crate::reconcile::{self, AbsenceOutcome};
use crate::scanner::{self, SweepStats};
use crate::storage::models::ClientRoot;
use crate::storage::{Database, DiscardedWork};
use chrono::{DateTime, SubsecRound, Utc};
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub struct BackupEngine {
    settings: BatchSettings,
    tmp_dir: PathBuf,
}

#[derive(Debug)]
pub struct RunSummary {
    pub discarded: DiscardedWork,
    pub sweep: SweepStats,
    pub absence: AbsenceOutcome,
    pub files_pending: usize,
    pub batch: BatchSummary,
    pub duration: Duration,
}

impl BackupEngine {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            settings: BatchSettings {
                max_unit_bytes: config.max_archive_bytes as i64,
                storage_class: config.storage_class.clone(),
            },
            tmp_dir: config.tmp_dir.clone(),
        }
    }

    pub fn with_max_unit_bytes(mut self, bytes: i64) -> Self {
        self.settings.max_unit_bytes = bytes;
        self
    }

    /// Run one backup of `client_root`:
    /// 1. Discard leftovers of an interrupted run
    /// 2. Sweep the tree in a single transaction
    /// 3. Confirm deletions of files the sweep did not see
    /// 4. Flag changed files for backup
    /// 5. Batch, encrypt and upload the flagged files
    pub fn run(
        &self,
        db: &mut Database,
        client_root: &ClientRoot,
        collaborators: &Collaborators,
        reporter: &dyn BackupReporter,
    ) -> Result<RunSummary> {
        self.run_at(db, client_root, collaborators, reporter, Utc::now())
    }

    pub fn run_at(
        &self,
        db: &mut Database,
        client_root: &ClientRoot,
        collaborators: &Collaborators,
        reporter: &dyn BackupReporter,
        started: DateTime<Utc>,
    ) -> Result<RunSummary> {
        let run_start = Instant::now();
        let frozen_at = started.trunc_subsecs(0);
        info!("Backing up {}", client_root.label());

        let discarded = prepare_run(db, client_root)?;

        let tx = db.transaction()?;
        let sweep = scanner::sweep(&tx, client_root, frozen_at, reporter)?;
        tx.commit()?;

        let tx = db.transaction()?;
        let absence = reconcile::absence_pass(&tx, client_root, sweep.sweep_id)?;
        tx.commit()?;

        let tx = db.transaction()?;
        let files_pending = reconcile::force_backup_pass(&tx, client_root, sweep.sweep_id)?;
        tx.commit()?;

        let batch = if files_pending > 0 {
            let tmp_base = client_root
                .options
                .tmp_dir
                .clone()
                .unwrap_or_else(|| self.tmp_dir.clone());
            fs::create_dir_all(&tmp_base)?;
            let work_dir = tempfile::Builder::new()
                .prefix("deep-freeze-")
                .tempdir_in(&tmp_base)?;
            debug!("Staging archives in {}", work_dir.path().display());

            let mut batcher = Batcher::new(
                client_root,
                collaborators,
                &self.settings,
                work_dir.path(),
                frozen_at,
                reporter,
            );
            batcher.run(db)?
        } else {
            BatchSummary::default()
        };

        let duration = run_start.elapsed();
        info!(
            "Finished {} in {:.2}s: {} units uploaded, {} failed, {} files skipped",
            client_root.label(),
            duration.as_secs_f64(),
            batch.units_uploaded,
            batch.units_failed,
            batch.files_skipped
        );
        Ok(RunSummary {
            discarded,
            sweep,
            absence,
            files_pending,
            batch,
            duration,
        })
    }
}
