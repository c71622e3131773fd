pub mod walk;

use crate::error::Result;
use crate::progress::BackupReporter;
use crate::storage::models::{ClientRoot, FileState};
use crate::storage::Tx;
use chrono::{DateTime, SecondsFormat, Utc};
use std::time::Instant;
use tracing::info;

pub use walk::{walk_root, Exclusions, Observation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub sweep_id: i64,
    pub files_seen: usize,
    pub skipped: usize,
}

/// Begin a sweep, stage every observed file and close the sweep, all inside
/// `tx`. Nothing is visible to other readers until the caller commits.
pub fn sweep(
    tx: &Tx<'_>,
    client_root: &ClientRoot,
    started: DateTime<Utc>,
    reporter: &dyn BackupReporter,
) -> Result<SweepStats> {
    let client = client_root.client.as_str();
    let root = client_root.root_str();
    let exclusions = Exclusions::compile(&client_root.exclusions)?;

    let sweep_id = tx.begin_sweep(
        client,
        root,
        &started.to_rfc3339_opts(SecondsFormat::Secs, true),
    )?;
    reporter.on_sweep_start(root);
    let sweep_start = Instant::now();

    let mut files_seen = 0usize;
    let skipped = walk_root(
        &client_root.root,
        client_root.options.cross_filesystems,
        &exclusions,
        |observation| {
            tx.upsert_observed_file(
                client,
                root,
                &observation.relative_path,
                FileState::present(observation.size, observation.modified),
                sweep_id,
            )?;
            files_seen += 1;
            if files_seen % 1000 == 0 {
                reporter.on_sweep_progress(files_seen, &observation.relative_path);
            }
            Ok(())
        },
    )?;

    tx.complete_sweep(
        sweep_id,
        files_seen as i64,
        &Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    )?;
    reporter.on_sweep_complete(files_seen, sweep_start.elapsed().as_secs_f64());
    info!(
        "Sweep {} of {} saw {} files ({} skipped)",
        sweep_id,
        client_root.label(),
        files_seen,
        skipped
    );

    Ok(SweepStats {
        sweep_id,
        files_seen,
        skipped,
    })
}
