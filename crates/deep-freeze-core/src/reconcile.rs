use crate::error::Result;
use crate::storage::models::{ClientRoot, FileState};
use crate::storage::Tx;
use crate::supersession;
use tracing::{debug, info};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AbsenceOutcome {
    pub vanished: usize,
    pub bytes_released: i64,
    pub archives_touched: usize,
}

/// Stage `absent` for every live file the sweep did not see and confirm the
/// deletion.
pub fn absence_pass(tx: &Tx<'_>, client_root: &ClientRoot, sweep_id: i64) -> Result<AbsenceOutcome> {
    // a reappeared file that vanished again before its upload landed
    let cleared =
        tx.clear_force_backup_on_absent(&client_root.client, client_root.root_str(), sweep_id)?;
    if cleared > 0 {
        debug!("Cleared backup flag on {} files gone again", cleared);
    }

    let mut missing =
        tx.files_missing_from_sweep(&client_root.client, client_root.root_str(), sweep_id)?;
    if missing.is_empty() {
        return Ok(AbsenceOutcome::default());
    }

    for file in missing.iter_mut() {
        debug!("Not observed: {}", file.relative_path);
        file.pending = Some(FileState::absent_from(file.committed));
    }
    let released = supersession::confirm_vanished(tx, &mut missing)?;

    let outcome = AbsenceOutcome {
        vanished: missing.len(),
        bytes_released: released.values().sum(),
        archives_touched: released.len(),
    };
    info!(
        "{} files vanished from {}, releasing {} bytes across {} archives",
        outcome.vanished,
        client_root.label(),
        outcome.bytes_released,
        outcome.archives_touched
    );
    Ok(outcome)
}

/// Flag every observed file whose staged state differs from its committed
/// one. Returns the number of files due for backup. A flag set by an
/// earlier run stays up until that file is uploaded.
pub fn force_backup_pass(tx: &Tx<'_>, client_root: &ClientRoot, sweep_id: i64) -> Result<usize> {
    let seen = tx.files_seen_in_sweep(&client_root.client, client_root.root_str(), sweep_id)?;
    let mut newly_flagged = 0usize;
    let mut due = 0usize;
    for file in &seen {
        if file.force_backup {
            due += 1;
        } else if file.needs_backup() {
            tx.set_force_backup(file.id, true)?;
            newly_flagged += 1;
            due += 1;
        }
    }
    info!(
        "{} files due for backup in {} ({} newly changed)",
        due,
        client_root.label(),
        newly_flagged
    );
    Ok(due)
}
