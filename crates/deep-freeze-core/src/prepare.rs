use crate::error::Result;
use crate::storage::models::ClientRoot;
use crate::storage::{Database, DiscardedWork};
use tracing::info;

/// Undo whatever an interrupted run left behind for this root: pending
/// archives and their memberships go, staged file states are cleared. The
/// next sweep re-derives everything from the filesystem.
pub fn prepare_run(db: &mut Database, client_root: &ClientRoot) -> Result<DiscardedWork> {
    let client = client_root.client.as_str();
    let root = client_root.root_str();

    let tx = db.transaction()?;
    let mut discarded = tx.discard_pending_uploads(client, root)?;
    discarded.staged_files = tx.clear_staged_files(client, root)?;
    tx.commit()?;

    if discarded != DiscardedWork::default() {
        info!(
            "Discarded leftovers for {}: {} archives, {} memberships, {} staged files",
            client_root.label(),
            discarded.archives,
            discarded.memberships,
            discarded.staged_files
        );
    }
    Ok(discarded)
}
