//! Keeps each archive's `relevant_size` equal to the committed sizes of the
//! files whose current backup it holds.
//!
//! Both entry points aggregate per predecessor archive and issue one
//! subtraction per archive.

use crate::error::Result;
use crate::storage::models::{FileRecord, FileStatus, MembershipStatus};
use crate::storage::Tx;
use std::collections::BTreeMap;
use tracing::debug;

/// Bytes released from each predecessor archive.
pub type Released = BTreeMap<i64, i64>;

fn release(tx: &Tx<'_>, released: &Released) -> Result<()> {
    for (archive_id, bytes) in released {
        debug!("Releasing {} bytes from archive {}", bytes, archive_id);
        tx.subtract_relevant_size(*archive_id, *bytes)?;
    }
    Ok(())
}

/// Confirm deletion of files the sweep no longer saw.
///
/// Each file's committed size is released from its last archive, its
/// uploaded memberships become `deleted`, and its staged absent state is
/// settled into the committed one.
pub fn confirm_vanished(tx: &Tx<'_>, files: &mut [FileRecord]) -> Result<Released> {
    let mut released = Released::new();
    for file in files.iter() {
        if let (Some(archive_id), Some(committed)) = (file.last_archive_id, file.committed) {
            if committed.status == FileStatus::Present {
                *released.entry(archive_id).or_default() += committed.size;
            }
        }
    }
    release(tx, &released)?;

    for file in files.iter_mut() {
        tx.retire_file_memberships(file.id, None, MembershipStatus::Deleted)?;
        file.last_archive_id = None;
        file.settle();
        tx.store_file_state(file)?;
    }
    Ok(released)
}

/// Make `archive_id` the current backup of every file it contains.
///
/// Memberships must already be `uploaded`. Predecessor archives lose the
/// files' previous committed sizes and their memberships become
/// `superseded`; an archive never supersedes itself.
pub fn adopt_uploaded_archive(tx: &Tx<'_>, archive_id: i64) -> Result<Released> {
    let members = tx.memberships_for_archive(archive_id)?;
    let mut files = Vec::with_capacity(members.len());
    for member in &members {
        if let Some(file) = tx.get_file(member.file_id)? {
            files.push(file);
        }
    }

    let mut released = Released::new();
    for file in &files {
        match (file.last_archive_id, file.committed) {
            (Some(previous), Some(committed))
                if previous != archive_id && committed.status == FileStatus::Present =>
            {
                *released.entry(previous).or_default() += committed.size;
            }
            _ => {}
        }
    }
    release(tx, &released)?;

    for file in files.iter_mut() {
        tx.retire_file_memberships(file.id, Some(archive_id), MembershipStatus::Superseded)?;
        file.last_archive_id = Some(archive_id);
        file.settle();
        tx.store_file_state(file)?;
    }
    debug!(
        "Archive {} adopted {} files, superseding {} archives",
        archive_id,
        files.len(),
        released.len()
    );
    Ok(released)
}
