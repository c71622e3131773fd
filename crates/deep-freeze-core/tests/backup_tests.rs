mod common;

use std::path::{Path, PathBuf};

use common::{base_time, CopyEncryptor, FailingEncryptor, Fixture, CLIENT};
use deep_freeze_core::collab::{ArchiveWriter, Archiver, TarGzArchiver};
use deep_freeze_core::prepare::prepare_run;
use deep_freeze_core::scanner;
use deep_freeze_core::storage::models::{ArchiveStatus, FileStatus, MembershipStatus};
use deep_freeze_core::{Error, Result, SilentReporter};

fn uploaded_archives(fx: &mut Fixture) -> Vec<deep_freeze_core::storage::models::ArchiveRecord> {
    let root = fx.root_str();
    let tx = fx.db.transaction().unwrap();
    let archives = tx
        .archives_for_root(CLIENT, &root, ArchiveStatus::Uploaded)
        .unwrap();
    tx.commit().unwrap();
    archives
}

#[test]
fn test_first_run_backs_up_every_file() {
    let mut fx = Fixture::new();
    fx.write("a.txt", 100);
    fx.write("docs/b.txt", 200);
    fx.write("docs/deep/c.txt", 300);

    let summary = fx.run();
    assert_eq!(summary.sweep.files_seen, 3);
    assert_eq!(summary.files_pending, 3);
    assert_eq!(summary.batch.units_uploaded, 1);
    assert_eq!(summary.batch.files_archived, 3);
    assert_eq!(summary.batch.bytes_archived, 600);

    let archives = uploaded_archives(&mut fx);
    assert_eq!(archives.len(), 1);
    assert_eq!(archives[0].total_size, 600);
    assert_eq!(archives[0].relevant_size, 600);
    assert!(archives[0].digest.is_some());
    assert!(archives[0].stored_size > 0);
    assert_eq!(fx.store.put_keys(), vec![archives[0].object_key()]);

    let b = fx.file("docs/b.txt");
    assert!(!b.force_backup);
    assert!(b.pending.is_none());
    let committed = b.committed.unwrap();
    assert_eq!(committed.size, 200);
    assert_eq!(committed.status, FileStatus::Present);
    assert_eq!(b.last_archive_id, Some(archives[0].id));

    assert_eq!(
        fx.count("SELECT COUNT(*) FROM membership WHERE status = 'uploaded'"),
        3
    );
    // temp artifacts are gone
    assert_eq!(std::fs::read_dir(fx.work.path()).unwrap().count(), 0);
}

#[test]
fn test_unchanged_tree_creates_no_archive() {
    let mut fx = Fixture::new();
    fx.write("a.txt", 100);
    fx.write("b.txt", 100);
    fx.run();

    let summary = fx.run();
    assert_eq!(summary.sweep.files_seen, 2);
    assert_eq!(summary.files_pending, 0);
    assert_eq!(summary.batch.units_uploaded, 0);
    assert_eq!(fx.store.put_keys().len(), 1);
    assert_eq!(fx.count("SELECT COUNT(*) FROM archives"), 1);
}

#[test]
fn test_changed_file_supersedes_previous_copy() {
    let mut fx = Fixture::new();
    fx.write("a.txt", 100);
    fx.write("b.txt", 100);
    fx.write("c.txt", 100);
    fx.run();
    let first = uploaded_archives(&mut fx).remove(0);

    fx.write("b.txt", 150);
    let summary = fx.run();
    assert_eq!(summary.files_pending, 1);
    assert_eq!(summary.batch.units_uploaded, 1);

    let archives = uploaded_archives(&mut fx);
    assert_eq!(archives.len(), 2);
    let old = archives.iter().find(|a| a.id == first.id).unwrap();
    let new = archives.iter().find(|a| a.id != first.id).unwrap();
    assert_eq!(old.relevant_size, 200);
    assert_eq!(new.total_size, 150);
    assert_eq!(new.relevant_size, 150);

    let b = fx.file("b.txt");
    assert_eq!(b.last_archive_id, Some(new.id));
    assert_eq!(b.committed.unwrap().size, 150);

    let tx = fx.db.transaction().unwrap();
    let memberships = tx.memberships_for_file(b.id).unwrap();
    tx.commit().unwrap();
    assert_eq!(memberships.len(), 2);
    let superseded: Vec<_> = memberships
        .iter()
        .filter(|m| m.status == MembershipStatus::Superseded)
        .collect();
    assert_eq!(superseded.len(), 1);
    assert_eq!(superseded[0].archive_id, first.id);
    assert_eq!(superseded[0].file_size, 100);
}

#[test]
fn test_deleted_file_releases_relevance() {
    let mut fx = Fixture::new();
    fx.write("keep.txt", 100);
    fx.write("gone.txt", 250);
    fx.run();

    fx.remove("gone.txt");
    let summary = fx.run();
    assert_eq!(summary.absence.vanished, 1);
    assert_eq!(summary.absence.bytes_released, 250);
    assert_eq!(summary.absence.archives_touched, 1);
    assert_eq!(summary.batch.units_uploaded, 0);

    let archives = uploaded_archives(&mut fx);
    assert_eq!(archives[0].relevant_size, 100);

    let gone = fx.file("gone.txt");
    assert_eq!(gone.committed.unwrap().status, FileStatus::Absent);
    assert_eq!(gone.last_archive_id, None);
    assert!(gone.pending.is_none());

    let tx = fx.db.transaction().unwrap();
    let memberships = tx.memberships_for_file(gone.id).unwrap();
    tx.commit().unwrap();
    assert_eq!(memberships.len(), 1);
    assert_eq!(memberships[0].status, MembershipStatus::Deleted);

    // a second run does not release the same bytes again
    let summary = fx.run();
    assert_eq!(summary.absence.vanished, 0);
    assert_eq!(uploaded_archives(&mut fx)[0].relevant_size, 100);
}

#[test]
fn test_reappearing_file_is_backed_up_again() {
    let mut fx = Fixture::new();
    fx.write("a.txt", 100);
    fx.run();
    fx.remove("a.txt");
    fx.run();

    fx.write("a.txt", 100);
    let summary = fx.run();
    assert_eq!(summary.files_pending, 1);
    assert_eq!(summary.batch.units_uploaded, 1);

    let a = fx.file("a.txt");
    assert_eq!(a.committed.unwrap().status, FileStatus::Present);
    assert!(a.last_archive_id.is_some());
}

#[test]
fn test_file_gone_again_before_upload_drops_its_flag() {
    let mut fx = Fixture::new();
    fx.write("a.txt", 100);
    fx.run();
    fx.remove("a.txt");
    fx.run();

    fx.write("a.txt", 100);
    fx.store.set_fail_puts(true);
    let summary = fx.run();
    assert_eq!(summary.batch.units_failed, 1);
    assert!(fx.file("a.txt").force_backup);

    fx.store.set_fail_puts(false);
    fx.remove("a.txt");
    let summary = fx.run();
    // the bytes were already released the first time it vanished
    assert_eq!(summary.absence.vanished, 0);
    assert_eq!(summary.absence.bytes_released, 0);
    assert_eq!(summary.batch.units_uploaded, 0);

    let a = fx.file("a.txt");
    assert!(!a.force_backup);
    assert_eq!(a.committed.unwrap().status, FileStatus::Absent);
    assert_eq!(uploaded_archives(&mut fx)[0].relevant_size, 0);

    let root = fx.root_str();
    let tx = fx.db.transaction().unwrap();
    assert!(tx.files_to_backup(CLIENT, &root).unwrap().is_empty());
    tx.commit().unwrap();
}

#[cfg(unix)]
#[test]
fn test_non_utf8_name_is_not_observed() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let mut fx = Fixture::new();
    fx.write("good.txt", 100);
    std::fs::write(fx.tree.path().join(OsStr::from_bytes(b"bad\xff.txt")), b"x").unwrap();

    let summary = fx.run();
    assert_eq!(summary.sweep.files_seen, 1);
    assert_eq!(summary.sweep.skipped, 1);
    assert_eq!(summary.batch.files_archived, 1);
    assert_eq!(fx.count("SELECT COUNT(*) FROM files"), 1);
}

#[test]
fn test_interrupted_sweep_rolls_back_to_previous_state() {
    let mut fx = Fixture::new();
    fx.write("a.txt", 100);
    fx.run();

    fx.write("a.txt", 150);
    fx.write("refused.txt", 10);
    fx.db
        .connection()
        .execute_batch(
            "CREATE TRIGGER refuse_insert BEFORE INSERT ON files \
             WHEN NEW.relative_path = 'refused.txt' \
             BEGIN SELECT RAISE(ABORT, 'disk gave up'); END;",
        )
        .unwrap();

    let client_root = fx.client_root.clone();
    {
        let tx = fx.db.transaction().unwrap();
        let result = scanner::sweep(&tx, &client_root, base_time(), &SilentReporter);
        assert!(result.is_err());
    }

    assert_eq!(fx.count("SELECT COUNT(*) FROM files"), 1);
    assert_eq!(fx.count("SELECT COUNT(*) FROM sweeps"), 1);
    let a = fx.file("a.txt");
    assert!(a.pending.is_none());
    assert_eq!(a.committed.unwrap().size, 100);
}

#[test]
fn test_failed_encryption_leaves_unit_pending() {
    let mut fx = Fixture::new();
    fx.collaborators.encryptor = Box::new(FailingEncryptor);
    fx.write("a.txt", 100);
    fx.write("b.txt", 100);

    let summary = fx.run();
    assert_eq!(summary.batch.units_failed, 1);
    assert_eq!(summary.batch.units_uploaded, 0);
    assert!(fx.store.put_keys().is_empty());
    assert_eq!(
        fx.count("SELECT COUNT(*) FROM archives WHERE status = 'pending_upload'"),
        1
    );
    assert_eq!(
        fx.count("SELECT COUNT(*) FROM membership WHERE status = 'pending_upload'"),
        2
    );
    let a = fx.file("a.txt");
    assert!(a.force_backup);
    assert!(a.committed.is_none());

    fx.collaborators.encryptor = Box::new(CopyEncryptor);
    let summary = fx.run();
    assert_eq!(summary.discarded.archives, 1);
    assert_eq!(summary.batch.units_uploaded, 1);
    assert_eq!(summary.batch.files_archived, 2);
}

#[test]
fn test_units_split_after_crossing_file() {
    let mut fx = Fixture::new();
    for name in ["1.bin", "2.bin", "3.bin", "4.bin", "5.bin"] {
        fx.write(name, 100);
    }

    let summary = fx.run_with_max(250);
    assert_eq!(summary.batch.units_uploaded, 2);
    assert_eq!(summary.batch.files_archived, 5);

    let mut totals: Vec<i64> = uploaded_archives(&mut fx)
        .iter()
        .map(|a| a.total_size)
        .collect();
    totals.sort();
    assert_eq!(totals, vec![200, 300]);

    let names: Vec<String> = uploaded_archives(&mut fx)
        .into_iter()
        .map(|a| a.archive_file_name)
        .collect();
    assert!(names[0].ends_with("_1.tar.gz"), "{}", names[0]);
    assert!(names[1].ends_with("_2.tar.gz"), "{}", names[1]);
}

#[test]
fn test_failed_upload_is_retried_next_run() {
    let mut fx = Fixture::new();
    fx.write("a.txt", 100);
    fx.write("b.txt", 100);

    fx.store.set_fail_puts(true);
    let summary = fx.run();
    assert_eq!(summary.batch.units_failed, 1);
    assert_eq!(summary.batch.units_uploaded, 0);
    assert_eq!(
        fx.count("SELECT COUNT(*) FROM archives WHERE status = 'pending_upload'"),
        1
    );
    let a = fx.file("a.txt");
    assert!(a.force_backup);
    assert!(a.committed.is_none());

    fx.store.set_fail_puts(false);
    let summary = fx.run();
    assert_eq!(summary.discarded.archives, 1);
    assert_eq!(summary.discarded.memberships, 2);
    assert_eq!(summary.batch.units_uploaded, 1);
    assert_eq!(summary.batch.files_archived, 2);
    assert_eq!(fx.count("SELECT COUNT(*) FROM archives"), 1);
    assert_eq!(
        fx.count("SELECT COUNT(*) FROM membership WHERE status = 'pending_upload'"),
        0
    );
}

#[test]
fn test_preparation_is_idempotent() {
    let mut fx = Fixture::new();
    fx.write("a.txt", 100);
    fx.store.set_fail_puts(true);
    fx.run();

    let client_root = fx.client_root.clone();
    let first = prepare_run(&mut fx.db, &client_root).unwrap();
    assert_eq!(first.archives, 1);
    let second = prepare_run(&mut fx.db, &client_root).unwrap();
    assert_eq!(second.archives, 0);
    assert_eq!(second.memberships, 0);
    assert_eq!(second.staged_files, 0);
    assert_eq!(
        fx.count("SELECT COUNT(*) FROM files WHERE new_status IS NOT NULL"),
        0
    );
}

#[test]
fn test_excluded_directory_is_not_indexed() {
    let mut fx = Fixture::new();
    fx.write("src/main.rs", 10);
    fx.write("cache/blob.bin", 1000);

    let root = fx.root_str();
    let tx = fx.db.transaction().unwrap();
    tx.add_exclusion(CLIENT, &root, ".*/cache").unwrap();
    fx.client_root = tx.get_client_root(CLIENT, &root).unwrap().unwrap();
    tx.commit().unwrap();

    let summary = fx.run();
    assert_eq!(summary.sweep.files_seen, 1);
    assert_eq!(fx.count("SELECT COUNT(*) FROM files"), 1);
}

/// tar.gz archiver that reports any entry named `*.locked` as unreadable.
struct LockedFilesArchiver;

struct LockedFilesWriter {
    inner: Box<dyn ArchiveWriter>,
}

impl Archiver for LockedFilesArchiver {
    fn open(&self, path: &Path) -> Result<Box<dyn ArchiveWriter>> {
        Ok(Box::new(LockedFilesWriter {
            inner: TarGzArchiver.open(path)?,
        }))
    }
}

impl ArchiveWriter for LockedFilesWriter {
    fn add(&mut self, source: &Path, entry_name: &Path) -> Result<()> {
        if source.extension().is_some_and(|ext| ext == "locked") {
            return Err(Error::ContentUnavailable {
                path: PathBuf::from(source),
                reason: "locked".to_string(),
            });
        }
        self.inner.add(source, entry_name)
    }

    fn seal(self: Box<Self>) -> Result<u64> {
        self.inner.seal()
    }
}

#[test]
fn test_unreadable_file_is_skipped_and_stays_flagged() {
    let mut fx = Fixture::new();
    fx.collaborators.archiver = Box::new(LockedFilesArchiver);
    fx.write("a.txt", 100);
    fx.write("db.locked", 100);

    let summary = fx.run();
    assert_eq!(summary.batch.units_uploaded, 1);
    assert_eq!(summary.batch.files_archived, 1);
    assert_eq!(summary.batch.files_skipped, 1);

    let locked = fx.file("db.locked");
    assert!(locked.force_backup);
    assert!(locked.committed.is_none());
    assert_eq!(uploaded_archives(&mut fx)[0].total_size, 100);

    fx.collaborators.archiver = Box::new(TarGzArchiver);
    let summary = fx.run();
    assert_eq!(summary.files_pending, 1);
    assert_eq!(summary.batch.files_archived, 1);
    assert!(!fx.file("db.locked").force_backup);
}

#[test]
fn test_only_skipped_files_leave_no_archive() {
    let mut fx = Fixture::new();
    fx.collaborators.archiver = Box::new(LockedFilesArchiver);
    fx.write("db.locked", 100);

    let summary = fx.run();
    assert_eq!(summary.batch.units_uploaded, 0);
    assert_eq!(summary.batch.files_skipped, 1);
    assert_eq!(fx.count("SELECT COUNT(*) FROM archives"), 0);
    assert!(fx.store.put_keys().is_empty());
}
