/// Trait for reporting backup and purge progress.
///
/// The CLI implements it with indicatif; tests use [`SilentReporter`].
/// All methods have default no-op implementations.
pub trait BackupReporter: Send + Sync {
    fn on_sweep_start(&self, _root: &str) {}
    fn on_sweep_progress(&self, _files_seen: usize, _current_path: &str) {}
    fn on_sweep_complete(&self, _files_seen: usize, _duration_secs: f64) {}
    fn on_backup_start(&self, _files_pending: usize) {}
    fn on_unit_open(&self, _archive_name: &str) {}
    fn on_file_added(&self, _relative_path: &str, _size: i64) {}
    fn on_file_skipped(&self, _relative_path: &str, _reason: &str) {}
    fn on_unit_flushed(&self, _archive_name: &str, _files: usize, _bytes: i64) {}
    fn on_unit_failed(&self, _archive_name: &str, _reason: &str) {}
    fn on_backup_complete(&self, _units: usize, _duration_secs: f64) {}
    fn on_archive_purged(&self, _archive_name: &str) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl BackupReporter for SilentReporter {}
