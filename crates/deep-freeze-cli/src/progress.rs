use deep_freeze_core::BackupReporter;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using indicatif.
///
/// - Sweep: spinner, total unknown upfront
/// - Backup: bar over the files flagged for backup
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn spinner(message: String) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars(TICK_CHARS);
        pb.set_style(style);
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }

    fn set_bar(&self, pb: ProgressBar) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(old) = guard.take() {
                old.finish_and_clear();
            }
            *guard = Some(pb);
        }
    }

    fn finish_bar(&self) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(pb) = guard.as_ref() {
                f(pb);
            }
        }
    }
}

impl BackupReporter for CliReporter {
    fn on_sweep_start(&self, root: &str) {
        self.set_bar(Self::spinner(format!("Sweeping {}...", root)));
    }

    fn on_sweep_progress(&self, files_seen: usize, _current_path: &str) {
        self.with_bar(|pb| pb.set_message(format!("Sweeping... {} files seen", files_seen)));
    }

    fn on_sweep_complete(&self, files_seen: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Sweep complete: {} files in {:.2}s",
            files_seen, duration_secs
        );
    }

    fn on_backup_start(&self, files_pending: usize) {
        let pb = ProgressBar::new(files_pending as u64);
        let style = ProgressStyle::with_template(
            "  {spinner:.cyan} Archiving [{bar:30.cyan/dim}] {pos}/{len} files {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━╸─")
        .tick_chars(TICK_CHARS);
        pb.set_style(style);
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_unit_open(&self, archive_name: &str) {
        let name = archive_name.to_string();
        self.with_bar(|pb| pb.set_message(name));
    }

    fn on_file_added(&self, _relative_path: &str, _size: i64) {
        self.with_bar(|pb| pb.inc(1));
    }

    fn on_file_skipped(&self, relative_path: &str, reason: &str) {
        let line = format!("  \x1b[33m!\x1b[0m Skipped {}: {}", relative_path, reason);
        self.with_bar(|pb| {
            pb.inc(1);
            pb.println(line);
        });
    }

    fn on_unit_flushed(&self, archive_name: &str, files: usize, bytes: i64) {
        let line = format!(
            "  \x1b[32m✓\x1b[0m Uploaded {} ({} files, {} bytes)",
            archive_name, files, bytes
        );
        self.with_bar(|pb| pb.println(line));
    }

    fn on_unit_failed(&self, archive_name: &str, reason: &str) {
        let line = format!("  \x1b[31m✗\x1b[0m {} failed: {}", archive_name, reason);
        self.with_bar(|pb| pb.println(line));
    }

    fn on_backup_complete(&self, units: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Backup complete: {} archives in {:.2}s",
            units, duration_secs
        );
    }

    fn on_archive_purged(&self, archive_name: &str) {
        eprintln!("  \x1b[32m✓\x1b[0m Purged {}", archive_name);
    }
}
