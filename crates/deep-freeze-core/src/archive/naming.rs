use chrono::{DateTime, Utc};

pub const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// Hands out archive names for one run:
/// `YYYY/MM/DD/HH-MM-SS_<client>_<root>_<seq>.tar.gz`.
///
/// The date prefix shards archives into a hierarchy so no single directory
/// of the bucket grows without bound.
#[derive(Debug)]
pub struct ArchiveNamer {
    stamp: String,
    client: String,
    safe_root: String,
    sequence: u32,
}

impl ArchiveNamer {
    pub fn new(frozen_at: DateTime<Utc>, client: &str, root: &str) -> Self {
        Self {
            stamp: frozen_at.format("%Y/%m/%d/%H-%M-%S").to_string(),
            client: client.to_string(),
            safe_root: safe_filename(root),
            sequence: 0,
        }
    }

    pub fn next_name(&mut self) -> String {
        self.sequence += 1;
        format!(
            "{}_{}_{}_{}{}",
            self.stamp, self.client, self.safe_root, self.sequence, ARCHIVE_SUFFIX
        )
    }
}

/// Flatten a path into a single dash-separated token.
pub fn safe_filename(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| match c {
            '/' | '.' | ' ' | '_' => '-',
            other => other,
        })
        .collect();
    let safe = safe.strip_prefix('-').unwrap_or(&safe);
    let safe = safe.strip_suffix('-').unwrap_or(safe);
    safe.to_string()
}
