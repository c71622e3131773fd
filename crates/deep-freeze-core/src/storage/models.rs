use crate::config::RootOptions;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use std::path::PathBuf;

macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let text = value.as_str()?;
                $name::parse(text).ok_or_else(|| {
                    FromSqlError::Other(format!("invalid {} '{}'", stringify!($name), text).into())
                })
            }
        }
    };
}

text_enum!(FileStatus {
    Present => "present",
    Absent => "absent",
});

text_enum!(ArchiveStatus {
    PendingUpload => "pending_upload",
    Uploaded => "uploaded",
    PendingDeletion => "pending_deletion",
    Deleted => "deleted",
});

text_enum!(MembershipStatus {
    PendingUpload => "pending_upload",
    Uploaded => "uploaded",
    Deleted => "deleted",
    Superseded => "superseded",
});

text_enum!(RootStatus {
    Active => "active",
    Inactive => "inactive",
});

/// A configured backup target: one client directory shipped to one bucket.
#[derive(Debug, Clone)]
pub struct ClientRoot {
    pub cloud: String,
    pub region: String,
    pub credentials: String,
    pub bucket: String,
    pub client: String,
    pub root: PathBuf,
    pub key_file_path: PathBuf,
    pub status: RootStatus,
    pub options: RootOptions,
    pub exclusions: Vec<String>,
}

impl ClientRoot {
    pub fn root_str(&self) -> &str {
        self.root.to_str().unwrap_or_default()
    }

    pub fn label(&self) -> String {
        format!(
            "{}/{}/{}:{}",
            self.cloud,
            self.region,
            self.client,
            self.root.display()
        )
    }
}

/// Size and modification time (unix seconds) of a file at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileState {
    pub size: i64,
    pub modified: i64,
    pub status: FileStatus,
}

impl FileState {
    pub fn present(size: i64, modified: i64) -> Self {
        Self {
            size,
            modified,
            status: FileStatus::Present,
        }
    }

    pub fn absent_from(previous: Option<FileState>) -> Self {
        let (size, modified) = previous.map(|s| (s.size, s.modified)).unwrap_or((0, 0));
        Self {
            size,
            modified,
            status: FileStatus::Absent,
        }
    }
}

/// One tracked path. `committed` is the state of the last confirmed backup or
/// deletion; `pending` is what the current sweep observed and has not been
/// confirmed yet.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub id: i64,
    pub client: String,
    pub root: String,
    pub relative_path: String,
    pub committed: Option<FileState>,
    pub pending: Option<FileState>,
    pub last_archive_id: Option<i64>,
    pub last_seen_sweep: Option<i64>,
    pub force_backup: bool,
}

impl FileRecord {
    /// Whether the pending observation requires a fresh archive copy.
    pub fn needs_backup(&self) -> bool {
        match (self.committed, self.pending) {
            (_, None) => false,
            (_, Some(pending)) if pending.status == FileStatus::Absent => false,
            (None, Some(_)) => true,
            (Some(committed), Some(pending)) => {
                committed.status == FileStatus::Absent
                    || committed.size != pending.size
                    || committed.modified != pending.modified
            }
        }
    }

    /// Promote the pending state into the committed one. This is the single
    /// transition used both when an upload completes and when a deletion is
    /// confirmed.
    pub fn settle(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.committed = Some(pending);
        }
        self.force_backup = false;
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveRecord {
    pub id: i64,
    pub client: String,
    pub root: String,
    pub cloud: String,
    pub region: String,
    pub bucket: String,
    pub archive_file_name: String,
    pub total_size: i64,
    pub relevant_size: i64,
    pub stored_size: i64,
    pub status: ArchiveStatus,
    pub digest: Option<String>,
    pub created: String,
}

impl ArchiveRecord {
    /// Object key of the encrypted artifact in the cold store.
    pub fn object_key(&self) -> String {
        object_key_for(&self.archive_file_name)
    }
}

pub fn object_key_for(archive_file_name: &str) -> String {
    format!("{}.enc", archive_file_name)
}

#[derive(Debug, Clone)]
pub struct MembershipRecord {
    pub file_id: i64,
    pub archive_id: i64,
    pub file_size: i64,
    pub file_modification: i64,
    pub status: MembershipStatus,
}

#[derive(Debug, Clone)]
pub struct Sweep {
    pub id: i64,
    pub client: String,
    pub root: String,
    pub started: String,
    pub completed: Option<String>,
    pub files_seen: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(committed: Option<FileState>, pending: Option<FileState>) -> FileRecord {
        FileRecord {
            id: 1,
            client: "host".to_string(),
            root: "/data".to_string(),
            relative_path: "a.txt".to_string(),
            committed,
            pending,
            last_archive_id: None,
            last_seen_sweep: None,
            force_backup: false,
        }
    }

    #[test]
    fn test_new_file_needs_backup() {
        let r = record(None, Some(FileState::present(10, 100)));
        assert!(r.needs_backup());
    }

    #[test]
    fn test_unchanged_file_does_not_need_backup() {
        let state = FileState::present(10, 100);
        let r = record(Some(state), Some(state));
        assert!(!r.needs_backup());
    }

    #[test]
    fn test_changed_size_or_mtime_needs_backup() {
        let committed = FileState::present(10, 100);
        assert!(record(Some(committed), Some(FileState::present(11, 100))).needs_backup());
        assert!(record(Some(committed), Some(FileState::present(10, 101))).needs_backup());
    }

    #[test]
    fn test_reappeared_file_needs_backup() {
        let committed = FileState::absent_from(Some(FileState::present(10, 100)));
        let r = record(Some(committed), Some(FileState::present(10, 100)));
        assert!(r.needs_backup());
    }

    #[test]
    fn test_vanished_file_does_not_need_backup() {
        let committed = FileState::present(10, 100);
        let r = record(Some(committed), Some(FileState::absent_from(Some(committed))));
        assert!(!r.needs_backup());
    }

    #[test]
    fn test_settle_promotes_pending() {
        let mut r = record(
            Some(FileState::present(10, 100)),
            Some(FileState::present(20, 200)),
        );
        r.force_backup = true;
        r.settle();
        assert_eq!(r.committed, Some(FileState::present(20, 200)));
        assert!(r.pending.is_none());
        assert!(!r.force_backup);
    }

    #[test]
    fn test_status_text_round_trip() {
        assert_eq!(ArchiveStatus::parse("pending_deletion"), Some(ArchiveStatus::PendingDeletion));
        assert_eq!(MembershipStatus::Superseded.as_str(), "superseded");
        assert_eq!(FileStatus::parse("gone"), None);
    }
}
