use crate::error::{Error, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Full-path exclusion patterns. Each pattern must match the whole path.
#[derive(Debug, Default)]
pub struct Exclusions {
    patterns: Vec<Regex>,
}

impl Exclusions {
    pub fn compile(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(&format!("^(?:{})$", p)).map_err(Error::from))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        let text = path.to_string_lossy();
        self.patterns.iter().any(|re| re.is_match(&text))
    }
}

/// A regular file seen under the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub relative_path: String,
    pub size: i64,
    pub modified: i64,
}

/// Walk `root` without following symlinks, skipping excluded paths and,
/// unless `cross_filesystems`, mount points. Entries that vanish or whose
/// names are not valid UTF-8 are skipped as if never seen.
pub fn walk_root<F>(
    root: &Path,
    cross_filesystems: bool,
    exclusions: &Exclusions,
    mut visit: F,
) -> Result<usize>
where
    F: FnMut(Observation) -> Result<()>,
{
    if !root.is_dir() {
        return Err(Error::RootMissing(root.to_path_buf()));
    }

    let mut skipped = 0usize;
    let walker = WalkDir::new(root)
        .follow_links(false)
        .same_file_system(!cross_filesystems)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !exclusions.is_excluded(entry.path()));

    for entry_result in walker {
        let entry = match entry_result {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Skipping unreadable entry: {}", err);
                skipped += 1;
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        match observe(root, &entry) {
            Some(observation) => visit(observation)?,
            None => skipped += 1,
        }
    }

    Ok(skipped)
}

fn observe(root: &Path, entry: &DirEntry) -> Option<Observation> {
    let path = entry.path();
    let relative_path = match relative_path(root, path) {
        Some(rel) => rel,
        None => {
            warn!("Skipping file with non UTF-8 name: {}", path.display());
            return None;
        }
    };

    // lstat; a file deleted since the listing simply was not observed
    let metadata = match entry.metadata() {
        Ok(metadata) => metadata,
        Err(err) => {
            debug!("File vanished before stat {}: {}", path.display(), err);
            return None;
        }
    };

    let modified = metadata
        .modified()
        .ok()
        .map(|t| match t.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs() as i64,
            Err(e) => -(e.duration().as_secs() as i64),
        })
        .unwrap_or(0);

    Some(Observation {
        relative_path,
        size: metadata.len() as i64,
        modified,
    })
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel: PathBuf = path.strip_prefix(root).ok()?.to_path_buf();
    rel.to_str().map(|s| s.to_string())
}
