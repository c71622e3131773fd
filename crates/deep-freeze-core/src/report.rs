use crate::error::Result;
use crate::storage::models::{ArchiveStatus, ClientRoot};
use crate::storage::Database;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct ArchiveRelevance {
    pub archive_id: i64,
    pub archive_file_name: String,
    pub total_size: i64,
    pub relevant_size: i64,
    pub percent_relevant: f64,
    pub age_days: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct RelevanceReport {
    pub archives: Vec<ArchiveRelevance>,
    /// Archive counts by relevance decile; the last bucket includes 100%.
    pub histogram: [usize; 10],
}

impl RelevanceReport {
    pub fn fully_irrelevant(&self) -> impl Iterator<Item = &ArchiveRelevance> {
        self.archives.iter().filter(|a| a.relevant_size == 0)
    }

    pub fn partially_relevant(&self) -> impl Iterator<Item = &ArchiveRelevance> {
        self.archives
            .iter()
            .filter(|a| a.relevant_size > 0 && a.relevant_size < a.total_size)
    }
}

/// How much of each uploaded archive of a root still backs a current file.
pub fn relevance_report(
    db: &mut Database,
    client_root: &ClientRoot,
    now: DateTime<Utc>,
) -> Result<RelevanceReport> {
    let archives = {
        let tx = db.transaction()?;
        let archives = tx.archives_for_root(
            &client_root.client,
            client_root.root_str(),
            ArchiveStatus::Uploaded,
        )?;
        tx.commit()?;
        archives
    };

    let mut report = RelevanceReport::default();
    for archive in archives {
        let percent_relevant = if archive.total_size > 0 {
            archive.relevant_size as f64 * 100.0 / archive.total_size as f64
        } else {
            0.0
        };
        let bucket = ((percent_relevant / 10.0) as usize).min(9);
        report.histogram[bucket] += 1;

        let age_days = DateTime::parse_from_rfc3339(&archive.created)
            .ok()
            .map(|created| (now - created.with_timezone(&Utc)).num_days());

        report.archives.push(ArchiveRelevance {
            archive_id: archive.id,
            archive_file_name: archive.archive_file_name,
            total_size: archive.total_size,
            relevant_size: archive.relevant_size,
            percent_relevant,
            age_days,
        });
    }
    Ok(report)
}
