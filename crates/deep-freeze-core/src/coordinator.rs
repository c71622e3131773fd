use crate::collab::CollaboratorFactory;
use crate::config::AppConfig;
use crate::engine::{BackupEngine, RunSummary};
use crate::error::{Error, Result};
use crate::progress::BackupReporter;
use crate::purge::{PurgePlanner, PurgeSummary};
use crate::storage::models::ClientRoot;
use crate::storage::Database;
use chrono::Utc;
use tracing::{error, info};

/// Result of one root within a multi-root invocation.
#[derive(Debug)]
pub struct RootOutcome<T> {
    pub label: String,
    pub result: Result<T>,
}

/// Drives backup and purge runs over the configured client roots. Runs for
/// one root are strictly sequential; the caller must not start two runs for
/// the same root at once.
pub struct Coordinator<F: CollaboratorFactory> {
    db: Database,
    config: AppConfig,
    factory: F,
}

impl<F: CollaboratorFactory> Coordinator<F> {
    pub fn new(db: Database, config: AppConfig, factory: F) -> Self {
        Self {
            db,
            config,
            factory,
        }
    }

    pub fn database(&mut self) -> &mut Database {
        &mut self.db
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Back up every active root not flagged manual-only. A failing root is
    /// logged and does not stop the others.
    pub fn run_all(&mut self, reporter: &dyn BackupReporter) -> Result<Vec<RootOutcome<RunSummary>>> {
        let roots = {
            let tx = self.db.transaction()?;
            let roots = tx.active_client_roots()?;
            tx.commit()?;
            roots
        };

        let mut outcomes = Vec::new();
        for client_root in roots.iter().filter(|r| !r.options.manual_only) {
            let result = self.backup_root(client_root, reporter);
            if let Err(err) = &result {
                error!("Backup of {} failed: {}", client_root.label(), err);
            }
            outcomes.push(RootOutcome {
                label: client_root.label(),
                result,
            });
        }
        Ok(outcomes)
    }

    /// Back up one root by its full identity, whatever its status or
    /// manual-only flag.
    pub fn run_manual(
        &mut self,
        cloud: &str,
        region: &str,
        client: &str,
        root: &str,
        reporter: &dyn BackupReporter,
    ) -> Result<RunSummary> {
        let client_root = {
            let tx = self.db.transaction()?;
            let found = tx.find_client_root(cloud, region, client, root)?;
            tx.commit()?;
            found
        }
        .ok_or_else(|| {
            Error::ClientRootNotFound(format!("{}/{}/{}:{}", cloud, region, client, root))
        })?;
        info!("Manual backup of {}", client_root.label());
        self.backup_root(&client_root, reporter)
    }

    pub fn purge(
        &mut self,
        client: &str,
        root: &str,
        reporter: &dyn BackupReporter,
    ) -> Result<PurgeSummary> {
        let client_root = {
            let tx = self.db.transaction()?;
            let found = tx.get_client_root(client, root)?;
            tx.commit()?;
            found
        }
        .ok_or_else(|| Error::ClientRootNotFound(format!("{}:{}", client, root)))?;
        self.purge_root(&client_root, reporter)
    }

    /// Purge every active root. Failures are logged and the next root runs.
    pub fn purge_all(&mut self, reporter: &dyn BackupReporter) -> Result<Vec<RootOutcome<PurgeSummary>>> {
        let roots = {
            let tx = self.db.transaction()?;
            let roots = tx.active_client_roots()?;
            tx.commit()?;
            roots
        };

        let mut outcomes = Vec::new();
        for client_root in &roots {
            let result = self.purge_root(client_root, reporter);
            if let Err(err) = &result {
                error!("Purge of {} failed: {}", client_root.label(), err);
            }
            outcomes.push(RootOutcome {
                label: client_root.label(),
                result,
            });
        }
        Ok(outcomes)
    }

    fn backup_root(
        &mut self,
        client_root: &ClientRoot,
        reporter: &dyn BackupReporter,
    ) -> Result<RunSummary> {
        let collaborators = self.factory.for_root(client_root)?;
        BackupEngine::new(&self.config).run(&mut self.db, client_root, &collaborators, reporter)
    }

    fn purge_root(
        &mut self,
        client_root: &ClientRoot,
        reporter: &dyn BackupReporter,
    ) -> Result<PurgeSummary> {
        let collaborators = self.factory.for_root(client_root)?;
        PurgePlanner::new(self.config.retention_days).run(
            &mut self.db,
            client_root,
            collaborators.cold_store.as_ref(),
            Utc::now(),
            reporter,
        )
    }
}
