use super::models::{ClientRoot, RootStatus};
use super::sqlite::Tx;
use crate::config::RootOptions;
use rusqlite::{params, OptionalExtension, Result, Row};
use std::path::PathBuf;
use tracing::debug;

const ROOT_COLUMNS: &str =
    "cloud, region, credentials, bucket, client, root, key_file_path, status";

fn root_from_row(row: &Row<'_>) -> Result<ClientRoot> {
    Ok(ClientRoot {
        cloud: row.get(0)?,
        region: row.get(1)?,
        credentials: row.get(2)?,
        bucket: row.get(3)?,
        client: row.get(4)?,
        root: PathBuf::from(row.get::<_, String>(5)?),
        key_file_path: PathBuf::from(row.get::<_, String>(6)?),
        status: row.get(7)?,
        options: RootOptions::default(),
        exclusions: Vec::new(),
    })
}

/// Fields needed to register a new backup target.
#[derive(Debug, Clone)]
pub struct NewClientRoot<'a> {
    pub client: &'a str,
    pub root: &'a str,
    pub key_file_path: &'a str,
    pub cloud: &'a str,
    pub region: &'a str,
    pub credentials: &'a str,
    pub bucket: &'a str,
}

impl Tx<'_> {
    pub fn add_client_root(&self, new: &NewClientRoot<'_>) -> Result<()> {
        self.execute(
            "INSERT INTO client_roots \
             (client, root, status, key_file_path, cloud, region, credentials, bucket) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                new.client,
                new.root,
                RootStatus::Active,
                new.key_file_path,
                new.cloud,
                new.region,
                new.credentials,
                new.bucket
            ],
        )?;
        debug!("Registered client root {}:{}", new.client, new.root);
        Ok(())
    }

    pub fn set_root_status(&self, client: &str, root: &str, status: RootStatus) -> Result<usize> {
        self.execute(
            "UPDATE client_roots SET status = ?1 WHERE client = ?2 AND root = ?3",
            params![status, client, root],
        )
    }

    pub fn set_root_option(&self, client: &str, root: &str, key: &str, value: &str) -> Result<()> {
        self.execute(
            "INSERT INTO client_root_options (client, root, key, value) VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(client, root, key) DO UPDATE SET value = excluded.value",
            params![client, root, key, value],
        )?;
        Ok(())
    }

    pub fn add_exclusion(&self, client: &str, root: &str, pattern: &str) -> Result<()> {
        self.execute(
            "INSERT OR IGNORE INTO client_root_exclusions (client, root, pattern) \
             VALUES (?1, ?2, ?3)",
            params![client, root, pattern],
        )?;
        Ok(())
    }

    pub fn list_client_roots(&self) -> Result<Vec<ClientRoot>> {
        let mut stmt = self.prepare(&format!(
            "SELECT {} FROM client_roots ORDER BY client, root",
            ROOT_COLUMNS
        ))?;
        let roots = stmt
            .query_map([], root_from_row)?
            .collect::<Result<Vec<_>>>()?;
        roots.into_iter().map(|r| self.with_settings(r)).collect()
    }

    pub fn active_client_roots(&self) -> Result<Vec<ClientRoot>> {
        let mut stmt = self.prepare(&format!(
            "SELECT {} FROM client_roots WHERE status = ?1 ORDER BY client, root",
            ROOT_COLUMNS
        ))?;
        let roots = stmt
            .query_map(params![RootStatus::Active], root_from_row)?
            .collect::<Result<Vec<_>>>()?;
        roots.into_iter().map(|r| self.with_settings(r)).collect()
    }

    pub fn find_client_root(
        &self,
        cloud: &str,
        region: &str,
        client: &str,
        root: &str,
    ) -> Result<Option<ClientRoot>> {
        let found = self
            .query_row(
                &format!(
                    "SELECT {} FROM client_roots \
                     WHERE cloud = ?1 AND region = ?2 AND client = ?3 AND root = ?4",
                    ROOT_COLUMNS
                ),
                params![cloud, region, client, root],
                root_from_row,
            )
            .optional()?;
        found.map(|r| self.with_settings(r)).transpose()
    }

    pub fn get_client_root(&self, client: &str, root: &str) -> Result<Option<ClientRoot>> {
        let found = self
            .query_row(
                &format!(
                    "SELECT {} FROM client_roots WHERE client = ?1 AND root = ?2",
                    ROOT_COLUMNS
                ),
                params![client, root],
                root_from_row,
            )
            .optional()?;
        found.map(|r| self.with_settings(r)).transpose()
    }

    fn with_settings(&self, mut root: ClientRoot) -> Result<ClientRoot> {
        let root_str = root.root.to_string_lossy().into_owned();

        let mut stmt = self.prepare_cached(
            "SELECT key, value FROM client_root_options WHERE client = ?1 AND root = ?2",
        )?;
        let pairs = stmt
            .query_map(params![root.client, root_str], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>>>()?;
        root.options = RootOptions::from_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let mut stmt = self.prepare_cached(
            "SELECT pattern FROM client_root_exclusions \
             WHERE client = ?1 AND root = ?2 ORDER BY pattern",
        )?;
        root.exclusions = stmt
            .query_map(params![root.client, root_str], |row| row.get(0))?
            .collect::<Result<Vec<String>>>()?;

        Ok(root)
    }
}
