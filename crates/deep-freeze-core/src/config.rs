use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_MAX_ARCHIVE_BYTES: u64 = 500_000_000;
pub const DEFAULT_STORAGE_CLASS: &str = "DEEP_ARCHIVE";
pub const DEFAULT_RETENTION_DAYS: i64 = 180;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub tmp_dir: PathBuf,
    pub max_archive_bytes: u64,
    pub storage_class: String,
    pub retention_days: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            tmp_dir: std::env::temp_dir(),
            max_archive_bytes: DEFAULT_MAX_ARCHIVE_BYTES,
            storage_class: DEFAULT_STORAGE_CLASS.to_string(),
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

/// Defaults, then `DeepFreeze.toml` if present, then `DEEP_FREEZE_*` variables.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let defaults = AppConfig::default();
    let builder = Config::builder()
        .set_default("db_path", defaults.db_path.to_string_lossy().into_owned())?
        .set_default("tmp_dir", defaults.tmp_dir.to_string_lossy().into_owned())?
        .set_default("max_archive_bytes", defaults.max_archive_bytes)?
        .set_default("storage_class", defaults.storage_class)?
        .set_default("retention_days", defaults.retention_days)?
        .add_source(ConfigFile::with_name("DeepFreeze").required(false))
        .add_source(Environment::with_prefix("DEEP_FREEZE"))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

fn default_db_path() -> PathBuf {
    let home = directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(".deep-freeze-backups")
        .join("deep-freeze-backups.db")
}

/// Typed view over the `client_root_options` key/value rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootOptions {
    pub cross_filesystems: bool,
    pub manual_only: bool,
    pub tmp_dir: Option<PathBuf>,
}

pub const OPT_CROSS_FILESYSTEMS: &str = "cross-filesystems";
pub const OPT_MANUAL_ONLY: &str = "manual-only";
pub const OPT_TMP_DIR: &str = "tmp-dir";

impl RootOptions {
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut options = RootOptions::default();
        for (key, value) in pairs {
            match key {
                OPT_CROSS_FILESYSTEMS => options.cross_filesystems = parse_flag(value),
                OPT_MANUAL_ONLY => options.manual_only = parse_flag(value),
                OPT_TMP_DIR if !value.trim().is_empty() => {
                    options.tmp_dir = Some(PathBuf::from(value))
                }
                other => tracing::warn!("Ignoring unknown root option '{}'", other),
            }
        }
        options
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "yes" | "y" | "true" | "1" | "on"
    )
}
