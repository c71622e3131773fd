pub mod archive;
pub mod collab;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod prepare;
pub mod progress;
pub mod purge;
pub mod reconcile;
pub mod report;
pub mod scanner;
pub mod storage;
pub mod supersession;

pub use config::AppConfig;
pub use coordinator::{Coordinator, RootOutcome};
pub use engine::{BackupEngine, RunSummary};
pub use error::{Error, Result};
pub use progress::{BackupReporter, SilentReporter};
pub use purge::{PurgePlanner, PurgeSummary};
