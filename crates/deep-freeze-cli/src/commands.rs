use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "deep-freeze")]
#[command(about = "Incremental encrypted backups to cold storage", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Back up every active client root not marked manual-only
    Run,
    /// Back up a single client root
    Manual {
        #[arg(long, default_value = "aws")]
        cloud: String,
        #[arg(long, default_value = "eu-north-1")]
        region: String,
        #[arg(long)]
        client: String,
        #[arg(long)]
        root: String,
    },
    /// Delete fully irrelevant archives past the retention period
    Purge {
        #[arg(long, requires = "root")]
        client: Option<String>,
        #[arg(long, requires = "client")]
        root: Option<String>,
    },
    /// Register a new client root
    AddRoot {
        #[arg(long)]
        client: String,
        #[arg(long)]
        root: String,
        #[arg(long)]
        key_file: String,
        #[arg(long)]
        bucket: String,
        #[arg(long, default_value = "aws")]
        cloud: String,
        #[arg(long, default_value = "eu-north-1")]
        region: String,
        /// Credentials profile handed to the cloud tooling
        #[arg(long, default_value = "default")]
        credentials: String,
    },
    /// Set a per-root option (cross-filesystems, manual-only, tmp-dir)
    SetOption {
        #[arg(long)]
        client: String,
        #[arg(long)]
        root: String,
        key: String,
        value: String,
    },
    /// Exclude paths matching a regular expression
    Exclude {
        #[arg(long)]
        client: String,
        #[arg(long)]
        root: String,
        pattern: String,
    },
    /// Activate or deactivate a client root
    SetStatus {
        #[arg(long)]
        client: String,
        #[arg(long)]
        root: String,
        /// active or inactive
        status: String,
    },
    /// List configured client roots
    ListRoots,
    /// Show how much of each archive still backs current files
    Report {
        #[arg(long)]
        client: String,
        #[arg(long)]
        root: String,
    },
    /// Print configuration values
    PrintConfig,
}
