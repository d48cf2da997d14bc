//! CLI argument definitions using clap
//!
//! ```text
//! batchread --instance-id <id> --database-id <id> [--config <path>] [overrides...]
//! ```
//!
//! Every override is optional; unset flags fall back to the config file,
//! then to built-in defaults.

use clap::Parser;
use std::path::PathBuf;

/// batchread - read a whole query result in parallel from one consistent snapshot
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "batchread")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Instance to connect to
    #[arg(long = "instance-id", alias = "instance_id")]
    pub instance_id: String,

    /// Database to read from
    #[arg(long = "database-id", alias = "database_id")]
    pub database_id: String,

    /// Path to a JSON configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Root directory of the local store
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Query to run
    #[arg(long)]
    pub sql: Option<String>,

    /// Maximum partitions executing at once
    #[arg(long)]
    pub max_workers: Option<usize>,

    /// Wall-clock limit for the whole run, in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Abort the run on the first partition failure
    #[arg(long)]
    pub fail_fast: bool,

    /// Plan partitions for the isolated compute path
    #[arg(long)]
    pub accelerated: bool,

    /// Partition size hint, in bytes
    #[arg(long)]
    pub partition_size_bytes: Option<u64>,

    /// Upper bound on the number of partitions
    #[arg(long)]
    pub max_partitions: Option<usize>,

    /// Credential for protected databases
    #[arg(long)]
    pub access_token: Option<String>,

    /// Write every row to stdout as it is read
    #[arg(long)]
    pub print_rows: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
