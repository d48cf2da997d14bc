//! CLI command implementation
//!
//! 1. Load configuration (file, then flag overrides) and validate it
//! 2. Build a tokio runtime
//! 3. Run the query against the local store
//! 4. Print the summary; on failure print the partial summary and return
//!    the error for the caller to report

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::observability::{log_event_with_fields, Event, Logger, MetricsRegistry, Severity};
use crate::partition::ListOptions;
use crate::runner::{QueryRunner, RunOptions};
use crate::snapshot::ConnectionParams;
use crate::store::LocalStore;

use super::args::Cli;
use super::errors::{CliError, CliResult};
use super::io::{write_error, write_response, RowPrinter};

/// Configuration file structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Root of the local store (default "./data")
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Query to run (default "SELECT * FROM users")
    #[serde(default = "default_sql")]
    pub sql: String,

    /// Concurrent partitions (default: from available parallelism)
    #[serde(default)]
    pub max_workers: Option<usize>,

    /// Whole-run deadline in seconds (default 3600)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Abort on first partition failure (default false)
    #[serde(default)]
    pub fail_fast: bool,

    /// Plan for the isolated compute path (default false)
    #[serde(default)]
    pub use_accelerated_path: bool,

    /// Partition size hint in bytes (default: store's choice)
    #[serde(default)]
    pub partition_size_bytes: Option<u64>,

    /// Upper bound on partitions (default: none)
    #[serde(default)]
    pub max_partitions: Option<usize>,

    /// Credential for protected databases
    #[serde(default)]
    pub access_token: Option<String>,

    /// Minimum log severity (default "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_data_dir() -> String {
    "./data".to_string()
}
fn default_sql() -> String {
    "SELECT * FROM users".to_string()
}
fn default_timeout_secs() -> u64 {
    3600
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            sql: default_sql(),
            max_workers: None,
            timeout_secs: default_timeout_secs(),
            fail_fast: false,
            use_accelerated_path: false,
            partition_size_bytes: None,
            max_partitions: None,
            access_token: None,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::config_error(format!("Failed to read config: {}", e)))?;

        let config: Config = serde_json::from_str(&content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Config file (if any) with command-line overrides applied
    pub fn resolve(cli: &Cli) -> CliResult<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };

        if let Some(dir) = &cli.data_dir {
            config.data_dir = dir.to_string_lossy().into_owned();
        }
        if let Some(sql) = &cli.sql {
            config.sql = sql.clone();
        }
        if cli.max_workers.is_some() {
            config.max_workers = cli.max_workers;
        }
        if let Some(secs) = cli.timeout_secs {
            config.timeout_secs = secs;
        }
        if cli.partition_size_bytes.is_some() {
            config.partition_size_bytes = cli.partition_size_bytes;
        }
        if cli.max_partitions.is_some() {
            config.max_partitions = cli.max_partitions;
        }
        if cli.access_token.is_some() {
            config.access_token = cli.access_token.clone();
        }
        config.fail_fast |= cli.fail_fast;
        config.use_accelerated_path |= cli.accelerated;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    fn validate(&self) -> CliResult<()> {
        if self.data_dir.trim().is_empty() {
            return Err(CliError::config_error("data_dir must not be empty"));
        }

        if self.sql.trim().is_empty() {
            return Err(CliError::config_error("sql must not be empty"));
        }

        if self.max_workers == Some(0) {
            return Err(CliError::config_error("max_workers must be > 0"));
        }

        if self.timeout_secs == 0 {
            return Err(CliError::config_error("timeout_secs must be > 0"));
        }

        if self.partition_size_bytes == Some(0) {
            return Err(CliError::config_error("partition_size_bytes must be > 0"));
        }

        if self.max_partitions == Some(0) {
            return Err(CliError::config_error("max_partitions must be > 0"));
        }

        self.severity()?;

        Ok(())
    }

    pub fn severity(&self) -> CliResult<Severity> {
        Severity::parse(&self.log_level).ok_or_else(|| {
            CliError::config_error(format!("Invalid log_level: '{}'", self.log_level))
        })
    }

    /// Get data directory as Path
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    /// Engine options for one run
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            max_workers: self.max_workers,
            timeout: Some(Duration::from_secs(self.timeout_secs)),
            fail_fast: self.fail_fast,
            list: ListOptions {
                use_accelerated_path: self.use_accelerated_path,
                partition_size_bytes: self.partition_size_bytes,
                max_partitions: self.max_partitions,
            },
        }
    }
}

/// Run one query as described by the command line
pub fn run_batch(cli: &Cli) -> CliResult<()> {
    let config = Config::resolve(cli)?;
    Logger::set_min_severity(config.severity()?);

    log_event_with_fields(
        Event::ConfigLoaded,
        &[
            ("data_dir", &config.data_dir),
            ("fail_fast", if config.fail_fast { "true" } else { "false" }),
            ("timeout_secs", &config.timeout_secs.to_string()),
        ],
    );

    let mut params = ConnectionParams::new(&cli.instance_id, &cli.database_id);
    if let Some(token) = &config.access_token {
        params = params.with_credentials(token);
    }

    let metrics = Arc::new(MetricsRegistry::new());
    let mut runner = QueryRunner::new(Arc::new(LocalStore::new(config.data_path())))
        .with_metrics(Arc::clone(&metrics));
    if cli.print_rows {
        runner = runner.with_row_sink(Arc::new(RowPrinter));
    }

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::io_error(format!("Failed to start runtime: {}", e)))?;

    let cancel = runner.canceller();
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let result = runtime.block_on(runner.run(&params, &config.sql, &config.run_options()));

    match result {
        Ok(summary) => write_response(json!({
            "summary": summary,
            "metrics": metrics.to_json(),
        })),
        Err(run_error) => {
            let error = CliError::from(run_error);
            let summary = error
                .summary()
                .map(serde_json::to_value)
                .transpose()?;
            write_error(error.code_str(), error.message(), summary)?;
            Err(error)
        }
    }
}
