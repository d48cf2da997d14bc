//! Per-run options

use std::time::Duration;

use crate::errors::EngineResult;
use crate::partition::ListOptions;
use crate::pool::PoolConfig;

/// Default whole-run deadline: one hour
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3600);

/// Options for one query run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Concurrent partitions; `None` picks a value from available parallelism
    pub max_workers: Option<usize>,

    /// Deadline for the whole run; `None` waits indefinitely
    pub timeout: Option<Duration>,

    /// Abort the run on the first failed partition
    pub fail_fast: bool,

    /// Planner options
    pub list: ListOptions,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_workers: None,
            timeout: Some(DEFAULT_TIMEOUT),
            fail_fast: false,
            list: ListOptions::default(),
        }
    }
}

impl RunOptions {
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = Some(max_workers);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn with_list_options(mut self, list: ListOptions) -> Self {
        self.list = list;
        self
    }

    /// Resolve into a validated pool configuration
    pub fn pool_config(&self) -> EngineResult<PoolConfig> {
        let config = PoolConfig {
            max_workers: self
                .max_workers
                .unwrap_or_else(PoolConfig::default_max_workers),
            fail_fast: self.fail_fast,
            timeout: self.timeout,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = RunOptions::default();
        assert_eq!(options.timeout, Some(DEFAULT_TIMEOUT));
        assert!(!options.fail_fast);
        assert!(!options.list.use_accelerated_path);

        let config = options.pool_config().unwrap();
        assert!(config.max_workers >= 1);
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(RunOptions::default().with_max_workers(0).pool_config().is_err());
    }
}
