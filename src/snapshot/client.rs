//! Backing store client boundary
//!
//! These four calls are the whole contract the engine needs from a store:
//! open a read-only snapshot, list partitions, execute a partition, close.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{EngineError, EngineResult};
use crate::partition::{ListOptions, Partition};

/// One result row: column name to value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(Map<String, Value>);

impl Row {
    pub fn new(columns: Map<String, Value>) -> Self {
        Self(columns)
    }

    /// Build a row from a JSON object
    pub fn from_value(value: Value) -> EngineResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(EngineError::query_plan(format!(
                "row must be a JSON object, got {}",
                other
            ))),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn columns(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Lazy row stream for one partition
pub type RowStream = Box<dyn Iterator<Item = EngineResult<Row>> + Send>;

/// Explicit connection parameters passed to `open`.
///
/// Replaces process-wide client state.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Target store instance
    pub instance_id: String,

    /// Target database within the instance
    pub database_id: String,

    /// Credential presented to the store
    #[serde(default)]
    pub credentials: Option<String>,
}

impl ConnectionParams {
    pub fn new(instance_id: impl Into<String>, database_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            database_id: database_id.into(),
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, credentials: impl Into<String>) -> Self {
        self.credentials = Some(credentials.into());
        self
    }

    /// Reject empty identifiers before touching the store
    pub fn validate(&self) -> EngineResult<()> {
        if self.instance_id.trim().is_empty() {
            return Err(EngineError::invalid_config("instance_id must not be empty"));
        }
        if self.database_id.trim().is_empty() {
            return Err(EngineError::invalid_config("database_id must not be empty"));
        }
        Ok(())
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("instance_id", &self.instance_id)
            .field("database_id", &self.database_id)
            .field("credentials", &self.credentials.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A read-only snapshot created by a store client.
///
/// Must tolerate concurrent `execute` calls from many worker threads.
pub trait ReadSnapshot: Send + Sync {
    /// Store-assigned snapshot identifier
    fn id(&self) -> &str;

    /// Point in time the snapshot reads at
    fn read_timestamp(&self) -> DateTime<Utc>;

    /// Plan the partitions of a query
    fn list_partitions(&self, sql: &str, options: &ListOptions) -> EngineResult<Vec<Partition>>;

    /// Stream the rows of one partition
    fn execute(&self, partition: &Partition) -> EngineResult<RowStream>;

    /// Release server-side and local resources
    fn close(&self) -> EngineResult<()>;
}

/// Entry point into a backing store
pub trait StoreClient: Send + Sync {
    /// Open a read-only snapshot.
    ///
    /// Fails with `Connection` when the store is unreachable and `Auth` when
    /// the credentials are rejected.
    fn open(&self, params: &ConnectionParams) -> EngineResult<Box<dyn ReadSnapshot>>;
}
