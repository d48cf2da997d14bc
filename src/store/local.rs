//! File-backed store client
//!
//! Layout:
//!
//! ```text
//! <data_dir>/<instance>/<database>/<table>.jsonl
//! <data_dir>/<instance>/<database>/access.token   (optional)
//! ```
//!
//! Tables are append-only JSON-lines files. A snapshot pins the byte length
//! of every table when it is opened; reads never look past the pinned
//! length, so rows appended afterwards are invisible to it.
//!
//! Partitions are byte ranges of one table, split on line starts. Their
//! tokens are checksum-sealed JSON.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Lines, Read, Seek, SeekFrom, Take};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::access;
use super::sql::{self, SelectStatement};
use crate::errors::{EngineError, EngineResult};
use crate::observability::{trace_event_with_fields, Event};
use crate::partition::{seal, unseal, ListOptions, Partition, PartitionId};
use crate::snapshot::{ConnectionParams, ReadSnapshot, Row, RowStream, StoreClient};

/// Default partition size
pub const DEFAULT_PARTITION_SIZE_BYTES: u64 = 64 * 1024;

const TABLE_EXTENSION: &str = "jsonl";

/// Upper bound on the partitions planned for one table
pub const MAX_PARTITIONS: u64 = 10_000;

/// Bytes sampled from the head of a table to estimate row width
const ESTIMATE_SAMPLE_BYTES: u64 = 16 * 1024;

/// Client for a directory of JSON-lines databases
#[derive(Debug, Clone)]
pub struct LocalStore {
    data_dir: PathBuf,
}

impl LocalStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory holding one database's tables
    pub fn database_dir(&self, instance_id: &str, database_id: &str) -> PathBuf {
        self.data_dir.join(instance_id).join(database_id)
    }

    /// Create a database directory if missing
    pub fn create_database(&self, instance_id: &str, database_id: &str) -> io::Result<PathBuf> {
        let dir = self.database_dir(instance_id, database_id);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Append rows to a table, creating it if missing
    pub fn append_rows(
        &self,
        instance_id: &str,
        database_id: &str,
        table: &str,
        rows: &[Value],
    ) -> io::Result<()> {
        use std::io::Write;

        let dir = self.create_database(instance_id, database_id)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(table_path(&dir, table))?;
        let mut buf = Vec::new();
        for row in rows {
            serde_json::to_writer(&mut buf, row)?;
            buf.push(b'\n');
        }
        file.write_all(&buf)?;
        file.sync_all()
    }

    /// Require `token` for future connections to a database
    pub fn set_access_token(
        &self,
        instance_id: &str,
        database_id: &str,
        token: &str,
    ) -> io::Result<()> {
        let dir = self.create_database(instance_id, database_id)?;
        access::install(&dir, token)
    }
}

impl StoreClient for LocalStore {
    fn open(&self, params: &ConnectionParams) -> EngineResult<Box<dyn ReadSnapshot>> {
        check_path_component("instance", &params.instance_id)?;
        check_path_component("database", &params.database_id)?;

        let instance_dir = self.data_dir.join(&params.instance_id);
        if !instance_dir.is_dir() {
            return Err(EngineError::connection(format!(
                "instance '{}' not found in {}",
                params.instance_id,
                self.data_dir.display()
            )));
        }
        let root = instance_dir.join(&params.database_id);
        if !root.is_dir() {
            return Err(EngineError::connection(format!(
                "database '{}' not found on instance '{}'",
                params.database_id, params.instance_id
            )));
        }

        access::verify(&root, params.credentials.as_deref())?;
        let tables = pin_tables(&root)?;

        Ok(Box::new(LocalSnapshot {
            id: Uuid::new_v4().to_string(),
            root,
            read_timestamp: Utc::now(),
            tables: RwLock::new(Some(tables)),
        }))
    }
}

/// A pinned read view of one database
struct LocalSnapshot {
    id: String,
    root: PathBuf,
    read_timestamp: DateTime<Utc>,
    /// Table name -> pinned length. `None` once closed.
    tables: RwLock<Option<HashMap<String, u64>>>,
}

/// Token carried by every partition this store plans
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RangeToken {
    snapshot_id: String,
    table: String,
    start: u64,
    end: u64,
    columns: Option<Vec<String>>,
    accelerated: bool,
}

impl LocalSnapshot {
    fn pinned_len(&self, table: &str) -> EngineResult<Option<u64>> {
        let tables = self
            .tables
            .read()
            .map_err(|_| EngineError::connection("snapshot state poisoned"))?;
        match tables.as_ref() {
            Some(tables) => Ok(tables.get(table).copied()),
            None => Err(EngineError::SnapshotClosed(self.id.clone())),
        }
    }

    /// Split `0..len` into line-aligned ranges of about `partition_size_bytes`.
    ///
    /// At most `MAX_PARTITIONS` ranges (or `max_partitions`, if lower) are
    /// planned, and no range is shorter than one line.
    fn plan_ranges(
        &self,
        path: &Path,
        len: u64,
        options: &ListOptions,
    ) -> io::Result<Vec<(u64, u64)>> {
        if len == 0 {
            return Ok(Vec::new());
        }

        let target = options
            .partition_size_bytes
            .unwrap_or(DEFAULT_PARTITION_SIZE_BYTES)
            .max(1);
        let mut count = len.div_ceil(target).min(MAX_PARTITIONS);
        if let Some(max) = options.max_partitions {
            count = count.min(max.max(1) as u64);
        }
        let chunk = len.div_ceil(count);

        let mut file = File::open(path)?;
        let mut ranges = Vec::new();
        let mut start = 0;
        while start < len {
            let end = match start.checked_add(chunk) {
                Some(next) if next < len => next_line_start(&mut file, next, len)?,
                _ => len,
            };
            ranges.push((start, end));
            start = end;
        }
        Ok(ranges)
    }
}

impl ReadSnapshot for LocalSnapshot {
    fn id(&self) -> &str {
        &self.id
    }

    fn read_timestamp(&self) -> DateTime<Utc> {
        self.read_timestamp
    }

    fn list_partitions(&self, sql: &str, options: &ListOptions) -> EngineResult<Vec<Partition>> {
        let SelectStatement { table, columns } = sql::parse(sql)?;
        let len = self
            .pinned_len(&table)?
            .ok_or_else(|| EngineError::query_plan(format!("unknown table: {}", table)))?;

        let path = table_path(&self.root, &table);
        let ranges = self
            .plan_ranges(&path, len, options)
            .map_err(|e| EngineError::connection(format!("cannot plan {}: {}", table, e)))?;
        let row_width = estimate_row_width(&path, len)
            .map_err(|e| EngineError::connection(format!("cannot plan {}: {}", table, e)))?;

        trace_event_with_fields(
            Event::PartitionsPlanned,
            &[
                ("snapshot", &self.id),
                ("table", &table),
                ("pinned_bytes", &len.to_string()),
                ("ranges", &ranges.len().to_string()),
                (
                    "accelerated",
                    if options.use_accelerated_path { "true" } else { "false" },
                ),
            ],
        );

        ranges
            .into_iter()
            .enumerate()
            .map(|(index, (start, end))| {
                let token = RangeToken {
                    snapshot_id: self.id.clone(),
                    table: table.clone(),
                    start,
                    end,
                    columns: columns.clone(),
                    accelerated: options.use_accelerated_path,
                };
                let payload = serde_json::to_vec(&token)
                    .map_err(|e| EngineError::query_plan(format!("cannot encode token: {}", e)))?;
                let index = u32::try_from(index).map_err(|_| {
                    EngineError::query_plan(format!("too many partitions for {}", table))
                })?;
                let mut partition = Partition::new(PartitionId::new(index), seal(&payload))
                    .with_accelerated(options.use_accelerated_path);
                if let Some(width) = row_width {
                    partition = partition.with_estimated_rows((end - start).div_ceil(width));
                }
                Ok(partition)
            })
            .collect()
    }

    fn execute(&self, partition: &Partition) -> EngineResult<RowStream> {
        let id = partition.id;
        let payload = unseal(&partition.token)
            .ok_or_else(|| EngineError::partition(id, "token checksum mismatch"))?;
        let token: RangeToken = serde_json::from_slice(payload)
            .map_err(|e| EngineError::partition(id, format!("malformed token: {}", e)))?;
        if token.snapshot_id != self.id {
            return Err(EngineError::partition(
                id,
                format!("stale token: planned against snapshot {}", token.snapshot_id),
            ));
        }

        let pinned = self
            .pinned_len(&token.table)?
            .ok_or_else(|| EngineError::partition(id, format!("unknown table: {}", token.table)))?;
        if token.start > token.end || token.end > pinned {
            return Err(EngineError::partition(
                id,
                format!("stale token: range {}..{} outside pinned table", token.start, token.end),
            ));
        }

        let path = table_path(&self.root, &token.table);
        let io_err = |e: io::Error| EngineError::partition(id, format!("{}: {}", token.table, e));
        let mut file = File::open(&path).map_err(io_err)?;
        if file.metadata().map_err(io_err)?.len() < token.end {
            return Err(EngineError::partition(
                id,
                format!("stale token: {} truncated since snapshot", token.table),
            ));
        }
        file.seek(SeekFrom::Start(token.start)).map_err(io_err)?;

        Ok(Box::new(RangeRows {
            partition_id: id,
            lines: BufReader::new(file.take(token.end - token.start)).lines(),
            columns: token.columns,
            line: 0,
        }))
    }

    fn close(&self) -> EngineResult<()> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| EngineError::connection("snapshot state poisoned"))?;
        *tables = None;
        Ok(())
    }
}

/// Lazy row reader over one byte range
struct RangeRows {
    partition_id: PartitionId,
    lines: Lines<BufReader<Take<File>>>,
    columns: Option<Vec<String>>,
    line: u64,
}

impl Iterator for RangeRows {
    type Item = EngineResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(EngineError::partition(self.partition_id, e.to_string()))),
            };
            self.line += 1;
            if line.trim().is_empty() {
                continue;
            }

            let row = serde_json::from_str::<Value>(&line)
                .map_err(|e| e.to_string())
                .and_then(|value| Row::from_value(value).map_err(|e| e.to_string()))
                .map(|row| project(row, self.columns.as_deref()))
                .map_err(|cause| {
                    EngineError::partition(
                        self.partition_id,
                        format!("line {} of range: {}", self.line, cause),
                    )
                });
            return Some(row);
        }
    }
}

fn project(row: Row, columns: Option<&[String]>) -> Row {
    match columns {
        None => row,
        Some(columns) => Row::new(
            columns
                .iter()
                .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
                .collect(),
        ),
    }
}

fn table_path(root: &Path, table: &str) -> PathBuf {
    root.join(format!("{}.{}", table, TABLE_EXTENSION))
}

fn check_path_component(kind: &str, value: &str) -> EngineResult<()> {
    if value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\'])
    {
        return Err(EngineError::invalid_config(format!(
            "invalid {} id: '{}'",
            kind, value
        )));
    }
    Ok(())
}

/// Pin the current length of every table in `root`
fn pin_tables(root: &Path) -> EngineResult<HashMap<String, u64>> {
    let read_err = |e: io::Error| {
        EngineError::connection(format!("cannot read {}: {}", root.display(), e))
    };

    let mut tables = HashMap::new();
    for entry in fs::read_dir(root).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(TABLE_EXTENSION) {
            continue;
        }
        if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
            let len = fs::metadata(&path).map_err(read_err)?.len();
            tables.insert(name.to_string(), len);
        }
    }
    Ok(tables)
}

/// First line start at or after `offset`, capped at `len`
fn next_line_start(file: &mut File, offset: u64, len: u64) -> io::Result<u64> {
    if offset == 0 || offset >= len {
        return Ok(offset.min(len));
    }

    // A line starts at `offset` iff the byte before it is a newline
    file.seek(SeekFrom::Start(offset - 1))?;
    let mut reader = BufReader::new(&mut *file).take(len - (offset - 1));
    let mut skipped = Vec::new();
    let read = reader.read_until(b'\n', &mut skipped)? as u64;
    Ok((offset - 1 + read).min(len))
}

/// Average bytes per row from the head of the table
fn estimate_row_width(path: &Path, len: u64) -> io::Result<Option<u64>> {
    if len == 0 {
        return Ok(None);
    }
    let mut sample = Vec::new();
    File::open(path)?
        .take(ESTIMATE_SAMPLE_BYTES.min(len))
        .read_to_end(&mut sample)?;
    let lines = sample.iter().filter(|b| **b == b'\n').count() as u64;
    if lines == 0 {
        return Ok(None);
    }
    Ok(Some((sample.len() as u64 / lines).max(1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn store_with_users(count: usize) -> (TempDir, LocalStore) {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        let rows: Vec<Value> = (0..count)
            .map(|i| json!({"id": i, "email": format!("user{}@example.com", i)}))
            .collect();
        store.append_rows("inst", "db", "users", &rows).unwrap();
        (dir, store)
    }

    fn open(store: &LocalStore) -> Box<dyn ReadSnapshot> {
        store.open(&ConnectionParams::new("inst", "db")).unwrap()
    }

    fn read_all(snapshot: &dyn ReadSnapshot, partitions: &[Partition]) -> Vec<Row> {
        partitions
            .iter()
            .flat_map(|p| snapshot.execute(p).unwrap())
            .map(|r| r.unwrap())
            .collect()
    }

    fn ids(rows: &[Row]) -> Vec<u64> {
        let mut ids: Vec<u64> = rows.iter().map(|r| r.get("id").unwrap().as_u64().unwrap()).collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn test_missing_instance_and_database() {
        let (_dir, store) = store_with_users(1);

        let err = store.open(&ConnectionParams::new("nope", "db")).err().unwrap();
        assert!(matches!(err, EngineError::Connection(_)));

        let err = store.open(&ConnectionParams::new("inst", "nope")).err().unwrap();
        assert!(matches!(err, EngineError::Connection(_)));
    }

    #[test]
    fn test_path_escape_rejected() {
        let (_dir, store) = store_with_users(1);
        let err = store.open(&ConnectionParams::new("inst", "..")).err().unwrap();
        assert!(matches!(err, EngineError::InvalidConfig(_)));
    }

    #[test]
    fn test_access_token_required() {
        let (_dir, store) = store_with_users(1);
        store.set_access_token("inst", "db", "s3cret").unwrap();

        let err = store.open(&ConnectionParams::new("inst", "db")).err().unwrap();
        assert!(matches!(err, EngineError::Auth(_)));

        let params = ConnectionParams::new("inst", "db").with_credentials("s3cret");
        assert!(store.open(&params).is_ok());
    }

    #[test]
    fn test_partitions_cover_table_exactly_once() {
        let (_dir, store) = store_with_users(500);
        let snapshot = open(&store);
        let options = ListOptions {
            partition_size_bytes: Some(1000),
            ..ListOptions::default()
        };

        let partitions = snapshot.list_partitions("SELECT * FROM users", &options).unwrap();
        assert!(partitions.len() > 1);
        for (i, p) in partitions.iter().enumerate() {
            assert_eq!(p.id, PartitionId::new(i as u32));
            assert!(p.estimated_rows.is_some());
        }

        let rows = read_all(&*snapshot, &partitions);
        assert_eq!(ids(&rows), (0..500).collect::<Vec<u64>>());
    }

    #[test]
    fn test_max_partitions_caps_split() {
        let (_dir, store) = store_with_users(200);
        let snapshot = open(&store);
        let options = ListOptions {
            partition_size_bytes: Some(10),
            max_partitions: Some(4),
            ..ListOptions::default()
        };

        let partitions = snapshot.list_partitions("SELECT id FROM users", &options).unwrap();
        assert!(partitions.len() <= 4);
        assert_eq!(read_all(&*snapshot, &partitions).len(), 200);
    }

    #[test]
    fn test_one_byte_partitions_split_per_line() {
        let (_dir, store) = store_with_users(50);
        let snapshot = open(&store);
        let options = ListOptions {
            partition_size_bytes: Some(1),
            ..ListOptions::default()
        };

        let partitions = snapshot.list_partitions("SELECT * FROM users", &options).unwrap();
        assert_eq!(partitions.len(), 50);
        assert_eq!(ids(&read_all(&*snapshot, &partitions)), (0..50).collect::<Vec<u64>>());
    }

    #[test]
    fn test_partition_count_is_capped() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        let rows: Vec<Value> = (0..25_000).map(|i| json!({ "id": i })).collect();
        store.append_rows("inst", "db", "users", &rows).unwrap();

        let snapshot = open(&store);
        let options = ListOptions {
            partition_size_bytes: Some(1),
            ..ListOptions::default()
        };

        let partitions = snapshot.list_partitions("SELECT * FROM users", &options).unwrap();
        assert!(partitions.len() as u64 <= MAX_PARTITIONS);
        assert!(partitions.len() > 1);
        assert_eq!(read_all(&*snapshot, &partitions).len(), 25_000);
    }

    #[test]
    fn test_empty_table_yields_no_partitions() {
        let (_dir, store) = store_with_users(0);
        let snapshot = open(&store);
        let partitions = snapshot
            .list_partitions("SELECT * FROM users", &ListOptions::default())
            .unwrap();
        assert!(partitions.is_empty());
    }

    #[test]
    fn test_unknown_table_and_bad_sql() {
        let (_dir, store) = store_with_users(1);
        let snapshot = open(&store);
        let options = ListOptions::default();

        assert!(matches!(
            snapshot.list_partitions("SELECT * FROM orders", &options),
            Err(EngineError::QueryPlan(_))
        ));
        assert!(matches!(
            snapshot.list_partitions("UPDATE users SET id = 1", &options),
            Err(EngineError::QueryPlan(_))
        ));
    }

    #[test]
    fn test_projection_fills_missing_columns() {
        let (_dir, store) = store_with_users(3);
        let snapshot = open(&store);
        let partitions = snapshot
            .list_partitions("SELECT email, phone FROM users", &ListOptions::default())
            .unwrap();

        let rows = read_all(&*snapshot, &partitions);
        assert_eq!(rows.len(), 3);
        for row in &rows {
            assert_eq!(row.len(), 2);
            assert!(row.get("email").unwrap().is_string());
            assert_eq!(row.get("phone"), Some(&Value::Null));
            assert!(row.get("id").is_none());
        }
    }

    #[test]
    fn test_rows_appended_after_open_are_invisible() {
        let (_dir, store) = store_with_users(10);
        let snapshot = open(&store);
        store
            .append_rows("inst", "db", "users", &[json!({"id": 99})])
            .unwrap();

        let partitions = snapshot
            .list_partitions("SELECT * FROM users", &ListOptions::default())
            .unwrap();
        assert_eq!(read_all(&*snapshot, &partitions).len(), 10);
    }

    #[test]
    fn test_malformed_line_fails_partition() {
        let (dir, store) = store_with_users(2);
        let path = store.database_dir("inst", "db").join("users.jsonl");
        let mut contents = fs::read_to_string(&path).unwrap();
        contents.push_str("{not json\n");
        fs::write(&path, contents).unwrap();

        let snapshot = open(&store);
        let partitions = snapshot
            .list_partitions("SELECT * FROM users", &ListOptions::default())
            .unwrap();
        let results: Vec<_> = snapshot.execute(&partitions[0]).unwrap().collect();
        assert!(results[0].is_ok());
        assert!(matches!(
            results.last().unwrap(),
            Err(EngineError::PartitionExecution { .. })
        ));
        drop(dir);
    }

    #[test]
    fn test_token_from_other_snapshot_is_stale() {
        let (_dir, store) = store_with_users(5);
        let first = open(&store);
        let second = open(&store);
        let partitions = first
            .list_partitions("SELECT * FROM users", &ListOptions::default())
            .unwrap();

        match second.execute(&partitions[0]) {
            Err(EngineError::PartitionExecution { cause, .. }) => assert!(cause.contains("stale")),
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("stale token accepted"),
        }
    }

    #[test]
    fn test_corrupted_token_fails_partition() {
        let (_dir, store) = store_with_users(5);
        let snapshot = open(&store);
        let mut partitions = snapshot
            .list_partitions("SELECT * FROM users", &ListOptions::default())
            .unwrap();
        let last = partitions[0].token.len() - 3;
        partitions[0].token[last] ^= 0x01;

        match snapshot.execute(&partitions[0]) {
            Err(EngineError::PartitionExecution { cause, .. }) => {
                assert!(cause.contains("checksum"))
            }
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("corrupted token accepted"),
        }
    }

    #[test]
    fn test_truncated_table_is_stale() {
        let (_dir, store) = store_with_users(5);
        let snapshot = open(&store);
        let partitions = snapshot
            .list_partitions("SELECT * FROM users", &ListOptions::default())
            .unwrap();
        fs::write(store.database_dir("inst", "db").join("users.jsonl"), b"").unwrap();

        assert!(matches!(
            snapshot.execute(&partitions[0]),
            Err(EngineError::PartitionExecution { .. })
        ));
    }

    #[test]
    fn test_close_releases_pinned_state() {
        let (_dir, store) = store_with_users(5);
        let snapshot = open(&store);
        snapshot.close().unwrap();
        snapshot.close().unwrap();

        assert!(matches!(
            snapshot.list_partitions("SELECT * FROM users", &ListOptions::default()),
            Err(EngineError::SnapshotClosed(_))
        ));
    }

    #[test]
    fn test_accelerated_flag_carried() {
        let (_dir, store) = store_with_users(5);
        let snapshot = open(&store);
        let partitions = snapshot
            .list_partitions("SELECT * FROM users", &ListOptions::accelerated())
            .unwrap();
        assert!(partitions.iter().all(|p| p.accelerated));
    }

    #[test]
    fn test_next_line_start() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.jsonl");
        fs::write(&path, b"aaa\nbb\nc\n").unwrap();
        let mut file = File::open(&path).unwrap();

        assert_eq!(next_line_start(&mut file, 0, 9).unwrap(), 0);
        assert_eq!(next_line_start(&mut file, 1, 9).unwrap(), 4);
        assert_eq!(next_line_start(&mut file, 4, 9).unwrap(), 4);
        assert_eq!(next_line_start(&mut file, 5, 9).unwrap(), 7);
        assert_eq!(next_line_start(&mut file, 8, 9).unwrap(), 9);
    }
}
