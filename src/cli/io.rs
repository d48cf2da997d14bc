//! JSON output for the CLI
//!
//! - One JSON object per line on stdout
//! - `{"status":"ok","data":...}` on success
//! - `{"status":"error","code":...,"message":...}` on failure
//! - UTF-8 only

use std::io::{self, Write};

use serde_json::{json, Value};

use super::errors::CliResult;
use crate::errors::{EngineError, EngineResult};
use crate::partition::{PartitionId, RowSink};
use crate::snapshot::Row;

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    write_value(&json!({
        "status": "ok",
        "data": data
    }))
}

/// Write an error response to stdout, with the partial summary if any
pub fn write_error(code: &str, message: &str, summary: Option<Value>) -> CliResult<()> {
    let mut response = json!({
        "status": "error",
        "code": code,
        "message": message
    });
    if let Some(summary) = summary {
        response["data"] = summary;
    }
    write_value(&response)
}

fn write_value(value: &Value) -> CliResult<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, value)?;
    writeln!(stdout)?;
    stdout.flush()?;

    Ok(())
}

/// Row sink printing `{"partition":"p0","row":{...}}` lines to stdout
#[derive(Debug, Default)]
pub struct RowPrinter;

impl RowSink for RowPrinter {
    fn accept(&self, partition_id: PartitionId, row: &Row) -> EngineResult<()> {
        let line = json!({
            "partition": partition_id.to_string(),
            "row": row,
        });
        let mut stdout = io::stdout().lock();
        serde_json::to_writer(&mut stdout, &line)
            .map_err(io::Error::from)
            .and_then(|_| writeln!(stdout))
            .map_err(|e| EngineError::partition(partition_id, format!("stdout: {}", e)))
    }
}
