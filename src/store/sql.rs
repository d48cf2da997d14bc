//! Statement recognition for the local store
//!
//! Only two shapes are accepted:
//!
//! ```text
//! SELECT * FROM <table>
//! SELECT <col>[, <col>...] FROM <table>
//! ```
//!
//! Keywords are case-insensitive; a trailing `;` is allowed.

use std::sync::OnceLock;

use regex::Regex;

use crate::errors::{EngineError, EngineResult};

static SELECT: OnceLock<Regex> = OnceLock::new();
static IDENTIFIER: OnceLock<Regex> = OnceLock::new();

fn select_pattern() -> &'static Regex {
    SELECT.get_or_init(|| {
        Regex::new(r"(?is)^\s*SELECT\s+(?P<projection>.+?)\s+FROM\s+(?P<table>[^\s;]+)\s*;?\s*$")
            .expect("static pattern")
    })
}

fn identifier_pattern() -> &'static Regex {
    IDENTIFIER.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static pattern"))
}

/// A recognized statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectStatement {
    pub table: String,
    /// `None` for `*`
    pub columns: Option<Vec<String>>,
}

/// Recognize `sql`, or fail with `QueryPlan`
pub fn parse(sql: &str) -> EngineResult<SelectStatement> {
    let captures = select_pattern().captures(sql).ok_or_else(|| {
        EngineError::query_plan(format!("unsupported statement: {}", sql.trim()))
    })?;

    let table = &captures["table"];
    if !identifier_pattern().is_match(table) {
        return Err(EngineError::query_plan(format!("invalid table name: {}", table)));
    }

    let projection = captures["projection"].trim();
    let columns = if projection == "*" {
        None
    } else {
        let columns = projection
            .split(',')
            .map(|c| c.trim())
            .map(|c| {
                if identifier_pattern().is_match(c) {
                    Ok(c.to_string())
                } else {
                    Err(EngineError::query_plan(format!("invalid column: '{}'", c)))
                }
            })
            .collect::<EngineResult<Vec<_>>>()?;
        Some(columns)
    };

    Ok(SelectStatement {
        table: table.to_string(),
        columns,
    })
}
