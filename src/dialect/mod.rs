//! The dialect capability set: one trait, six implementations.
//!
//! Modeled on the teacher's `SqlxBackend` trait (`catalog/sqlx_manager.rs`):
//! default method bodies where engines agree, overrides where they diverge.
//! The Tool Generator and Query Engine depend on `&dyn Dialect` only.

mod mssql;
mod mysql;
mod oracle;
mod postgres;
mod snowflake;
mod sqlite;

pub use mssql::MssqlDialect;
pub use mysql::MysqlDialect;
pub use oracle::OracleDialect;
pub use postgres::PostgresDialect;
pub use snowflake::SnowflakeDialect;
pub use sqlite::SqliteDialect;

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::value::Value;

/// The closed logical type enum every native column type maps into.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalType {
    String,
    Integer,
    Decimal,
    Boolean,
    Datetime,
    Binary,
    Json,
    /// A PostgreSQL array of the element type. No other dialect produces this.
    Array(Box<LogicalType>),
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalType::String => write!(f, "string"),
            LogicalType::Integer => write!(f, "integer"),
            LogicalType::Decimal => write!(f, "decimal"),
            LogicalType::Boolean => write!(f, "boolean"),
            LogicalType::Datetime => write!(f, "datetime"),
            LogicalType::Binary => write!(f, "binary"),
            LogicalType::Json => write!(f, "json"),
            LogicalType::Array(inner) => write!(f, "{inner}[]"),
        }
    }
}

/// One row destined for INSERT. Sparse across rows; `BTreeMap` gives us the
/// ASCII-ascending key order the determinism rules require for free.
pub type Row = BTreeMap<String, Value>;

/// A single column in a SET clause.
pub type Assignment = (String, Value);

/// Direction of a stored-procedure/function parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    InOut,
}

/// One procedure call argument.
#[derive(Debug, Clone)]
pub struct ProcParam {
    pub name: String,
    pub value: Value,
    pub direction: Direction,
}

/// Everything `build_select` needs. `filter_fragment` is already rendered
/// (placeholders already assigned starting at 1) by the filter parser;
/// `filter_param_count` tells the dialect where its own pagination
/// placeholders must start numbering from.
pub struct SelectSpec<'a> {
    pub table: &'a str,
    pub columns: &'a [String],
    pub filter_fragment: Option<&'a str>,
    pub filter_param_count: usize,
    pub order_by: Option<&'a str>,
    pub limit: i64,
    pub offset: i64,
}

/// The SQL-rendering capability set for one database engine.
///
/// All trait methods are pure string-building; none of them touch I/O.
/// `quote_ident` and the `build_*` methods must never interpolate a value
/// that could carry attacker-controlled SQL — only `Value`s flow through
/// placeholders.
pub trait Dialect: Send + Sync {
    /// Stable, lowercase driver tag used in `DatabaseError{driver,..}`.
    fn name(&self) -> &'static str;

    /// Quote one dot-separated identifier segment (never the whole dotted
    /// path — callers quote each segment independently so `schema.table`
    /// round-trips).
    fn quote_segment(&self, segment: &str) -> String;

    /// The concrete placeholder text for the 1-based position `i`.
    fn placeholder(&self, i: usize) -> String;

    /// Quote a (possibly schema-qualified) identifier by quoting each
    /// dot-separated segment independently.
    fn quote_ident(&self, ident: &str) -> String {
        ident
            .split('.')
            .map(|seg| self.quote_segment(seg))
            .collect::<Vec<_>>()
            .join(".")
    }

    fn map_native_type(&self, native: &str) -> LogicalType;

    /// Whether a single `build_insert` call can render more than one row.
    fn supports_multi_row_insert(&self) -> bool {
        true
    }

    fn build_select(&self, spec: &SelectSpec) -> (String, Vec<Value>);

    /// Render an INSERT. `rows` must be non-empty; if
    /// `supports_multi_row_insert()` is false the caller must pass exactly
    /// one row. Column list is the ASCII-sorted union of keys across rows;
    /// rows missing a column emit `DEFAULT`.
    fn build_insert(&self, table: &str, rows: &[Row]) -> (String, Vec<Value>);

    /// Render an UPDATE. `filter_fragment` must be non-empty — the
    /// Connector layer is responsible for rejecting an empty filter before
    /// calling this (see SPEC_FULL.md §4.3, UPDATE/DELETE safety).
    fn build_update(
        &self,
        table: &str,
        assignments: &[Assignment],
        filter_fragment: &str,
        filter_params: &[Value],
    ) -> (String, Vec<Value>);

    /// Render a DELETE. Same non-empty-filter contract as `build_update`.
    fn build_delete(
        &self,
        table: &str,
        filter_fragment: &str,
        filter_params: &[Value],
    ) -> (String, Vec<Value>);

    /// Render a stored procedure/function call. Parameters are sorted by
    /// name before rendering (determinism rule, SPEC_FULL.md §4.3).
    /// `Err` when the engine has no callable-routine concept (sqlite).
    fn build_call(
        &self,
        name: &str,
        params: &[ProcParam],
    ) -> Result<(String, Vec<Value>), UnsupportedOperation>;
}

/// Returned when a dialect is asked to render something its engine has no
/// concept of (e.g. a stored-procedure call against sqlite).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{operation} is not supported by the {dialect} dialect")]
pub struct UnsupportedOperation {
    pub dialect: &'static str,
    pub operation: &'static str,
}

/// Render the quoted, comma-separated column list, or the literal `*` when
/// `columns` is empty.
pub(crate) fn render_columns(dialect: &dyn Dialect, columns: &[String]) -> String {
    if columns.is_empty() {
        "*".to_string()
    } else {
        columns
            .iter()
            .map(|c| dialect.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Sort procedure parameters by name, matching the determinism rule that
/// applies to every dialect's `build_call`.
pub(crate) fn sorted_params(params: &[ProcParam]) -> Vec<&ProcParam> {
    let mut sorted: Vec<&ProcParam> = params.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    sorted
}

/// Renumber every `<prefix><digits>` placeholder occurrence in `fragment`
/// so that placeholder `N` becomes `<prefix>(start + N - 1)`. Used when a
/// filter fragment (placeholders assigned starting at 1 by the parser) is
/// spliced into a statement whose earlier clause already claimed the low
/// placeholder numbers (e.g. an UPDATE's SET list).
pub(crate) fn renumber_placeholders(fragment: &str, prefix: &str, start: usize) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut i = 0;
    while i < fragment.len() {
        if fragment[i..].starts_with(prefix) {
            let digit_start = i + prefix.len();
            let mut j = digit_start;
            while j < fragment.len() && fragment.as_bytes()[j].is_ascii_digit() {
                j += 1;
            }
            if j > digit_start {
                let n: usize = fragment[digit_start..j].parse().unwrap_or(0);
                out.push_str(prefix);
                out.push_str(&(start + n - 1).to_string());
                i = j;
                continue;
            }
        }
        let ch = fragment[i..].chars().next().expect("non-empty slice");
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

/// Union of row keys across all rows, ASCII-ascending (`BTreeSet` gives
/// this for free).
pub(crate) fn union_columns(rows: &[Row]) -> Vec<String> {
    let mut set = std::collections::BTreeSet::new();
    for row in rows {
        for key in row.keys() {
            set.insert(key.clone());
        }
    }
    set.into_iter().collect()
}

/// Construct the dialect implementation for a normalized DSN scheme.
/// Unknown schemes are rejected at startup (SPEC_FULL.md §6).
pub fn dialect_for_scheme(scheme: &str) -> Option<Box<dyn Dialect>> {
    match scheme {
        "postgres" | "postgresql" => Some(Box::new(PostgresDialect)),
        "mysql" => Some(Box::new(MysqlDialect)),
        "sqlserver" | "mssql" => Some(Box::new(MssqlDialect)),
        "oracle" => Some(Box::new(OracleDialect)),
        "snowflake" => Some(Box::new(SnowflakeDialect)),
        "sqlite" | "sqlite3" => Some(Box::new(SqliteDialect)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_scheme_rejected() {
        assert!(dialect_for_scheme("redis").is_none());
    }

    #[test]
    fn union_columns_is_sorted_ascending() {
        let mut row1 = Row::new();
        row1.insert("email".into(), Value::Text("a@b".into()));
        row1.insert("name".into(), Value::Text("A".into()));
        let mut row2 = Row::new();
        row2.insert("email".into(), Value::Text("c@d".into()));
        assert_eq!(union_columns(&[row1, row2]), vec!["email", "name"]);
    }
}
