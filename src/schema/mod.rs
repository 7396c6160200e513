//! The schema data model (SPEC_FULL.md §3) and the TTL-bounded cache built
//! on top of it (§4.5).

mod cache;

pub use cache::{CacheHandle, SchemaCache, SchemaProvider};

use serde::Serialize;

use crate::dialect::LogicalType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Table,
    View,
    MaterializedView,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub kind: TableKind,
    /// Engine-native estimate, never `COUNT(*)`.
    pub row_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub logical_type: LogicalType,
    pub nullable: bool,
    pub pk: bool,
    /// `"reftable.refcol"` when this column is a foreign key.
    pub fk: Option<String>,
    pub default: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForeignKey {
    pub column: String,
    pub ref_table: String,
    pub ref_column: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableDetail {
    pub name: String,
    pub schema: String,
    pub columns: Vec<ColumnInfo>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
    pub indexes: Vec<String>,
    pub row_count: i64,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    In,
    Out,
    InOut,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcedureParam {
    pub name: String,
    pub logical_type: LogicalType,
    pub direction: Direction,
    pub default: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcedureKind {
    Procedure,
    Function,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcedureDetail {
    pub name: String,
    pub kind: ProcedureKind,
    pub parameters: Vec<ProcedureParam>,
    pub returns: Option<LogicalType>,
}
