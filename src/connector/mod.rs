//! The Connector capability set (SPEC_FULL.md §4.4, §6): lifecycle,
//! introspection, and CRUD/call operations against one live database. One
//! implementation per dialect; the Query Engine depends on `&dyn Connector`
//! only, mirroring the way the teacher's `CatalogManager` trait hides
//! postgres/sqlite behind one interface (`catalog/sqlx_manager.rs`).

mod mssql;
mod mysql;
mod oracle;
mod postgres;
mod snowflake;
mod sqlite;

pub use mssql::MssqlConnector;
pub use mysql::MysqlConnector;
pub use oracle::OracleConnector;
pub use postgres::PostgresConnector;
pub use snowflake::SnowflakeConnector;
pub use sqlite::SqliteConnector;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

use crate::dialect::{Assignment, ProcParam, Row};
use crate::schema::{ProcedureDetail, TableDetail, TableSummary};
use crate::value::Value;

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("{driver}: {msg}")]
    Database { driver: &'static str, msg: String },
    #[error("read-only connection: writes are disabled")]
    ReadOnly,
    #[error("{entity} not found")]
    NotFound { entity: String },
    #[error("operation timed out")]
    Timeout,
    #[error("unsafe write rejected: {0}")]
    UnsafeWrite(String),
    #[error("{0}")]
    Dialect(#[from] crate::dialect::UnsupportedOperation),
}

impl ConnectorError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConnectorError::Timeout)
    }
}

/// A deadline threaded explicitly through Engine → Connector calls rather
/// than relying on thread-local/ambient cancellation state.
#[derive(Debug, Clone, Copy)]
pub struct Deadline(pub Instant);

impl Deadline {
    pub fn from_timeout(timeout: Duration) -> Self {
        Deadline(Instant::now() + timeout)
    }

    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<BTreeMap<String, Value>>,
    pub total: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MutationResult {
    pub rows_affected: u64,
    pub returning: Option<BTreeMap<String, Value>>,
}

pub struct SelectRequest<'a> {
    pub table: &'a str,
    pub columns: &'a [String],
    pub filter_fragment: Option<&'a str>,
    pub filter_params: &'a [Value],
    pub order_by: Option<&'a str>,
    pub limit: i64,
    pub offset: i64,
}

pub struct UpdateRequest<'a> {
    pub table: &'a str,
    pub assignments: &'a [Assignment],
    pub filter_fragment: &'a str,
    pub filter_params: &'a [Value],
}

pub struct DeleteRequest<'a> {
    pub table: &'a str,
    pub filter_fragment: &'a str,
    pub filter_params: &'a [Value],
}

pub struct CallRequest<'a> {
    pub name: &'a str,
    pub params: &'a [ProcParam],
}

#[async_trait]
pub trait Connector: Send + Sync {
    fn driver_name(&self) -> &'static str;
    fn quote_identifier(&self, ident: &str) -> String;
    fn parameter_placeholder(&self, i: usize) -> String;
    fn read_only(&self) -> bool;

    async fn ping(&self, deadline: Deadline) -> Result<(), ConnectorError>;

    async fn list_tables(&self, deadline: Deadline) -> Result<Vec<TableSummary>, ConnectorError>;
    async fn describe_table(
        &self,
        name: &str,
        deadline: Deadline,
    ) -> Result<TableDetail, ConnectorError>;
    async fn list_procedures(
        &self,
        deadline: Deadline,
    ) -> Result<Vec<ProcedureDetail>, ConnectorError>;
    async fn describe_procedure(
        &self,
        name: &str,
        deadline: Deadline,
    ) -> Result<ProcedureDetail, ConnectorError>;

    async fn select(
        &self,
        req: SelectRequest<'_>,
        deadline: Deadline,
    ) -> Result<ResultSet, ConnectorError>;
    async fn insert(
        &self,
        table: &str,
        rows: &[Row],
        deadline: Deadline,
    ) -> Result<MutationResult, ConnectorError>;
    async fn update(
        &self,
        req: UpdateRequest<'_>,
        deadline: Deadline,
    ) -> Result<MutationResult, ConnectorError>;
    async fn delete(
        &self,
        req: DeleteRequest<'_>,
        deadline: Deadline,
    ) -> Result<MutationResult, ConnectorError>;
    async fn call(
        &self,
        req: CallRequest<'_>,
        deadline: Deadline,
    ) -> Result<ResultSet, ConnectorError>;

    /// Run a raw, caller-supplied statement with no dialect rendering in
    /// front of it (DESIGN.md Open Question (b): a dedicated method with an
    /// explicit `is_write` flag, not the source's `__exec__:` table-prefix
    /// hack). `is_write` gates the read-only guard; the Tier 1 `raw_sql`/
    /// `execute_sql` tools are the only callers, and `raw_sql` is additionally
    /// restricted to SELECT/WITH/EXPLAIN/SHOW before it ever reaches here.
    async fn execute_raw(
        &self,
        sql: &str,
        is_write: bool,
        deadline: Deadline,
    ) -> Result<ResultSet, ConnectorError>;
}

pub(crate) fn guard_writes(read_only: bool) -> Result<(), ConnectorError> {
    if read_only {
        Err(ConnectorError::ReadOnly)
    } else {
        Ok(())
    }
}

/// Second line of defense against an unfiltered UPDATE/DELETE, independent
/// of the Query Engine's own empty-filter check: every connector calls this
/// itself so a caller that reaches `update`/`delete` through any other path
/// still can't issue a full-table write.
pub(crate) fn guard_nonempty_filter(filter_fragment: &str) -> Result<(), ConnectorError> {
    if filter_fragment.trim().is_empty() {
        Err(ConnectorError::UnsafeWrite(
            "UPDATE/DELETE requires a non-empty filter fragment".to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Adapts a live `Connector` to the Schema Cache's narrower
/// [`crate::schema::SchemaProvider`] surface, fixing the deadline each
/// introspection call gets since the cache's trait has none of its own.
pub struct ConnectorSchemaProvider {
    connector: std::sync::Arc<dyn Connector>,
    timeout: Duration,
}

impl ConnectorSchemaProvider {
    pub fn new(connector: std::sync::Arc<dyn Connector>, timeout: Duration) -> Self {
        ConnectorSchemaProvider { connector, timeout }
    }
}

#[async_trait]
impl crate::schema::SchemaProvider for ConnectorSchemaProvider {
    async fn list_tables(&self) -> anyhow::Result<Vec<TableSummary>> {
        let deadline = Deadline::from_timeout(self.timeout);
        Ok(self.connector.list_tables(deadline).await?)
    }

    async fn describe_table(&self, name: &str) -> anyhow::Result<TableDetail> {
        let deadline = Deadline::from_timeout(self.timeout);
        Ok(self.connector.describe_table(name, deadline).await?)
    }
}

/// Build the scheme-normalized connector for one DSN. Unknown schemes fail
/// startup (SPEC_FULL.md §6).
pub async fn open(dsn: &str, read_only: bool) -> Result<Box<dyn Connector>, ConnectorError> {
    let url = url::Url::parse(dsn).map_err(|e| ConnectorError::Database {
        driver: "dsn",
        msg: e.to_string(),
    })?;
    match url.scheme() {
        "postgres" | "postgresql" => Ok(Box::new(PostgresConnector::open(dsn, read_only).await?)),
        "mysql" => Ok(Box::new(MysqlConnector::open(dsn, read_only).await?)),
        "sqlserver" | "mssql" => Ok(Box::new(MssqlConnector::open(dsn, read_only).await?)),
        "oracle" => Ok(Box::new(OracleConnector::open(dsn, read_only).await?)),
        "snowflake" => Ok(Box::new(SnowflakeConnector::open(dsn, read_only).await?)),
        "sqlite" | "sqlite3" => Ok(Box::new(SqliteConnector::open(dsn, read_only).await?)),
        other => Err(ConnectorError::Database {
            driver: "dsn",
            msg: format!("unknown scheme '{other}'"),
        }),
    }
}
