use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Column, Row as SqlxRow, SqlitePool, TypeInfo};

use crate::dialect::{Dialect, Row, SqliteDialect};
use crate::schema::{
    ColumnInfo, ProcedureDetail, TableDetail, TableKind, TableSummary,
};
use crate::value::Value;

use super::{
    guard_nonempty_filter, guard_writes, CallRequest, Connector, ConnectorError, DeleteRequest, Deadline, MutationResult,
    ResultSet, SelectRequest, UpdateRequest,
};

const DRIVER: &str = "sqlite";

pub struct SqliteConnector {
    pool: SqlitePool,
    dialect: SqliteDialect,
    read_only: bool,
}

impl SqliteConnector {
    pub async fn open(dsn: &str, read_only: bool) -> Result<Self, ConnectorError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(dsn)
            .await
            .map_err(db_err)?;
        Ok(SqliteConnector {
            pool,
            dialect: SqliteDialect,
            read_only,
        })
    }

    fn map_row(row: &sqlx::sqlite::SqliteRow) -> BTreeMap<String, Value> {
        let mut out = BTreeMap::new();
        for (i, col) in row.columns().iter().enumerate() {
            let value = decode_value(row, i, col.type_info().name());
            out.insert(col.name().to_string(), value);
        }
        out
    }
}

fn decode_value(row: &sqlx::sqlite::SqliteRow, idx: usize, type_name: &str) -> Value {
    match type_name {
        "BOOLEAN" => row
            .try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        "INTEGER" => row
            .try_get::<Option<i64>, _>(idx)
            .ok()
            .flatten()
            .map(Value::I64)
            .unwrap_or(Value::Null),
        "REAL" => row
            .try_get::<Option<f64>, _>(idx)
            .ok()
            .flatten()
            .map(Value::F64)
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Text)
            .unwrap_or(Value::Null),
    }
}

fn db_err(e: sqlx::Error) -> ConnectorError {
    ConnectorError::Database {
        driver: DRIVER,
        msg: e.to_string(),
    }
}

fn bind_params<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    params: &'q [Value],
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    for p in params {
        query = match p {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::I64(i) => query.bind(*i),
            Value::F64(f) => query.bind(*f),
            Value::Text(s) => query.bind(s.clone()),
        };
    }
    query
}

#[async_trait]
impl Connector for SqliteConnector {
    fn driver_name(&self) -> &'static str {
        DRIVER
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.dialect.quote_ident(ident)
    }

    fn parameter_placeholder(&self, i: usize) -> String {
        self.dialect.placeholder(i)
    }

    fn read_only(&self) -> bool {
        self.read_only
    }

    async fn ping(&self, _deadline: Deadline) -> Result<(), ConnectorError> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(db_err)?;
        Ok(())
    }

    async fn list_tables(&self, _deadline: Deadline) -> Result<Vec<TableSummary>, ConnectorError> {
        let rows = sqlx::query(
            "SELECT name, type FROM sqlite_master WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.get(0);
            let kind_str: String = row.get(1);
            let row_count: i64 = sqlx::query_scalar(&format!(
                "SELECT COUNT(*) FROM {}",
                self.dialect.quote_ident(&name)
            ))
            .fetch_one(&self.pool)
            .await
            .unwrap_or(0);
            summaries.push(TableSummary {
                name,
                kind: if kind_str == "view" {
                    TableKind::View
                } else {
                    TableKind::Table
                },
                row_count,
            });
        }
        Ok(summaries)
    }

    async fn describe_table(
        &self,
        name: &str,
        _deadline: Deadline,
    ) -> Result<TableDetail, ConnectorError> {
        let rows = sqlx::query(&format!(
            "PRAGMA table_info({})",
            self.dialect.quote_ident(name)
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        if rows.is_empty() {
            return Err(ConnectorError::NotFound {
                entity: name.to_string(),
            });
        }

        let mut primary_key = Vec::new();
        let columns: Vec<ColumnInfo> = rows
            .iter()
            .map(|row| {
                let col_name: String = row.get(1);
                let col_type: String = row.get(2);
                let notnull: i64 = row.get(3);
                let default: Option<String> = row.get(4);
                let pk: i64 = row.get(5);
                if pk > 0 {
                    primary_key.push(col_name.clone());
                }
                ColumnInfo {
                    logical_type: self.dialect.map_native_type(&col_type),
                    nullable: notnull == 0,
                    name: col_name,
                    pk: pk > 0,
                    fk: None,
                    default,
                }
            })
            .collect();

        let row_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {}",
            self.dialect.quote_ident(name)
        ))
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(TableDetail {
            name: name.to_string(),
            schema: "main".to_string(),
            columns,
            primary_key,
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
            row_count,
            description: None,
        })
    }

    async fn list_procedures(
        &self,
        _deadline: Deadline,
    ) -> Result<Vec<ProcedureDetail>, ConnectorError> {
        // sqlite has no callable-routine concept.
        Ok(Vec::new())
    }

    async fn describe_procedure(
        &self,
        name: &str,
        _deadline: Deadline,
    ) -> Result<ProcedureDetail, ConnectorError> {
        Err(ConnectorError::NotFound {
            entity: name.to_string(),
        })
    }

    async fn select(
        &self,
        req: SelectRequest<'_>,
        _deadline: Deadline,
    ) -> Result<ResultSet, ConnectorError> {
        use crate::dialect::SelectSpec;
        let spec = SelectSpec {
            table: req.table,
            columns: req.columns,
            filter_fragment: req.filter_fragment,
            filter_param_count: req.filter_params.len(),
            order_by: req.order_by,
            limit: req.limit,
            offset: req.offset,
        };
        let (sql, _) = self.dialect.build_select(&spec);
        let query = sqlx::query(&sql);
        let query = bind_params(query, req.filter_params);
        let rows = query.fetch_all(&self.pool).await.map_err(db_err)?;

        let columns = if req.columns.is_empty() {
            rows.first()
                .map(|r| r.columns().iter().map(|c| c.name().to_string()).collect())
                .unwrap_or_default()
        } else {
            req.columns.to_vec()
        };
        let mapped = rows.iter().map(Self::map_row).collect();
        Ok(ResultSet {
            columns,
            rows: mapped,
            total: None,
        })
    }

    async fn insert(
        &self,
        table: &str,
        rows: &[Row],
        _deadline: Deadline,
    ) -> Result<MutationResult, ConnectorError> {
        guard_writes(self.read_only)?;
        let mut affected = 0;
        for row in rows {
            let (sql, params) = self.dialect.build_insert(table, std::slice::from_ref(row));
            let query = sqlx::query(&sql);
            let query = bind_params(query, &params);
            let result = query.execute(&self.pool).await.map_err(db_err)?;
            affected += result.rows_affected();
        }
        Ok(MutationResult {
            rows_affected: affected,
            returning: None,
        })
    }

    async fn update(
        &self,
        req: UpdateRequest<'_>,
        _deadline: Deadline,
    ) -> Result<MutationResult, ConnectorError> {
        guard_writes(self.read_only)?;
        guard_nonempty_filter(req.filter_fragment)?;
        let (sql, params) = self.dialect.build_update(
            req.table,
            req.assignments,
            req.filter_fragment,
            req.filter_params,
        );
        let query = sqlx::query(&sql);
        let query = bind_params(query, &params);
        let result = query.execute(&self.pool).await.map_err(db_err)?;
        Ok(MutationResult {
            rows_affected: result.rows_affected(),
            returning: None,
        })
    }

    async fn delete(
        &self,
        req: DeleteRequest<'_>,
        _deadline: Deadline,
    ) -> Result<MutationResult, ConnectorError> {
        guard_writes(self.read_only)?;
        guard_nonempty_filter(req.filter_fragment)?;
        let (sql, params) =
            self.dialect.build_delete(req.table, req.filter_fragment, req.filter_params);
        let query = sqlx::query(&sql);
        let query = bind_params(query, &params);
        let result = query.execute(&self.pool).await.map_err(db_err)?;
        Ok(MutationResult {
            rows_affected: result.rows_affected(),
            returning: None,
        })
    }

    async fn call(
        &self,
        req: CallRequest<'_>,
        _deadline: Deadline,
    ) -> Result<ResultSet, ConnectorError> {
        self.dialect.build_call(req.name, req.params)?;
        unreachable!("SqliteDialect::build_call always returns Err, caught by `?` above")
    }

    async fn execute_raw(
        &self,
        sql: &str,
        is_write: bool,
        _deadline: Deadline,
    ) -> Result<ResultSet, ConnectorError> {
        if is_write {
            guard_writes(self.read_only)?;
            let result = sqlx::query(sql).execute(&self.pool).await.map_err(db_err)?;
            return Ok(ResultSet {
                columns: Vec::new(),
                rows: Vec::new(),
                total: Some(result.rows_affected() as i64),
            });
        }
        let rows = sqlx::query(sql).fetch_all(&self.pool).await.map_err(db_err)?;
        let columns = rows
            .first()
            .map(|r| r.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let mapped = rows.iter().map(Self::map_row).collect();
        Ok(ResultSet {
            columns,
            rows: mapped,
            total: None,
        })
    }
}
