use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::{Column, MySqlPool, Row as SqlxRow, TypeInfo};

use crate::dialect::{Dialect, MysqlDialect, Row};
use crate::schema::{
    ColumnInfo, Direction, ForeignKey, ProcedureDetail, ProcedureKind, ProcedureParam, TableDetail,
    TableKind, TableSummary,
};
use crate::value::Value;

use super::{
    guard_nonempty_filter, guard_writes, CallRequest, Connector, ConnectorError, DeleteRequest, Deadline, MutationResult,
    ResultSet, SelectRequest, UpdateRequest,
};

const DRIVER: &str = "mysql";

pub struct MysqlConnector {
    pool: MySqlPool,
    dialect: MysqlDialect,
    schema: String,
    read_only: bool,
}

impl MysqlConnector {
    pub async fn open(dsn: &str, read_only: bool) -> Result<Self, ConnectorError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(10)
            .connect(dsn)
            .await
            .map_err(db_err)?;
        let schema: String = sqlx::query_scalar("SELECT DATABASE()")
            .fetch_one(&pool)
            .await
            .map_err(db_err)?;
        Ok(MysqlConnector {
            pool,
            dialect: MysqlDialect,
            schema,
            read_only,
        })
    }

    fn map_row(row: &sqlx::mysql::MySqlRow) -> BTreeMap<String, Value> {
        let mut out = BTreeMap::new();
        for (i, col) in row.columns().iter().enumerate() {
            let value = decode_value(row, i, col.type_info().name());
            out.insert(col.name().to_string(), value);
        }
        out
    }
}

fn decode_value(row: &sqlx::mysql::MySqlRow, idx: usize, type_name: &str) -> Value {
    match type_name {
        "TINYINT(1)" | "BOOLEAN" => row
            .try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        "TINYINT" | "SMALLINT" | "INT" | "BIGINT" | "MEDIUMINT" => row
            .try_get::<Option<i64>, _>(idx)
            .ok()
            .flatten()
            .map(Value::I64)
            .unwrap_or(Value::Null),
        "FLOAT" | "DOUBLE" | "DECIMAL" => row
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
    mut query: sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments>,
    params: &'q [Value],
) -> sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments> {
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
impl Connector for MysqlConnector {
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
            "SELECT table_name, table_type, table_rows
             FROM information_schema.tables
             WHERE table_schema = ?
             ORDER BY table_name",
        )
        .bind(&self.schema)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .iter()
            .map(|row| {
                let name: String = row.get(0);
                let table_type: String = row.get(1);
                let row_count: Option<i64> = row.get(2);
                TableSummary {
                    name,
                    kind: if table_type.eq_ignore_ascii_case("VIEW") {
                        TableKind::View
                    } else {
                        TableKind::Table
                    },
                    row_count: row_count.unwrap_or(0),
                }
            })
            .collect())
    }

    async fn describe_table(
        &self,
        name: &str,
        _deadline: Deadline,
    ) -> Result<TableDetail, ConnectorError> {
        let col_rows = sqlx::query(
            "SELECT column_name, column_type, is_nullable, column_default, column_key
             FROM information_schema.columns
             WHERE table_schema = ? AND table_name = ?
             ORDER BY ordinal_position",
        )
        .bind(&self.schema)
        .bind(name)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        if col_rows.is_empty() {
            return Err(ConnectorError::NotFound {
                entity: name.to_string(),
            });
        }

        let mut primary_key = Vec::new();
        let columns: Vec<ColumnInfo> = col_rows
            .iter()
            .map(|row| {
                let col_name: String = row.get(0);
                let column_type: String = row.get(1);
                let is_nullable: String = row.get(2);
                let default: Option<String> = row.get(3);
                let key: String = row.get(4);
                let pk = key == "PRI";
                if pk {
                    primary_key.push(col_name.clone());
                }
                ColumnInfo {
                    logical_type: self.dialect.map_native_type(&column_type),
                    nullable: is_nullable.eq_ignore_ascii_case("yes"),
                    name: col_name,
                    pk,
                    fk: None,
                    default,
                }
            })
            .collect();

        let fk_rows = sqlx::query(
            "SELECT column_name, referenced_table_name, referenced_column_name
             FROM information_schema.key_column_usage
             WHERE table_schema = ? AND table_name = ? AND referenced_table_name IS NOT NULL",
        )
        .bind(&self.schema)
        .bind(name)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        let foreign_keys = fk_rows
            .iter()
            .map(|row| ForeignKey {
                column: row.get(0),
                ref_table: row.get(1),
                ref_column: row.get(2),
            })
            .collect();

        let row_count: Option<i64> = sqlx::query_scalar(
            "SELECT table_rows FROM information_schema.tables WHERE table_schema = ? AND table_name = ?",
        )
        .bind(&self.schema)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(TableDetail {
            name: name.to_string(),
            schema: self.schema.clone(),
            columns,
            primary_key,
            foreign_keys,
            indexes: Vec::new(),
            row_count: row_count.unwrap_or(0),
            description: None,
        })
    }

    async fn list_procedures(
        &self,
        _deadline: Deadline,
    ) -> Result<Vec<ProcedureDetail>, ConnectorError> {
        let rows = sqlx::query(
            "SELECT routine_name, routine_type FROM information_schema.routines WHERE routine_schema = ?",
        )
        .bind(&self.schema)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .iter()
            .map(|row| {
                let name: String = row.get(0);
                let routine_type: String = row.get(1);
                ProcedureDetail {
                    name,
                    kind: if routine_type.eq_ignore_ascii_case("FUNCTION") {
                        ProcedureKind::Function
                    } else {
                        ProcedureKind::Procedure
                    },
                    parameters: Vec::new(),
                    returns: None,
                }
            })
            .collect())
    }

    async fn describe_procedure(
        &self,
        name: &str,
        _deadline: Deadline,
    ) -> Result<ProcedureDetail, ConnectorError> {
        let param_rows = sqlx::query(
            "SELECT parameter_name, dtd_identifier, parameter_mode
             FROM information_schema.parameters
             WHERE specific_schema = ? AND specific_name = ?
             ORDER BY ordinal_position",
        )
        .bind(&self.schema)
        .bind(name)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        if param_rows.is_empty() {
            return Err(ConnectorError::NotFound {
                entity: name.to_string(),
            });
        }

        let parameters = param_rows
            .iter()
            .filter_map(|row| {
                let pname: Option<String> = row.get(0);
                let dtd: String = row.get(1);
                let mode: Option<String> = row.get(2);
                pname.map(|pname| ProcedureParam {
                    name: pname,
                    logical_type: self.dialect.map_native_type(&dtd),
                    direction: match mode.as_deref() {
                        Some("OUT") => Direction::Out,
                        Some("INOUT") => Direction::InOut,
                        _ => Direction::In,
                    },
                    default: None,
                })
            })
            .collect();

        Ok(ProcedureDetail {
            name: name.to_string(),
            kind: ProcedureKind::Procedure,
            parameters,
            returns: None,
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
        let (sql, pagination_params) = self.dialect.build_select(&spec);
        let mut all_params = req.filter_params.to_vec();
        all_params.extend(pagination_params);

        let query = sqlx::query(&sql);
        let query = bind_params(query, &all_params);
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
        let (sql, params) = self.dialect.build_insert(table, rows);
        let query = sqlx::query(&sql);
        let query = bind_params(query, &params);
        let result = query.execute(&self.pool).await.map_err(db_err)?;
        Ok(MutationResult {
            rows_affected: result.rows_affected(),
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
        let (sql, params) = self.dialect.build_call(req.name, req.params)?;
        let query = sqlx::query(&sql);
        let query = bind_params(query, &params);
        let rows = query.fetch_all(&self.pool).await.map_err(db_err)?;
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
