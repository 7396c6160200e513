use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Column, PgPool, Row as SqlxRow, TypeInfo};

use crate::dialect::{Dialect, PostgresDialect, Row};
use crate::schema::{
    ColumnInfo, Direction, ForeignKey, ProcedureDetail, ProcedureKind, ProcedureParam, TableDetail,
    TableKind, TableSummary,
};
use crate::value::Value;

use super::{
    guard_nonempty_filter, guard_writes, CallRequest, Connector, ConnectorError, DeleteRequest, Deadline, MutationResult,
    ResultSet, SelectRequest, UpdateRequest,
};

const DRIVER: &str = "postgres";

pub struct PostgresConnector {
    pool: PgPool,
    dialect: PostgresDialect,
    schema: String,
    read_only: bool,
}

impl PostgresConnector {
    pub async fn open(dsn: &str, read_only: bool) -> Result<Self, ConnectorError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(dsn)
            .await
            .map_err(db_err)?;
        let schema: String = sqlx::query_scalar("SELECT current_schema()")
            .fetch_one(&pool)
            .await
            .map_err(db_err)?;
        Ok(PostgresConnector {
            pool,
            dialect: PostgresDialect,
            schema,
            read_only,
        })
    }

    fn map_row(row: &sqlx::postgres::PgRow) -> BTreeMap<String, Value> {
        let mut out = BTreeMap::new();
        for (i, col) in row.columns().iter().enumerate() {
            let value = decode_pg_value(row, i, col.type_info().name());
            out.insert(col.name().to_string(), value);
        }
        out
    }
}

fn decode_pg_value(row: &sqlx::postgres::PgRow, idx: usize, type_name: &str) -> Value {
    match type_name {
        "BOOL" => row
            .try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        "INT2" | "INT4" | "INT8" => row
            .try_get::<Option<i64>, _>(idx)
            .ok()
            .flatten()
            .map(Value::I64)
            .unwrap_or(Value::Null),
        "FLOAT4" | "FLOAT8" | "NUMERIC" => row
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
    mut query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    params: &'q [Value],
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
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
impl Connector for PostgresConnector {
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
            "SELECT c.relname, c.relkind, COALESCE(s.n_live_tup, 0)
             FROM pg_catalog.pg_class c
             JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
             LEFT JOIN pg_stat_user_tables s ON s.relname = c.relname AND s.schemaname = n.nspname
             WHERE n.nspname = $1 AND c.relkind IN ('r', 'v', 'm')
             ORDER BY c.relname",
        )
        .bind(&self.schema)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .iter()
            .map(|row| {
                let name: String = row.get(0);
                let relkind: String = row.get(1);
                let row_count: i64 = row.get(2);
                let kind = match relkind.as_str() {
                    "v" => TableKind::View,
                    "m" => TableKind::MaterializedView,
                    _ => TableKind::Table,
                };
                TableSummary { name, kind, row_count }
            })
            .collect())
    }

    async fn describe_table(
        &self,
        name: &str,
        _deadline: Deadline,
    ) -> Result<TableDetail, ConnectorError> {
        let col_rows = sqlx::query(
            "SELECT column_name, data_type, is_nullable, column_default
             FROM information_schema.columns
             WHERE table_schema = $1 AND table_name = $2
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

        let pk_rows = sqlx::query(
            "SELECT a.attname
             FROM pg_index i
             JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey)
             WHERE i.indrelid = $1::regclass AND i.indisprimary",
        )
        .bind(format!("{}.{}", self.schema, name))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        let primary_key: Vec<String> = pk_rows.iter().map(|r| r.get(0)).collect();
        let pk_set: std::collections::HashSet<&str> =
            primary_key.iter().map(|s| s.as_str()).collect();

        let columns: Vec<ColumnInfo> = col_rows
            .iter()
            .map(|row| {
                let col_name: String = row.get(0);
                let data_type: String = row.get(1);
                let is_nullable: String = row.get(2);
                let default: Option<String> = row.get(3);
                ColumnInfo {
                    pk: pk_set.contains(col_name.as_str()),
                    logical_type: self.dialect.map_native_type(&data_type),
                    nullable: is_nullable.eq_ignore_ascii_case("yes"),
                    name: col_name,
                    fk: None,
                    default,
                }
            })
            .collect();

        let fk_rows = sqlx::query(
            "SELECT kcu.column_name, ccu.table_name, ccu.column_name
             FROM information_schema.table_constraints tc
             JOIN information_schema.key_column_usage kcu ON tc.constraint_name = kcu.constraint_name
             JOIN information_schema.constraint_column_usage ccu ON tc.constraint_name = ccu.constraint_name
             WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_schema = $1 AND tc.table_name = $2",
        )
        .bind(&self.schema)
        .bind(name)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        let foreign_keys: Vec<ForeignKey> = fk_rows
            .iter()
            .map(|row| ForeignKey {
                column: row.get(0),
                ref_table: row.get(1),
                ref_column: row.get(2),
            })
            .collect();

        let row_count: i64 = sqlx::query_scalar(
            "SELECT COALESCE(n_live_tup, 0) FROM pg_stat_user_tables WHERE relname = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .unwrap_or(0);

        Ok(TableDetail {
            name: name.to_string(),
            schema: self.schema.clone(),
            columns,
            primary_key,
            foreign_keys,
            indexes: Vec::new(),
            row_count,
            description: None,
        })
    }

    async fn list_procedures(
        &self,
        _deadline: Deadline,
    ) -> Result<Vec<ProcedureDetail>, ConnectorError> {
        let rows = sqlx::query(
            "SELECT p.proname, p.prokind
             FROM pg_proc p
             JOIN pg_namespace n ON n.oid = p.pronamespace
             WHERE n.nspname = $1",
        )
        .bind(&self.schema)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .iter()
            .map(|row| {
                let name: String = row.get(0);
                let prokind: String = row.get(1);
                ProcedureDetail {
                    name,
                    kind: if prokind == "f" {
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
        // `information_schema.parameters` keyed by `specific_name` resolved
        // via `pg_proc.oid`, not a `LIKE specific_name || '_%'` scan — see
        // DESIGN.md open-question (c).
        let oid: Option<i64> = sqlx::query_scalar("SELECT p.oid::bigint FROM pg_proc p JOIN pg_namespace n ON n.oid = p.pronamespace WHERE n.nspname = $1 AND p.proname = $2 LIMIT 1")
            .bind(&self.schema)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        let Some(oid) = oid else {
            return Err(ConnectorError::NotFound {
                entity: name.to_string(),
            });
        };

        // Postgres's own `specific_name` format is `{proname}_{oid}` — keying
        // on that directly pins the lookup to the exact overload we just
        // resolved, instead of re-resolving `specific_name` from
        // `routine_name` (ambiguous across overloads, same as the source's
        // `LIKE specific_name || '_%'` scan).
        let specific_name = format!("{name}_{oid}");
        let param_rows = sqlx::query(
            "SELECT parameter_name, data_type, parameter_mode
             FROM information_schema.parameters
             WHERE specific_name = $1
             ORDER BY ordinal_position",
        )
        .bind(&specific_name)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let parameters = param_rows
            .iter()
            .map(|row| {
                let pname: Option<String> = row.get(0);
                let data_type: String = row.get(1);
                let mode: String = row.get(2);
                ProcedureParam {
                    name: pname.unwrap_or_default(),
                    logical_type: self.dialect.map_native_type(&data_type),
                    direction: match mode.as_str() {
                        "OUT" => Direction::Out,
                        "INOUT" => Direction::InOut,
                        _ => Direction::In,
                    },
                    default: None,
                }
            })
            .collect();

        Ok(ProcedureDetail {
            name: name.to_string(),
            kind: ProcedureKind::Function,
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
