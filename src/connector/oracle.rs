use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::dialect::{Dialect, OracleDialect, Row};
use crate::schema::{
    ColumnInfo, Direction, ProcedureDetail, ProcedureKind, ProcedureParam, TableDetail, TableKind,
    TableSummary,
};
use crate::value::Value;

use super::{
    guard_nonempty_filter, guard_writes, CallRequest, Connector, ConnectorError, DeleteRequest, Deadline, MutationResult,
    ResultSet, SelectRequest, UpdateRequest,
};

const DRIVER: &str = "oracle";

pub struct OracleConnector {
    conn: Arc<Mutex<oracle::Connection>>,
    dialect: OracleDialect,
    read_only: bool,
}

impl OracleConnector {
    pub async fn open(dsn: &str, read_only: bool) -> Result<Self, ConnectorError> {
        let (user, password, connect_string) = parse_dsn(dsn)?;
        let conn = tokio::task::spawn_blocking(move || {
            oracle::Connection::connect(&user, &password, &connect_string)
        })
        .await
        .map_err(join_err)?
        .map_err(db_err)?;
        Ok(OracleConnector {
            conn: Arc::new(Mutex::new(conn)),
            dialect: OracleDialect,
            read_only,
        })
    }

    async fn run_blocking<F, T>(&self, f: F) -> Result<T, ConnectorError>
    where
        F: FnOnce(&oracle::Connection) -> oracle::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().expect("oracle connection mutex poisoned");
            f(&guard)
        })
        .await
        .map_err(join_err)?
        .map_err(db_err)
    }
}

fn parse_dsn(dsn: &str) -> Result<(String, String, String), ConnectorError> {
    let url = url::Url::parse(dsn).map_err(|e| ConnectorError::Database {
        driver: DRIVER,
        msg: e.to_string(),
    })?;
    let user = url.username().to_string();
    let password = url.password().unwrap_or_default().to_string();
    let host = url.host_str().unwrap_or_default();
    let port = url.port().unwrap_or(1521);
    let service = url.path().trim_start_matches('/');
    Ok((user, password, format!("{host}:{port}/{service}")))
}

fn db_err(e: oracle::Error) -> ConnectorError {
    ConnectorError::Database {
        driver: DRIVER,
        msg: e.to_string(),
    }
}

fn join_err(e: tokio::task::JoinError) -> ConnectorError {
    ConnectorError::Database {
        driver: DRIVER,
        msg: e.to_string(),
    }
}

fn decode_value(row: &oracle::Row, idx: usize) -> Value {
    if let Ok(Some(i)) = row.get::<usize, Option<i64>>(idx) {
        return Value::I64(i);
    }
    if let Ok(Some(f)) = row.get::<usize, Option<f64>>(idx) {
        return Value::F64(f);
    }
    if let Ok(Some(s)) = row.get::<usize, Option<String>>(idx) {
        return Value::Text(s);
    }
    Value::Null
}

fn map_row(row: &oracle::Row) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    for (idx, info) in row.column_info().iter().enumerate() {
        out.insert(info.name().to_string(), decode_value(row, idx));
    }
    out
}

fn bind_slice(params: &[Value]) -> Vec<Box<dyn oracle::sql_type::ToSql>> {
    params
        .iter()
        .map(|p| -> Box<dyn oracle::sql_type::ToSql> {
            match p {
                Value::Null => Box::new(None::<String>),
                Value::Bool(b) => Box::new(if *b { 1i64 } else { 0i64 }),
                Value::I64(i) => Box::new(*i),
                Value::F64(f) => Box::new(*f),
                Value::Text(s) => Box::new(s.clone()),
            }
        })
        .collect()
}

#[async_trait]
impl Connector for OracleConnector {
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
        self.run_blocking(|conn| conn.query("SELECT 1 FROM DUAL", &[]).map(|_| ()))
            .await
    }

    async fn list_tables(&self, _deadline: Deadline) -> Result<Vec<TableSummary>, ConnectorError> {
        self.run_blocking(|conn| {
            let rows = conn.query(
                "SELECT table_name, 'table', num_rows FROM user_tables \
                 UNION ALL SELECT view_name, 'view', NULL FROM user_views ORDER BY 1",
                &[],
            )?;
            let mut summaries = Vec::new();
            for row in rows {
                let row = row?;
                let name: String = row.get(0)?;
                let kind: String = row.get(1)?;
                let row_count: Option<i64> = row.get(2)?;
                summaries.push(TableSummary {
                    name,
                    kind: if kind == "view" {
                        TableKind::View
                    } else {
                        TableKind::Table
                    },
                    row_count: row_count.unwrap_or(0),
                });
            }
            Ok(summaries)
        })
        .await
    }

    async fn describe_table(
        &self,
        name: &str,
        _deadline: Deadline,
    ) -> Result<TableDetail, ConnectorError> {
        let owned_name = name.to_string();
        let detail = self
            .run_blocking(move |conn| {
                let cols = conn.query(
                    "SELECT column_name, data_type, nullable FROM user_tab_columns \
                     WHERE table_name = :1 ORDER BY column_id",
                    &[&owned_name.to_uppercase()],
                )?;
                let mut columns = Vec::new();
                for row in cols {
                    let row = row?;
                    let col_name: String = row.get(0)?;
                    let native: String = row.get(1)?;
                    let nullable: String = row.get(2)?;
                    columns.push((col_name, native, nullable == "Y"));
                }

                let pk_rows = conn.query(
                    "SELECT cols.column_name FROM user_constraints cons \
                     JOIN user_cons_columns cols ON cons.constraint_name = cols.constraint_name \
                     WHERE cons.constraint_type = 'P' AND cons.table_name = :1",
                    &[&owned_name.to_uppercase()],
                )?;
                let mut primary_key = Vec::new();
                for row in pk_rows {
                    let row = row?;
                    primary_key.push(row.get::<usize, String>(0)?);
                }

                let row_count_row = conn.query_row_as::<Option<i64>>(
                    "SELECT num_rows FROM user_tables WHERE table_name = :1",
                    &[&owned_name.to_uppercase()],
                )?;

                Ok((columns, primary_key, row_count_row.unwrap_or(0)))
            })
            .await?;

        let (raw_columns, primary_key, row_count) = detail;
        let columns = raw_columns
            .into_iter()
            .map(|(col_name, native, nullable)| {
                let pk = primary_key.contains(&col_name);
                ColumnInfo {
                    logical_type: self.dialect.map_native_type(&native),
                    nullable,
                    pk,
                    name: col_name,
                    fk: None,
                    default: None,
                }
            })
            .collect();

        Ok(TableDetail {
            name: name.to_string(),
            schema: "".to_string(),
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
        self.run_blocking(|conn| {
            let rows = conn.query(
                "SELECT object_name, object_type FROM user_procedures \
                 WHERE object_type IN ('PROCEDURE', 'FUNCTION') ORDER BY object_name",
                &[],
            )?;
            let mut procs = Vec::new();
            for row in rows {
                let row = row?;
                let name: String = row.get(0)?;
                let kind: String = row.get(1)?;
                procs.push(ProcedureDetail {
                    name,
                    kind: if kind == "FUNCTION" {
                        ProcedureKind::Function
                    } else {
                        ProcedureKind::Procedure
                    },
                    parameters: Vec::new(),
                    returns: None,
                });
            }
            Ok(procs)
        })
        .await
    }

    async fn describe_procedure(
        &self,
        name: &str,
        _deadline: Deadline,
    ) -> Result<ProcedureDetail, ConnectorError> {
        let owned_name = name.to_string();
        let params = self
            .run_blocking(move |conn| {
                let rows = conn.query(
                    "SELECT argument_name, data_type, in_out FROM user_arguments \
                     WHERE object_name = :1 ORDER BY position",
                    &[&owned_name.to_uppercase()],
                )?;
                let mut params = Vec::new();
                for row in rows {
                    let row = row?;
                    let pname: Option<String> = row.get(0)?;
                    let native: Option<String> = row.get(1)?;
                    let direction: String = row.get(2)?;
                    params.push((
                        pname.unwrap_or_default(),
                        native.unwrap_or_default(),
                        direction,
                    ));
                }
                Ok(params)
            })
            .await?;

        let parameters = params
            .into_iter()
            .map(|(pname, native, direction)| ProcedureParam {
                name: pname,
                logical_type: self.dialect.map_native_type(&native),
                direction: match direction.as_str() {
                    "OUT" => Direction::Out,
                    "IN/OUT" => Direction::InOut,
                    _ => Direction::In,
                },
                default: None,
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
        let requested_columns = req.columns.to_vec();

        self.run_blocking(move |conn| {
            let binds = bind_slice(&all_params);
            let bind_refs: Vec<&dyn oracle::sql_type::ToSql> =
                binds.iter().map(|b| b.as_ref()).collect();
            let rows = conn.query(&sql, &bind_refs)?;
            let mut out_rows = Vec::new();
            let mut columns = requested_columns;
            for (i, row) in rows.enumerate() {
                let row = row?;
                if i == 0 && columns.is_empty() {
                    columns = row
                        .column_info()
                        .iter()
                        .map(|c| c.name().to_string())
                        .collect();
                }
                out_rows.push(map_row(&row));
            }
            Ok(ResultSet {
                columns,
                rows: out_rows,
                total: None,
            })
        })
        .await
    }

    async fn insert(
        &self,
        table: &str,
        rows: &[Row],
        _deadline: Deadline,
    ) -> Result<MutationResult, ConnectorError> {
        guard_writes(self.read_only)?;
        let (sql, params) = self.dialect.build_insert(table, rows);
        let affected = self
            .run_blocking(move |conn| {
                let binds = bind_slice(&params);
                let bind_refs: Vec<&dyn oracle::sql_type::ToSql> =
                    binds.iter().map(|b| b.as_ref()).collect();
                let stmt = conn.execute(&sql, &bind_refs)?;
                conn.commit()?;
                Ok(stmt.row_count()?)
            })
            .await?;
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
        let affected = self
            .run_blocking(move |conn| {
                let binds = bind_slice(&params);
                let bind_refs: Vec<&dyn oracle::sql_type::ToSql> =
                    binds.iter().map(|b| b.as_ref()).collect();
                let stmt = conn.execute(&sql, &bind_refs)?;
                conn.commit()?;
                Ok(stmt.row_count()?)
            })
            .await?;
        Ok(MutationResult {
            rows_affected: affected,
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
        let affected = self
            .run_blocking(move |conn| {
                let binds = bind_slice(&params);
                let bind_refs: Vec<&dyn oracle::sql_type::ToSql> =
                    binds.iter().map(|b| b.as_ref()).collect();
                let stmt = conn.execute(&sql, &bind_refs)?;
                conn.commit()?;
                Ok(stmt.row_count()?)
            })
            .await?;
        Ok(MutationResult {
            rows_affected: affected,
            returning: None,
        })
    }

    async fn call(
        &self,
        req: CallRequest<'_>,
        _deadline: Deadline,
    ) -> Result<ResultSet, ConnectorError> {
        let (sql, params) = self.dialect.build_call(req.name, req.params)?;
        self.run_blocking(move |conn| {
            let binds = bind_slice(&params);
            let bind_refs: Vec<&dyn oracle::sql_type::ToSql> =
                binds.iter().map(|b| b.as_ref()).collect();
            conn.execute(&sql, &bind_refs)?;
            conn.commit()?;
            Ok(ResultSet {
                columns: Vec::new(),
                rows: Vec::new(),
                total: None,
            })
        })
        .await
    }

    async fn execute_raw(
        &self,
        sql: &str,
        is_write: bool,
        _deadline: Deadline,
    ) -> Result<ResultSet, ConnectorError> {
        let owned_sql = sql.to_string();
        if is_write {
            guard_writes(self.read_only)?;
            let affected = self
                .run_blocking(move |conn| {
                    let stmt = conn.execute(&owned_sql, &[])?;
                    conn.commit()?;
                    Ok(stmt.row_count()?)
                })
                .await?;
            return Ok(ResultSet {
                columns: Vec::new(),
                rows: Vec::new(),
                total: Some(affected as i64),
            });
        }
        self.run_blocking(move |conn| {
            let rows = conn.query(&owned_sql, &[])?;
            let mut out_rows = Vec::new();
            let mut columns = Vec::new();
            for (i, row) in rows.enumerate() {
                let row = row?;
                if i == 0 {
                    columns = row.column_info().iter().map(|c| c.name().to_string()).collect();
                }
                out_rows.push(map_row(&row));
            }
            Ok(ResultSet {
                columns,
                rows: out_rows,
                total: None,
            })
        })
        .await
    }
}

