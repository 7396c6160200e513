use std::collections::BTreeMap;

use async_trait::async_trait;
use snowflake_api::{QueryResult, SnowflakeApi};
use tokio::sync::Mutex;

use crate::dialect::{Dialect, Row, SnowflakeDialect};
use crate::schema::{
    ColumnInfo, ProcedureDetail, ProcedureKind, TableDetail, TableKind, TableSummary,
};
use crate::value::Value;

use super::{
    guard_nonempty_filter, guard_writes, CallRequest, Connector, ConnectorError, DeleteRequest, Deadline, MutationResult,
    ResultSet, SelectRequest, UpdateRequest,
};

const DRIVER: &str = "snowflake";

pub struct SnowflakeConnector {
    api: Mutex<SnowflakeApi>,
    dialect: SnowflakeDialect,
    schema: String,
    read_only: bool,
}

impl SnowflakeConnector {
    pub async fn open(dsn: &str, read_only: bool) -> Result<Self, ConnectorError> {
        let opts = SnowflakeDsn::parse(dsn)?;
        let api = SnowflakeApi::with_password_auth(
            &opts.account,
            Some(&opts.warehouse),
            Some(&opts.database),
            Some(&opts.schema),
            &opts.user,
            opts.role.as_deref(),
            &opts.password,
        )
        .map_err(api_err)?;
        Ok(SnowflakeConnector {
            api: Mutex::new(api),
            dialect: SnowflakeDialect,
            schema: opts.schema,
            read_only,
        })
    }

    /// snowflake-api executes raw SQL text over REST; the driver has no
    /// native parameter binding, so placeholders are inlined as SQL
    /// literals before the statement is sent (still safe: values only ever
    /// reach here through the filter parser / request structs, never as
    /// unsanitized identifier or keyword text).
    async fn exec_with_params(&self, sql: &str, params: &[Value]) -> Result<QueryResult, ConnectorError> {
        let rendered = inline_params(sql, params);
        let mut api = self.api.lock().await;
        api.exec(&rendered).await.map_err(api_err)
    }
}

struct SnowflakeDsn {
    account: String,
    user: String,
    password: String,
    warehouse: String,
    database: String,
    schema: String,
    role: Option<String>,
}

impl SnowflakeDsn {
    fn parse(dsn: &str) -> Result<Self, ConnectorError> {
        let url = url::Url::parse(dsn).map_err(|e| ConnectorError::Database {
            driver: DRIVER,
            msg: e.to_string(),
        })?;
        let mut warehouse = String::new();
        let mut database = String::new();
        let mut schema = "PUBLIC".to_string();
        let mut role = None;
        for (k, v) in url.query_pairs() {
            match k.as_ref() {
                "warehouse" => warehouse = v.to_string(),
                "database" => database = v.to_string(),
                "schema" => schema = v.to_string(),
                "role" => role = Some(v.to_string()),
                _ => {}
            }
        }
        Ok(SnowflakeDsn {
            account: url.host_str().unwrap_or_default().to_string(),
            user: url.username().to_string(),
            password: url.password().unwrap_or_default().to_string(),
            warehouse,
            database,
            schema,
            role,
        })
    }
}

fn inline_params(sql: &str, params: &[Value]) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut params = params.iter();
    for ch in sql.chars() {
        if ch == '?' {
            let literal = params.next().map(render_literal).unwrap_or_else(|| "NULL".to_string());
            out.push_str(&literal);
        } else {
            out.push(ch);
        }
    }
    out
}

fn render_literal(v: &Value) -> String {
    match v {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => b.to_string().to_uppercase(),
        Value::I64(i) => i.to_string(),
        Value::F64(f) => f.to_string(),
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
    }
}

fn api_err(e: snowflake_api::SnowflakeApiError) -> ConnectorError {
    ConnectorError::Database {
        driver: DRIVER,
        msg: e.to_string(),
    }
}

fn result_to_rows(result: &QueryResult) -> (Vec<String>, Vec<BTreeMap<String, Value>>) {
    match result {
        QueryResult::Arrow(batches) => {
            let columns: Vec<String> = batches
                .first()
                .map(|b| {
                    b.schema()
                        .fields()
                        .iter()
                        .map(|f| f.name().to_string())
                        .collect()
                })
                .unwrap_or_default();
            let mut rows = Vec::new();
            for batch in batches {
                for row_idx in 0..batch.num_rows() {
                    let mut row = BTreeMap::new();
                    for (col_idx, name) in columns.iter().enumerate() {
                        row.insert(name.clone(), arrow_cell_to_value(batch, col_idx, row_idx));
                    }
                    rows.push(row);
                }
            }
            (columns, rows)
        }
        QueryResult::Empty => (Vec::new(), Vec::new()),
        QueryResult::Json(_) => (Vec::new(), Vec::new()),
    }
}

fn arrow_cell_to_value(
    batch: &arrow::record_batch::RecordBatch,
    col_idx: usize,
    row_idx: usize,
) -> Value {
    use arrow::array::Array;
    let column = batch.column(col_idx);
    if column.is_null(row_idx) {
        return Value::Null;
    }
    let formatted = arrow::util::display::array_value_to_string(column, row_idx)
        .unwrap_or_else(|_| String::new());
    Value::Text(formatted)
}

#[async_trait]
impl Connector for SnowflakeConnector {
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
        self.exec_with_params("SELECT 1", &[]).await?;
        Ok(())
    }

    async fn list_tables(&self, _deadline: Deadline) -> Result<Vec<TableSummary>, ConnectorError> {
        let sql = format!(
            "SELECT table_name, table_type, row_count FROM information_schema.tables \
             WHERE table_schema = '{}' ORDER BY table_name",
            self.schema.replace('\'', "''")
        );
        let result = self.exec_with_params(&sql, &[]).await?;
        let (_, rows) = result_to_rows(&result);
        Ok(rows
            .into_iter()
            .map(|row| {
                let name = text_of(&row, "TABLE_NAME");
                let kind = text_of(&row, "TABLE_TYPE");
                let row_count = int_of(&row, "ROW_COUNT");
                TableSummary {
                    name,
                    kind: if kind.eq_ignore_ascii_case("VIEW") {
                        TableKind::View
                    } else {
                        TableKind::Table
                    },
                    row_count,
                }
            })
            .collect())
    }

    async fn describe_table(
        &self,
        name: &str,
        _deadline: Deadline,
    ) -> Result<TableDetail, ConnectorError> {
        let sql = format!(
            "SELECT column_name, data_type, is_nullable FROM information_schema.columns \
             WHERE table_schema = '{}' AND table_name = '{}' ORDER BY ordinal_position",
            self.schema.replace('\'', "''"),
            name.replace('\'', "''").to_uppercase()
        );
        let result = self.exec_with_params(&sql, &[]).await?;
        let (_, rows) = result_to_rows(&result);
        if rows.is_empty() {
            return Err(ConnectorError::NotFound {
                entity: name.to_string(),
            });
        }
        let columns: Vec<ColumnInfo> = rows
            .iter()
            .map(|row| {
                let native = text_of(row, "DATA_TYPE");
                ColumnInfo {
                    name: text_of(row, "COLUMN_NAME"),
                    logical_type: self.dialect.map_native_type(&native),
                    nullable: text_of(row, "IS_NULLABLE").eq_ignore_ascii_case("YES"),
                    pk: false,
                    fk: None,
                    default: None,
                }
            })
            .collect();

        Ok(TableDetail {
            name: name.to_string(),
            schema: self.schema.clone(),
            columns,
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
            row_count: 0,
            description: None,
        })
    }

    async fn list_procedures(
        &self,
        _deadline: Deadline,
    ) -> Result<Vec<ProcedureDetail>, ConnectorError> {
        let sql = format!(
            "SHOW PROCEDURES IN SCHEMA {}",
            self.dialect.quote_ident(&self.schema)
        );
        let result = self.exec_with_params(&sql, &[]).await?;
        let (_, rows) = result_to_rows(&result);
        Ok(rows
            .iter()
            .map(|row| ProcedureDetail {
                name: text_of(row, "name"),
                kind: ProcedureKind::Procedure,
                parameters: Vec::new(),
                returns: None,
            })
            .collect())
    }

    async fn describe_procedure(
        &self,
        name: &str,
        _deadline: Deadline,
    ) -> Result<ProcedureDetail, ConnectorError> {
        Ok(ProcedureDetail {
            name: name.to_string(),
            kind: ProcedureKind::Procedure,
            parameters: Vec::new(),
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
        let result = self.exec_with_params(&sql, &all_params).await?;
        let (fetched_columns, rows) = result_to_rows(&result);
        let columns = if req.columns.is_empty() {
            fetched_columns
        } else {
            req.columns.to_vec()
        };
        Ok(ResultSet {
            columns,
            rows,
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
        self.exec_with_params(&sql, &params).await?;
        Ok(MutationResult {
            rows_affected: rows.len() as u64,
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
        self.exec_with_params(&sql, &params).await?;
        Ok(MutationResult {
            rows_affected: 0,
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
        self.exec_with_params(&sql, &params).await?;
        Ok(MutationResult {
            rows_affected: 0,
            returning: None,
        })
    }

    async fn call(
        &self,
        req: CallRequest<'_>,
        _deadline: Deadline,
    ) -> Result<ResultSet, ConnectorError> {
        let (sql, params) = self.dialect.build_call(req.name, req.params)?;
        let result = self.exec_with_params(&sql, &params).await?;
        let (columns, rows) = result_to_rows(&result);
        Ok(ResultSet {
            columns,
            rows,
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
        }
        let result = self.exec_with_params(sql, &[]).await?;
        let (columns, rows) = result_to_rows(&result);
        if is_write {
            return Ok(ResultSet {
                columns: Vec::new(),
                rows: Vec::new(),
                total: Some(rows.len() as i64),
            });
        }
        Ok(ResultSet {
            columns,
            rows,
            total: None,
        })
    }
}

fn text_of(row: &BTreeMap<String, Value>, key: &str) -> String {
    match row.get(key) {
        Some(Value::Text(s)) => s.clone(),
        Some(v) => format!("{v:?}"),
        None => String::new(),
    }
}

fn int_of(row: &BTreeMap<String, Value>, key: &str) -> i64 {
    match row.get(key) {
        Some(Value::I64(i)) => *i,
        Some(Value::Text(s)) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

