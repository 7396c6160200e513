use std::collections::BTreeMap;

use async_trait::async_trait;
use tiberius::{Client, Config};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::dialect::{Dialect, MssqlDialect, ProcParam, Row};
use crate::schema::{
    ColumnInfo, Direction, ForeignKey, ProcedureDetail, ProcedureKind, ProcedureParam, TableDetail,
    TableKind, TableSummary,
};
use crate::value::Value;

use super::{
    guard_nonempty_filter, guard_writes, CallRequest, Connector, ConnectorError, DeleteRequest, Deadline, MutationResult,
    ResultSet, SelectRequest, UpdateRequest,
};

const DRIVER: &str = "mssql";

pub struct MssqlConnector {
    client: tokio::sync::Mutex<Client<Compat<TcpStream>>>,
    dialect: MssqlDialect,
    read_only: bool,
}

impl MssqlConnector {
    pub async fn open(dsn: &str, read_only: bool) -> Result<Self, ConnectorError> {
        let mut config = Config::from_ado_string(dsn).map_err(db_err)?;
        config.trust_cert();
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| ConnectorError::Database {
                driver: DRIVER,
                msg: e.to_string(),
            })?;
        tcp.set_nodelay(true).ok();
        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(db_err)?;
        Ok(MssqlConnector {
            client: tokio::sync::Mutex::new(client),
            dialect: MssqlDialect,
            read_only,
        })
    }
}

fn db_err(e: tiberius::error::Error) -> ConnectorError {
    ConnectorError::Database {
        driver: DRIVER,
        msg: e.to_string(),
    }
}

fn decode_column(row: &tiberius::Row, idx: usize) -> Value {
    let col = &row.columns()[idx];
    match col.column_type() {
        tiberius::ColumnType::Bit | tiberius::ColumnType::Bitn => row
            .get::<bool, usize>(idx)
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        tiberius::ColumnType::Int1
        | tiberius::ColumnType::Int2
        | tiberius::ColumnType::Int4
        | tiberius::ColumnType::Int8
        | tiberius::ColumnType::Intn => row
            .get::<i64, usize>(idx)
            .map(Value::I64)
            .unwrap_or(Value::Null),
        tiberius::ColumnType::Float4
        | tiberius::ColumnType::Float8
        | tiberius::ColumnType::Floatn
        | tiberius::ColumnType::Money
        | tiberius::ColumnType::Money4
        | tiberius::ColumnType::Decimaln
        | tiberius::ColumnType::Numericn => row
            .get::<f64, usize>(idx)
            .map(Value::F64)
            .unwrap_or(Value::Null),
        _ => row
            .get::<&str, usize>(idx)
            .map(|s| Value::Text(s.to_string()))
            .unwrap_or(Value::Null),
    }
}

fn map_row(row: &tiberius::Row) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    for (idx, col) in row.columns().iter().enumerate() {
        out.insert(col.name().to_string(), decode_column(row, idx));
    }
    out
}

fn bind_params<'a>(query: &mut tiberius::Query<'a>, params: &'a [Value]) {
    for p in params {
        match p {
            Value::Null => query.bind(Option::<i32>::None),
            Value::Bool(b) => query.bind(*b),
            Value::I64(i) => query.bind(*i),
            Value::F64(f) => query.bind(*f),
            Value::Text(s) => query.bind(s.as_str()),
        }
    }
}

#[async_trait]
impl Connector for MssqlConnector {
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
        let mut client = self.client.lock().await;
        client.simple_query("SELECT 1").await.map_err(db_err)?;
        Ok(())
    }

    async fn list_tables(&self, _deadline: Deadline) -> Result<Vec<TableSummary>, ConnectorError> {
        let mut client = self.client.lock().await;
        let stream = client
            .simple_query(
                "SELECT t.name, CASE WHEN t.type = 'V' THEN 'view' ELSE 'table' END, \
                 ISNULL(p.rows, 0) FROM sys.objects t \
                 LEFT JOIN sys.partitions p ON p.object_id = t.object_id AND p.index_id IN (0, 1) \
                 WHERE t.type IN ('U', 'V') ORDER BY t.name",
            )
            .await
            .map_err(db_err)?;
        let rows = stream.into_first_result().await.map_err(db_err)?;
        Ok(rows
            .iter()
            .map(|row| {
                let name: &str = row.get(0).unwrap_or_default();
                let kind: &str = row.get(1).unwrap_or_default();
                let row_count: i64 = row.get(2).unwrap_or(0);
                TableSummary {
                    name: name.to_string(),
                    kind: if kind == "view" {
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
        let mut client = self.client.lock().await;
        let query = format!(
            "SELECT c.name, ty.name, c.is_nullable, \
             COLUMNPROPERTY(c.object_id, c.name, 'IsIdentity'), \
             CASE WHEN pk.column_id IS NOT NULL THEN 1 ELSE 0 END \
             FROM sys.columns c \
             JOIN sys.types ty ON ty.user_type_id = c.user_type_id \
             LEFT JOIN ( \
               SELECT ic.object_id, ic.column_id FROM sys.index_columns ic \
               JOIN sys.indexes i ON i.object_id = ic.object_id AND i.index_id = ic.index_id \
               WHERE i.is_primary_key = 1 \
             ) pk ON pk.object_id = c.object_id AND pk.column_id = c.column_id \
             WHERE c.object_id = OBJECT_ID('{}') ORDER BY c.column_id",
            name.replace('\'', "''")
        );
        let stream = client.simple_query(query).await.map_err(db_err)?;
        let rows = stream.into_first_result().await.map_err(db_err)?;
        if rows.is_empty() {
            return Err(ConnectorError::NotFound {
                entity: name.to_string(),
            });
        }

        let mut primary_key = Vec::new();
        let columns: Vec<ColumnInfo> = rows
            .iter()
            .map(|row| {
                let col_name: &str = row.get(0).unwrap_or_default();
                let native: &str = row.get(1).unwrap_or_default();
                let nullable: bool = row.get(2).unwrap_or(false);
                let is_pk: i32 = row.get(4).unwrap_or(0);
                if is_pk == 1 {
                    primary_key.push(col_name.to_string());
                }
                ColumnInfo {
                    logical_type: self.dialect.map_native_type(native),
                    nullable,
                    name: col_name.to_string(),
                    pk: is_pk == 1,
                    fk: None,
                    default: None,
                }
            })
            .collect();

        let fk_query = format!(
            "SELECT fc.name, rt.name, rc.name FROM sys.foreign_key_columns fkc \
             JOIN sys.columns fc ON fc.object_id = fkc.parent_object_id AND fc.column_id = fkc.parent_column_id \
             JOIN sys.columns rc ON rc.object_id = fkc.referenced_object_id AND rc.column_id = fkc.referenced_column_id \
             JOIN sys.objects rt ON rt.object_id = fkc.referenced_object_id \
             WHERE fkc.parent_object_id = OBJECT_ID('{}')",
            name.replace('\'', "''")
        );
        let fk_stream = client.simple_query(fk_query).await.map_err(db_err)?;
        let fk_rows = fk_stream.into_first_result().await.map_err(db_err)?;
        let foreign_keys = fk_rows
            .iter()
            .map(|row| ForeignKey {
                column: row.get::<&str, _>(0).unwrap_or_default().to_string(),
                ref_table: row.get::<&str, _>(1).unwrap_or_default().to_string(),
                ref_column: row.get::<&str, _>(2).unwrap_or_default().to_string(),
            })
            .collect();

        let count_query = format!(
            "SELECT SUM(p.rows) FROM sys.partitions p \
             WHERE p.object_id = OBJECT_ID('{}') AND p.index_id IN (0, 1)",
            name.replace('\'', "''")
        );
        let count_stream = client.simple_query(count_query).await.map_err(db_err)?;
        let count_rows = count_stream.into_first_result().await.map_err(db_err)?;
        let row_count: i64 = count_rows
            .first()
            .and_then(|r| r.get::<i64, _>(0))
            .unwrap_or(0);

        Ok(TableDetail {
            name: name.to_string(),
            schema: "dbo".to_string(),
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
        let mut client = self.client.lock().await;
        let stream = client
            .simple_query(
                "SELECT name, CASE WHEN type = 'FN' THEN 'function' ELSE 'procedure' END \
                 FROM sys.objects WHERE type IN ('P', 'FN') ORDER BY name",
            )
            .await
            .map_err(db_err)?;
        let rows = stream.into_first_result().await.map_err(db_err)?;
        Ok(rows
            .iter()
            .map(|row| {
                let name: &str = row.get(0).unwrap_or_default();
                let kind: &str = row.get(1).unwrap_or_default();
                ProcedureDetail {
                    name: name.to_string(),
                    kind: if kind == "function" {
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
        let mut client = self.client.lock().await;
        let query = format!(
            "SELECT p.name, ty.name, p.is_output, p.has_default_value \
             FROM sys.parameters p JOIN sys.types ty ON ty.user_type_id = p.user_type_id \
             WHERE p.object_id = OBJECT_ID('{}') ORDER BY p.parameter_id",
            name.replace('\'', "''")
        );
        let stream = client.simple_query(query).await.map_err(db_err)?;
        let rows = stream.into_first_result().await.map_err(db_err)?;
        let parameters = rows
            .iter()
            .map(|row| {
                let pname: &str = row.get(0).unwrap_or_default();
                let native: &str = row.get(1).unwrap_or_default();
                let is_output: bool = row.get(2).unwrap_or(false);
                ProcedureParam {
                    name: pname.trim_start_matches('@').to_string(),
                    logical_type: self.dialect.map_native_type(native),
                    direction: if is_output {
                        Direction::InOut
                    } else {
                        Direction::In
                    },
                    default: None,
                }
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
        let mut all_params: Vec<Value> = req.filter_params.to_vec();
        all_params.extend(pagination_params);

        let mut client = self.client.lock().await;
        let mut query = tiberius::Query::new(sql);
        bind_params(&mut query, &all_params);
        let stream = query.query(&mut client).await.map_err(db_err)?;
        let rows = stream.into_first_result().await.map_err(db_err)?;

        let columns = if req.columns.is_empty() {
            rows.first()
                .map(|r| r.columns().iter().map(|c| c.name().to_string()).collect())
                .unwrap_or_default()
        } else {
            req.columns.to_vec()
        };
        let mapped = rows.iter().map(map_row).collect();
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
        let mut client = self.client.lock().await;
        let mut query = tiberius::Query::new(sql);
        bind_params(&mut query, &params);
        let result = query.execute(&mut client).await.map_err(db_err)?;
        Ok(MutationResult {
            rows_affected: result.rows_affected().iter().sum(),
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
        let mut client = self.client.lock().await;
        let mut query = tiberius::Query::new(sql);
        bind_params(&mut query, &params);
        let result = query.execute(&mut client).await.map_err(db_err)?;
        Ok(MutationResult {
            rows_affected: result.rows_affected().iter().sum(),
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
        let mut client = self.client.lock().await;
        let mut query = tiberius::Query::new(sql);
        bind_params(&mut query, &params);
        let result = query.execute(&mut client).await.map_err(db_err)?;
        Ok(MutationResult {
            rows_affected: result.rows_affected().iter().sum(),
            returning: None,
        })
    }

    async fn call(
        &self,
        req: CallRequest<'_>,
        _deadline: Deadline,
    ) -> Result<ResultSet, ConnectorError> {
        let (sql, params) = self.dialect.build_call(req.name, req.params)?;
        let mut client = self.client.lock().await;
        let mut query = tiberius::Query::new(sql);
        bind_params(&mut query, &params);
        let stream = query.query(&mut client).await.map_err(db_err)?;
        let rows = stream.into_first_result().await.map_err(db_err)?;
        let columns = rows
            .first()
            .map(|r| r.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let mapped = rows.iter().map(map_row).collect();
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
        let mut client = self.client.lock().await;
        if is_write {
            guard_writes(self.read_only)?;
            let result = client.execute(sql, &[]).await.map_err(db_err)?;
            return Ok(ResultSet {
                columns: Vec::new(),
                rows: Vec::new(),
                total: Some(result.rows_affected().iter().sum::<u64>() as i64),
            });
        }
        let stream = client.simple_query(sql).await.map_err(db_err)?;
        let rows = stream.into_first_result().await.map_err(db_err)?;
        let columns = rows
            .first()
            .map(|r| r.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let mapped = rows.iter().map(map_row).collect();
        Ok(ResultSet {
            columns,
            rows: mapped,
            total: None,
        })
    }
}
