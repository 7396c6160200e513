//! The Tool Generator (SPEC_FULL.md §4.10): owns the mutable tool registry,
//! synthesizes Tier 1 and Tier 2 tool descriptors and JSON schemas from the
//! schema cache, and dispatches a named call into the Query Engine. The MCP
//! adapter (`crate::mcp`) is the only caller — this module knows nothing
//! about the wire protocol.

mod schema_json;

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::{Map, Value as Json};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::access::Role;
use crate::connector::{Connector, MutationResult, ResultSet};
use crate::dialect::{Assignment, Direction, ProcParam, Row};
use crate::engine::{FilterInput, QueryEngine, SelectArgs};
use crate::error::Error;
use crate::schema::{ProcedureDetail, SchemaCache, TableDetail, TableSummary};
use crate::value::Value;

use schema_json::{object_schema, table_columns_enum, table_pk_properties, table_row_properties};

/// Hard cap on distinct tables carrying Tier 2 tools within one session
/// (SPEC_FULL.md §4.10 state machine, §2 ownership note).
pub const MAX_DYNAMIC_TABLES: usize = 20;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("enabling {requested} table(s) would exceed the {max} dynamic table limit ({current} already enabled)")]
    TooManyTables {
        requested: usize,
        current: usize,
        max: usize,
    },
    #[error("unknown tool '{0}'")]
    UnknownTool(String),
    #[error("argument error: {0}")]
    BadArgs(String),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ToolAnnotations {
    pub read_only: bool,
    pub destructive: bool,
    pub idempotent: bool,
    pub open_world: bool,
}

#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Map<String, Json>,
    pub annotations: ToolAnnotations,
}

/// What a tool call resolves to; the MCP adapter serializes this to the
/// protocol's content blocks.
#[derive(Debug)]
pub enum ToolOutcome {
    Tables(Vec<TableSummary>),
    Detail(Box<TableDetail>),
    Result(ResultSet),
    Mutation(MutationResult),
    Procedures(Vec<ProcedureDetail>),
    ProcedureDetail(Box<ProcedureDetail>),
    Enabled(Vec<String>),
    Refreshed,
}

/// Per-call context the registry needs to actually run a tool; bundled so
/// `dispatch` takes one argument instead of five.
pub struct ExecCtx<'a> {
    pub engine: &'a QueryEngine<'a>,
    pub connector: &'a dyn Connector,
    pub schema: &'a SchemaCache,
    pub role: &'a Role,
    pub query_timeout: Duration,
}

pub struct ToolRegistry {
    allow_raw_sql: bool,
    allow_writes: bool,
    read_only_connector: bool,
    max_dynamic_tables: usize,
    enabled: RwLock<BTreeMap<String, TableDetail>>,
}

impl ToolRegistry {
    pub fn new(allow_raw_sql: bool, allow_writes: bool, read_only_connector: bool) -> Self {
        ToolRegistry {
            allow_raw_sql,
            allow_writes,
            read_only_connector,
            max_dynamic_tables: MAX_DYNAMIC_TABLES,
            enabled: RwLock::new(BTreeMap::new()),
        }
    }

    /// Whether write tools (Tier 1 `execute_sql` and Tier 2 mutators) may be
    /// synthesized at all: the config flag must allow it *and* the live
    /// connector must not be hard-wired read-only (§1.2 supplement).
    fn writes_available(&self) -> bool {
        self.allow_writes && !self.read_only_connector
    }

    pub async fn list_tools(&self) -> Vec<ToolDescriptor> {
        let mut tools = tier1_descriptors(self.allow_raw_sql, self.writes_available());
        let guard = self.enabled.read().await;
        for detail in guard.values() {
            tools.extend(tier2_descriptors(detail, self.writes_available()));
        }
        tools
    }

    /// Idempotent: tables already enabled don't count against the cap, and
    /// re-enabling one just refreshes its cached `TableDetail`. Returns the
    /// full set of Tier 2 tool names now live for the requested tables (not
    /// just newly-added ones), matching scenario 8 in SPEC_FULL.md §8.
    pub async fn enable_table_tools(
        &self,
        tables: &[String],
        schema: &SchemaCache,
    ) -> Result<Vec<String>, Error> {
        let mut guard = self.enabled.write().await;
        let new_count = tables.iter().filter(|t| !guard.contains_key(*t)).count();
        if guard.len() + new_count > self.max_dynamic_tables {
            return Err(Error::Internal(
                RegistryError::TooManyTables {
                    requested: new_count,
                    current: guard.len(),
                    max: self.max_dynamic_tables,
                }
                .to_string(),
            ));
        }

        let mut names = Vec::new();
        for table in tables {
            let detail = schema
                .describe_table(table)
                .await
                .map_err(|e| Error::Internal(e.to_string()))?;
            for d in tier2_descriptors(&detail, self.writes_available()) {
                names.push(d.name);
            }
            guard.insert(table.clone(), detail);
        }
        info!(tables = ?tables, "enable_table_tools: registry updated");
        Ok(names)
    }

    pub async fn dispatch(&self, name: &str, args: Json, ctx: &ExecCtx<'_>) -> Result<ToolOutcome, Error> {
        debug!(tool = %name, "dispatching tool call");
        if let Some(outcome) = self.dispatch_tier1(name, &args, ctx).await? {
            return Ok(outcome);
        }
        self.dispatch_tier2(name, args, ctx).await
    }

    async fn dispatch_tier1(
        &self,
        name: &str,
        args: &Json,
        ctx: &ExecCtx<'_>,
    ) -> Result<Option<ToolOutcome>, Error> {
        match name {
            "list_tables" => {
                let tables = ctx
                    .schema
                    .list_tables()
                    .await
                    .map_err(|e| Error::Internal(e.to_string()))?;
                Ok(Some(ToolOutcome::Tables(tables)))
            }
            "describe_table" => {
                let table = arg_str(args, "table")?;
                let detail = ctx
                    .schema
                    .describe_table(&table)
                    .await
                    .map_err(|e| Error::Internal(e.to_string()))?;
                Ok(Some(ToolOutcome::Detail(Box::new(detail))))
            }
            "query" => {
                let table = arg_str(args, "table")?;
                let detail = ctx
                    .schema
                    .describe_table(&table)
                    .await
                    .map_err(|e| Error::Internal(e.to_string()))?;
                let known_columns = column_names(&detail);
                let select_args = select_args_for_table(&table, args, known_columns)?;
                let result = ctx.engine.query(ctx.role, select_args, ctx.query_timeout).await?;
                Ok(Some(ToolOutcome::Result(result)))
            }
            "enable_table_tools" => {
                let tables = arg_str_vec(args, "tables")?;
                let names = self.enable_table_tools(&tables, ctx.schema).await?;
                Ok(Some(ToolOutcome::Enabled(names)))
            }
            "refresh_schema" => {
                ctx.schema.refresh().await;
                Ok(Some(ToolOutcome::Refreshed))
            }
            "list_procedures" => {
                let procs = ctx
                    .connector
                    .list_procedures(crate::connector::Deadline::from_timeout(ctx.query_timeout))
                    .await?;
                Ok(Some(ToolOutcome::Procedures(procs)))
            }
            "call_procedure" => {
                let proc_name = arg_str(args, "name")?;
                let params = proc_params_from_json(args)?;
                let result = ctx
                    .engine
                    .call_procedure(ctx.role, &proc_name, params, ctx.query_timeout)
                    .await?;
                Ok(Some(ToolOutcome::Result(result)))
            }
            "raw_sql" if self.allow_raw_sql => {
                let sql = arg_str(args, "sql")?;
                reject_unless_read_statement(&sql)?;
                let deadline = crate::connector::Deadline::from_timeout(ctx.query_timeout);
                let mut result = ctx.connector.execute_raw(&sql, false, deadline).await?;
                if ctx.engine.mask_pii_enabled() {
                    result.columns = crate::pii::filter_columns(&result.columns);
                    for row in &mut result.rows {
                        crate::pii::mask_row(row);
                    }
                }
                Ok(Some(ToolOutcome::Result(result)))
            }
            "execute_sql" if self.allow_raw_sql && self.writes_available() => {
                let sql = arg_str(args, "sql")?;
                let deadline = crate::connector::Deadline::from_timeout(ctx.query_timeout);
                let result = ctx.connector.execute_raw(&sql, true, deadline).await?;
                Ok(Some(ToolOutcome::Mutation(MutationResult {
                    rows_affected: result.total.unwrap_or(0).max(0) as u64,
                    returning: None,
                })))
            }
            _ => Ok(None),
        }
    }

    async fn dispatch_tier2(&self, name: &str, args: Json, ctx: &ExecCtx<'_>) -> Result<ToolOutcome, Error> {
        let guard = self.enabled.read().await;
        for (table, detail) in guard.iter() {
            if name == format!("query_{table}") {
                let select_args = select_args_for_table(table, &args, column_names(detail))?;
                let result = ctx.engine.query(ctx.role, select_args, ctx.query_timeout).await?;
                return Ok(ToolOutcome::Result(result));
            }
            if name == format!("get_{table}_by_id") && !detail.primary_key.is_empty() {
                let filter = pk_filter_json(&detail.primary_key, &args)?;
                let select_args = SelectArgs {
                    table: table.clone(),
                    columns: Vec::new(),
                    known_columns: column_names(detail),
                    filter: Some(FilterInput::JsonForm(filter)),
                    order_by: None,
                    limit: 1,
                    offset: 0,
                };
                let result = ctx.engine.query(ctx.role, select_args, ctx.query_timeout).await?;
                return Ok(ToolOutcome::Result(result));
            }
            if self.writes_available() && name == format!("insert_{table}") {
                let rows = rows_from_json(&args)?;
                let result = ctx.engine.insert(ctx.role, table, rows, ctx.query_timeout).await?;
                return Ok(ToolOutcome::Mutation(result));
            }
            if self.writes_available() && name == format!("update_{table}") {
                let assignments = assignments_from_json(&args)?;
                let filter = filter_from_json(&args)?;
                let result = ctx
                    .engine
                    .update(ctx.role, table, assignments, filter, ctx.query_timeout)
                    .await?;
                return Ok(ToolOutcome::Mutation(result));
            }
            if self.writes_available() && name == format!("delete_{table}") {
                let filter = filter_from_json(&args)?;
                let result = ctx.engine.delete(ctx.role, table, filter, ctx.query_timeout).await?;
                return Ok(ToolOutcome::Mutation(result));
            }
        }
        drop(guard);
        Err(Error::Internal(RegistryError::UnknownTool(name.to_string()).to_string()))
    }
}

fn tier1_descriptors(allow_raw_sql: bool, writes_available: bool) -> Vec<ToolDescriptor> {
    let mut tools = vec![
        ToolDescriptor {
            name: "list_tables".to_string(),
            description: "List every table and view visible to this connection, with an engine-native row-count estimate.".to_string(),
            input_schema: object_schema(&[], &[]),
            annotations: ToolAnnotations {
                read_only: true,
                idempotent: true,
                ..Default::default()
            },
        },
        ToolDescriptor {
            name: "describe_table".to_string(),
            description: "Describe one table's columns, primary key, foreign keys, and indexes.".to_string(),
            input_schema: object_schema(&[("table", schema_json::string_prop(None))], &["table"]),
            annotations: ToolAnnotations {
                read_only: true,
                idempotent: true,
                ..Default::default()
            },
        },
        ToolDescriptor {
            name: "query".to_string(),
            description: "Run a filtered, paginated SELECT against one table. Filter accepts either the compact string grammar (\"age > 18 AND state = 'CA'\") or a JSON operator object.".to_string(),
            input_schema: query_tool_schema("table"),
            annotations: ToolAnnotations {
                read_only: true,
                idempotent: true,
                ..Default::default()
            },
        },
        ToolDescriptor {
            name: "enable_table_tools".to_string(),
            description: format!(
                "Generate query/get/insert/update/delete tools scoped to the named tables. At most {MAX_DYNAMIC_TABLES} distinct tables may be enabled per session."
            ),
            input_schema: object_schema(
                &[("tables", schema_json::string_array_prop())],
                &["tables"],
            ),
            annotations: ToolAnnotations {
                idempotent: true,
                ..Default::default()
            },
        },
        ToolDescriptor {
            name: "refresh_schema".to_string(),
            description: "Force an immediate schema cache refresh instead of waiting for the next background tick.".to_string(),
            input_schema: object_schema(&[], &[]),
            annotations: ToolAnnotations {
                idempotent: true,
                ..Default::default()
            },
        },
        ToolDescriptor {
            name: "list_procedures".to_string(),
            description: "List stored procedures and functions callable on this connection.".to_string(),
            input_schema: object_schema(&[], &[]),
            annotations: ToolAnnotations {
                read_only: true,
                idempotent: true,
                ..Default::default()
            },
        },
        ToolDescriptor {
            name: "call_procedure".to_string(),
            description: "Call a stored procedure or function by name with named parameters.".to_string(),
            input_schema: object_schema(
                &[
                    ("name", schema_json::string_prop(None)),
                    ("params", schema_json::object_prop()),
                ],
                &["name"],
            ),
            annotations: ToolAnnotations {
                open_world: true,
                ..Default::default()
            },
        },
    ];

    if allow_raw_sql {
        tools.push(ToolDescriptor {
            name: "raw_sql".to_string(),
            description: "Run a raw SELECT/WITH/EXPLAIN/SHOW statement. No other statement kind is accepted.".to_string(),
            input_schema: object_schema(&[("sql", schema_json::string_prop(None))], &["sql"]),
            annotations: ToolAnnotations {
                read_only: true,
                open_world: true,
                ..Default::default()
            },
        });
        if writes_available {
            tools.push(ToolDescriptor {
                name: "execute_sql".to_string(),
                description: "Run a raw write statement. Irreversible; disabled unless the connection allows writes.".to_string(),
                input_schema: object_schema(&[("sql", schema_json::string_prop(None))], &["sql"]),
                annotations: ToolAnnotations {
                    destructive: true,
                    open_world: true,
                    ..Default::default()
                },
            });
        }
    }

    tools
}

fn tier2_descriptors(detail: &TableDetail, writes_available: bool) -> Vec<ToolDescriptor> {
    let table = &detail.name;
    let mut tools = vec![ToolDescriptor {
        name: format!("query_{table}"),
        description: format!("Run a filtered, paginated SELECT against `{table}`."),
        input_schema: query_tool_schema_for_table(detail),
        annotations: ToolAnnotations {
            read_only: true,
            idempotent: true,
            ..Default::default()
        },
    }];

    if !detail.primary_key.is_empty() {
        tools.push(ToolDescriptor {
            name: format!("get_{table}_by_id"),
            description: format!("Fetch one row of `{table}` by its primary key."),
            input_schema: object_schema(
                &table_pk_properties(detail),
                &detail.primary_key.iter().map(String::as_str).collect::<Vec<_>>(),
            ),
            annotations: ToolAnnotations {
                read_only: true,
                idempotent: true,
                ..Default::default()
            },
        });
    }

    if writes_available {
        tools.push(ToolDescriptor {
            name: format!("insert_{table}"),
            description: format!("Insert one or more rows into `{table}`."),
            input_schema: object_schema(
                &[("rows", schema_json::row_array_prop(&table_row_properties(detail)))],
                &["rows"],
            ),
            annotations: ToolAnnotations::default(),
        });
        tools.push(ToolDescriptor {
            name: format!("update_{table}"),
            description: format!("Update rows of `{table}` matching a required, non-empty filter."),
            input_schema: object_schema(
                &[
                    ("set", schema_json::object_prop()),
                    ("filter", schema_json::filter_prop()),
                ],
                &["set", "filter"],
            ),
            annotations: ToolAnnotations {
                destructive: true,
                idempotent: true,
                ..Default::default()
            },
        });
        tools.push(ToolDescriptor {
            name: format!("delete_{table}"),
            description: format!("Delete rows of `{table}` matching a required, non-empty filter."),
            input_schema: object_schema(&[("filter", schema_json::filter_prop())], &["filter"]),
            annotations: ToolAnnotations {
                destructive: true,
                idempotent: true,
                ..Default::default()
            },
        });
    }

    tools
}

fn query_tool_schema(table_field: &str) -> Map<String, Json> {
    object_schema(
        &[
            (table_field, schema_json::string_prop(None)),
            ("columns", schema_json::string_array_prop()),
            ("filter", schema_json::filter_prop()),
            ("order_by", schema_json::string_prop(None)),
            ("limit", schema_json::integer_prop()),
            ("offset", schema_json::integer_prop()),
        ],
        &[table_field],
    )
}

fn query_tool_schema_for_table(detail: &TableDetail) -> Map<String, Json> {
    object_schema(
        &[
            ("columns", table_columns_enum(detail)),
            ("filter", schema_json::filter_prop()),
            ("order_by", schema_json::string_prop(None)),
            ("limit", schema_json::integer_prop()),
            ("offset", schema_json::integer_prop()),
        ],
        &[],
    )
}

fn arg_str(args: &Json, field: &str) -> Result<String, Error> {
    args.get(field)
        .and_then(Json::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::Internal(RegistryError::BadArgs(format!("missing required field '{field}'")).to_string()))
}

fn arg_str_vec(args: &Json, field: &str) -> Result<Vec<String>, Error> {
    args.get(field)
        .and_then(Json::as_array)
        .map(|a| a.iter().filter_map(Json::as_str).map(str::to_string).collect())
        .ok_or_else(|| Error::Internal(RegistryError::BadArgs(format!("missing required array field '{field}'")).to_string()))
}

fn json_to_value(v: &Json) -> Value {
    match v {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::I64(i)
            } else {
                Value::F64(n.as_f64().unwrap_or_default())
            }
        }
        Json::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}

fn filter_input_from_json(v: &Json) -> FilterInput {
    match v {
        Json::String(s) => FilterInput::StringForm(s.clone()),
        other => FilterInput::JsonForm(other.clone()),
    }
}

fn filter_from_json(args: &Json) -> Result<FilterInput, Error> {
    args.get("filter")
        .map(filter_input_from_json)
        .ok_or_else(|| Error::Internal(RegistryError::BadArgs("missing required field 'filter'".to_string()).to_string()))
}

fn column_names(detail: &TableDetail) -> Vec<String> {
    detail.columns.iter().map(|c| c.name.clone()).collect()
}

fn select_args_for_table(table: &str, args: &Json, known_columns: Vec<String>) -> Result<SelectArgs, Error> {
    let columns = args
        .get("columns")
        .and_then(Json::as_array)
        .map(|a| a.iter().filter_map(Json::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    let filter = args.get("filter").map(filter_input_from_json);
    let order_by = args.get("order_by").and_then(Json::as_str).map(str::to_string);
    let limit = args.get("limit").and_then(Json::as_i64).unwrap_or(0);
    let offset = args.get("offset").and_then(Json::as_i64).unwrap_or(0);
    Ok(SelectArgs {
        table: table.to_string(),
        columns,
        known_columns,
        filter,
        order_by,
        limit,
        offset,
    })
}

fn pk_filter_json(pk: &[String], args: &Json) -> Result<Json, Error> {
    let mut obj = Map::new();
    for col in pk {
        let v = args
            .get(col)
            .ok_or_else(|| Error::Internal(RegistryError::BadArgs(format!("missing primary key field '{col}'")).to_string()))?;
        obj.insert(col.clone(), v.clone());
    }
    Ok(Json::Object(obj))
}

fn rows_from_json(args: &Json) -> Result<Vec<Row>, Error> {
    let arr = args
        .get("rows")
        .and_then(Json::as_array)
        .ok_or_else(|| Error::Internal(RegistryError::BadArgs("missing required array field 'rows'".to_string()).to_string()))?;
    let mut rows = Vec::with_capacity(arr.len());
    for item in arr {
        let obj = item
            .as_object()
            .ok_or_else(|| Error::Internal(RegistryError::BadArgs("each row must be a JSON object".to_string()).to_string()))?;
        let mut row = Row::new();
        for (k, v) in obj {
            row.insert(k.clone(), json_to_value(v));
        }
        rows.push(row);
    }
    Ok(rows)
}

fn assignments_from_json(args: &Json) -> Result<Vec<Assignment>, Error> {
    let obj = args
        .get("set")
        .and_then(Json::as_object)
        .ok_or_else(|| Error::Internal(RegistryError::BadArgs("missing required object field 'set'".to_string()).to_string()))?;
    Ok(obj.iter().map(|(k, v)| (k.clone(), json_to_value(v))).collect())
}

fn proc_params_from_json(args: &Json) -> Result<Vec<ProcParam>, Error> {
    let obj = args.get("params").and_then(Json::as_object);
    let Some(obj) = obj else { return Ok(Vec::new()) };
    Ok(obj
        .iter()
        .map(|(k, v)| ProcParam {
            name: k.clone(),
            value: json_to_value(v),
            direction: Direction::In,
        })
        .collect())
}

fn reject_unless_read_statement(sql: &str) -> Result<(), Error> {
    let upper = sql.trim_start().to_ascii_uppercase();
    let allowed = ["SELECT", "WITH", "EXPLAIN", "SHOW"];
    if allowed.iter().any(|p| upper.starts_with(p)) {
        Ok(())
    } else {
        Err(Error::Internal(
            "raw_sql only accepts statements beginning with SELECT, WITH, EXPLAIN, or SHOW".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::LogicalType;
    use crate::schema::ColumnInfo;

    fn sample_detail(name: &str) -> TableDetail {
        TableDetail {
            name: name.to_string(),
            schema: "public".to_string(),
            columns: vec![ColumnInfo {
                name: "id".to_string(),
                logical_type: LogicalType::Integer,
                nullable: false,
                pk: true,
                fk: None,
                default: None,
            }],
            primary_key: vec!["id".to_string()],
            foreign_keys: vec![],
            indexes: vec![],
            row_count: 0,
            description: None,
        }
    }

    #[test]
    fn tier1_excludes_raw_sql_when_disabled() {
        let tools = tier1_descriptors(false, false);
        assert!(!tools.iter().any(|t| t.name == "raw_sql"));
        assert!(tools.iter().any(|t| t.name == "query"));
    }

    #[test]
    fn tier1_adds_execute_sql_only_when_writes_and_raw_sql_allowed() {
        let tools = tier1_descriptors(true, false);
        assert!(tools.iter().any(|t| t.name == "raw_sql"));
        assert!(!tools.iter().any(|t| t.name == "execute_sql"));

        let tools = tier1_descriptors(true, true);
        assert!(tools.iter().any(|t| t.name == "execute_sql"));
    }

    #[test]
    fn tier2_names_match_scenario_8() {
        let detail = sample_detail("users");
        let names: Vec<String> = tier2_descriptors(&detail, true).into_iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                "query_users".to_string(),
                "get_users_by_id".to_string(),
                "insert_users".to_string(),
                "update_users".to_string(),
                "delete_users".to_string(),
            ]
        );
    }

    #[test]
    fn tier2_skips_get_by_id_without_primary_key() {
        let mut detail = sample_detail("logs");
        detail.primary_key = vec![];
        let names: Vec<String> = tier2_descriptors(&detail, false).into_iter().map(|t| t.name).collect();
        assert!(!names.iter().any(|n| n.starts_with("get_")));
    }

    #[tokio::test]
    async fn enable_table_tools_rejects_over_cap() {
        let registry = ToolRegistry::new(false, false, false);
        let mut guard = registry.enabled.write().await;
        for i in 0..MAX_DYNAMIC_TABLES {
            guard.insert(format!("t{i}"), sample_detail(&format!("t{i}")));
        }
        drop(guard);

        use async_trait::async_trait;

        struct FakeProvider;
        #[async_trait]
        impl crate::schema::SchemaProvider for FakeProvider {
            async fn list_tables(&self) -> anyhow::Result<Vec<TableSummary>> {
                Ok(vec![])
            }
            async fn describe_table(&self, name: &str) -> anyhow::Result<TableDetail> {
                Ok(sample_detail(name))
            }
        }
        let cache = SchemaCache::new(std::sync::Arc::new(FakeProvider), Duration::from_secs(60), 0);
        let err = registry
            .enable_table_tools(&["overflow".to_string()], &cache)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exceed"));
    }

    #[test]
    fn reject_unless_read_statement_blocks_writes() {
        assert!(reject_unless_read_statement("SELECT 1").is_ok());
        assert!(reject_unless_read_statement("select * from t").is_ok());
        assert!(reject_unless_read_statement("DELETE FROM t").is_err());
    }
}
