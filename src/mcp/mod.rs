//! MCP adapter: bridges the internal [`ToolRegistry`] to `rmcp`'s
//! `ServerHandler`.
//!
//! The `#[tool_router]`/`#[tool]` macro family (used by the single-static-
//! tool-set examples in this corpus) fixes its tool list at compile time; it
//! can't express `enable_table_tools` growing the live tool set mid-session
//! or the `tools/list_changed` notification that follows. So this handler is
//! written by hand against `ServerHandler::list_tools`/`call_tool` instead.
//!
//! Open question (recorded in DESIGN.md): MCP's stdio transport carries no
//! per-request caller identity, so every call in a session runs as one
//! configured default `Role` rather than a role resolved per request.

use std::sync::Arc;

use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, Implementation, ListToolsResult,
    PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo, Tool, ToolAnnotations as RmcpToolAnnotations,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler};
use serde_json::{Map, Value as Json};
use tracing::{error, warn};

use crate::access::{AccessEngine, Role};
use crate::audit::AuditSink;
use crate::connector::Connector;
use crate::dialect::Dialect;
use crate::engine::QueryEngine;
use crate::error::Error;
use crate::registry::{ToolAnnotations, ToolDescriptor, ToolOutcome, ToolRegistry};
use crate::schema::{CacheHandle, SchemaCache};
use crate::validate::Validator;

/// Everything the MCP server needs for the lifetime of the process. Owns the
/// connector/dialect/validator/audit sink outright; `QueryEngine` and
/// `AccessEngine` are cheap borrowing wrappers reconstructed for each call
/// rather than stored (SPEC_FULL.md §2 ownership note: the Query Engine
/// "borrows Connector, Cache, Validator and Access Engine for the duration
/// of a call").
pub struct TabletoolServer {
    connector: Arc<dyn Connector>,
    dialect: Box<dyn Dialect>,
    validator: Validator,
    audit: Box<dyn AuditSink>,
    schema: Arc<SchemaCache>,
    registry: ToolRegistry,
    role: Role,
    query_timeout: std::time::Duration,
    mask_pii: bool,
    _cache_handle: CacheHandle,
}

impl TabletoolServer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        connector: Arc<dyn Connector>,
        dialect: Box<dyn Dialect>,
        validator: Validator,
        audit: Box<dyn AuditSink>,
        schema: Arc<SchemaCache>,
        registry: ToolRegistry,
        role: Role,
        query_timeout: std::time::Duration,
        mask_pii: bool,
        cache_handle: CacheHandle,
    ) -> Self {
        TabletoolServer {
            connector,
            dialect,
            validator,
            audit,
            schema,
            registry,
            role,
            query_timeout,
            mask_pii,
            _cache_handle: cache_handle,
        }
    }

    fn to_rmcp_tool(desc: ToolDescriptor) -> Tool {
        let schema: Map<String, Json> = desc.input_schema;
        let mut tool = Tool::new(desc.name, desc.description, Arc::new(schema));
        tool.annotations = Some(to_rmcp_annotations(&desc.annotations));
        tool
    }

    async fn run_tool(&self, name: &str, args: Json) -> Result<ToolOutcome, Error> {
        let access = AccessEngine::new(self.audit.as_ref());
        let engine = QueryEngine::new(
            self.connector.as_ref(),
            self.dialect.as_ref(),
            &self.validator,
            &access,
            self.mask_pii,
        );
        let ctx = crate::registry::ExecCtx {
            engine: &engine,
            connector: self.connector.as_ref(),
            schema: self.schema.as_ref(),
            role: &self.role,
            query_timeout: self.query_timeout,
        };
        self.registry.dispatch(name, args, &ctx).await
    }
}

fn to_rmcp_annotations(a: &ToolAnnotations) -> RmcpToolAnnotations {
    RmcpToolAnnotations {
        title: None,
        read_only_hint: Some(a.read_only),
        destructive_hint: Some(a.destructive),
        idempotent_hint: Some(a.idempotent),
        open_world_hint: Some(a.open_world),
    }
}

/// Render a [`ToolOutcome`] into the MCP result's text content block. Every
/// variant is a plain JSON value; callers parse the JSON rather than
/// scraping prose, so there is no free-text summarization layer here.
fn outcome_to_result(outcome: ToolOutcome) -> Result<CallToolResult, McpError> {
    let value = match outcome {
        ToolOutcome::Tables(tables) => serde_json::to_value(tables),
        ToolOutcome::Detail(detail) => serde_json::to_value(detail),
        ToolOutcome::Result(result) => serde_json::to_value(result),
        ToolOutcome::Mutation(mutation) => serde_json::to_value(mutation),
        ToolOutcome::Procedures(procs) => serde_json::to_value(procs),
        ToolOutcome::ProcedureDetail(detail) => serde_json::to_value(detail),
        ToolOutcome::Enabled(names) => serde_json::to_value(serde_json::json!({ "tools": names })),
        ToolOutcome::Refreshed => serde_json::to_value(serde_json::json!({ "status": "refreshed" })),
    }
    .map_err(|e| McpError::internal_error(format!("failed to serialize tool result: {e}"), None))?;

    let text = serde_json::to_string_pretty(&value)
        .map_err(|e| McpError::internal_error(format!("failed to render tool result: {e}"), None))?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

fn error_to_mcp(name: &str, err: Error) -> McpError {
    match err {
        Error::Access(_) => McpError::invalid_request(err.user_message(), None),
        Error::Validation(_) | Error::Injection(_) | Error::Parse(_) => {
            McpError::invalid_params(err.user_message(), None)
        }
        Error::NotFound { .. } => McpError::invalid_params(err.user_message(), None),
        Error::Timeout => McpError::internal_error(err.user_message(), None),
        other => {
            error!(tool = %name, error = %other, "tool dispatch failed");
            McpError::internal_error(other.user_message(), None)
        }
    }
}

impl ServerHandler for TabletoolServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "tabletool".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "Relational database tool surface. list_tables/describe_table explore the \
                 schema, query runs a scoped read, enable_table_tools grows the tool set with \
                 per-table query_<table>/get_<table>_by_id (and insert_/update_/delete_<table> \
                 when writes are enabled). refresh_schema forces a cache reload. raw_sql and \
                 execute_sql (when enabled) accept arbitrary SQL text."
                    .to_string(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        let tools = self
            .registry
            .list_tools()
            .await
            .into_iter()
            .map(Self::to_rmcp_tool)
            .collect();
        Ok(ListToolsResult {
            tools,
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let name = request.name.to_string();
        let args = request
            .arguments
            .map(Json::Object)
            .unwrap_or_else(|| Json::Object(Map::new()));

        let tables_before = if name == "enable_table_tools" {
            Some(self.registry.list_tools().await.len())
        } else {
            None
        };

        let outcome = self.run_tool(&name, args).await.map_err(|e| error_to_mcp(&name, e))?;

        if let Some(before) = tables_before {
            let after = self.registry.list_tools().await.len();
            if after != before {
                if let Err(e) = context.peer.notify_tool_list_changed().await {
                    warn!(error = %e, "failed to send tools/list_changed notification");
                }
            }
        }

        outcome_to_result(outcome)
    }
}
