use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use rmcp::transport::stdio;
use rmcp::ServiceExt;

use tabletool::audit::{AuditSink, TracingAuditSink};
use tabletool::config::AppConfig;
use tabletool::connector::{self, ConnectorSchemaProvider};
use tabletool::dialect::dialect_for_scheme;
use tabletool::mcp::TabletoolServer;
use tabletool::registry::ToolRegistry;
use tabletool::schema::SchemaCache;
use tabletool::validate::Validator;

#[derive(Parser)]
#[command(name = "tabletool-server", about = "Relational database MCP tool server")]
struct Cli {
    /// Path to config file (TOML/YAML/JSON, extension-sniffed)
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let now = Instant::now();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    tracing::info!("starting tabletool MCP server");

    let config = AppConfig::load(&cli.config).context("loading configuration")?;
    config.validate().context("validating configuration")?;
    tracing::info!(path = %cli.config, "configuration loaded");

    let roles = config.roles().context("parsing configured roles")?;
    let role = roles
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("configuration must define at least one access.roles entry"))?;
    tracing::info!(role = %role.name, "operating as default role (stdio transport carries no per-call identity)");

    let scheme = url::Url::parse(&config.connection.dsn)
        .context("parsing connection.dsn")?
        .scheme()
        .to_string();
    let dialect = dialect_for_scheme(&scheme).ok_or_else(|| anyhow!("unsupported DSN scheme '{scheme}'"))?;

    let connector: Arc<dyn connector::Connector> =
        Arc::from(connector::open(&config.connection.dsn, config.connection.read_only).await?);
    connector
        .ping(connector::Deadline::from_timeout(config.query_limits.query_timeout()))
        .await
        .context("pinging database on startup")?;
    tracing::info!(driver = connector.driver_name(), "connector ready");

    let provider = Arc::new(ConnectorSchemaProvider::new(
        connector.clone(),
        config.query_limits.query_timeout(),
    ));
    let schema = SchemaCache::new(provider, config.cache.ttl(), config.cache.max_tables);
    let cache_handle = schema.spawn_refresh(config.cache.refresh_interval());

    let validator = Validator {
        max_rows: config.query_limits.max_rows,
        max_result_bytes: config.query_limits.max_result_bytes,
        query_timeout: config.query_limits.query_timeout(),
        max_filter_depth: config.query_limits.max_filter_depth,
        allow_writes: config.query_limits.allow_writes,
    };

    let audit: Box<dyn AuditSink> = Box::new(TracingAuditSink);

    let registry = ToolRegistry::new(
        config.query_limits.allow_raw_sql,
        config.query_limits.allow_writes,
        connector.read_only(),
    );

    let server = TabletoolServer::new(
        connector,
        dialect,
        validator,
        audit,
        schema,
        registry,
        role,
        config.query_limits.query_timeout(),
        config.pii.mask_pii,
        cache_handle,
    );

    tracing::info!(startup_ms = now.elapsed().as_millis(), "tabletool server ready, serving over stdio");

    let service = server.serve(stdio()).await.inspect_err(|e| {
        tracing::error!(error = %e, "failed to start MCP service");
    })?;

    service.waiting().await?;
    Ok(())
}
