//! End-to-end exercise of the full stack against a real SQLite file: open a
//! connector, seed a table with raw DDL, drive it through the Schema Cache,
//! Tool Registry, and a `QueryEngine` built the way `bin/server.rs` builds
//! one. No mocks below the `Connector` trait boundary.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::NamedTempFile;

use tabletool::access::{AccessEngine, Role, TablePolicy, Verb};
use tabletool::audit::NoopAuditSink;
use tabletool::connector::{Connector, ConnectorSchemaProvider, Deadline, SqliteConnector};
use tabletool::dialect::SqliteDialect;
use tabletool::engine::QueryEngine;
use tabletool::registry::{ExecCtx, ToolOutcome, ToolRegistry};
use tabletool::schema::SchemaCache;
use tabletool::validate::Validator;

async fn seed_db() -> (NamedTempFile, SqliteConnector) {
    let file = NamedTempFile::new().expect("tempfile");
    let dsn = format!("sqlite://{}", file.path().display());
    let connector = SqliteConnector::open(&dsn, false).await.expect("open sqlite");
    let deadline = Deadline::from_timeout(Duration::from_secs(5));
    connector
        .execute_raw(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, ssn TEXT)",
            true,
            deadline,
        )
        .await
        .expect("create table");
    connector
        .execute_raw(
            "INSERT INTO users (id, name, ssn) VALUES (1, 'Ada', '123-45-6789'), (2, 'Grace', '987-65-4321')",
            true,
            deadline,
        )
        .await
        .expect("seed rows");
    (file, connector)
}

fn admin_role() -> Role {
    Role {
        name: "admin".to_string(),
        max_rows_per_query: 100,
        tables: vec![TablePolicy {
            name: "*".to_string(),
            verbs: [Verb::Select, Verb::Insert, Verb::Update, Verb::Delete].into_iter().collect(),
            deny_columns: vec!["ssn".to_string()],
            mask_columns: vec![],
            row_filter: None,
        }],
    }
}

#[tokio::test]
async fn list_tables_and_describe_round_trip() {
    let (_file, connector) = seed_db().await;
    let provider = Arc::new(ConnectorSchemaProvider::new(
        Arc::new(connector),
        Duration::from_secs(5),
    ));
    let schema = SchemaCache::new(provider, Duration::from_secs(60), 0);

    let tables = schema.list_tables().await.expect("list_tables");
    assert!(tables.iter().any(|t| t.name == "users"));

    let detail = schema.describe_table("users").await.expect("describe_table");
    assert_eq!(detail.primary_key, vec!["id".to_string()]);
    assert!(detail.columns.iter().any(|c| c.name == "ssn"));
}

#[tokio::test]
async fn enable_table_tools_then_query_denies_ssn_column() {
    let (_file, connector) = seed_db().await;
    let connector: Arc<dyn Connector> = Arc::new(connector);
    let dialect = SqliteDialect;
    let validator = Validator::default();
    let audit = NoopAuditSink;
    let access = AccessEngine::new(&audit);
    let engine = QueryEngine::new(connector.as_ref(), &dialect, &validator, &access, false);

    let provider = Arc::new(ConnectorSchemaProvider::new(connector.clone(), Duration::from_secs(5)));
    let schema = SchemaCache::new(provider, Duration::from_secs(60), 0);

    let registry = ToolRegistry::new(false, true, false);
    let enabled = registry
        .enable_table_tools(&["users".to_string()], &schema)
        .await
        .expect("enable_table_tools");
    assert!(enabled.contains(&"query_users".to_string()));
    assert!(enabled.contains(&"get_users_by_id".to_string()));
    assert!(enabled.contains(&"insert_users".to_string()));

    let role = admin_role();
    let ctx = ExecCtx {
        engine: &engine,
        connector: connector.as_ref(),
        schema: &schema,
        role: &role,
        query_timeout: Duration::from_secs(5),
    };

    let outcome = registry
        .dispatch("query_users", json!({}), &ctx)
        .await
        .expect("dispatch query_users");
    let ToolOutcome::Result(result) = outcome else {
        panic!("expected a Result outcome");
    };
    assert_eq!(result.rows.len(), 2);
    for row in &result.rows {
        assert!(!row.contains_key("ssn"), "ssn must be denied by the role's table policy");
    }
}

#[tokio::test]
async fn enable_table_tools_rejects_over_cap_in_practice() {
    let (_file, connector) = seed_db().await;
    let provider = Arc::new(ConnectorSchemaProvider::new(
        Arc::new(connector),
        Duration::from_secs(5),
    ));
    let schema = SchemaCache::new(provider, Duration::from_secs(60), 0);
    let registry = ToolRegistry::new(false, false, false);

    let too_many: Vec<String> = (0..25).map(|i| format!("t{i}")).collect();
    let err = registry.enable_table_tools(&too_many, &schema).await.unwrap_err();
    assert!(err.to_string().contains("dynamic table limit"));
}
