//! Layered application configuration (SPEC_FULL.md §1.1, §6).
//!
//! Loaded with the `config` crate from a TOML/YAML file plus `APP_`-prefixed
//! environment overrides, then validated with an explicit `validate()` pass
//! before the server boots. The original teacher repo wires this same
//! `AppConfig::load` / `config.validate()` shape from its `bin/server.rs`,
//! but its own `src/config.rs` was not present in this retrieval; the shape
//! below is rebuilt fresh against the recognized options this system needs.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::access::{Role, TablePolicy, Verb};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Connection-pool and schema-discovery scoping options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub dsn: String,
    pub max_open_conns: u32,
    pub max_idle_conns: u32,
    pub conn_max_lifetime_secs: u64,
    pub read_only: bool,
    /// Schemas to include during introspection; empty means "all".
    pub schemas: Vec<String>,
    pub exclude_tables: Vec<String>,
    pub include_tables: Vec<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            dsn: String::new(),
            max_open_conns: 10,
            max_idle_conns: 5,
            conn_max_lifetime_secs: 1800,
            read_only: false,
            schemas: Vec::new(),
            exclude_tables: Vec::new(),
            include_tables: Vec::new(),
        }
    }
}

impl ConnectionConfig {
    pub fn conn_max_lifetime(&self) -> Duration {
        Duration::from_secs(self.conn_max_lifetime_secs)
    }

    /// Whether `table` passes the include/exclude scoping lists.
    pub fn table_in_scope(&self, table: &str) -> bool {
        if self.exclude_tables.iter().any(|t| t == table) {
            return false;
        }
        if self.include_tables.is_empty() {
            return true;
        }
        self.include_tables.iter().any(|t| t == table)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub refresh_interval_secs: u64,
    pub max_tables: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            ttl_secs: 300,
            refresh_interval_secs: 60,
            max_tables: 0,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueryLimitsConfig {
    pub max_rows: i64,
    pub max_result_bytes: u64,
    pub query_timeout_secs: u64,
    pub max_filter_depth: u32,
    pub allow_writes: bool,
    pub allow_raw_sql: bool,
}

impl Default for QueryLimitsConfig {
    fn default() -> Self {
        QueryLimitsConfig {
            max_rows: 1000,
            max_result_bytes: 10 * 1024 * 1024,
            query_timeout_secs: 30,
            max_filter_depth: 10,
            allow_writes: false,
            allow_raw_sql: false,
        }
    }
}

impl QueryLimitsConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PiiConfig {
    pub mask_pii: bool,
}

impl Default for PiiConfig {
    fn default() -> Self {
        PiiConfig { mask_pii: true }
    }
}

/// A single table grant as written in config; converted into
/// [`crate::access::TablePolicy`] by [`RoleConfig::into_role`].
#[derive(Debug, Clone, Deserialize)]
pub struct TablePolicyConfig {
    pub name: String,
    #[serde(default)]
    pub verbs: Vec<String>,
    #[serde(default)]
    pub deny_columns: Vec<String>,
    #[serde(default)]
    pub mask_columns: Vec<String>,
    #[serde(default)]
    pub row_filter: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoleConfig {
    pub name: String,
    #[serde(default = "default_max_rows_per_query")]
    pub max_rows_per_query: i64,
    #[serde(default)]
    pub tables: Vec<TablePolicyConfig>,
}

fn default_max_rows_per_query() -> i64 {
    1000
}

impl RoleConfig {
    fn into_role(self) -> Result<Role, ConfigError> {
        let tables = self
            .tables
            .into_iter()
            .map(|t| {
                let verbs = t
                    .verbs
                    .iter()
                    .map(|v| parse_verb(v))
                    .collect::<Result<_, _>>()?;
                Ok(TablePolicy {
                    name: t.name,
                    verbs,
                    deny_columns: t.deny_columns,
                    mask_columns: t.mask_columns,
                    row_filter: t.row_filter,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Role {
            name: self.name,
            max_rows_per_query: self.max_rows_per_query,
            tables,
        })
    }
}

fn parse_verb(raw: &str) -> Result<Verb, ConfigError> {
    match raw.to_ascii_uppercase().as_str() {
        "SELECT" => Ok(Verb::Select),
        "INSERT" => Ok(Verb::Insert),
        "UPDATE" => Ok(Verb::Update),
        "DELETE" => Ok(Verb::Delete),
        other => Err(ConfigError::Invalid(format!("unknown verb '{other}' in role table policy"))),
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AccessConfig {
    pub roles: Vec<RoleConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub connection: ConnectionConfig,
    pub cache: CacheConfig,
    pub query_limits: QueryLimitsConfig,
    pub pii: PiiConfig,
    pub access: AccessConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            connection: ConnectionConfig::default(),
            cache: CacheConfig::default(),
            query_limits: QueryLimitsConfig::default(),
            pii: PiiConfig::default(),
            access: AccessConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from a TOML/YAML/JSON file (format sniffed from extension) with
    /// `APP_`-prefixed, `__`-nested environment overrides on top, e.g.
    /// `APP_QUERY_LIMITS__ALLOW_WRITES=true`.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn roles(&self) -> Result<Vec<Role>, ConfigError> {
        self.access
            .roles
            .iter()
            .cloned()
            .map(RoleConfig::into_role)
            .collect()
    }

    /// Structural checks that don't require a live connection: a DSN is
    /// present, limits are sane, and `execute_sql`'s implicit require
    /// (`allow_raw_sql` whenever `allow_writes` is set) is satisfied — the
    /// Tool Generator's `execute_sql` tool only ever appears behind both
    /// flags (SPEC_FULL.md §4.10), so a config enabling writes without raw
    /// SQL silently loses that tool rather than failing, but we still want
    /// operators to see the implication spelled out.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection.dsn.is_empty() {
            return Err(ConfigError::Invalid("connection.dsn must not be empty".into()));
        }
        if self.query_limits.max_rows <= 0 {
            return Err(ConfigError::Invalid("query_limits.max_rows must be positive".into()));
        }
        if self.query_limits.query_timeout_secs == 0 {
            return Err(ConfigError::Invalid("query_limits.query_timeout_secs must be positive".into()));
        }
        if self.connection.max_open_conns == 0 {
            return Err(ConfigError::Invalid("connection.max_open_conns must be positive".into()));
        }
        if self.connection.max_idle_conns > self.connection.max_open_conns {
            return Err(ConfigError::Invalid(
                "connection.max_idle_conns must not exceed max_open_conns".into(),
            ));
        }
        for role in &self.access.roles {
            for table in &role.tables {
                for verb in &table.verbs {
                    parse_verb(verb)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_fails_validation_without_dsn() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_idle_above_open() {
        let mut cfg = AppConfig::default();
        cfg.connection.dsn = "sqlite://./dev.db".to_string();
        cfg.connection.max_idle_conns = 99;
        cfg.connection.max_open_conns = 10;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_accepts_minimal_config() {
        let mut cfg = AppConfig::default();
        cfg.connection.dsn = "sqlite://./dev.db".to_string();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn table_scope_respects_include_and_exclude() {
        let mut conn = ConnectionConfig::default();
        conn.include_tables = vec!["users".to_string(), "orders".to_string()];
        conn.exclude_tables = vec!["orders".to_string()];
        assert!(conn.table_in_scope("users"));
        assert!(!conn.table_in_scope("orders"));
        assert!(!conn.table_in_scope("invoices"));
    }

    #[test]
    fn role_config_converts_verbs() {
        let role_cfg = RoleConfig {
            name: "analyst".to_string(),
            max_rows_per_query: 500,
            tables: vec![TablePolicyConfig {
                name: "users".to_string(),
                verbs: vec!["select".to_string()],
                deny_columns: vec!["ssn".to_string()],
                mask_columns: vec![],
                row_filter: None,
            }],
        };
        let role = role_cfg.into_role().unwrap();
        assert_eq!(role.name, "analyst");
        assert_eq!(role.tables[0].verbs.len(), 1);
    }

    #[test]
    fn role_config_rejects_unknown_verb() {
        let role_cfg = RoleConfig {
            name: "analyst".to_string(),
            max_rows_per_query: 500,
            tables: vec![TablePolicyConfig {
                name: "users".to_string(),
                verbs: vec!["TRUNCATE".to_string()],
                deny_columns: vec![],
                mask_columns: vec![],
                row_filter: None,
            }],
        };
        assert!(role_cfg.into_role().is_err());
    }
}
