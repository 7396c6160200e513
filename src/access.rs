//! Role-based access control (SPEC_FULL.md §4.7). Given `(role, table,
//! verb)`, decide allow/deny and return the supplementary data — denied
//! columns, masked columns, a row filter to conjoin, and a row cap — that
//! the Query Engine folds into the rendered statement.

use std::collections::HashSet;

use thiserror::Error;

use crate::audit::{AuditEvent, AuditSink, Verdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Select,
    Insert,
    Update,
    Delete,
}

impl Verb {
    fn as_str(&self) -> &'static str {
        match self {
            Verb::Select => "SELECT",
            Verb::Insert => "INSERT",
            Verb::Update => "UPDATE",
            Verb::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TablePolicy {
    /// Table name, or `"*"` for the wildcard fallback.
    pub name: String,
    pub verbs: HashSet<Verb>,
    pub deny_columns: Vec<String>,
    pub mask_columns: Vec<String>,
    pub row_filter: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Role {
    pub name: String,
    pub max_rows_per_query: i64,
    pub tables: Vec<TablePolicy>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("role '{role}' may not {verb} on '{table}'")]
pub struct AccessError {
    pub role: String,
    pub verb: String,
    pub table: String,
}

#[derive(Debug, Clone, Default)]
pub struct AccessGrant {
    pub denied_columns: Vec<String>,
    pub masked_columns: Vec<String>,
    pub row_filter: Option<String>,
    pub max_rows: Option<i64>,
}

pub struct AccessEngine<'a> {
    audit: &'a dyn AuditSink,
}

impl<'a> AccessEngine<'a> {
    pub fn new(audit: &'a dyn AuditSink) -> Self {
        AccessEngine { audit }
    }

    /// Resolve the table policy that governs `table`: exact match first,
    /// then the `"*"` wildcard. An exact match that doesn't list the verb
    /// denies outright — it never falls through to the wildcard.
    pub fn check(&self, role: &Role, table: &str, verb: Verb) -> Result<AccessGrant, AccessError> {
        let exact = role.tables.iter().find(|p| p.name == table);

        let policy = match exact {
            Some(p) => Some(p),
            None => role.tables.iter().find(|p| p.name == "*"),
        };

        let Some(policy) = policy else {
            self.deny(role, table, verb, "no_matching_policy");
            return Err(AccessError {
                role: role.name.clone(),
                verb: verb.as_str().to_string(),
                table: table.to_string(),
            });
        };

        if !policy.verbs.contains(&verb) {
            let rule = if exact.is_some() {
                "exact_table_verb_not_listed"
            } else {
                "wildcard_verb_not_listed"
            };
            self.deny(role, table, verb, rule);
            return Err(AccessError {
                role: role.name.clone(),
                verb: verb.as_str().to_string(),
                table: table.to_string(),
            });
        }

        self.audit.record(AuditEvent {
            role: role.name.clone(),
            table: table.to_string(),
            verb: verb.as_str().to_string(),
            verdict: if policy.mask_columns.is_empty() {
                Verdict::Allow
            } else {
                Verdict::Mask
            },
            rule: None,
            at: chrono::Utc::now(),
        });

        Ok(AccessGrant {
            denied_columns: policy.deny_columns.clone(),
            masked_columns: policy.mask_columns.clone(),
            row_filter: policy.row_filter.clone(),
            max_rows: Some(role.max_rows_per_query),
        })
    }

    fn deny(&self, role: &Role, table: &str, verb: Verb, rule: &str) {
        self.audit.record(AuditEvent {
            role: role.name.clone(),
            table: table.to_string(),
            verb: verb.as_str().to_string(),
            verdict: Verdict::Deny,
            rule: Some(rule.to_string()),
            at: chrono::Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::NoopAuditSink;

    fn role_with(policies: Vec<TablePolicy>) -> Role {
        Role {
            name: "analyst".to_string(),
            max_rows_per_query: 500,
            tables: policies,
        }
    }

    #[test]
    fn exact_match_denies_unlisted_verb_without_wildcard_fallback() {
        let sink = NoopAuditSink;
        let engine = AccessEngine::new(&sink);
        let role = role_with(vec![
            TablePolicy {
                name: "users".to_string(),
                verbs: HashSet::from([Verb::Select]),
                deny_columns: vec![],
                mask_columns: vec![],
                row_filter: None,
            },
            TablePolicy {
                name: "*".to_string(),
                verbs: HashSet::from([Verb::Select, Verb::Insert]),
                deny_columns: vec![],
                mask_columns: vec![],
                row_filter: None,
            },
        ]);
        assert!(engine.check(&role, "users", Verb::Insert).is_err());
    }

    #[test]
    fn wildcard_grants_when_no_exact_match() {
        let sink = NoopAuditSink;
        let engine = AccessEngine::new(&sink);
        let role = role_with(vec![TablePolicy {
            name: "*".to_string(),
            verbs: HashSet::from([Verb::Select]),
            deny_columns: vec![],
            mask_columns: vec![],
            row_filter: None,
        }]);
        assert!(engine.check(&role, "orders", Verb::Select).is_ok());
    }

    #[test]
    fn no_matching_policy_denies() {
        let sink = NoopAuditSink;
        let engine = AccessEngine::new(&sink);
        let role = role_with(vec![]);
        assert!(engine.check(&role, "orders", Verb::Select).is_err());
    }
}
