//! The Query Engine: orchestrates a single tool call end to end
//! (SPEC_FULL.md §4.9). Every other component is a pure function or a
//! narrow capability; this is the one place that sequences them.
//!
//! validate_* -> sanitize filter/order_by/columns -> parse_filter ->
//! Access Engine merge -> column projection -> Deadline -> Connector ->
//! PII masking.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::access::{AccessEngine, Role, Verb};
use crate::connector::{
    CallRequest, Connector, Deadline, DeleteRequest, MutationResult, ResultSet, SelectRequest,
    UpdateRequest,
};
use crate::dialect::{Assignment, Dialect, ProcParam, Row};
use crate::error::Error;
use crate::filter::{parse_filter_json, parse_filter_string, ParsedFilter};
use crate::pii;
use crate::sanitize::{sanitize_filter_input, sanitize_order_by, validate_identifier};
use crate::validate::Validator;
use crate::value::Value;

/// Either grammar the filter parser accepts.
#[derive(Debug, Clone)]
pub enum FilterInput {
    StringForm(String),
    JsonForm(serde_json::Value),
}

#[derive(Debug, Clone, Default)]
pub struct SelectArgs {
    pub table: String,
    pub columns: Vec<String>,
    /// The table's full column list, as known by the Schema Cache at call
    /// time. Used only to resolve "all columns" when `columns` is empty
    /// and the role's grant denies some columns (SPEC_FULL.md §4.9 step 5);
    /// an empty `columns` with an empty `known_columns` still renders as
    /// `SELECT *` downstream.
    pub known_columns: Vec<String>,
    pub filter: Option<FilterInput>,
    pub order_by: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

pub struct QueryEngine<'a> {
    connector: &'a dyn Connector,
    dialect: &'a dyn Dialect,
    validator: &'a Validator,
    access: &'a AccessEngine<'a>,
    mask_pii: bool,
}

impl<'a> QueryEngine<'a> {
    pub fn new(
        connector: &'a dyn Connector,
        dialect: &'a dyn Dialect,
        validator: &'a Validator,
        access: &'a AccessEngine<'a>,
        mask_pii: bool,
    ) -> Self {
        QueryEngine {
            connector,
            dialect,
            validator,
            access,
            mask_pii,
        }
    }

    /// Whether the connection-wide PII masking pass is enabled. Exposed so
    /// the Tool Generator's `raw_sql` path (which bypasses the per-table
    /// Access Engine entirely) can still apply it.
    pub fn mask_pii_enabled(&self) -> bool {
        self.mask_pii
    }

    fn parse_filter(&self, filter: &FilterInput) -> Result<ParsedFilter, Error> {
        match filter {
            FilterInput::StringForm(s) => {
                sanitize_filter_input(s)?;
                Ok(parse_filter_string(s, self.dialect, self.validator.max_filter_depth)?)
            }
            FilterInput::JsonForm(v) => Ok(parse_filter_json(v, self.dialect, self.validator.max_filter_depth)?),
        }
    }

    /// Conjoin the user's fragment with a role row filter, parenthesizing
    /// each side so operator precedence can't bleed across the join. The
    /// row filter is admin-configured, not user-supplied, so it isn't
    /// subject to `max_filter_depth`.
    fn merge_row_filter(&self, user: ParsedFilter, row_filter: &str) -> Result<ParsedFilter, Error> {
        let role_parsed = parse_filter_string(row_filter, self.dialect, u32::MAX)?;
        let offset = user.params.len();
        let shifted =
            crate::dialect::renumber_placeholders(&role_parsed.where_clause, placeholder_prefix(self.dialect), offset + 1);
        let mut params = user.params;
        params.extend(role_parsed.params);
        let where_clause = if user.where_clause.is_empty() {
            shifted
        } else {
            format!("({}) AND ({})", user.where_clause, shifted)
        };
        Ok(ParsedFilter {
            where_clause,
            params,
        })
    }

    pub async fn query(
        &self,
        role: &Role,
        args: SelectArgs,
        query_timeout: Duration,
    ) -> Result<ResultSet, Error> {
        debug!(table = %args.table, "query: validating envelope");
        let limit = self.validator.validate_select(&args.table, args.limit, args.offset)?;

        for col in &args.columns {
            validate_identifier(col)?;
        }
        if let Some(order) = &args.order_by {
            sanitize_order_by(order)?;
        }

        let grant = self.access.check(role, &args.table, Verb::Select)?;

        let mut parsed = match &args.filter {
            Some(f) => self.parse_filter(f)?,
            None => ParsedFilter {
                where_clause: String::new(),
                params: Vec::new(),
            },
        };
        if let Some(row_filter) = &grant.row_filter {
            parsed = self.merge_row_filter(parsed, row_filter)?;
        }

        let effective_columns = project_columns(&args.columns, &grant.denied_columns, &args.known_columns);
        let effective_limit = grant.max_rows.map(|cap| limit.min(cap)).unwrap_or(limit);

        let filter_fragment = if parsed.where_clause.is_empty() {
            None
        } else {
            Some(parsed.where_clause.as_str())
        };

        let deadline = Deadline::from_timeout(query_timeout);
        let req = SelectRequest {
            table: &args.table,
            columns: &effective_columns,
            filter_fragment,
            filter_params: &parsed.params,
            order_by: args.order_by.as_deref(),
            limit: effective_limit,
            offset: args.offset,
        };

        let mut result = self.connector.select(req, deadline).await?;
        self.validator
            .validate_result_size(result.rows.len() as u64, 1024)?;

        for row in &mut result.rows {
            for col in &grant.masked_columns {
                if let Some(v) = row.get_mut(col) {
                    *v = Value::Text("***".to_string());
                }
            }
        }
        if self.mask_pii {
            result.columns = pii::filter_columns(&result.columns);
            for row in &mut result.rows {
                pii::mask_row(row);
            }
        }

        info!(table = %args.table, rows = result.rows.len(), "query complete");
        Ok(result)
    }

    pub async fn insert(
        &self,
        role: &Role,
        table: &str,
        rows: Vec<Row>,
        query_timeout: Duration,
    ) -> Result<MutationResult, Error> {
        self.validator.validate_write(table)?;
        self.access.check(role, table, Verb::Insert)?;
        let deadline = Deadline::from_timeout(query_timeout);
        Ok(self.connector.insert(table, &rows, deadline).await?)
    }

    pub async fn update(
        &self,
        role: &Role,
        table: &str,
        assignments: Vec<Assignment>,
        filter: FilterInput,
        query_timeout: Duration,
    ) -> Result<MutationResult, Error> {
        self.validator.validate_write(table)?;
        self.access.check(role, table, Verb::Update)?;

        let parsed = self.parse_filter(&filter)?;
        if parsed.where_clause.is_empty() {
            return Err(Error::Validation(crate::validate::ValidationError::Field {
                field: "filter".to_string(),
                msg: "UPDATE requires a non-empty filter".to_string(),
            }));
        }

        let deadline = Deadline::from_timeout(query_timeout);
        let req = UpdateRequest {
            table,
            assignments: &assignments,
            filter_fragment: &parsed.where_clause,
            filter_params: &parsed.params,
        };
        Ok(self.connector.update(req, deadline).await?)
    }

    pub async fn delete(
        &self,
        role: &Role,
        table: &str,
        filter: FilterInput,
        query_timeout: Duration,
    ) -> Result<MutationResult, Error> {
        self.validator.validate_write(table)?;
        self.access.check(role, table, Verb::Delete)?;

        let parsed = self.parse_filter(&filter)?;
        if parsed.where_clause.is_empty() {
            return Err(Error::Validation(crate::validate::ValidationError::Field {
                field: "filter".to_string(),
                msg: "DELETE requires a non-empty filter".to_string(),
            }));
        }

        let deadline = Deadline::from_timeout(query_timeout);
        let req = DeleteRequest {
            table,
            filter_fragment: &parsed.where_clause,
            filter_params: &parsed.params,
        };
        Ok(self.connector.delete(req, deadline).await?)
    }

    pub async fn call_procedure(
        &self,
        role: &Role,
        name: &str,
        params: Vec<ProcParam>,
        query_timeout: Duration,
    ) -> Result<ResultSet, Error> {
        self.access.check(role, name, Verb::Select)?;
        let deadline = Deadline::from_timeout(query_timeout);
        let req = CallRequest { name, params: &params };
        let mut result = self.connector.call(req, deadline).await?;
        if self.mask_pii {
            result.columns = pii::filter_columns(&result.columns);
            for row in &mut result.rows {
                pii::mask_row(row);
            }
        }
        Ok(result)
    }
}

/// The placeholder text's fixed prefix for a dialect, used only to
/// renumber a spliced-in row filter fragment. Numeric-placeholder
/// dialects share a prefix; `?`-based dialects have none to renumber.
fn placeholder_prefix(dialect: &dyn Dialect) -> &'static str {
    match dialect.name() {
        "postgres" => "$",
        "mssql" => "@p",
        "oracle" => ":",
        _ => "",
    }
}

/// Effective projection = user columns ∩ (all columns − denied)
/// (SPEC_FULL.md §4.9 step 5). `requested` empty means "all columns"; it
/// must never resolve to an empty list when `denied` is non-empty, since
/// an empty column list renders as `SELECT *` downstream and would leak
/// every denied column straight through the Connector.
fn project_columns(requested: &[String], denied: &[String], known_columns: &[String]) -> Vec<String> {
    if denied.is_empty() {
        return requested.to_vec();
    }
    if known_columns.is_empty() {
        warn!("row access grant denies columns but the table's full column list is unavailable; projection left empty, Connector will surface all columns");
        return requested.iter().filter(|c| !denied.contains(c)).cloned().collect();
    }
    let allowed: Vec<String> = known_columns.iter().filter(|c| !denied.contains(c)).cloned().collect();
    if requested.is_empty() {
        return allowed;
    }
    requested.iter().filter(|c| allowed.contains(c)).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_columns_drops_denied() {
        let requested = vec!["id".to_string(), "ssn".to_string()];
        let denied = vec!["ssn".to_string()];
        let known = vec!["id".to_string(), "name".to_string(), "ssn".to_string()];
        assert_eq!(project_columns(&requested, &denied, &known), vec!["id".to_string()]);
    }

    #[test]
    fn project_columns_keeps_all_when_no_denials() {
        let requested = vec!["id".to_string()];
        assert_eq!(project_columns(&requested, &[], &[]), requested);
    }

    #[test]
    fn project_columns_enumerates_all_minus_denied_when_no_columns_requested() {
        let known = vec!["id".to_string(), "name".to_string(), "ssn".to_string()];
        let denied = vec!["ssn".to_string()];
        assert_eq!(
            project_columns(&[], &denied, &known),
            vec!["id".to_string(), "name".to_string()]
        );
    }
}
