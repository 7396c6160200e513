//! Filter parser: turns a user-supplied expression (restricted-SQL string or
//! JSON object) into a `ParsedFilter` — a WHERE fragment with the Dialect's
//! placeholders already substituted, and the ordered parameter list that
//! must accompany it. Injection screening happens one layer up in
//! `sanitize`; this module trusts that gate has already run.

mod json;
mod string;

use thiserror::Error;

use crate::dialect::Dialect;
use crate::sanitize::validate_identifier;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFilter {
    pub where_clause: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Error, Clone, PartialEq)]
#[error("filter parse error at {position}: {msg}")]
pub struct ParseError {
    pub position: usize,
    pub msg: String,
}

impl ParseError {
    pub(crate) fn new(position: usize, msg: impl Into<String>) -> Self {
        ParseError {
            position,
            msg: msg.into(),
        }
    }
}

/// One resolved comparison, prior to placeholder assignment. `NULL`-valued
/// operators carry no parameter; everything else does.
pub(crate) enum Term {
    IsNull { ident: String, negated: bool },
    Binary {
        ident: String,
        op: &'static str,
        value: Value,
    },
    In {
        ident: String,
        negated: bool,
        values: Vec<Value>,
    },
    Like { ident: String, pattern: String },
    Between { ident: String, low: Value, high: Value },
}

/// Parse a restricted-SQL filter expression against `dialect`. The grammar
/// is left-associative with no precedence split between `AND` and `OR`
/// (SPEC_FULL.md §4.2), so the connector preceding each term after the
/// first is threaded straight through to rendering. `max_depth` caps how
/// many comparisons one expression may chain (SPEC_FULL.md §4.8's
/// `max_filter_depth`) — the grammar has no parenthesized nesting, so term
/// count is the depth measure.
pub fn parse_filter_string(input: &str, dialect: &dyn Dialect, max_depth: u32) -> Result<ParsedFilter, ParseError> {
    let (terms, connectors) = string::parse(input)?;
    check_depth(terms.len(), max_depth)?;
    Ok(render(&terms, &connectors, dialect))
}

/// Parse the JSON-object filter form against `dialect`. Keys are processed
/// in lexicographic order so the rendered clause is deterministic; every
/// join — within one column's operator object, and across columns — is
/// `AND`.
pub fn parse_filter_json(
    input: &serde_json::Value,
    dialect: &dyn Dialect,
    max_depth: u32,
) -> Result<ParsedFilter, ParseError> {
    let terms = json::parse(input)?;
    check_depth(terms.len(), max_depth)?;
    let connectors = vec!["AND"; terms.len().saturating_sub(1)];
    Ok(render(&terms, &connectors, dialect))
}

fn check_depth(term_count: usize, max_depth: u32) -> Result<(), ParseError> {
    if term_count > max_depth as usize {
        Err(ParseError::new(
            0,
            format!("filter has {term_count} comparisons, exceeding max_filter_depth of {max_depth}"),
        ))
    } else {
        Ok(())
    }
}

/// Render a term list into Dialect placeholders. `connectors[i]` is the
/// operator joining `terms[i]` to `terms[i+1]`.
fn render(terms: &[Term], connectors: &[&'static str], dialect: &dyn Dialect) -> ParsedFilter {
    let mut clause = String::new();
    let mut params = Vec::new();
    let mut next = 1;

    for (i, term) in terms.iter().enumerate() {
        if i > 0 {
            clause.push(' ');
            clause.push_str(connectors[i - 1]);
            clause.push(' ');
        }
        render_term(term, dialect, &mut clause, &mut params, &mut next);
    }

    ParsedFilter {
        where_clause: clause,
        params,
    }
}

fn render_term(
    term: &Term,
    dialect: &dyn Dialect,
    clause: &mut String,
    params: &mut Vec<Value>,
    next: &mut usize,
) {
    match term {
        Term::IsNull { ident, negated } => {
            clause.push_str(&dialect.quote_ident(ident));
            clause.push_str(if *negated { " IS NOT NULL" } else { " IS NULL" });
        }
        Term::Binary { ident, op, value } => {
            clause.push_str(&dialect.quote_ident(ident));
            clause.push(' ');
            clause.push_str(op);
            clause.push(' ');
            clause.push_str(&dialect.placeholder(*next));
            *next += 1;
            params.push(value.clone());
        }
        Term::In {
            ident,
            negated,
            values,
        } => {
            clause.push_str(&dialect.quote_ident(ident));
            clause.push_str(if *negated { " NOT IN (" } else { " IN (" });
            for (i, v) in values.iter().enumerate() {
                if i > 0 {
                    clause.push_str(", ");
                }
                clause.push_str(&dialect.placeholder(*next));
                *next += 1;
                params.push(v.clone());
            }
            clause.push(')');
        }
        Term::Like { ident, pattern } => {
            clause.push_str(&dialect.quote_ident(ident));
            clause.push_str(" LIKE ");
            clause.push_str(&dialect.placeholder(*next));
            *next += 1;
            params.push(Value::Text(pattern.clone()));
        }
        Term::Between { ident, low, high } => {
            clause.push_str(&dialect.quote_ident(ident));
            clause.push_str(" BETWEEN ");
            clause.push_str(&dialect.placeholder(*next));
            *next += 1;
            params.push(low.clone());
            clause.push_str(" AND ");
            clause.push_str(&dialect.placeholder(*next));
            *next += 1;
            params.push(high.clone());
        }
    }
}

pub(crate) fn check_ident(ident: &str, position: usize) -> Result<(), ParseError> {
    validate_identifier(ident)
        .map_err(|_| ParseError::new(position, format!("invalid identifier '{ident}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::PostgresDialect;

    #[test]
    fn string_form_basic_comparison() {
        let d = PostgresDialect;
        let pf = parse_filter_string("age > 21 AND state = 'CA'", &d, 10).unwrap();
        assert_eq!(pf.where_clause, "\"age\" > $1 AND \"state\" = $2");
        assert_eq!(pf.params, vec![Value::I64(21), Value::Text("CA".into())]);
    }

    #[test]
    fn string_form_null_rewrite() {
        let d = PostgresDialect;
        let pf = parse_filter_string("email = NULL", &d, 10).unwrap();
        assert_eq!(pf.where_clause, "\"email\" IS NULL");
        assert!(pf.params.is_empty());
    }

    #[test]
    fn json_form_sorted_keys() {
        let d = PostgresDialect;
        let input: serde_json::Value = serde_json::json!({
            "status": "active",
            "age": {"$gte": 18}
        });
        let pf = parse_filter_json(&input, &d, 10).unwrap();
        assert_eq!(pf.where_clause, "\"age\" >= $1 AND \"status\" = $2");
        assert_eq!(pf.params, vec![Value::I64(18), Value::Text("active".into())]);
    }

    #[test]
    fn string_form_rejects_over_max_depth() {
        let d = PostgresDialect;
        let expr = "age > 1 AND age > 2 AND age > 3";
        assert!(parse_filter_string(expr, &d, 2).is_err());
        assert!(parse_filter_string(expr, &d, 3).is_ok());
    }
}
