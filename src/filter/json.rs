//! The JSON-object filter form (SPEC_FULL.md §4.2):
//!
//! `{ "col": v }` means equality; `{ "col": {"$op": v, ...} }` maps operator
//! tokens to SQL comparisons. Keys are processed in lexicographic order —
//! both the outer column keys and, for determinism, the inner operator
//! keys — so the rendered clause never depends on JSON object insertion
//! order.

use std::collections::BTreeMap;

use serde_json::Value as Json;

use super::{check_ident, ParseError, Term};
use crate::value::Value;

fn op_token(token: &str) -> Option<&'static str> {
    match token {
        "$eq" => Some("="),
        "$ne" => Some("!="),
        "$gt" => Some(">"),
        "$gte" => Some(">="),
        "$lt" => Some("<"),
        "$lte" => Some("<="),
        _ => None,
    }
}

fn json_to_value(v: &Json) -> Result<Value, ParseError> {
    match v {
        Json::Null => Ok(Value::Null),
        Json::Bool(b) => Ok(Value::Bool(*b)),
        Json::String(s) => Ok(Value::Text(s.clone())),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::I64(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Value::F64(f))
            } else {
                Err(ParseError::new(0, format!("unrepresentable number '{n}'")))
            }
        }
        other => Err(ParseError::new(0, format!("unsupported filter value '{other}'"))),
    }
}

pub(super) fn parse(input: &Json) -> Result<Vec<Term>, ParseError> {
    let obj = input
        .as_object()
        .ok_or_else(|| ParseError::new(0, "filter JSON must be an object"))?;

    let sorted: BTreeMap<&String, &Json> = obj.iter().collect();
    let mut terms = Vec::new();

    for (ident, value) in sorted {
        check_ident(ident, 0)?;
        match value {
            Json::Object(ops) => {
                let sorted_ops: BTreeMap<&String, &Json> = ops.iter().collect();
                for (token, operand) in sorted_ops {
                    let op = op_token(token)
                        .ok_or_else(|| ParseError::new(0, format!("unknown operator '{token}'")))?;
                    let resolved = json_to_value(operand)?;
                    if matches!(resolved, Value::Null) {
                        terms.push(Term::IsNull {
                            ident: ident.clone(),
                            negated: op == "!=",
                        });
                    } else {
                        terms.push(Term::Binary {
                            ident: ident.clone(),
                            op,
                            value: resolved,
                        });
                    }
                }
            }
            scalar => {
                let resolved = json_to_value(scalar)?;
                if matches!(resolved, Value::Null) {
                    terms.push(Term::IsNull {
                        ident: ident.clone(),
                        negated: false,
                    });
                } else {
                    terms.push(Term::Binary {
                        ident: ident.clone(),
                        op: "=",
                        value: resolved,
                    });
                }
            }
        }
    }

    Ok(terms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn equality_form() {
        let input = json!({"status": "active"});
        let terms = parse(&input).unwrap();
        assert_eq!(terms.len(), 1);
    }

    #[test]
    fn operator_form_with_null() {
        let input = json!({"deleted_at": {"$eq": null}});
        let terms = parse(&input).unwrap();
        assert!(matches!(terms[0], Term::IsNull { negated: false, .. }));
    }

    #[test]
    fn rejects_unknown_operator() {
        let input = json!({"age": {"$bogus": 1}});
        assert!(parse(&input).is_err());
    }
}
