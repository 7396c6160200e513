//! Column-name-driven PII classification and masking (SPEC_FULL.md §4.6).
//! Classification is substring matching against lowercased column names,
//! first rule wins, `exclude` categories checked before `mask` categories.

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PiiAction {
    Exclude,
    Mask,
}

struct Rule {
    patterns: &'static [&'static str],
    action: PiiAction,
    masker: Option<fn(&str) -> String>,
}

const RULES: &[Rule] = &[
    Rule {
        patterns: &["password", "passwd", "secret"],
        action: PiiAction::Exclude,
        masker: None,
    },
    Rule {
        patterns: &["token", "api_key", "secret_key"],
        action: PiiAction::Exclude,
        masker: None,
    },
    Rule {
        patterns: &["email", "e_mail"],
        action: PiiAction::Mask,
        masker: Some(mask_email),
    },
    Rule {
        patterns: &["phone", "mobile", "tel"],
        action: PiiAction::Mask,
        masker: Some(mask_phone),
    },
    Rule {
        patterns: &["ssn", "social_security"],
        action: PiiAction::Mask,
        masker: Some(mask_ssn),
    },
    Rule {
        patterns: &["card_number", "cc_num"],
        action: PiiAction::Mask,
        masker: Some(mask_credit_card),
    },
];

/// The rule a column name matched, if any.
pub fn classify(column_name: &str) -> Option<PiiAction> {
    let lower = column_name.to_lowercase();
    RULES
        .iter()
        .find(|rule| rule.patterns.iter().any(|p| lower.contains(p)))
        .map(|rule| rule.action)
}

fn masker_for(column_name: &str) -> Option<fn(&str) -> String> {
    let lower = column_name.to_lowercase();
    RULES
        .iter()
        .find(|rule| rule.patterns.iter().any(|p| lower.contains(p)))
        .and_then(|rule| rule.masker)
}

/// Drop excluded columns from a column-name list, preserving order.
pub fn filter_columns(columns: &[String]) -> Vec<String> {
    columns
        .iter()
        .filter(|c| classify(c) != Some(PiiAction::Exclude))
        .cloned()
        .collect()
}

/// Rewrite one row in place: drop excluded columns, mask values in
/// mask-classified columns. Non-string values in a masked column become
/// the literal `***`.
pub fn mask_row(row: &mut std::collections::BTreeMap<String, Value>) {
    let excluded: Vec<String> = row
        .keys()
        .filter(|k| classify(k) == Some(PiiAction::Exclude))
        .cloned()
        .collect();
    for key in excluded {
        row.remove(&key);
    }

    let to_mask: Vec<String> = row
        .keys()
        .filter(|k| classify(k) == Some(PiiAction::Mask))
        .cloned()
        .collect();
    for key in to_mask {
        if let Some(v) = row.get_mut(&key) {
            *v = match v {
                Value::Text(s) => {
                    let masker = masker_for(&key).expect("mask-classified column has a masker");
                    Value::Text(masker(s))
                }
                Value::Null => Value::Null,
                _ => Value::Text("***".to_string()),
            };
        }
    }
}

fn mask_email(s: &str) -> String {
    match s.split_once('@') {
        Some((local, domain)) => {
            let first = local.chars().next().unwrap_or('*');
            format!("{first}***@{domain}")
        }
        None => "***".to_string(),
    }
}

fn last_n(s: &str, n: usize) -> String {
    let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() >= n {
        digits[digits.len() - n..].to_string()
    } else {
        digits
    }
}

fn mask_phone(s: &str) -> String {
    format!("***-***-{}", last_n(s, 4))
}

fn mask_ssn(s: &str) -> String {
    format!("***-**-{}", last_n(s, 4))
}

fn mask_credit_card(s: &str) -> String {
    format!("****-****-****-{}", last_n(s, 4))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_is_excluded() {
        assert_eq!(classify("password"), Some(PiiAction::Exclude));
        assert_eq!(classify("api_key"), Some(PiiAction::Exclude));
    }

    #[test]
    fn email_and_phone_masking_matches_scenarios() {
        assert_eq!(mask_email("kevin@example.com"), "k***@example.com");
        assert_eq!(mask_phone("555-123-4567"), "***-***-4567");
    }

    #[test]
    fn filter_columns_drops_excluded_preserving_order() {
        let cols = vec!["id".to_string(), "password".to_string(), "name".to_string()];
        assert_eq!(filter_columns(&cols), vec!["id", "name"]);
    }

    #[test]
    fn mask_row_drops_excluded_and_masks_email() {
        let mut row = std::collections::BTreeMap::new();
        row.insert("password".to_string(), Value::Text("hunter2".into()));
        row.insert("email".to_string(), Value::Text("kevin@example.com".into()));
        mask_row(&mut row);
        assert!(!row.contains_key("password"));
        assert_eq!(row.get("email"), Some(&Value::Text("k***@example.com".into())));
    }

    #[test]
    fn non_string_masked_value_becomes_stars() {
        let mut row = std::collections::BTreeMap::new();
        row.insert("ssn".to_string(), Value::I64(123456789));
        mask_row(&mut row);
        assert_eq!(row.get("ssn"), Some(&Value::Text("***".into())));
    }
}
