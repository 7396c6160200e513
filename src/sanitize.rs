//! Pre-parse injection defense: identifier validation, filter-input
//! screening, and ORDER BY validation. All three gates run before the
//! filter parser ever sees raw input (SPEC_FULL.md §4.1) — defense in
//! depth, since the parser itself only ever emits parameterized SQL.

use thiserror::Error;

const RESERVED: &[&str] = &[
    "SELECT", "FROM", "WHERE", "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE",
    "TRUNCATE", "UNION", "INTERSECT", "EXCEPT", "EXEC", "EXECUTE",
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("injection check failed: pattern={pattern} input={input}")]
pub struct InjectionError {
    pub pattern: String,
    pub input: String,
}

impl InjectionError {
    fn new(pattern: impl Into<String>, input: impl Into<String>) -> Self {
        InjectionError {
            pattern: pattern.into(),
            input: input.into(),
        }
    }
}

/// Accept `ident` or `ident.ident` where each atom matches
/// `[A-Za-z_][A-Za-z0-9_]*`, and the uppercased whole is not a reserved word.
pub fn validate_identifier(name: &str) -> Result<(), InjectionError> {
    let atoms: Vec<&str> = name.split('.').collect();
    if atoms.len() > 2 || atoms.iter().any(|a| !is_plain_atom(a)) {
        return Err(InjectionError::new("identifier_grammar", name));
    }
    let upper = name.to_uppercase();
    if RESERVED.contains(&upper.as_str()) {
        return Err(InjectionError::new("reserved_keyword", name));
    }
    Ok(())
}

fn is_plain_atom(atom: &str) -> bool {
    let mut chars = atom.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// Strip single-quoted string literals (`''` is the escape for an embedded
/// quote), then scan what remains for forbidden punctuation and keywords.
pub fn sanitize_filter_input(raw: &str) -> Result<(), InjectionError> {
    let residue = strip_string_literals(raw);

    if residue.contains(';') {
        return Err(InjectionError::new("semicolon", raw));
    }
    if residue.contains("--") {
        return Err(InjectionError::new("line_comment", raw));
    }
    if residue.contains("/*") || residue.contains("*/") {
        return Err(InjectionError::new("block_comment", raw));
    }
    for word in RESERVED {
        if contains_word(&residue, word) {
            return Err(InjectionError::new(
                format!("keyword:{}", word.to_lowercase()),
                raw,
            ));
        }
    }
    Ok(())
}

/// Replace the contents of every single-quoted literal with spaces so
/// injected punctuation inside a legitimate string value doesn't trip the
/// scan, while preserving byte offsets for callers that want them.
fn strip_string_literals(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    let mut in_string = false;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if in_string {
            if c == '\'' {
                if bytes.get(i + 1) == Some(&b'\'') {
                    out.push(' ');
                    out.push(' ');
                    i += 2;
                    continue;
                }
                in_string = false;
                out.push(' ');
            } else {
                out.push(' ');
            }
        } else if c == '\'' {
            in_string = true;
            out.push(' ');
        } else {
            out.push(c);
        }
        i += 1;
    }
    out
}

fn contains_word(haystack: &str, word: &str) -> bool {
    let upper = haystack.to_uppercase();
    let wlen = word.len();
    let bytes = upper.as_bytes();
    let mut start = 0;
    while let Some(pos) = upper[start..].find(word) {
        let idx = start + pos;
        let before_ok = idx == 0 || !is_ident_byte(bytes[idx - 1]);
        let after_idx = idx + wlen;
        let after_ok = after_idx >= bytes.len() || !is_ident_byte(bytes[after_idx]);
        if before_ok && after_ok {
            return true;
        }
        start = idx + 1;
        if start >= upper.len() {
            break;
        }
    }
    false
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Split on commas; each term is one identifier optionally followed by
/// `ASC`/`DESC` (case-insensitive). Anything else is rejected.
pub fn sanitize_order_by(clause: &str) -> Result<(), InjectionError> {
    for term in clause.split(',') {
        let term = term.trim();
        if term.is_empty() {
            return Err(InjectionError::new("order_by_empty_term", clause));
        }
        let mut parts = term.split_whitespace();
        let ident = parts.next().unwrap_or("");
        validate_identifier(ident).map_err(|_| InjectionError::new("order_by_term", clause))?;
        match parts.next() {
            None => {}
            Some(dir) if dir.eq_ignore_ascii_case("asc") || dir.eq_ignore_ascii_case("desc") => {}
            Some(_) => return Err(InjectionError::new("order_by_direction", clause)),
        }
        if parts.next().is_some() {
            return Err(InjectionError::new("order_by_term", clause));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_accepts_schema_qualified() {
        assert!(validate_identifier("public.users").is_ok());
        assert!(validate_identifier("users").is_ok());
    }

    #[test]
    fn identifier_rejects_reserved_keyword() {
        assert!(validate_identifier("DROP").is_err());
        assert!(validate_identifier("select").is_err());
    }

    #[test]
    fn identifier_rejects_leading_digit() {
        assert!(validate_identifier("1users").is_err());
    }

    #[test]
    fn filter_input_rejects_semicolon_injection() {
        let err = sanitize_filter_input("name = 'x'; DROP TABLE users").unwrap_err();
        assert_eq!(err.pattern, "semicolon");
    }

    #[test]
    fn filter_input_ignores_punctuation_inside_string_literal() {
        assert!(sanitize_filter_input("name = 'a;b--c'").is_ok());
    }

    #[test]
    fn filter_input_rejects_keyword_outside_string() {
        assert!(sanitize_filter_input("1=1 UNION SELECT 1").is_err());
    }

    #[test]
    fn order_by_accepts_direction() {
        assert!(sanitize_order_by("name ASC, age DESC").is_ok());
    }

    #[test]
    fn order_by_rejects_garbage() {
        assert!(sanitize_order_by("name; DROP TABLE users").is_err());
    }
}
