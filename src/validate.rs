//! Request-envelope limits: row caps, result-size caps, timeouts, and the
//! write gate. Runs after sanitization, before any SQL is rendered
//! (SPEC_FULL.md §4.8).

use std::time::Duration;

use thiserror::Error;

use crate::sanitize::validate_identifier;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid field '{field}': {msg}")]
    Field { field: String, msg: String },
}

impl ValidationError {
    fn field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        ValidationError::Field {
            field: field.into(),
            msg: msg.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Validator {
    pub max_rows: i64,
    pub max_result_bytes: u64,
    pub query_timeout: Duration,
    pub max_filter_depth: u32,
    pub allow_writes: bool,
}

impl Default for Validator {
    fn default() -> Self {
        Validator {
            max_rows: 1000,
            max_result_bytes: 10 * 1024 * 1024,
            query_timeout: Duration::from_secs(30),
            max_filter_depth: 10,
            allow_writes: false,
        }
    }
}

impl Validator {
    pub fn validate_select(
        &self,
        table: &str,
        limit: i64,
        offset: i64,
    ) -> Result<i64, ValidationError> {
        validate_identifier(table)
            .map_err(|e| ValidationError::field("table", e.to_string()))?;
        if offset < 0 {
            return Err(ValidationError::field("offset", "must be >= 0"));
        }
        Ok(self.clamp_limit(limit))
    }

    pub fn validate_write(&self, table: &str) -> Result<(), ValidationError> {
        validate_identifier(table)
            .map_err(|e| ValidationError::field("table", e.to_string()))?;
        if !self.allow_writes {
            return Err(ValidationError::field("allow_writes", "writes are disabled"));
        }
        Ok(())
    }

    /// Map non-positive or above-cap limits to `max_rows`.
    pub fn clamp_limit(&self, limit: i64) -> i64 {
        if limit <= 0 || limit > self.max_rows {
            self.max_rows
        } else {
            limit
        }
    }

    pub fn validate_result_size(
        &self,
        row_count: u64,
        est_row_bytes: u64,
    ) -> Result<(), ValidationError> {
        if row_count.saturating_mul(est_row_bytes) > self.max_result_bytes {
            return Err(ValidationError::field(
                "result_size",
                "estimated result size exceeds max_result_bytes",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_limit_caps_above_max() {
        let v = Validator::default();
        assert_eq!(v.clamp_limit(5000), 1000);
        assert_eq!(v.clamp_limit(0), 1000);
        assert_eq!(v.clamp_limit(-1), 1000);
        assert_eq!(v.clamp_limit(50), 50);
    }

    #[test]
    fn validate_select_rejects_negative_offset() {
        let v = Validator::default();
        assert!(v.validate_select("users", 10, -1).is_err());
    }

    #[test]
    fn validate_write_rejects_when_disabled() {
        let v = Validator::default();
        assert!(v.validate_write("users").is_err());
    }

    #[test]
    fn validate_result_size_rejects_over_cap() {
        let v = Validator::default();
        assert!(v.validate_result_size(1_000_000, 1024).is_err());
        assert!(v.validate_result_size(10, 1024).is_ok());
    }
}
