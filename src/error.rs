//! Crate-level error taxonomy.
//!
//! Each component (`sanitize`, `filter`, `validate`, `access`, `connector`,
//! `schema`) owns a narrow `thiserror` enum; this module aggregates them
//! into one `Error` via `#[from]` so the engine and the MCP adapter have a
//! single type to propagate. Kinds are never conflated — see SPEC_FULL.md §7.

use thiserror::Error;

use crate::access::AccessError;
use crate::connector::ConnectorError;
use crate::filter::ParseError;
use crate::sanitize::InjectionError;
use crate::validate::ValidationError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("injection check failed: {0}")]
    Injection(#[from] InjectionError),

    #[error("filter parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("access denied: {0}")]
    Access(#[from] AccessError),

    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error("{entity} not found")]
    NotFound { entity: String },

    #[error("operation timed out")]
    Timeout,

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(entity: impl Into<String>) -> Self {
        Error::NotFound {
            entity: entity.into(),
        }
    }

    /// Whether a client may retry the call unchanged. Only the connector's
    /// transient failures and ambient timeouts are retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout) || matches!(self, Error::Connector(e) if e.is_retryable())
    }

    /// The message surfaced to the MCP client. `AccessDenied` and `Internal`
    /// are deliberately generic; everything else passes its detail through.
    pub fn user_message(&self) -> String {
        match self {
            Error::Access(_) => "access denied".to_string(),
            Error::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}
