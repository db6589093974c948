//! Error types for statecap

use crate::registry::Scope;

/// The main error type for statecap operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StatecapError {
    /// A grant or mention store read/write could not complete
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// An import document failed validation; nothing was applied
    #[error("malformed import: {0}")]
    MalformedImport(String),

    /// A stored row matched none of the known schemas
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("unknown {scope} capability '{key}'")]
    UnknownCapability { scope: Scope, key: String },

    #[error("config: {0}")]
    Config(String),
}

/// Result type alias for statecap operations
pub type Result<T> = std::result::Result<T, StatecapError>;

/// Convert a backend error into `StoreUnavailable`
pub fn err<E: std::error::Error>(e: E) -> StatecapError {
    StatecapError::StoreUnavailable(e.to_string())
}

/// Shorthand for a `MalformedImport` error
pub(crate) fn malformed(msg: impl Into<String>) -> StatecapError {
    StatecapError::MalformedImport(msg.into())
}
