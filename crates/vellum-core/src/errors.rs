//! Error types shared across the engine

use thiserror::Error;

/// Errors surfaced by every fallible engine operation
#[derive(Debug, Error)]
pub enum VellumError {
    /// The byte stream is not a valid vellum store, or import data is
    /// not decodable.
    #[error("invalid format: {0}")]
    Format(String),

    /// The store was written by a newer engine revision.
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u16),

    #[error("io error")]
    Io(#[from] std::io::Error),

    /// Query text failed to lex or parse. `position` is a byte offset
    /// into the statement.
    #[error("syntax error at offset {position}: {message}")]
    Syntax { message: String, position: usize },

    #[error("unknown collection '{0}'")]
    UnknownCollection(String),

    #[error("collection '{0}' already exists")]
    CollectionExists(String),

    #[error("invalid collection name '{0}'")]
    InvalidCollectionName(String),

    #[error("duplicate _id {0} in collection '{1}'")]
    DuplicateKey(String, String),

    #[error("invalid _id value: {0}")]
    InvalidId(String),

    #[error("no active transaction")]
    NoTransaction,

    #[error("a transaction is already active")]
    TransactionActive,

    #[error("missing query parameter @{0}")]
    Parameter(String),

    /// Runtime expression evaluation failure (type mismatch, overflow,
    /// bad path write, ...).
    #[error("cannot evaluate expression: {0}")]
    Eval(String),

    #[error("no active query tab")]
    NoActiveTab,

    #[error("json error")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, VellumError>;

impl VellumError {
    pub(crate) fn format(message: impl Into<String>) -> Self {
        VellumError::Format(message.into())
    }

    pub(crate) fn syntax(message: impl Into<String>, position: usize) -> Self {
        VellumError::Syntax { message: message.into(), position }
    }

    pub(crate) fn eval(message: impl Into<String>) -> Self {
        VellumError::Eval(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VellumError::format("bad magic");
        assert_eq!(err.to_string(), "invalid format: bad magic");

        let err = VellumError::syntax("expected FROM", 12);
        assert_eq!(err.to_string(), "syntax error at offset 12: expected FROM");

        let err = VellumError::DuplicateKey("3".into(), "users".into());
        assert_eq!(err.to_string(), "duplicate _id 3 in collection 'users'");
    }

    #[test]
    fn test_io_error_source() {
        use std::error::Error;

        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let err = VellumError::from(io);
        assert!(err.source().is_some());
    }
}
