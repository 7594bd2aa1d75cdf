//! Core error types.

use thiserror::Error;

/// Storage-level errors raised by store handles and state persistence.
#[derive(Debug, Error)]
pub enum Error {
    /// Embedded key-value store error.
    #[error("state storage error: {0}")]
    Sled(#[from] sled::Error),

    /// SQLite driver error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A statement was rejected by the store.
    #[error("statement failed: {message} (statement: {statement})")]
    Statement {
        /// The statement text that failed.
        statement: String,
        /// Driver or store message.
        message: String,
    },

    /// Transaction error.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),
}
