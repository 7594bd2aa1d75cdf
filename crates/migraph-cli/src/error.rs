//! CLI error type.

use migraph_core::migration::{MigrationError, PlanError};
use thiserror::Error;

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// A file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// The file path.
        path: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The plan file is not valid JSON for a plan.
    #[error("invalid plan file: {0}")]
    Parse(#[from] serde_json::Error),

    /// The plan definition is invalid.
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// A migration failed.
    #[error(transparent)]
    Migration(#[from] MigrationError),

    /// The database or state store failed.
    #[error(transparent)]
    Storage(#[from] migraph_core::Error),

    /// The state directory could not be opened.
    #[error("state store error: {0}")]
    State(#[from] sled::Error),
}
