//! Output formatting for command results.

use clap::ValueEnum;
use serde::Serialize;

use crate::error::CliError;

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines
    Text,
    /// Pretty-printed JSON
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Render a result, using `text` for the text format.
pub fn render<T, F>(format: OutputFormat, value: &T, text: F) -> Result<String, CliError>
where
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    match format {
        OutputFormat::Text => Ok(text(value)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(value)?),
    }
}

/// Display name of a state; the empty state is the origin.
pub fn state_label(state: &str) -> &str {
    if state.is_empty() {
        "(origin)"
    } else {
        state
    }
}
