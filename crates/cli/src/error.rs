//! CLI error types.

use thiserror::Error;

use crate::config::ConfigError;

/// CLI errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A one-shot lookup failed.
    #[error(transparent)]
    Lookup(#[from] lookup::Error),

    /// The MCP session ended with an error.
    #[error("MCP session failed: {0}")]
    Mcp(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Binding or serving the webhook failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
