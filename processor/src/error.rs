//! Errors of the outer, genuinely fallible operations
//!
//! Malformed trace records are never errors: they are counted in
//! [`crate::storage::Stats`] and skipped.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("failed to render configuration: {0}")]
    ConfigRender(#[from] toml::ser::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: malformed packet: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, ProcessorError>;
