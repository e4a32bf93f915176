//! Crate-wide error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Timestamp string did not match the canonical format.
    #[error("malformed timestamp {value:?}: {source}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    /// Configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse config {path}: {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// Stream mode named in the configuration is not supported.
    #[error("unsupported stream mode {0:?}")]
    UnsupportedMode(String),

    /// Pipeline control operation issued in the wrong state.
    #[error("{0}")]
    PipelineState(&'static str),

    /// Ingest transport failed to initialize.
    #[error("ingest transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, Error>;
