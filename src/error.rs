//! Custom error types for the application.
//!
//! This module defines the primary error type, `TelemetryError`, for the whole pipeline.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the failures that can end a run, from configuration issues to a collaborator
//! refusing to decode a clip.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment`, typically TOML parse errors or a value
//!   of the wrong type in the configuration file or environment.
//! - **`Configuration`**: Semantic errors in a configuration that parsed fine, such as a
//!   zero byte cap or a duplicated channel name. Caught by `TelemergeConfig::validate`.
//! - **`Input`**: The input stream could not be opened or failed mid-read.
//! - **`Extraction`** / **`Rendering`**: The two external collaborators failed. Both are
//!   terminal for the run and are never retried.
//! - **`MissingChannel`**: The renderer did not produce a channel the merge asked for.
//! - **`MissingColumn`**: A channel lacks the join column of the timestamp strategy.
//! - **`Table`**: A channel table could not be parsed field-wise (timestamp join only).
//! - **`Output`**: The merged table could not be written.
//!
//! By using `#[from]`, `TelemetryError` can be created from the underlying error types,
//! which keeps `?` usable throughout the crate.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, TelemetryError>;

/// Every way a run can fail.
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read input '{path}': {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Telemetry extraction failed: {0}")]
    Extraction(String),

    #[error("Channel rendering failed: {0}")]
    Rendering(String),

    #[error("Channel '{0}' missing from rendered telemetry")]
    MissingChannel(String),

    #[error("Channel '{channel}' has no '{column}' column")]
    MissingColumn { channel: String, column: String },

    #[error("Malformed channel table: {0}")]
    Table(#[from] csv::Error),

    #[error("Failed to write output '{path}': {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("External tool '{0}' not found on PATH")]
    ToolNotFound(String),
}

impl From<figment::Error> for TelemetryError {
    fn from(value: figment::Error) -> Self {
        TelemetryError::Config(Box::new(value))
    }
}

impl TelemetryError {
    /// Short name of the pipeline stage the error belongs to, used in diagnostics.
    pub fn stage(&self) -> &'static str {
        match self {
            TelemetryError::Config(_) | TelemetryError::Configuration(_) => "config",
            TelemetryError::Input { .. } => "read",
            TelemetryError::Extraction(_) | TelemetryError::ToolNotFound(_) => "extract",
            TelemetryError::Rendering(_) => "render",
            TelemetryError::MissingChannel(_)
            | TelemetryError::MissingColumn { .. }
            | TelemetryError::Table(_) => "merge",
            TelemetryError::Output { .. } => "write",
            TelemetryError::Io(_) => "io",
        }
    }
}
