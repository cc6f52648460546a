//! Error types for the load library.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for load operations.
#[derive(Error, Debug)]
pub enum LoadError {
    /// Configuration error (invalid YAML, missing fields, bad pattern, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A source file could not be parsed (malformed header, truncated record).
    /// Fatal for the table it belongs to.
    #[error("Source format error in {path}: {message}")]
    SourceFormat { path: PathBuf, message: String },

    /// A source-side query or row step failed. Recoverable: the table's
    /// counters record the error and other tables proceed.
    #[error("Source query error on table {table}: {source}")]
    SourceQuery {
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    /// The COPY stream or its transaction failed. Fatal for the table.
    #[error("Sink error on table {table} near row {row}: {message}")]
    Sink {
        table: String,
        row: u64,
        message: String,
    },

    /// A DDL statement failed during the schema phase. Fatal for the run.
    #[error("Schema error: {0}")]
    Schema(String),

    /// A single index build failed. Recoverable: logged against the index.
    #[error("Index build failed for {index}: {message}")]
    Index { index: String, message: String },

    /// A single sequence reset failed. Recoverable: logged, others proceed.
    #[error("Sequence reset failed for {sequence}: {message}")]
    Sequence { sequence: String, message: String },

    /// Target database connection or protocol error.
    #[error("PostgreSQL error: {0}")]
    Pg(#[from] tokio_postgres::Error),

    /// Embedded database error outside of row stepping.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error (file operations).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The run was cancelled (SIGINT, etc.)
    #[error("Load cancelled")]
    Cancelled,
}

impl LoadError {
    /// Create a SourceFormat error.
    pub fn source_format(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        LoadError::SourceFormat {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a Sink error with the approximate failing row index.
    pub fn sink(table: impl Into<String>, row: u64, message: impl Into<String>) -> Self {
        LoadError::Sink {
            table: table.into(),
            row,
            message: message.into(),
        }
    }

    /// Create an Index error.
    pub fn index(index: impl Into<String>, message: impl Into<String>) -> Self {
        LoadError::Index {
            index: index.into(),
            message: message.into(),
        }
    }

    /// Create a Sequence error.
    pub fn sequence(sequence: impl Into<String>, message: impl Into<String>) -> Self {
        LoadError::Sequence {
            sequence: sequence.into(),
            message: message.into(),
        }
    }

    /// Process exit code for this error. 0 is reserved for success and 3 for
    /// extension loading (handled outside this library).
    pub fn exit_code(&self) -> u8 {
        1
    }

    /// Format error with full details including the error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for load operations.
pub type Result<T> = std::result::Result<T, LoadError>;
