//! Source readers: one module per format plus the dispatch layer.
//!
//! The orchestrator only sees the functions here; which parser runs is
//! decided by the configured [`SourceKind`]. Discovery happens once per run
//! on a short-lived handle; each table copy then opens its own handle inside
//! its reader task, so no file or connection handle is ever shared.

pub mod dbf;
pub mod sqlite;

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::{SourceConfig, SourceKind};
use crate::core::schema::{SourceDescriptor, Table};
use crate::error::{LoadError, Result};
use crate::pipeline::queue::RowSender;

pub use dbf::DbfFile;
pub use sqlite::SqliteSource;

/// Result of streaming one table: rows actually emitted into the queue plus
/// the error that ended the stream early, if any.
#[derive(Debug)]
pub struct StreamOutcome {
    /// Rows pushed into the queue before the stream ended.
    pub rows: u64,

    /// Present when the stream ended on a source error rather than
    /// end-of-data or cancellation.
    pub error: Option<LoadError>,
}

/// Discover all tables (columns, indexes, declared row counts) from the
/// configured source. Blocking; callers run it via `spawn_blocking`.
pub fn discover(config: &SourceConfig) -> Result<Vec<Table>> {
    match config.kind {
        SourceKind::Sqlite => {
            let source = SqliteSource::open(&config.path)?;
            source.discover()
        }
        SourceKind::Dbf => {
            let mut tables = Vec::new();
            for path in dbf_files(&config.path)? {
                let file = DbfFile::open(&path, config.encoding)?;
                tables.push(file.table());
            }
            tables.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(tables)
        }
    }
}

/// Stream one table's rows into the queue.
///
/// Opens a fresh handle owned by this call (the reader task), streams until
/// end-of-data, cancellation, sink departure, or a source error, and
/// releases the handle on return.
pub fn stream_table(
    config: &SourceConfig,
    desc: &SourceDescriptor,
    tx: RowSender,
    cancel: CancellationToken,
) -> StreamOutcome {
    debug!("{}: reader starting", desc.source_table);
    match config.kind {
        SourceKind::Dbf => {
            let path = dbf_table_path(&config.path, &desc.source_table);
            match DbfFile::open(&path, config.encoding) {
                Ok(file) => file.stream_rows(&tx, &cancel),
                Err(e) => StreamOutcome {
                    rows: 0,
                    error: Some(e),
                },
            }
        }
        SourceKind::Sqlite => match SqliteSource::open(&config.path) {
            Ok(source) => source.stream_rows(&desc.source_table, &desc.columns, &tx, &cancel),
            Err(e) => StreamOutcome {
                rows: 0,
                error: Some(e),
            },
        },
    }
}

/// List the DBF files behind a source path: the file itself, or every
/// `*.dbf` in a directory (one table per file).
fn dbf_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_dir() {
        let mut files: Vec<PathBuf> = std::fs::read_dir(path)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| {
                p.extension()
                    .map(|ext| ext.eq_ignore_ascii_case("dbf"))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        Ok(files)
    } else if path.is_file() {
        Ok(vec![path.to_path_buf()])
    } else {
        Err(LoadError::Config(format!(
            "source path {} does not exist",
            path.display()
        )))
    }
}

/// Resolve the DBF file for a table name under the configured path.
fn dbf_table_path(path: &Path, table: &str) -> PathBuf {
    if path.is_dir() {
        path.join(format!("{}.dbf", table))
    } else {
        path.to_path_buf()
    }
}
