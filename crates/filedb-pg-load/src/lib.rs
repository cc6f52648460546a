//! # filedb-pg-load
//!
//! Bulk loader streaming rows from file-based databases (dBase DBF files
//! and SQLite databases) into PostgreSQL with support for:
//!
//! - **Bulk transfers** using the PostgreSQL COPY text protocol
//! - **Schema materialization** with per-format type mapping
//! - **Parallel index rebuilds** sized to the busiest table
//! - **Sequence resets** after the data lands
//! - **Per-table accounting** with reject files for bad rows
//!
//! ## Example
//!
//! ```rust,no_run
//! use filedb_pg_load::{Config, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> filedb_pg_load::Result<()> {
//!     let config = Config::load("load.yaml")?;
//!     let orchestrator = Orchestrator::new(config)?;
//!     let report = orchestrator.run(CancellationToken::new()).await?;
//!     println!("{}", report.render());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod source;
pub mod stats;
pub mod target;
pub mod typemap;

// Re-exports for convenient access
pub use config::{Config, Encoding, LoadConfig, RunContext, SourceConfig, SourceKind, TargetConfig};
pub use crate::core::{Column, Index, Row, SourceDescriptor, SqlValue, Table, TypeTag};
pub use error::{LoadError, Result};
pub use orchestrator::{Orchestrator, TableFilter};
pub use stats::{PhaseStats, RunReport, StateBundle, TableStats};
pub use typemap::{map_column, map_dbf_type, map_sqlite_type, Transform};
