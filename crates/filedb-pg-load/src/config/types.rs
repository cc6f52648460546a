//! Configuration type definitions.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source artifact configuration (DBF file/directory or SQLite file).
    pub source: SourceConfig,

    /// Target database configuration (PostgreSQL).
    pub target: TargetConfig,

    /// Load behavior configuration.
    #[serde(default)]
    pub load: LoadConfig,
}

/// Kind of source artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// dBase III/IV fixed-layout record file(s).
    Dbf,
    /// SQLite database file.
    Sqlite,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Dbf => write!(f, "dbf"),
            SourceKind::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Text encoding used when decoding DBF field bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Encoding {
    /// UTF-8, invalid sequences replaced.
    #[default]
    Utf8,
    /// ISO-8859-1, every byte maps to the same code point.
    Latin1,
}

/// Source artifact configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Source format.
    pub kind: SourceKind,

    /// Path to the artifact. For DBF this may be a single `.dbf` file or a
    /// directory of them (one table per file); for SQLite it is the
    /// database file, opened read-only.
    pub path: PathBuf,

    /// Encoding for DBF text fields.
    #[serde(default)]
    pub encoding: Encoding,
}

/// Target database (PostgreSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(skip_serializing)]
    pub password: String,

    /// Target schema (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,
}

impl TargetConfig {
    /// Build a connection string for tokio-postgres.
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            self.host, self.port, self.database, self.user, self.password
        )
    }
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .finish()
    }
}

/// Load behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Create target tables before copying.
    pub create_tables: bool,

    /// Emit DROP TABLE IF EXISTS before each CREATE TABLE.
    pub include_drop: bool,

    /// Truncate preexisting target tables instead of recreating them.
    pub truncate: bool,

    /// Copy data only: skip schema creation and index builds.
    pub data_only: bool,

    /// Create schema only: skip the data copy.
    pub schema_only: bool,

    /// Rebuild source indexes on the target.
    pub create_indexes: bool,

    /// Reset owned sequences after the copy.
    pub reset_sequences: bool,

    /// Restrict the load to exactly these tables (source spelling).
    pub only_tables: Vec<String>,

    /// Regex patterns a table must match (any of) to be selected.
    pub including: Vec<String>,

    /// Regex patterns that deselect a table (any match excludes).
    pub excluding: Vec<String>,

    /// Row queue capacity between reader and sink.
    pub queue_capacity: usize,

    /// Number of tables copied concurrently. Each active table runs one
    /// reader and one sink worker.
    pub concurrent_tables: usize,

    /// Fold unquoted identifiers to lower case.
    pub fold_identifiers: bool,

    /// Directory receiving the log and per-table reject files.
    pub root_dir: PathBuf,

    /// Optional file path for the final summary.
    pub summary_path: Option<PathBuf>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            create_tables: true,
            include_drop: false,
            truncate: false,
            data_only: false,
            schema_only: false,
            create_indexes: true,
            reset_sequences: true,
            only_tables: Vec::new(),
            including: Vec::new(),
            excluding: Vec::new(),
            queue_capacity: 10,
            concurrent_tables: 1,
            fold_identifiers: true,
            root_dir: PathBuf::from("."),
            summary_path: None,
        }
    }
}

fn default_pg_port() -> u16 {
    5432
}

fn default_public_schema() -> String {
    "public".to_string()
}

/// Explicit run-scoped state threaded through the pipeline instead of
/// process-wide globals.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Directory for reject files and logs.
    pub root_dir: PathBuf,

    /// Optional summary output path.
    pub summary_path: Option<PathBuf>,
}

impl RunContext {
    /// Build the context from the load configuration.
    pub fn from_config(load: &LoadConfig) -> Self {
        Self {
            root_dir: load.root_dir.clone(),
            summary_path: load.summary_path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_defaults() {
        let load = LoadConfig::default();
        assert!(load.create_tables);
        assert!(!load.include_drop);
        assert!(load.create_indexes);
        assert!(load.reset_sequences);
        assert_eq!(load.queue_capacity, 10);
        assert_eq!(load.concurrent_tables, 1);
    }

    #[test]
    fn test_target_config_password_not_serialized() {
        let config = TargetConfig {
            host: "localhost".to_string(),
            port: 5432,
            database: "test".to_string(),
            user: "postgres".to_string(),
            password: "super_secret".to_string(),
            schema: "public".to_string(),
        };

        let json = serde_json::to_string(&config).unwrap();
        assert!(
            !json.contains("super_secret"),
            "Password was serialized: {}",
            json
        );
    }

    #[test]
    fn test_target_debug_redacts_password() {
        let config = TargetConfig {
            host: "localhost".to_string(),
            port: 5432,
            database: "test".to_string(),
            user: "postgres".to_string(),
            password: "super_secret".to_string(),
            schema: "public".to_string(),
        };
        let debug = format!("{:?}", config);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super_secret"));
    }
}
