//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use std::path::Path;

use crate::error::{LoadError, Result};

impl Config {
    /// Load configuration from a file.
    ///
    /// `.json` files are parsed as JSON; everything else is treated as YAML.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase());

        match extension.as_deref() {
            Some("json") => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        }
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)
            .map_err(|e| LoadError::Config(format!("Failed to parse JSON config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const VALID_YAML: &str = r#"
source:
  kind: sqlite
  path: fixtures/app.db

target:
  host: localhost
  port: 5432
  database: target_db
  user: postgres
  password: password

load:
  include_drop: true
  excluding: ["^audit_"]
"#;

    #[test]
    fn test_from_yaml_valid() {
        let config = Config::from_yaml(VALID_YAML).unwrap();
        assert_eq!(config.source.kind, SourceKind::Sqlite);
        assert_eq!(config.target.database, "target_db");
        assert!(config.load.include_drop);
        assert_eq!(config.load.excluding, vec!["^audit_".to_string()]);
        // Unspecified load options keep their defaults.
        assert!(config.load.create_tables);
        assert_eq!(config.load.queue_capacity, 10);
    }

    #[test]
    fn test_from_yaml_missing_target_fails() {
        let result = Config::from_yaml("source:\n  kind: dbf\n  path: a.dbf\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_from_json_valid() {
        let json = r#"{
          "source": {"kind": "dbf", "path": "people.dbf", "encoding": "latin1"},
          "target": {
            "host": "localhost",
            "database": "db",
            "user": "pg",
            "password": "pw"
          }
        }"#;
        let config = Config::from_json(json).unwrap();
        assert_eq!(config.source.kind, SourceKind::Dbf);
        assert_eq!(config.source.encoding, Encoding::Latin1);
        assert_eq!(config.target.port, 5432);
        assert_eq!(config.target.schema, "public");
    }

    #[test]
    fn test_from_json_invalid_syntax() {
        let result = Config::from_json(r#"{ "source": { invalid }"#);
        assert!(matches!(result, Err(LoadError::Config(_))));
    }

    #[test]
    fn test_load_detects_extension() {
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        file.write_all(VALID_YAML.as_bytes()).unwrap();
        file.flush().unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.target.host, "localhost");
    }
}
