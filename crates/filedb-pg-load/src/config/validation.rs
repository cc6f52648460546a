//! Configuration validation.

use regex::Regex;

use super::types::Config;
use crate::error::{LoadError, Result};

/// Validate a loaded configuration before the run starts.
pub fn validate(config: &Config) -> Result<()> {
    if config.target.host.is_empty() {
        return Err(LoadError::Config("target.host cannot be empty".into()));
    }
    if config.target.database.is_empty() {
        return Err(LoadError::Config("target.database cannot be empty".into()));
    }
    if config.target.user.is_empty() {
        return Err(LoadError::Config("target.user cannot be empty".into()));
    }
    if config.source.path.as_os_str().is_empty() {
        return Err(LoadError::Config("source.path cannot be empty".into()));
    }

    let load = &config.load;
    if load.queue_capacity == 0 {
        return Err(LoadError::Config(
            "load.queue_capacity must be at least 1".into(),
        ));
    }
    if load.concurrent_tables == 0 {
        return Err(LoadError::Config(
            "load.concurrent_tables must be at least 1".into(),
        ));
    }
    if load.data_only && load.schema_only {
        return Err(LoadError::Config(
            "load.data_only and load.schema_only are mutually exclusive".into(),
        ));
    }
    if load.truncate && load.include_drop {
        return Err(LoadError::Config(
            "load.truncate and load.include_drop are mutually exclusive".into(),
        ));
    }

    for pattern in load.including.iter().chain(load.excluding.iter()) {
        Regex::new(pattern).map_err(|e| {
            LoadError::Config(format!("invalid table pattern {:?}: {}", pattern, e))
        })?;
    }

    Ok(())
}
