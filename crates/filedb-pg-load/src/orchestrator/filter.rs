//! Table selection filter.
//!
//! A table is selected iff it is in `only_tables` (when non-empty), matches
//! at least one `including` pattern (when any are given), and matches no
//! `excluding` pattern. The same filter governs which tables' indexes are
//! rebuilt.

use regex::Regex;

use crate::config::LoadConfig;
use crate::error::{LoadError, Result};

/// Compiled table filter for one run.
#[derive(Debug, Default)]
pub struct TableFilter {
    only: Vec<String>,
    including: Vec<Regex>,
    excluding: Vec<Regex>,
}

impl TableFilter {
    /// Compile the filter from the run options.
    pub fn from_options(load: &LoadConfig) -> Result<Self> {
        Ok(Self {
            only: load.only_tables.clone(),
            including: compile(&load.including)?,
            excluding: compile(&load.excluding)?,
        })
    }

    /// Whether the named table is selected.
    pub fn matches(&self, table: &str) -> bool {
        if !self.only.is_empty() && !self.only.iter().any(|t| t == table) {
            return false;
        }
        if !self.including.is_empty() && !self.including.iter().any(|re| re.is_match(table)) {
            return false;
        }
        !self.excluding.iter().any(|re| re.is_match(table))
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p)
                .map_err(|e| LoadError::Config(format!("invalid table pattern {:?}: {}", p, e)))
        })
        .collect()
}
