//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Self::load_unvalidated(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration without validating it, for callers that complete
    /// it with overrides first.
    pub fn load_unvalidated<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Apply command-line overrides and re-validate.
    pub fn with_overrides(mut self, overrides: &ConfigOverrides) -> Result<Self> {
        fn set<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if let Some(v) = value {
                *slot = Some(v.clone());
            }
        }

        set(&mut self.source.table, &overrides.source_table);
        set(&mut self.source.columns, &overrides.source_columns);
        set(&mut self.source.query, &overrides.source_query);
        set(&mut self.source.filter, &overrides.source_where);
        set(&mut self.sink.table, &overrides.sink_table);
        set(&mut self.sink.columns, &overrides.sink_columns);
        if let Some(jobs) = overrides.jobs {
            self.replication.jobs = jobs;
        }
        if let Some(batch_size) = overrides.batch_size {
            self.replication.batch_size = batch_size;
        }

        self.validate()?;
        Ok(self)
    }
}
