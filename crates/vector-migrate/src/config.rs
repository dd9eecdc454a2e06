//! Configuration types for vector-migrate.
//!
//! A run is described by a YAML file with `source`, `destination` and
//! `options` sections. Any key can be overridden from the environment with
//! the `VECTOR_MIGRATE_` prefix and `__` as the nesting separator, e.g.
//! `VECTOR_MIGRATE_OPTIONS__BATCH_SIZE=250`.

use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::connectors::json_export::JsonExportConfig;
use crate::connectors::jsonl_file::JsonlFileConfig;
use crate::connectors::Distance;
use crate::error::{Error, Result};
use crate::pipeline::MigrationPlan;
use crate::retry::RetryConfig;
use crate::transform::TransformConfig;

/// Environment prefix for configuration overrides.
pub const ENV_PREFIX: &str = "VECTOR_MIGRATE_";

/// Upper bound on writer tasks.
pub const MAX_WORKERS: usize = 16;

/// Main migration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Source store configuration.
    pub source: SourceConfig,
    /// Destination store or sink configuration.
    pub destination: TargetConfig,
    /// Migration options.
    #[serde(default)]
    pub options: MigrationOptions,
}

/// Source store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SourceConfig {
    /// Qdrant collection read through the REST API.
    #[serde(rename = "qdrant")]
    Qdrant(QdrantConfig),
    /// Newline-delimited JSON file.
    #[serde(rename = "jsonl_file")]
    JsonlFile(JsonlFileConfig),
}

/// Destination configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TargetConfig {
    /// Qdrant collection written through the REST API.
    #[serde(rename = "qdrant")]
    Qdrant(QdrantTargetConfig),
    /// Single JSON export document.
    #[serde(rename = "json_file")]
    JsonFile(JsonExportConfig),
}

/// Qdrant source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantConfig {
    /// Qdrant server URL.
    pub url: String,
    /// Collection name.
    pub collection: String,
    /// Optional API key.
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Qdrant destination configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantTargetConfig {
    /// Qdrant server URL.
    pub url: String,
    /// Collection name (defaults to the source collection).
    pub collection: Option<String>,
    /// Optional API key.
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Vector dimension (defaults to the source dimension).
    pub dimension: Option<usize>,
    /// Distance metric (defaults to the source metric).
    pub distance: Option<Distance>,
}

/// Retry policy for remote calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryOptions {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// First backoff delay in milliseconds.
    pub initial_delay_ms: u64,
    /// Backoff ceiling in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff multiplier.
    pub backoff_multiplier: f64,
    /// Add up to 25% random jitter.
    pub jitter: bool,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Migration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationOptions {
    /// Records per scan page and per write batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Number of concurrent writer tasks.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Batches allowed in flight ahead of the writers (defaults to `workers`).
    #[serde(default)]
    pub max_in_flight: Option<usize>,
    /// Stop after this many records.
    #[serde(default)]
    pub limit: Option<u64>,
    /// Dry run mode (don't write to destination).
    #[serde(default)]
    pub dry_run: bool,
    /// Retry policy for scans and writes.
    #[serde(default)]
    pub retry: RetryOptions,
    /// Record transformation rules.
    #[serde(default)]
    pub transform: TransformConfig,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            workers: default_workers(),
            max_in_flight: None,
            limit: None,
            dry_run: false,
            retry: RetryOptions::default(),
            transform: TransformConfig::default(),
        }
    }
}

fn default_batch_size() -> usize {
    100
}

fn default_workers() -> usize {
    2
}

fn default_timeout_secs() -> u64 {
    60
}

impl SourceConfig {
    /// Collection the source is read from.
    #[must_use]
    pub fn collection(&self) -> String {
        match self {
            Self::Qdrant(cfg) => cfg.collection.clone(),
            Self::JsonlFile(cfg) => cfg.collection_name(),
        }
    }
}

impl TargetConfig {
    /// Collection configured on the destination, if any.
    #[must_use]
    pub fn collection(&self) -> Option<String> {
        match self {
            Self::Qdrant(cfg) => cfg.collection.clone(),
            Self::JsonFile(cfg) => cfg.collection.clone(),
        }
    }
}

impl MigrationConfig {
    /// Load configuration from a YAML file, applying `VECTOR_MIGRATE_*` overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or the merged configuration
    /// cannot be parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }

        Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Parse configuration from a YAML string, without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        let options = &self.options;
        if options.batch_size == 0 {
            return Err(Error::Config("batch_size must be greater than 0".to_string()));
        }
        if options.workers == 0 || options.workers > MAX_WORKERS {
            return Err(Error::Config(format!(
                "workers must be between 1 and {MAX_WORKERS}"
            )));
        }
        if options.max_in_flight == Some(0) {
            return Err(Error::Config(
                "max_in_flight must be greater than 0".to_string(),
            ));
        }
        if options.retry.backoff_multiplier < 1.0 {
            return Err(Error::Config(
                "retry.backoff_multiplier must be at least 1.0".to_string(),
            ));
        }
        if self.source.collection().is_empty() {
            return Err(Error::Config(
                "source collection name cannot be empty".to_string(),
            ));
        }
        if self.destination.collection().is_some_and(|c| c.is_empty()) {
            return Err(Error::Config(
                "destination collection name cannot be empty".to_string(),
            ));
        }
        if let TargetConfig::Qdrant(cfg) = &self.destination {
            if cfg.dimension == Some(0) {
                return Err(Error::Config(
                    "dimension must be greater than 0".to_string(),
                ));
            }
        }
        options.transform.validate()
    }

    /// Builds the run plan handed to the [`Pipeline`](crate::pipeline::Pipeline).
    #[must_use]
    pub fn plan(&self) -> MigrationPlan {
        let source_collection = self.source.collection();
        let target_collection = self
            .destination
            .collection()
            .unwrap_or_else(|| source_collection.clone());
        let (dimension, distance) = match &self.destination {
            TargetConfig::Qdrant(cfg) => (cfg.dimension, cfg.distance),
            TargetConfig::JsonFile(_) => (None, None),
        };

        MigrationPlan {
            source_collection,
            target_collection,
            batch_size: self.options.batch_size,
            workers: self.options.workers,
            max_in_flight: self.options.max_in_flight.unwrap_or(self.options.workers),
            limit: self.options.limit,
            dry_run: self.options.dry_run,
            dimension,
            distance,
            retry: RetryConfig::from(&self.options.retry),
            transform: self.options.transform.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn qdrant_config() -> MigrationConfig {
        MigrationConfig {
            source: SourceConfig::Qdrant(QdrantConfig {
                url: "http://10.128.0.2:6333".to_string(),
                collection: "incidents".to_string(),
                api_key: None,
                timeout_secs: 60,
            }),
            destination: TargetConfig::Qdrant(QdrantTargetConfig {
                url: "https://cloud.qdrant.io".to_string(),
                collection: None,
                api_key: Some("key".to_string()),
                timeout_secs: 60,
                dimension: None,
                distance: None,
            }),
            options: MigrationOptions::default(),
        }
    }

    #[test]
    fn test_config_defaults() {
        let options = MigrationOptions::default();
        assert_eq!(options.batch_size, 100);
        assert_eq!(options.workers, 2);
        assert_eq!(options.max_in_flight, None);
        assert!(!options.dry_run);
        assert_eq!(options.retry.max_retries, 5);
    }

    #[test]
    fn test_config_validate_ok() {
        assert!(qdrant_config().validate().is_ok());
    }

    #[test]
    fn test_config_validate_batch_size() {
        let mut config = qdrant_config();
        config.options.batch_size = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_config_validate_workers() {
        let mut config = qdrant_config();
        config.options.workers = MAX_WORKERS + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validate_dimension() {
        let mut config = qdrant_config();
        if let TargetConfig::Qdrant(cfg) = &mut config.destination {
            cfg.dimension = Some(0);
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_plan_defaults_target_collection_to_source() {
        let plan = qdrant_config().plan();

        assert_eq!(plan.source_collection, "incidents");
        assert_eq!(plan.target_collection, "incidents");
        assert_eq!(plan.max_in_flight, 2);
    }

    #[test]
    fn test_config_yaml_parse() {
        let yaml = r#"
source:
  type: qdrant
  url: http://localhost:6333
  collection: incidents
destination:
  type: json_file
  path: ./exports/incidents.json
options:
  batch_size: 500
  limit: 1000
  transform:
    truncate:
      content: 1000
"#;
        let config = MigrationConfig::from_yaml_str(yaml).unwrap();

        assert_eq!(config.options.batch_size, 500);
        assert_eq!(config.options.limit, Some(1000));
        assert_eq!(config.options.transform.truncate.get("content"), Some(&1000));
        match config.destination {
            TargetConfig::JsonFile(cfg) => {
                assert_eq!(cfg.path, PathBuf::from("./exports/incidents.json"));
            }
            TargetConfig::Qdrant(_) => panic!("expected json_file destination"),
        }
    }

    #[test]
    fn test_from_file_with_env_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("migration.yaml");
        std::fs::write(
            &path,
            "source:\n  type: qdrant\n  url: http://localhost:6333\n  collection: a\ndestination:\n  type: qdrant\n  url: http://localhost:6334\n",
        )
        .unwrap();

        figment::Jail::expect_with(|jail| {
            jail.set_env("VECTOR_MIGRATE_OPTIONS__BATCH_SIZE", "250");
            let config = MigrationConfig::from_file(&path).expect("config loads");
            assert_eq!(config.options.batch_size, 250);
            Ok(())
        });
    }

    #[test]
    fn test_from_file_missing() {
        let result = MigrationConfig::from_file(Path::new("/nonexistent/migration.yaml"));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
