//! Configuration loading and validation.
//!
//! A run is described by a YAML file. Environment variables are substituted
//! into the text before parsing so credentials stay out of the file.

mod vars;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{
    ConfigError, EmptyPatternSnafu, EmptySinkPathSnafu, EmptySourcePathSnafu,
    EnvInterpolationSnafu, ReadFileSnafu, YamlParseSnafu,
};
use crate::transform::time::Timezone;

/// Default configuration file looked up when none is given.
pub const DEFAULT_CONFIG_PATH: &str = "playlake.yaml";

/// Main configuration structure for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    pub sink: SinkConfig,
    #[serde(default)]
    pub transform: TransformConfig,
    /// Metrics configuration (optional, disabled by default).
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Where the raw track and event files live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Input base location.
    /// Examples: "s3a://udacity-dend/", "/data/raw", "memory://raw"
    pub path: String,

    /// Pattern, relative to `path`, matching track metadata files.
    #[serde(default = "default_tracks_pattern")]
    pub tracks_pattern: String,

    /// Pattern, relative to `path`, matching session log files.
    #[serde(default = "default_events_pattern")]
    pub events_pattern: String,

    /// Storage options (credentials, region, etc.)
    #[serde(default)]
    pub storage_options: HashMap<String, String>,

    /// Maximum number of files fetched concurrently (default: 8)
    #[serde(default = "default_max_concurrent_files")]
    pub max_concurrent_files: usize,
}

fn default_tracks_pattern() -> String {
    "song_data/*/*/*/*.json".to_string()
}

fn default_events_pattern() -> String {
    "log_data/**/*.json".to_string()
}

fn default_max_concurrent_files() -> usize {
    8
}

/// Where the analytics tables are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Output base location; each table lands in a subdirectory.
    pub path: String,

    /// Storage options (credentials, region, etc.)
    #[serde(default)]
    pub storage_options: HashMap<String, String>,

    /// Parquet compression codec.
    #[serde(default)]
    pub compression: ParquetCompression,

    /// Rows per Parquet file before a partition is split (default: 1,000,000)
    #[serde(default = "default_max_rows_per_file")]
    pub max_rows_per_file: usize,

    /// Maximum concurrent file uploads (default: 4)
    #[serde(default = "default_max_concurrent_uploads")]
    pub max_concurrent_uploads: usize,
}

fn default_max_rows_per_file() -> usize {
    1_000_000
}

fn default_max_concurrent_uploads() -> usize {
    4
}

/// Settings for the derived columns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformConfig {
    /// Clock used to split playback timestamps into calendar fields.
    #[serde(default)]
    pub timezone: Timezone,
}

/// Metrics configuration for the Prometheus endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Address to bind the metrics HTTP server (default: "0.0.0.0:9090").
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
        }
    }
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}

/// Parquet compression codec.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParquetCompression {
    Uncompressed,
    #[default]
    Snappy,
    Gzip,
    Zstd,
    Lz4,
}

impl Config {
    /// Configuration for the given input and output locations with every
    /// other setting at its default.
    pub fn new(source_path: impl Into<String>, sink_path: impl Into<String>) -> Self {
        Self {
            source: SourceConfig {
                path: source_path.into(),
                tracks_pattern: default_tracks_pattern(),
                events_pattern: default_events_pattern(),
                storage_options: HashMap::new(),
                max_concurrent_files: default_max_concurrent_files(),
            },
            sink: SinkConfig {
                path: sink_path.into(),
                storage_options: HashMap::new(),
                compression: ParquetCompression::default(),
                max_rows_per_file: default_max_rows_per_file(),
                max_concurrent_uploads: default_max_concurrent_uploads(),
            },
            transform: TransformConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }

    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).context(ReadFileSnafu {
            path: path.display().to_string(),
        })?;
        Self::from_yaml(&content)
    }

    /// Parse configuration text, substituting environment variables first.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let substituted = vars::substitute(content);
        if !substituted.is_ok() {
            return EnvInterpolationSnafu {
                message: substituted.errors.join("\n"),
            }
            .fail();
        }

        let config: Config = serde_yaml::from_str(&substituted.text).context(YamlParseSnafu)?;
        config.validated()
    }

    /// Check required settings and clamp concurrency and size limits to at least 1.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        ensure!(!self.source.path.trim().is_empty(), EmptySourcePathSnafu);
        ensure!(!self.sink.path.trim().is_empty(), EmptySinkPathSnafu);
        ensure!(
            !self.source.tracks_pattern.trim().is_empty(),
            EmptyPatternSnafu { kind: "track" }
        );
        ensure!(
            !self.source.events_pattern.trim().is_empty(),
            EmptyPatternSnafu { kind: "event" }
        );

        self.source.max_concurrent_files = self.source.max_concurrent_files.max(1);
        self.sink.max_rows_per_file = self.sink.max_rows_per_file.max(1);
        self.sink.max_concurrent_uploads = self.sink.max_concurrent_uploads.max(1);
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let yaml = r#"
source:
  path: "s3a://udacity-dend/"
sink:
  path: "s3://analytics/warehouse"
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.source.tracks_pattern, "song_data/*/*/*/*.json");
        assert_eq!(config.source.events_pattern, "log_data/**/*.json");
        assert_eq!(config.source.max_concurrent_files, 8);
        assert_eq!(config.sink.compression, ParquetCompression::Snappy);
        assert_eq!(config.sink.max_rows_per_file, 1_000_000);
        assert_eq!(config.transform.timezone, Timezone::Utc);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_full_config_parsing() {
        let yaml = r#"
source:
  path: "/data/raw"
  tracks_pattern: "song_data/A/A/A/*.json"
  events_pattern: "log-data/*.json"
  max_concurrent_files: 2
sink:
  path: "/data/out"
  compression: zstd
  max_rows_per_file: 500
  max_concurrent_uploads: 0
transform:
  timezone: "+05:30"
metrics:
  enabled: true
  address: "127.0.0.1:9100"
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.source.tracks_pattern, "song_data/A/A/A/*.json");
        assert_eq!(config.sink.compression, ParquetCompression::Zstd);
        assert_eq!(config.sink.max_rows_per_file, 500);
        assert_eq!(config.sink.max_concurrent_uploads, 1);
        assert_eq!(config.transform.timezone.to_string(), "+05:30");
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_empty_paths_rejected() {
        let yaml = r#"
source:
  path: ""
sink:
  path: "/out"
"#;
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::EmptySourcePath));

        let err = Config::new("/in", " ").validated().unwrap_err();
        assert!(matches!(err, ConfigError::EmptySinkPath));
    }

    #[test]
    fn test_invalid_timezone_rejected() {
        let yaml = r#"
source:
  path: "/in"
sink:
  path: "/out"
transform:
  timezone: "mars/olympus"
"#;
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::YamlParse { .. }));
        assert!(err.to_string().contains("mars/olympus"));
    }

    #[test]
    fn test_environment_substitution() {
        // SAFETY: variable name is unique to this test
        unsafe { std::env::set_var("PLAYLAKE_CONFIG_TEST_BUCKET", "warehouse") };
        let yaml = r#"
source:
  path: "s3://${PLAYLAKE_CONFIG_TEST_BUCKET}/raw"
sink:
  path: "s3://${PLAYLAKE_CONFIG_TEST_BUCKET}/out"
  storage_options:
    aws_region: "${PLAYLAKE_CONFIG_TEST_REGION:-us-west-2}"
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.source.path, "s3://warehouse/raw");
        assert_eq!(config.sink.storage_options["aws_region"], "us-west-2");
    }

    #[test]
    fn test_missing_environment_variable() {
        let yaml = "source:\n  path: $PLAYLAKE_CONFIG_TEST_NEVER_SET\nsink:\n  path: /out\n";
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::EnvInterpolation { .. }));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "source:\n  path: /in\nsink:\n  path: /out").unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.source.path, "/in");

        let err = Config::from_file("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }
}
