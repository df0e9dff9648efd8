//! URL parsing for storage backends.
//!
//! Extracts backend configuration from the URL formats accepted for the
//! input and output base locations.

use object_store::path::Path;
use regex::Regex;
use snafu::prelude::*;
use std::sync::LazyLock;

use crate::error::{InvalidUrlSnafu, StorageError};

use super::{LocalConfig, MemoryConfig, S3Config};

// URL patterns for different storage backends
const S3_PATH: &str =
    r"^https://s3\.(?P<region>[\w\-]+)\.amazonaws\.com/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";
const S3_VIRTUAL: &str =
    r"^https://(?P<bucket>[a-z0-9\-\.]+)\.s3\.(?P<region>[\w\-]+)\.amazonaws\.com(/(?P<key>.+))?$";
const S3_URL: &str = r"^[sS]3[aAnN]?://(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.*))?$";
const S3_ENDPOINT_URL: &str = r"^[sS]3[aA]?::(?<protocol>https?)://(?P<endpoint>[^:/]+):(?<port>\d+)/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";

const FILE_URI: &str = r"^file://(?P<path>.*)$";
const FILE_URL: &str = r"^file:(?P<path>.*)$";
const FILE_PATH: &str = r"^(?P<path>/.*)$";
const RELATIVE_PATH: &str = r"^(?P<path>[^:]+)$";

const MEMORY_URL: &str = r"^memory://(?P<key>.*)$";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    S3,
    Memory,
    Local,
}

/// Matchers in precedence order; relative paths are tried last.
static MATCHERS: LazyLock<Vec<(Backend, Vec<Regex>)>> = LazyLock::new(|| {
    let compile = |pattern: &str| Regex::new(pattern).expect("storage URL pattern is valid");
    vec![
        (
            Backend::S3,
            vec![
                compile(S3_PATH),
                compile(S3_VIRTUAL),
                compile(S3_ENDPOINT_URL),
                compile(S3_URL),
            ],
        ),
        (Backend::Memory, vec![compile(MEMORY_URL)]),
        (
            Backend::Local,
            vec![
                compile(FILE_URI),
                compile(FILE_URL),
                compile(FILE_PATH),
                compile(RELATIVE_PATH),
            ],
        ),
    ]
});

/// Backend configuration enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    S3(S3Config),
    Local(LocalConfig),
    Memory(MemoryConfig),
}

fn key_from(matches: &regex::Captures) -> Option<Path> {
    matches
        .name("key")
        .map(|m| m.as_str().trim_matches('/'))
        .filter(|k| !k.is_empty())
        .map(Path::from)
}

impl BackendConfig {
    /// Parse a URL into a backend configuration.
    pub fn parse_url(url: &str) -> Result<Self, StorageError> {
        for (backend, regexes) in MATCHERS.iter() {
            if let Some(matches) = regexes.iter().find_map(|r| r.captures(url)) {
                return match backend {
                    Backend::S3 => Self::parse_s3(&matches, url),
                    Backend::Memory => Ok(BackendConfig::Memory(MemoryConfig {
                        key: key_from(&matches),
                    })),
                    Backend::Local => Self::parse_local(&matches, url),
                };
            }
        }

        InvalidUrlSnafu {
            url: url.to_string(),
        }
        .fail()
    }

    fn parse_s3(matches: &regex::Captures, url: &str) -> Result<Self, StorageError> {
        let bucket = matches
            .name("bucket")
            .context(InvalidUrlSnafu { url })?
            .as_str()
            .to_string();

        let region = std::env::var("AWS_DEFAULT_REGION")
            .ok()
            .or_else(|| matches.name("region").map(|m| m.as_str().to_string()));

        let endpoint = std::env::var("AWS_ENDPOINT").ok().or_else(|| {
            matches.name("endpoint").map(|endpoint| {
                let port = matches
                    .name("port")
                    .and_then(|p| p.as_str().parse::<u16>().ok())
                    .unwrap_or(443);
                let protocol = matches
                    .name("protocol")
                    .map(|p| p.as_str())
                    .unwrap_or("https");
                format!("{protocol}://{}:{port}", endpoint.as_str())
            })
        });

        Ok(BackendConfig::S3(S3Config {
            endpoint,
            region,
            bucket,
            key: key_from(matches),
        }))
    }

    fn parse_local(matches: &regex::Captures, url: &str) -> Result<Self, StorageError> {
        let path = matches
            .name("path")
            .context(InvalidUrlSnafu { url })?
            .as_str()
            .trim_end_matches('/');

        let path = if path.is_empty() { "/" } else { path };

        Ok(BackendConfig::Local(LocalConfig {
            path: path.to_string(),
            key: None,
        }))
    }

    pub(crate) fn key(&self) -> Option<&Path> {
        match self {
            BackendConfig::S3(s3) => s3.key.as_ref(),
            BackendConfig::Local(local) => local.key.as_ref(),
            BackendConfig::Memory(memory) => memory.key.as_ref(),
        }
    }

    /// The same backend rooted at a different key prefix.
    pub(crate) fn with_key(&self, key: Option<Path>) -> Self {
        match self {
            BackendConfig::S3(s3) => BackendConfig::S3(S3Config { key, ..s3.clone() }),
            BackendConfig::Local(local) => BackendConfig::Local(LocalConfig {
                key,
                ..local.clone()
            }),
            BackendConfig::Memory(_) => BackendConfig::Memory(MemoryConfig { key }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s3_url_parsing() {
        let config = BackendConfig::parse_url("s3://mybucket/path/to/data").unwrap();
        match config {
            BackendConfig::S3(s3) => {
                assert_eq!(s3.bucket, "mybucket");
                assert_eq!(s3.key, Some(Path::from("path/to/data")));
            }
            _ => panic!("Expected S3 config"),
        }
    }

    #[test]
    fn test_s3a_url_without_key() {
        let config = BackendConfig::parse_url("s3a://udacity-dend/").unwrap();
        match config {
            BackendConfig::S3(s3) => {
                assert_eq!(s3.bucket, "udacity-dend");
                assert_eq!(s3.key, None);
            }
            _ => panic!("Expected S3 config"),
        }
    }

    #[test]
    fn test_s3_path_style_url() {
        let config =
            BackendConfig::parse_url("https://s3.us-west-2.amazonaws.com/mybucket/out").unwrap();
        match config {
            BackendConfig::S3(s3) => {
                assert_eq!(s3.bucket, "mybucket");
                assert_eq!(s3.key, Some(Path::from("out")));
            }
            _ => panic!("Expected S3 config"),
        }
    }

    #[test]
    fn test_s3_custom_endpoint_url() {
        let config =
            BackendConfig::parse_url("s3::http://localhost:9000/warehouse/analytics").unwrap();
        match config {
            BackendConfig::S3(s3) => {
                assert_eq!(s3.bucket, "warehouse");
                assert_eq!(s3.key, Some(Path::from("analytics")));
                if std::env::var("AWS_ENDPOINT").is_err() {
                    assert_eq!(s3.endpoint.as_deref(), Some("http://localhost:9000"));
                }
            }
            _ => panic!("Expected S3 config"),
        }
    }

    #[test]
    fn test_local_url_parsing() {
        let config = BackendConfig::parse_url("/local/path/to/data").unwrap();
        match config {
            BackendConfig::Local(local) => {
                assert_eq!(local.path, "/local/path/to/data");
            }
            _ => panic!("Expected Local config"),
        }
    }

    #[test]
    fn test_file_url_parsing() {
        let config = BackendConfig::parse_url("file:///local/path/to/data/").unwrap();
        match config {
            BackendConfig::Local(local) => {
                assert_eq!(local.path, "/local/path/to/data");
            }
            _ => panic!("Expected Local config"),
        }
    }

    #[test]
    fn test_relative_path_parsing() {
        let config = BackendConfig::parse_url("data/output").unwrap();
        match config {
            BackendConfig::Local(local) => assert_eq!(local.path, "data/output"),
            _ => panic!("Expected Local config"),
        }
    }

    #[test]
    fn test_memory_url_parsing() {
        let config = BackendConfig::parse_url("memory://warehouse/out").unwrap();
        assert_eq!(
            config,
            BackendConfig::Memory(MemoryConfig {
                key: Some(Path::from("warehouse/out"))
            })
        );
    }

    #[test]
    fn test_invalid_url() {
        let result = BackendConfig::parse_url("invalid://url");
        assert!(result.is_err());
    }
}
