//! S3 connection configuration.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Smallest part size S3 accepts for every part but the last (5 MiB).
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Configuration for [`AwsObjectStore`](crate::AwsObjectStore).
///
/// Credentials always come from the AWS default provider chain; this only
/// carries what the chain cannot infer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct S3Config {
    /// AWS region (e.g., "us-east-1"). `None` lets the provider chain decide.
    pub region: Option<String>,

    /// Custom endpoint for S3-compatible services (MinIO, LocalStack, ...)
    pub endpoint_url: Option<String>,

    /// Address buckets as `endpoint/bucket` instead of `bucket.endpoint`.
    pub force_path_style: bool,

    /// Bytes per uploaded part. Streams shorter than one part are sent with a
    /// single PutObject.
    pub part_size: usize,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: None,
            endpoint_url: None,
            force_path_style: false,
            part_size: MIN_PART_SIZE,
        }
    }
}

impl S3Config {
    /// Load a config from a TOML file. Missing fields take their defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read S3 config: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse S3 config: {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: S3Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the values against S3's limits.
    pub fn validate(&self) -> Result<()> {
        if self.part_size < MIN_PART_SIZE {
            anyhow::bail!(
                "part_size {} is below the S3 minimum of {} bytes",
                self.part_size,
                MIN_PART_SIZE
            );
        }
        Ok(())
    }
}
