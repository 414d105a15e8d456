//! objfile library
//!
//! Copy, inspect and range-read S3 objects through the same seekable file
//! handles a columnar reader or writer would use.
//!
//! # CLI Usage
//!
//! ```bash
//! # Upload a local file (multipart when larger than one part)
//! objfile put ./data.parquet s3://my-bucket/data.parquet
//!
//! # Download an object
//! objfile get s3://my-bucket/data.parquet ./copy.parquet
//!
//! # Print the last 8 bytes of an object
//! objfile cat s3://my-bucket/data.parquet --offset 8 --from-end
//!
//! # Print the object size
//! objfile stat s3://my-bucket/data.parquet
//! ```

use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use objfile_s3::{parse_s3_uri, ObjectStore, OperationContext, S3Config, S3File};
use objfile_source::{LocalFile, SourceFile, SourceIo, Whence};

/// S3 connection options shared by every subcommand.
#[derive(Parser, Clone, Debug, Default)]
pub struct S3Opts {
    /// TOML file with S3 settings; flags override its values
    #[arg(long, value_name = "PATH", env = "OBJFILE_CONFIG")]
    pub config: Option<PathBuf>,

    /// AWS region
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,

    /// Custom endpoint for S3-compatible services
    #[arg(long, env = "AWS_ENDPOINT_URL")]
    pub endpoint_url: Option<String>,

    /// Use path-style bucket addressing
    #[arg(long, env = "OBJFILE_FORCE_PATH_STYLE")]
    pub force_path_style: bool,

    /// Upload part size in bytes (at least 5 MiB)
    #[arg(long, env = "OBJFILE_PART_SIZE")]
    pub part_size: Option<usize>,
}

impl S3Opts {
    /// Resolve the effective config: file values, then flag overrides.
    pub fn to_config(&self) -> Result<S3Config> {
        let mut config = match &self.config {
            Some(path) => S3Config::from_toml_file(path)?,
            None => S3Config::default(),
        };
        if let Some(region) = &self.region {
            config.region = Some(region.clone());
        }
        if let Some(endpoint_url) = &self.endpoint_url {
            config.endpoint_url = Some(endpoint_url.clone());
        }
        if self.force_path_style {
            config.force_path_style = true;
        }
        if let Some(part_size) = self.part_size {
            config.part_size = part_size;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Either side of a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Local(PathBuf),
    S3 { bucket: String, key: String },
}

impl Location {
    /// `s3://bucket/key` is an object; anything else is a local path.
    pub fn parse(s: &str) -> Result<Self> {
        if s.starts_with("s3://") {
            let (bucket, key) = parse_s3_uri(s)?;
            Ok(Location::S3 { bucket, key })
        } else {
            Ok(Location::Local(PathBuf::from(s)))
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Local(path) => write!(f, "{}", path.display()),
            Location::S3 { bucket, key } => write!(f, "s3://{bucket}/{key}"),
        }
    }
}

/// Which bytes `cat` prints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteWindow {
    /// Start offset, counted from the end when `from_end` is set
    pub offset: u64,
    /// Maximum number of bytes; `None` reads to the end
    pub length: Option<u64>,
    pub from_end: bool,
}

/// Runs transfers against one object store.
///
/// Every method blocks; call them from outside the async runtime.
#[derive(Clone)]
pub struct Objfile {
    store: Arc<dyn ObjectStore>,
    ctx: OperationContext,
}

impl Objfile {
    pub fn new(store: Arc<dyn ObjectStore>, ctx: OperationContext) -> Self {
        Self { store, ctx }
    }

    /// Read handle on `location`.
    pub fn open(&self, location: &Location) -> Result<Box<dyn SourceFile>> {
        match location {
            Location::Local(path) => Ok(Box::new(
                LocalFile::open(path).with_context(|| format!("Failed to open {location}"))?,
            )),
            Location::S3 { bucket, key } => Ok(Box::new(S3File::reader(
                self.store.clone(),
                self.ctx.clone(),
                bucket,
                key,
            ))),
        }
    }

    /// Write handle on `location`.
    pub fn create(&self, location: &Location) -> Result<Box<dyn SourceFile>> {
        match location {
            Location::Local(path) => Ok(Box::new(
                LocalFile::create(path).with_context(|| format!("Failed to create {location}"))?,
            )),
            Location::S3 { bucket, key } => Ok(Box::new(S3File::writer(
                self.store.clone(),
                self.ctx.clone(),
                bucket,
                key,
            ))),
        }
    }

    /// Copy `from` into `to`, returning the number of bytes copied.
    ///
    /// The destination only counts as written once its close succeeds.
    pub fn copy(&self, from: &Location, to: &Location) -> Result<u64> {
        let mut reader = SourceIo::new(self.open(from)?);
        let mut writer = SourceIo::new(self.create(to)?);

        let copied = std::io::copy(&mut reader, &mut writer)
            .with_context(|| format!("Failed to copy {from} to {to}"))?;
        writer
            .get_mut()
            .close()
            .with_context(|| format!("Failed to finish writing {to}"))?;
        reader.get_mut().close()?;

        tracing::info!("Copied {} bytes from {} to {}", copied, from, to);
        Ok(copied)
    }

    /// Write the bytes selected by `window` from `from` into `out`.
    pub fn cat(&self, from: &Location, window: ByteWindow, out: &mut impl Write) -> Result<u64> {
        let mut file = self.open(from)?;
        let offset = i64::try_from(window.offset)
            .with_context(|| format!("Offset {} is too large", window.offset))?;
        if window.from_end {
            file.seek(-offset, Whence::End)?;
        } else {
            file.seek(offset, Whence::Start)?;
        }

        let mut reader = SourceIo::new(file);
        let copied = match window.length {
            Some(length) => std::io::copy(&mut (&mut reader).take(length), out),
            None => std::io::copy(&mut reader, out),
        }
        .with_context(|| format!("Failed to read {from}"))?;
        reader.get_mut().close()?;
        Ok(copied)
    }

    /// Size of an object, or `None` when it cannot be probed.
    pub fn stat(&self, bucket: &str, key: &str) -> Option<u64> {
        S3File::reader(self.store.clone(), self.ctx.clone(), bucket, key).size()
    }
}
