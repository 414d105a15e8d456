//! S3 objects as seekable files
//!
//! This crate implements [`objfile_source::SourceFile`] for objects in S3 (or
//! any S3-compatible service), even though S3 itself only offers whole and
//! multipart PUTs plus ranged GETs.
//!
//! - **Reading**: every `read` becomes one ranged GET computed from the cursor,
//!   the last whence and the object size (probed once with HEAD)
//! - **Writing**: writes are piped into a background multipart upload; the
//!   object appears when `close` returns `Ok`
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use objfile_s3::{AwsObjectStore, OperationContext, S3Config, S3File};
//! use objfile_source::{SourceFile, Whence};
//!
//! let runtime = tokio::runtime::Runtime::new()?;
//! let store = Arc::new(runtime.block_on(AwsObjectStore::from_config(&S3Config::default()))?);
//! let ctx = OperationContext::new(runtime.handle().clone());
//!
//! let mut writer = S3File::writer(store.clone(), ctx.clone(), "my-bucket", "data/file.bin");
//! writer.write(b"hello world")?;
//! writer.close()?;
//!
//! let mut reader = S3File::reader(store, ctx, "my-bucket", "data/file.bin");
//! reader.seek(-5, Whence::End)?;
//! let mut buf = [0u8; 5];
//! reader.read(&mut buf)?;
//! ```

mod aws;
mod config;
mod context;
mod file;
mod memory;
mod pipe;
mod range;
mod store;


pub use aws::AwsObjectStore;
pub use config::{S3Config, MIN_PART_SIZE};
pub use context::OperationContext;
pub use file::S3File;
pub use memory::MemoryObjectStore;
pub use range::ByteRange;
pub use store::{BodyStream, ObjectStore};

use anyhow::{Context, Result};

/// Parse S3 URI in the format: s3://bucket/key/to/file
pub fn parse_s3_uri(uri: &str) -> Result<(String, String)> {
    let uri = uri
        .strip_prefix("s3://")
        .context("S3 URI must start with 's3://'")?;

    let parts: Vec<&str> = uri.splitn(2, '/').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        anyhow::bail!("S3 URI must be in format 's3://bucket/key/to/file'");
    }

    Ok((parts[0].to_string(), parts[1].to_string()))
}
