//! Object storage transport seam
//!
//! [`S3File`](crate::S3File) only needs three capabilities from a transport:
//! learn an object's size, fetch a byte range, and upload a stream of unknown
//! length. Keeping them behind a trait lets the same handle run against the AWS
//! SDK in production and an in-process store in tests.

use std::pin::Pin;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::range::ByteRange;

/// Body of a streamed upload. The stream ends when the writer closes; an
/// `Err` item means the writer gave up and the upload must not be committed.
pub type BodyStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Transport operations used by [`S3File`](crate::S3File).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Total length of the object, from a metadata-only request.
    async fn probe(&self, bucket: &str, key: &str) -> Result<u64>;

    /// Bytes covered by `range`. May return more than the range asks for.
    async fn fetch_range(&self, bucket: &str, key: &str, range: &ByteRange) -> Result<Bytes>;

    /// Consume `body` to completion and store it as the object's content,
    /// splitting it into parts as the protocol requires.
    async fn upload_stream(&self, bucket: &str, key: &str, body: BodyStream) -> Result<()>;
}
