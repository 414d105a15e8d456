//! AWS SDK implementation of [`ObjectStore`]

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;

use crate::config::S3Config;
use crate::range::ByteRange;
use crate::store::{BodyStream, ObjectStore};

/// [`ObjectStore`] backed by `aws_sdk_s3`.
///
/// Creating an S3 client is relatively expensive, so one store should be
/// shared (behind an `Arc`) by every handle that talks to the same account.
pub struct AwsObjectStore {
    client: aws_sdk_s3::Client,
    part_size: usize,
}

impl AwsObjectStore {
    /// Wrap an existing client.
    pub fn new(client: aws_sdk_s3::Client, part_size: usize) -> Self {
        Self { client, part_size }
    }

    /// Build a client from the AWS default provider chain plus `config`.
    pub async fn from_config(config: &S3Config) -> Result<Self> {
        config.validate()?;

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint_url) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint_url);
        }
        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();
        let client = aws_sdk_s3::Client::from_conf(s3_config);

        Ok(Self::new(client, config.part_size))
    }

    async fn put_whole(&self, bucket: &str, key: &str, data: Bytes) -> Result<()> {
        let len = data.len();
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .with_context(|| format!("Failed to put object: s3://{bucket}/{key}"))?;
        tracing::debug!("Put {} bytes to s3://{}/{}", len, bucket, key);
        Ok(())
    }

    async fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        first: Bytes,
        parts: &mut PartReader,
    ) -> Result<Vec<CompletedPart>> {
        let mut completed = Vec::new();
        let mut next = Some(first);
        let mut part_number: i32 = 1;

        while let Some(data) = next {
            let len = data.len();
            let response = self
                .client
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(data))
                .send()
                .await
                .with_context(|| {
                    format!("Failed to upload part {part_number} of s3://{bucket}/{key}")
                })?;
            completed.push(
                CompletedPart::builder()
                    .set_e_tag(response.e_tag().map(str::to_owned))
                    .part_number(part_number)
                    .build(),
            );
            tracing::debug!(
                "Uploaded part {} ({} bytes) of s3://{}/{}",
                part_number,
                len,
                bucket,
                key
            );

            part_number += 1;
            next = parts.next_part().await?;
        }

        Ok(completed)
    }

    async fn abort(&self, bucket: &str, key: &str, upload_id: &str) {
        let result = self
            .client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await;
        if let Err(e) = result {
            tracing::warn!(
                "Failed to abort multipart upload {} for s3://{}/{}: {}",
                upload_id,
                bucket,
                key,
                e
            );
        }
    }
}

#[async_trait]
impl ObjectStore for AwsObjectStore {
    async fn probe(&self, bucket: &str, key: &str) -> Result<u64> {
        let head = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to head object: s3://{bucket}/{key}"))?;
        let length = head.content_length().with_context(|| {
            format!("HeadObject returned no content length for s3://{bucket}/{key}")
        })?;
        u64::try_from(length)
            .with_context(|| format!("Negative content length {length} for s3://{bucket}/{key}"))
    }

    async fn fetch_range(&self, bucket: &str, key: &str, range: &ByteRange) -> Result<Bytes> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .range(range.to_string())
            .send()
            .await
            .with_context(|| format!("Failed to fetch {range} of s3://{bucket}/{key}"))?;
        let body = response
            .body
            .collect()
            .await
            .with_context(|| format!("Failed to read {range} of s3://{bucket}/{key}"))?;
        Ok(body.into_bytes())
    }

    async fn upload_stream(&self, bucket: &str, key: &str, body: BodyStream) -> Result<()> {
        let mut parts = PartReader::new(body, self.part_size);
        let first = parts.next_part().await?.unwrap_or_default();

        if parts.is_exhausted() {
            return self.put_whole(bucket, key, first).await;
        }

        let created = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to create multipart upload: s3://{bucket}/{key}"))?;
        let upload_id = created
            .upload_id()
            .context("CreateMultipartUpload returned no upload ID")?
            .to_string();

        let completed = match self
            .upload_parts(bucket, key, &upload_id, first, &mut parts)
            .await
        {
            Ok(completed) => completed,
            Err(e) => {
                self.abort(bucket, key, &upload_id).await;
                return Err(e);
            }
        };

        let part_count = completed.len();
        let multipart = CompletedMultipartUpload::builder()
            .set_parts(Some(completed))
            .build();
        if let Err(e) = self
            .client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(multipart)
            .send()
            .await
        {
            self.abort(bucket, key, &upload_id).await;
            return Err(e)
                .with_context(|| format!("Failed to complete multipart upload: s3://{bucket}/{key}"));
        }

        tracing::debug!(
            "Completed multipart upload of s3://{}/{} in {} parts",
            bucket,
            key,
            part_count
        );
        Ok(())
    }
}

/// Regroups an arbitrary chunked body into parts of `part_size` bytes. Every
/// part except the last is exactly `part_size` long.
pub(crate) struct PartReader {
    body: BodyStream,
    buffer: BytesMut,
    part_size: usize,
    eof: bool,
}

impl PartReader {
    pub(crate) fn new(body: BodyStream, part_size: usize) -> Self {
        Self {
            body,
            buffer: BytesMut::new(),
            part_size,
            eof: false,
        }
    }

    /// Next part, or `None` once the body is exhausted.
    pub(crate) async fn next_part(&mut self) -> Result<Option<Bytes>> {
        while !self.eof && self.buffer.len() < self.part_size {
            match self.body.next().await {
                Some(chunk) => {
                    let chunk = chunk.context("Upload body failed")?;
                    self.buffer.extend_from_slice(&chunk);
                }
                None => self.eof = true,
            }
        }
        if self.buffer.is_empty() {
            return Ok(None);
        }
        let len = self.buffer.len().min(self.part_size);
        Ok(Some(self.buffer.split_to(len).freeze()))
    }

    /// Whether every byte of the body has been handed out.
    pub(crate) fn is_exhausted(&self) -> bool {
        self.eof && self.buffer.is_empty()
    }
}
