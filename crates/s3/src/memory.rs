//! In-process [`ObjectStore`] that keeps objects in a map
//!
//! Serves ranges with S3 semantics and records every request, which makes it
//! the store of choice for tests and dry runs.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;

use crate::range::ByteRange;
use crate::store::{BodyStream, ObjectStore};

#[derive(Default)]
struct State {
    objects: HashMap<(String, String), Bytes>,
    probe_calls: usize,
    upload_calls: usize,
    aborted_uploads: usize,
    ranges: Vec<String>,
    probe_failure: Option<String>,
    upload_failure: Option<(usize, String)>,
}

/// Objects held in memory, keyed by `(bucket, key)`.
#[derive(Default)]
pub struct MemoryObjectStore {
    state: Mutex<State>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, bucket: &str, key: &str, data: impl Into<Bytes>) {
        self.state()
            .objects
            .insert((bucket.to_string(), key.to_string()), data.into());
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.state()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Number of `probe` calls served so far.
    pub fn probe_calls(&self) -> usize {
        self.state().probe_calls
    }

    /// Number of `upload_stream` calls started so far.
    pub fn upload_calls(&self) -> usize {
        self.state().upload_calls
    }

    /// Number of uploads that ended in an error, leaving nothing stored.
    pub fn aborted_uploads(&self) -> usize {
        self.state().aborted_uploads
    }

    /// Range headers of every `fetch_range` call, in order.
    pub fn requested_ranges(&self) -> Vec<String> {
        self.state().ranges.clone()
    }

    /// Make every following probe fail, as if HEAD were not permitted.
    pub fn fail_probes(&self, message: &str) {
        self.state().probe_failure = Some(message.to_string());
    }

    /// Make every following upload fail once it has received `after` bytes.
    pub fn fail_uploads_after(&self, after: usize, message: &str) {
        self.state().upload_failure = Some((after, message.to_string()));
    }

    fn object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        self.get(bucket, key)
            .ok_or_else(|| anyhow!("NoSuchKey: s3://{bucket}/{key}"))
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn probe(&self, bucket: &str, key: &str) -> Result<u64> {
        let failure = {
            let mut state = self.state();
            state.probe_calls += 1;
            state.probe_failure.clone()
        };
        if let Some(message) = failure {
            anyhow::bail!("{message}");
        }
        Ok(self.object(bucket, key)?.len() as u64)
    }

    async fn fetch_range(&self, bucket: &str, key: &str, range: &ByteRange) -> Result<Bytes> {
        self.state().ranges.push(range.to_string());
        let data = self.object(bucket, key)?;
        let len = data.len() as u64;

        let (begin, end) = match *range {
            ByteRange::Bounded { begin, end } => {
                if begin >= len || end < begin {
                    anyhow::bail!("InvalidRange: {range} of {len} byte object");
                }
                (begin, end.min(len - 1))
            }
            ByteRange::Suffix(n) => {
                if n == 0 || len == 0 {
                    anyhow::bail!("InvalidRange: {range} of {len} byte object");
                }
                (len - n.min(len), len - 1)
            }
        };
        Ok(data.slice(begin as usize..=end as usize))
    }

    async fn upload_stream(&self, bucket: &str, key: &str, body: BodyStream) -> Result<()> {
        let failure = {
            let mut state = self.state();
            state.upload_calls += 1;
            state.upload_failure.clone()
        };

        match receive(body, failure).await {
            Ok(content) => {
                tracing::debug!(
                    "Stored {} bytes at s3://{}/{}",
                    content.len(),
                    bucket,
                    key
                );
                self.insert(bucket, key, content);
                Ok(())
            }
            Err(e) => {
                self.state().aborted_uploads += 1;
                Err(e)
            }
        }
    }
}

/// Drain `body`, failing as configured by `fail_uploads_after`.
async fn receive(mut body: BodyStream, failure: Option<(usize, String)>) -> Result<Vec<u8>> {
    let mut content = Vec::new();
    if let Some((0, message)) = &failure {
        anyhow::bail!("{message}");
    }
    while let Some(chunk) = body.next().await {
        let chunk = chunk.context("Upload body failed")?;
        content.extend_from_slice(&chunk);
        if let Some((after, message)) = &failure {
            if content.len() >= *after {
                anyhow::bail!("{message}");
            }
        }
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_range_clamps_to_object() {
        let store = MemoryObjectStore::new();
        store.insert("b", "k", &b"0123456789"[..]);
        let range = ByteRange::Bounded { begin: 7, end: 20 };
        let data = tokio_test::block_on(store.fetch_range("b", "k", &range)).unwrap();
        assert_eq!(&data[..], b"789");
        assert_eq!(store.requested_ranges(), vec!["bytes=7-20"]);
    }

    #[test]
    fn test_suffix_range() {
        let store = MemoryObjectStore::new();
        store.insert("b", "k", &b"0123456789"[..]);
        let data =
            tokio_test::block_on(store.fetch_range("b", "k", &ByteRange::Suffix(3))).unwrap();
        assert_eq!(&data[..], b"789");
        let data =
            tokio_test::block_on(store.fetch_range("b", "k", &ByteRange::Suffix(30))).unwrap();
        assert_eq!(&data[..], b"0123456789");
    }

    #[test]
    fn test_range_past_end_is_invalid() {
        let store = MemoryObjectStore::new();
        store.insert("b", "k", &b"abc"[..]);
        let range = ByteRange::Bounded { begin: 3, end: 5 };
        let err = tokio_test::block_on(store.fetch_range("b", "k", &range)).unwrap_err();
        assert!(err.to_string().contains("InvalidRange"));
    }

    #[test]
    fn test_probe_counts_and_missing_key() {
        let store = MemoryObjectStore::new();
        store.insert("b", "k", &b"abc"[..]);
        assert_eq!(tokio_test::block_on(store.probe("b", "k")).unwrap(), 3);
        assert!(tokio_test::block_on(store.probe("b", "missing")).is_err());
        assert_eq!(store.probe_calls(), 2);
    }

    #[test]
    fn test_upload_stores_concatenation() {
        let store = MemoryObjectStore::new();
        let body: BodyStream = Box::pin(futures::stream::iter(vec![
            Ok(Bytes::from_static(b"ab")),
            Ok(Bytes::from_static(b"cd")),
        ]));
        tokio_test::block_on(store.upload_stream("b", "k", body)).unwrap();
        assert_eq!(&store.get("b", "k").unwrap()[..], b"abcd");
        assert_eq!(store.upload_calls(), 1);
        assert_eq!(store.aborted_uploads(), 0);
    }

    #[test]
    fn test_failed_body_counts_as_aborted() {
        let store = MemoryObjectStore::new();
        let body: BodyStream = Box::pin(futures::stream::iter(vec![
            Ok(Bytes::from_static(b"ab")),
            Err(std::io::Error::other("writer went away")),
        ]));
        let err = tokio_test::block_on(store.upload_stream("b", "k", body)).unwrap_err();
        assert!(format!("{err:#}").contains("writer went away"));
        assert_eq!(store.aborted_uploads(), 1);
        assert!(store.get("b", "k").is_none());
    }
}
