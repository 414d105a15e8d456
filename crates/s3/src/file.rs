//! S3 object exposed as a seekable [`SourceFile`]
//!
//! A handle is either a reader or a writer for its whole life.
//!
//! **Reads** are served one ranged GET per `read` call. The object's size is
//! learned lazily by a HEAD probe on first use; if the probe is refused the
//! handle keeps working with an unknown size and leaves range validity to the
//! server (see [`crate::range`]).
//!
//! **Writes** go through a zero-capacity pipe to one background task per
//! handle that streams the bytes into a (multipart) upload. The object only
//! exists once `close` has returned `Ok`. The first failure on either side is
//! latched and returned by every later `write` and by `close`. Cancelling the
//! context fails the upload body, so a started multipart upload is aborted
//! before `close` returns `Cancelled`.

use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use objfile_source::{Result, SourceError, SourceFile, Whence};
use tokio::sync::{oneshot, RwLock};

use crate::context::OperationContext;
use crate::pipe::{pipe, PipeWriter};
use crate::range::{self, ByteRange};
use crate::store::ObjectStore;

/// Identity of the target object plus the means to reach it.
#[derive(Clone)]
struct ObjectRef {
    store: Arc<dyn ObjectStore>,
    ctx: OperationContext,
    bucket: String,
    key: String,
}

impl ObjectRef {
    fn with_key(&self, name: &str) -> Self {
        let key = if name.is_empty() { &self.key } else { name };
        Self {
            store: self.store.clone(),
            ctx: self.ctx.clone(),
            bucket: self.bucket.clone(),
            key: key.to_string(),
        }
    }

    fn uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }

    /// HEAD the object. A refused probe leaves the size unknown.
    fn probe(&self) -> Option<u64> {
        match self
            .ctx
            .block_on("HeadObject", self.store.probe(&self.bucket, &self.key))
        {
            Ok(size) => {
                tracing::debug!("Probed {}: {} bytes", self.uri(), size);
                Some(size)
            }
            Err(e) => {
                tracing::warn!(
                    "Could not determine size of {}, reading with unknown size: {}",
                    self.uri(),
                    e
                );
                None
            }
        }
    }

    fn fetch(&self, range: &ByteRange) -> Result<Bytes> {
        tracing::debug!("GetObject {} {}", self.uri(), range);
        self.ctx.block_on(
            "GetObject",
            self.store.fetch_range(&self.bucket, &self.key, range),
        )
    }
}

struct ReadState {
    cursor: i64,
    anchor: Whence,
    /// Initialized once the probe has run; `None` inside means unknown size.
    size: OnceLock<Option<u64>>,
    closed: bool,
}

impl ReadState {
    fn new(size: OnceLock<Option<u64>>) -> Self {
        Self {
            cursor: 0,
            anchor: Whence::Start,
            size,
            closed: false,
        }
    }

    fn known_size(&self, object: &ObjectRef) -> Option<u64> {
        *self.size.get_or_init(|| object.probe())
    }
}

/// Write-session state shared with the background uploader.
#[derive(Default)]
struct WriteLatch {
    active: bool,
    error: Option<SourceError>,
}

impl WriteLatch {
    /// Keep the first error; later ones are dropped.
    fn record(&mut self, err: SourceError) -> SourceError {
        self.error.get_or_insert(err).clone()
    }
}

struct WriteSession {
    writer: PipeWriter,
    done: Option<oneshot::Receiver<Result<()>>>,
}

impl WriteSession {
    fn start(object: &ObjectRef, latch: &Arc<RwLock<WriteLatch>>) -> Self {
        let (writer, reader) = pipe(object.ctx.cancellation_token().clone());
        let (done_tx, done_rx) = oneshot::channel();
        latch.blocking_write().active = true;

        let task_object = object.clone();
        let task_latch = latch.clone();
        object.ctx.spawn(async move {
            let object = task_object;
            // Cancellation arrives through the body so a multipart upload
            // still gets aborted
            let result = object
                .ctx
                .run_to_completion(
                    "Upload",
                    object
                        .store
                        .upload_stream(&object.bucket, &object.key, Box::pin(reader)),
                )
                .await;
            match &result {
                Ok(()) => tracing::info!("Uploaded {}", object.uri()),
                Err(e) => {
                    task_latch.write().await.record(e.clone());
                    tracing::warn!("Upload of {} failed: {}", object.uri(), e);
                }
            }
            // Nobody waiting means the handle was dropped
            let _ = done_tx.send(result);
        });

        tracing::debug!("Started upload session for {}", object.uri());
        Self {
            writer,
            done: Some(done_rx),
        }
    }

    /// Wait for the uploader's outcome. Only the first call waits.
    fn join(&mut self) -> Result<()> {
        match self.done.take() {
            Some(done) => done.blocking_recv().unwrap_or_else(|_| {
                Err(SourceError::transport("Upload", "upload task ended without a result"))
            }),
            None => Ok(()),
        }
    }
}

struct WriteState {
    latch: Arc<RwLock<WriteLatch>>,
    session: Option<WriteSession>,
    outcome: Option<Result<()>>,
}

impl WriteState {
    fn new() -> Self {
        Self {
            latch: Arc::default(),
            session: None,
            outcome: None,
        }
    }

    fn latched_error(&self) -> Option<SourceError> {
        self.latch.blocking_read().error.clone()
    }

    fn write(&mut self, object: &ObjectRef, buf: &[u8]) -> Result<usize> {
        if self.outcome.is_some() {
            return Err(SourceError::Closed);
        }
        if let Some(err) = self.latched_error() {
            return Err(err);
        }

        let latch = &self.latch;
        let session = self
            .session
            .get_or_insert_with(|| WriteSession::start(object, latch));

        match session.writer.write(buf) {
            Ok(n) => Ok(n),
            Err(pipe_err) => {
                // The pipe only breaks when the uploader is gone; its outcome says why
                let cause = session.join().err().unwrap_or(pipe_err);
                let err = self.latch.blocking_write().record(cause);
                session.writer.close_with_error(err.clone());
                Err(err)
            }
        }
    }

    fn close(&mut self, object: &ObjectRef) -> Result<()> {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }

        // Closing without a single write still creates an (empty) object
        let latch = &self.latch;
        let session = self
            .session
            .get_or_insert_with(|| WriteSession::start(object, latch));
        session.writer.close();
        let outcome = session.join().and_then(|()| match self.latched_error() {
            Some(err) => Err(err),
            None => Ok(()),
        });

        self.outcome = Some(outcome.clone());
        outcome
    }
}

enum Mode {
    Read(ReadState),
    Write(WriteState),
}

/// A seekable handle on one S3 object.
pub struct S3File {
    object: ObjectRef,
    mode: Mode,
}

impl S3File {
    /// Read handle for `bucket/key`. Nothing is requested until first use.
    pub fn reader(
        store: Arc<dyn ObjectStore>,
        ctx: OperationContext,
        bucket: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            object: ObjectRef {
                store,
                ctx,
                bucket: bucket.into(),
                key: key.into(),
            },
            mode: Mode::Read(ReadState::new(OnceLock::new())),
        }
    }

    /// Write handle for `bucket/key`. The upload starts with the first write.
    pub fn writer(
        store: Arc<dyn ObjectStore>,
        ctx: OperationContext,
        bucket: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            object: ObjectRef {
                store,
                ctx,
                bucket: bucket.into(),
                key: key.into(),
            },
            mode: Mode::Write(WriteState::new()),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.object.bucket
    }

    pub fn key(&self) -> &str {
        &self.object.key
    }

    pub fn is_writer(&self) -> bool {
        matches!(self.mode, Mode::Write(_))
    }

    /// Object size, probing first if this read handle has not yet.
    ///
    /// `None` for write handles and for objects whose size could not be probed.
    pub fn size(&self) -> Option<u64> {
        match &self.mode {
            Mode::Read(state) => state.known_size(&self.object),
            Mode::Write(_) => None,
        }
    }

    /// Whether the size probe has already run for this handle.
    pub fn is_probed(&self) -> bool {
        match &self.mode {
            Mode::Read(state) => state.size.get().is_some(),
            Mode::Write(_) => false,
        }
    }

    /// Whether the background upload has been started.
    pub fn is_uploading(&self) -> bool {
        match &self.mode {
            Mode::Write(state) => state.latch.blocking_read().active,
            Mode::Read(_) => false,
        }
    }

    /// New read handle on `name` (or this handle's key if empty).
    ///
    /// A sibling on the same key inherits the probe result, so it never
    /// probes again; its cursor starts at zero.
    pub fn open_reader(&self, name: &str) -> S3File {
        let object = self.object.with_key(name);
        let size = match &self.mode {
            Mode::Read(state) if object.key == self.object.key => {
                OnceLock::from(state.known_size(&self.object))
            }
            _ => OnceLock::new(),
        };
        S3File {
            object,
            mode: Mode::Read(ReadState::new(size)),
        }
    }

    /// New write handle on `name` (or this handle's key if empty).
    pub fn create_writer(&self, name: &str) -> S3File {
        S3File {
            object: self.object.with_key(name),
            mode: Mode::Write(WriteState::new()),
        }
    }
}

impl SourceFile for S3File {
    fn create(&self, name: &str) -> Result<Box<dyn SourceFile>> {
        Ok(Box::new(self.create_writer(name)))
    }

    fn open(&self, name: &str) -> Result<Box<dyn SourceFile>> {
        Ok(Box::new(self.open_reader(name)))
    }

    /// Validate and record the new cursor. Writers ignore seeks.
    fn seek(&mut self, offset: i64, whence: Whence) -> Result<i64> {
        let Mode::Read(state) = &mut self.mode else {
            return Ok(offset);
        };
        if state.closed {
            return Err(SourceError::Closed);
        }
        let known_size = state.size.get().copied().flatten();
        let (cursor, anchor) =
            range::seek_target(offset, whence, state.cursor, state.anchor, known_size)?;
        state.cursor = cursor;
        state.anchor = anchor;
        Ok(cursor)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Mode::Read(state) = &mut self.mode else {
            return Err(SourceError::Unsupported("read"));
        };
        if state.closed {
            return Err(SourceError::Closed);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let known_size = state.known_size(&self.object);
        let range = range::read_range(state.cursor, state.anchor, known_size, buf.len())?;
        let data = self.object.fetch(&range)?;

        // The response may be longer than asked for (suffix ranges)
        let n = data.len().min(buf.len());
        if n == 0 {
            return Err(SourceError::EndOfStream);
        }
        buf[..n].copy_from_slice(&data[..n]);
        state.cursor = match range {
            // A short suffix response is the whole object; keep the cursor
            // relative to its real end
            ByteRange::Suffix(asked) if (data.len() as u64) < asked => {
                -((data.len() - n) as i64)
            }
            _ => state.cursor + n as i64,
        };
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        match &mut self.mode {
            Mode::Write(state) => state.write(&self.object, buf),
            Mode::Read(_) => Err(SourceError::Unsupported("write")),
        }
    }

    fn close(&mut self) -> Result<()> {
        match &mut self.mode {
            Mode::Write(state) => state.close(&self.object),
            Mode::Read(state) => {
                state.closed = true;
                Ok(())
            }
        }
    }
}

impl Drop for S3File {
    fn drop(&mut self) {
        let Mode::Write(state) = &mut self.mode else {
            return;
        };
        if state.outcome.is_some() {
            return;
        }
        if let Some(session) = &mut state.session {
            tracing::warn!(
                "Write handle for {} dropped before close, aborting upload",
                self.object.uri()
            );
            session
                .writer
                .close_with_error(SourceError::transport("Upload", "handle dropped before close"));
        }
    }
}
