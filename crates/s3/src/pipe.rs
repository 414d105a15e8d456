//! Synchronous byte pipe from a blocking writer to an async body stream
//!
//! Every [`PipeWriter::write`] blocks until the [`PipeReader`] stream has
//! handed that chunk to its consumer, so at most one chunk is ever in flight
//! and a slow upload applies backpressure straight to the writer.
//!
//! Cancelling the pipe's token ends the stream with an error, so the consumer
//! goes through its normal failure path (aborting a multipart upload) instead
//! of being dropped mid-flight.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use futures::Stream;
use objfile_source::{Result, SourceError};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

struct Chunk {
    data: Bytes,
    taken: oneshot::Sender<()>,
}

/// Error the writer closed with, delivered to the reader as the final item.
#[derive(Default)]
struct Shared {
    close_error: Mutex<Option<SourceError>>,
}

/// Create a connected writer/reader pair. Cancelling `cancel` fails the reader.
pub(crate) fn pipe(cancel: CancellationToken) -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel(1);
    let shared = Arc::new(Shared::default());
    (
        PipeWriter {
            tx: Some(tx),
            shared: shared.clone(),
        },
        PipeReader {
            rx,
            shared,
            cancelled: Box::pin(cancel.cancelled_owned()),
            finished: false,
        },
    )
}

/// Blocking write end. Must not be used from inside the runtime.
pub(crate) struct PipeWriter {
    tx: Option<mpsc::Sender<Chunk>>,
    shared: Arc<Shared>,
}

impl PipeWriter {
    /// Hand `buf` to the reader, blocking until it has been taken.
    ///
    /// Fails with [`SourceError::ClosedPipe`] once either end is closed.
    pub(crate) fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let tx = self.tx.as_ref().ok_or(SourceError::ClosedPipe)?;
        if buf.is_empty() {
            return Ok(0);
        }
        let (taken, taken_rx) = oneshot::channel();
        let chunk = Chunk {
            data: Bytes::copy_from_slice(buf),
            taken,
        };
        tx.blocking_send(chunk)
            .map_err(|_| SourceError::ClosedPipe)?;
        // the reader dropping the chunk unread also lands here
        taken_rx
            .blocking_recv()
            .map_err(|_| SourceError::ClosedPipe)?;
        Ok(buf.len())
    }

    /// Signal end-of-stream.
    pub(crate) fn close(&mut self) {
        self.tx = None;
    }

    /// End the stream with `err` as its final item.
    pub(crate) fn close_with_error(&mut self, err: SourceError) {
        if self.tx.is_some() {
            *self
                .shared
                .close_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(err);
        }
        self.tx = None;
    }
}

/// Async read end, consumed as an upload body.
pub(crate) struct PipeReader {
    rx: mpsc::Receiver<Chunk>,
    shared: Arc<Shared>,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    finished: bool,
}

impl Stream for PipeReader {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        if self.cancelled.as_mut().poll(cx).is_ready() {
            self.finished = true;
            let err = SourceError::Cancelled { op: "Upload" };
            return Poll::Ready(Some(Err(std::io::Error::other(err))));
        }
        match ready!(self.rx.poll_recv(cx)) {
            Some(chunk) => {
                // the writer may have given up waiting; nothing to do then
                let _ = chunk.taken.send(());
                Poll::Ready(Some(Ok(chunk.data)))
            }
            None => {
                self.finished = true;
                let close_error = self
                    .shared
                    .close_error
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                Poll::Ready(close_error.map(|err| Err(std::io::Error::other(err))))
            }
        }
    }
}
