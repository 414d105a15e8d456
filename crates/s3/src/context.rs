//! Runtime and cancellation context for blocking handles

use std::future::Future;

use objfile_source::{Result, SourceError};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Where a handle runs its transport calls, and how they are cancelled.
///
/// The file API is synchronous, so every call blocks the calling thread on
/// `runtime`. Handles must therefore be used from outside the runtime (a plain
/// thread or `spawn_blocking`), and the runtime must be multi-threaded so the
/// background uploader keeps running while a caller is blocked on a write.
#[derive(Clone)]
pub struct OperationContext {
    runtime: Handle,
    cancel: CancellationToken,
}

impl OperationContext {
    pub fn new(runtime: Handle) -> Self {
        Self::with_cancellation(runtime, CancellationToken::new())
    }

    /// Cancelling `cancel` aborts in-flight probes, fetches and uploads.
    pub fn with_cancellation(runtime: Handle, cancel: CancellationToken) -> Self {
        Self { runtime, cancel }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Drive `fut` to completion, racing it against cancellation.
    pub(crate) async fn run<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SourceError::Cancelled { op }),
            result = fut => result.map_err(|e| SourceError::transport(op, e)),
        }
    }

    /// Like [`OperationContext::run`], but `fut` is never dropped early.
    ///
    /// For work that has to clean up remotely when it fails, such as a
    /// multipart upload. `fut` is expected to notice cancellation itself; a
    /// failure after cancellation is reported as `Cancelled`.
    pub(crate) async fn run_to_completion<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T> {
        fut.await.map_err(|e| {
            if self.cancel.is_cancelled() {
                SourceError::Cancelled { op }
            } else {
                SourceError::transport(op, e)
            }
        })
    }

    /// Blocking form of [`OperationContext::run`].
    pub(crate) fn block_on<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T> {
        self.runtime.block_on(self.run(op, fut))
    }

    pub(crate) fn spawn<F>(&self, fut: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.runtime.spawn(fut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_on_maps_errors_with_operation() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let ctx = OperationContext::new(rt.handle().clone());
        let err = ctx
            .block_on("HeadObject", async { Err::<(), _>(anyhow::anyhow!("403 Forbidden")) })
            .unwrap_err();
        assert_eq!(err.to_string(), "HeadObject failed: 403 Forbidden");
    }

    #[test]
    fn test_run_to_completion_lets_cleanup_finish() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let ctx = OperationContext::new(rt.handle().clone());
        let token = ctx.cancellation_token().clone();
        let cleaned_up = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));

        let flag = cleaned_up.clone();
        let result = rt.block_on(ctx.run_to_completion("Upload", async move {
            token.cancel();
            tokio::task::yield_now().await;
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
            Err::<(), _>(anyhow::anyhow!("body cancelled"))
        }));

        assert!(cleaned_up.load(std::sync::atomic::Ordering::SeqCst));
        assert!(matches!(result, Err(SourceError::Cancelled { op: "Upload" })));
    }

    #[test]
    fn test_cancelled_context_short_circuits() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let ctx = OperationContext::new(rt.handle().clone());
        ctx.cancellation_token().cancel();
        let result = ctx.block_on("GetObject", std::future::pending::<anyhow::Result<()>>());
        assert!(matches!(
            result,
            Err(SourceError::Cancelled { op: "GetObject" })
        ));
    }
}
