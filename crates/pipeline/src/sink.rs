//! Sink trait for flushed batches.

use async_trait::async_trait;

/// Destination for cut batches.
///
/// `write_batch` must be safe under concurrent invocation; the dispatcher
/// may have several writes in flight at once, with no ordering guarantee on
/// completion. A failed batch is dropped by the caller, never retried.
#[async_trait]
pub trait BatchSink<R>: Send + Sync {
    type Error: std::error::Error + Send;

    async fn write_batch(&self, batch: Vec<R>) -> Result<(), Self::Error>;
}
