//! Owned pipeline value: queues, workers, and configuration for one
//! message category. Instantiated once per category; no ambient state.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use viaduct_core::config::BatchConfig;

use crate::decode::Decode;
use crate::sink::BatchSink;
use crate::worker::{BatchWorker, DecodeWorker};

/// Producer side of the intake queue.
///
/// Cloneable; handed to the transport delivery task.
#[derive(Clone)]
pub struct IntakeHandle {
    sender: mpsc::Sender<Vec<u8>>,
}

impl IntakeHandle {
    /// Hand one raw payload to the pipeline.
    ///
    /// Awaits while the intake queue is full, the only backpressure path to
    /// the outside world. Returns `false` once the pipeline has shut down.
    pub async fn push(&self, payload: Vec<u8>) -> bool {
        self.sender.send(payload).await.is_ok()
    }
}

/// A running ingestion pipeline: decode task plus accumulate/flush task.
pub struct Pipeline {
    intake: IntakeHandle,
    decode_handle: JoinHandle<()>,
    batch_handle: JoinHandle<()>,
}

impl Pipeline {
    /// Spawn both workers for one message category.
    ///
    /// The record queue between them has capacity 1: the decoder waits
    /// until the accumulator has taken the previous record, serializing the
    /// two stages' throughput.
    pub fn spawn<D, S>(
        name: impl Into<String>,
        decoder: D,
        sink: Arc<S>,
        config: &BatchConfig,
        cancel: CancellationToken,
    ) -> Self
    where
        D: Decode,
        S: BatchSink<D::Record> + 'static,
    {
        let name = name.into();
        let (intake_tx, intake_rx) = mpsc::channel(config.intake_capacity);
        let (record_tx, record_rx) = mpsc::channel(1);

        let decode = DecodeWorker::new(
            name.clone(),
            decoder,
            intake_rx,
            record_tx,
            cancel.clone(),
        );
        let batch = BatchWorker::new(name.clone(), record_rx, sink, config, cancel);

        info!(
            pipeline = %name,
            max_batch_size = config.max_batch_size,
            max_batch_interval_ms = config.max_batch_interval_ms,
            intake_capacity = config.intake_capacity,
            "pipeline started"
        );

        Self {
            intake: IntakeHandle { sender: intake_tx },
            decode_handle: tokio::spawn(decode.run()),
            batch_handle: tokio::spawn(batch.run()),
        }
    }

    /// Producer handle for the transport delivery task.
    pub fn intake(&self) -> IntakeHandle {
        self.intake.clone()
    }

    /// Wait for both workers to exit. Call after cancelling the token.
    pub async fn join(self) {
        let _ = self.decode_handle.await;
        let _ = self.batch_handle.await;
    }
}
