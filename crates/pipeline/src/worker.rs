//! The two cooperative tasks behind each pipeline instance.
//!
//! `DecodeWorker` pulls raw payloads off the intake queue, decodes them, and
//! hands records to the accumulator one at a time. `BatchWorker` accumulates
//! records and owns the flush/reset cycle under the dual triggers (size and
//! time) plus shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use viaduct_core::config::BatchConfig;

use crate::batcher::Batcher;
use crate::decode::Decode;
use crate::sink::BatchSink;

// ── Decode stage ────────────────────────────────────────────────────

/// Decodes intake payloads and feeds the record queue.
pub struct DecodeWorker<D: Decode> {
    name: String,
    decoder: D,
    intake: mpsc::Receiver<Vec<u8>>,
    records: mpsc::Sender<D::Record>,
    cancel: CancellationToken,
}

impl<D: Decode> DecodeWorker<D> {
    pub fn new(
        name: impl Into<String>,
        decoder: D,
        intake: mpsc::Receiver<Vec<u8>>,
        records: mpsc::Sender<D::Record>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            name: name.into(),
            decoder,
            intake,
            records,
            cancel,
        }
    }

    /// Run until cancellation or until the intake queue closes.
    ///
    /// A payload that fails to decode is dropped with a warning; nothing is
    /// propagated. Payloads still in the intake queue at cancellation are
    /// discarded.
    pub async fn run(mut self) {
        info!(pipeline = %self.name, "decode worker started");
        loop {
            tokio::select! {
                payload = self.intake.recv() => {
                    let Some(payload) = payload else { break };
                    match self.decoder.decode(&payload) {
                        Ok(records) => {
                            for record in records {
                                // Blocks until the accumulator takes the record;
                                // the pipeline's only internal flow-control point.
                                if self.records.send(record).await.is_err() {
                                    info!(pipeline = %self.name, "record queue closed, decode worker exiting");
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            warn!(pipeline = %self.name, error = %e, "dropping payload");
                        }
                    }
                }
                _ = self.cancel.cancelled() => break,
            }
        }
        info!(pipeline = %self.name, "decode worker stopped");
    }
}

// ── Accumulate/flush stage ──────────────────────────────────────────

/// Accumulates records and cuts batches under the dual flush triggers.
///
/// Dispatch is fire-and-forget: the loop never waits for a storage write to
/// complete, so successive size-triggered cuts can have multiple writes in
/// flight. The semaphore bounds that concurrency to the sink's budget.
pub struct BatchWorker<R, S: BatchSink<R>> {
    name: String,
    receiver: mpsc::Receiver<R>,
    sink: Arc<S>,
    batcher: Batcher<R>,
    interval: Duration,
    inflight: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl<R, S> BatchWorker<R, S>
where
    R: Send + 'static,
    S: BatchSink<R> + 'static,
{
    pub fn new(
        name: impl Into<String>,
        receiver: mpsc::Receiver<R>,
        sink: Arc<S>,
        config: &BatchConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            name: name.into(),
            receiver,
            sink,
            batcher: Batcher::new(config.max_batch_size),
            interval: config.max_batch_interval(),
            inflight: Arc::new(Semaphore::new(config.max_inflight_flushes)),
            cancel,
        }
    }

    /// Run until cancellation, finishing with exactly one final flush.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        // The first tick completes immediately; skip it.
        ticker.tick().await;

        info!(
            pipeline = %self.name,
            interval_ms = self.interval.as_millis() as u64,
            "batch worker started"
        );

        loop {
            tokio::select! {
                record = self.receiver.recv() => {
                    let Some(record) = record else { break };
                    if let Some(batch) = self.batcher.push(record) {
                        self.dispatch(batch);
                    }
                }
                _ = ticker.tick() => {
                    // Fires unconditionally; an empty cut dispatches to a no-op.
                    let batch = self.batcher.cut();
                    self.dispatch(batch);
                }
                _ = self.cancel.cancelled() => break,
            }
        }

        self.shutdown_flush().await;
        info!(pipeline = %self.name, "batch worker stopped");
    }

    /// Drain records already sitting in the record queue, then flush once.
    ///
    /// The drain covers hand-offs the decoder completed before it observed
    /// cancellation; intake payloads it never decoded stay dropped. The final
    /// write is awaited inline so the attempt completes before the task exits.
    async fn shutdown_flush(&mut self) {
        self.receiver.close();
        while let Some(record) = self.receiver.recv().await {
            if let Some(batch) = self.batcher.push(record) {
                self.dispatch(batch);
            }
        }

        let batch = self.batcher.cut();
        if batch.is_empty() {
            return;
        }
        let count = batch.len();
        match self.sink.write_batch(batch).await {
            Ok(()) => info!(pipeline = %self.name, records = count, "final flush complete"),
            Err(e) => error!(
                pipeline = %self.name,
                error = %e,
                records = count,
                "final batch write failed, records lost"
            ),
        }
    }

    /// Hand a cut batch to the sink without blocking the event loop.
    ///
    /// A write failure is terminal for that batch: logged, not retried.
    fn dispatch(&self, batch: Vec<R>) {
        if batch.is_empty() {
            return;
        }
        let name = self.name.clone();
        let sink = Arc::clone(&self.sink);
        let inflight = Arc::clone(&self.inflight);
        let count = batch.len();
        tokio::spawn(async move {
            let _permit = match inflight.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            if let Err(e) = sink.write_batch(batch).await {
                error!(
                    pipeline = %name,
                    error = %e,
                    records = count,
                    "batch write failed, dropping batch"
                );
            }
        });
    }
}
