//! End-to-end pipeline tests: intake payload → decode → accumulate → sink.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use viaduct_core::config::BatchConfig;
use viaduct_core::{AttributeRecord, Scope, TelemetryRecord, Value};
use viaduct_pipeline::{AttributeDecoder, BatchSink, Pipeline, TelemetryDecoder};

const DEVICE_ID: &str = "550e8400-e29b-41d4-a716-446655440000";

/// Sink that records every batch it is handed.
struct RecordingSink<R> {
    batches: Mutex<Vec<Vec<R>>>,
}

impl<R> RecordingSink<R> {
    fn new() -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
        }
    }

    async fn batches(&self) -> Vec<Vec<R>>
    where
        R: Clone,
    {
        self.batches.lock().await.clone()
    }
}

#[async_trait]
impl<R: Send> BatchSink<R> for RecordingSink<R> {
    type Error = Infallible;

    async fn write_batch(&self, batch: Vec<R>) -> Result<(), Infallible> {
        self.batches.lock().await.push(batch);
        Ok(())
    }
}

/// Sink that refuses every write but counts the attempts.
struct FailingSink {
    attempts: Mutex<u32>,
}

#[derive(Debug, thiserror::Error)]
#[error("storage unavailable")]
struct StorageUnavailable;

#[async_trait]
impl BatchSink<TelemetryRecord> for FailingSink {
    type Error = StorageUnavailable;

    async fn write_batch(&self, _batch: Vec<TelemetryRecord>) -> Result<(), StorageUnavailable> {
        *self.attempts.lock().await += 1;
        Err(StorageUnavailable)
    }
}

fn config(max_batch_size: usize, max_batch_interval_ms: u64) -> BatchConfig {
    BatchConfig {
        max_batch_size,
        max_batch_interval_ms,
        intake_capacity: 64,
        max_inflight_flushes: 4,
    }
}

fn telemetry_payload(data: &str) -> Vec<u8> {
    format!(r#"{{"device_id":"{DEVICE_ID}","ts":"2025-06-14T12:00:00Z","data":{data}}}"#)
        .into_bytes()
}

#[tokio::test]
async fn telemetry_payload_flows_to_the_sink() {
    let sink = Arc::new(RecordingSink::new());
    let cancel = CancellationToken::new();
    let pipeline = Pipeline::spawn(
        "telemetry",
        TelemetryDecoder,
        sink.clone(),
        &config(2, 60_000),
        cancel.clone(),
    );

    // Two entries fill a batch of two and trigger the size flush.
    let accepted = pipeline
        .intake()
        .push(telemetry_payload(r#"{"temperature": 22.5, "ok": true}"#))
        .await;
    assert!(accepted);

    tokio::time::sleep(Duration::from_millis(100)).await;

    let batches = sink.batches().await;
    assert_eq!(batches.len(), 1);
    let mut batch = batches[0].clone();
    batch.sort_by(|a, b| a.key.cmp(&b.key));

    let expected_id = Uuid::parse_str(DEVICE_ID).unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0].key, "ok");
    assert_eq!(batch[0].value, Value::Bool(true));
    assert_eq!(batch[1].key, "temperature");
    assert_eq!(batch[1].value, Value::Double(22.5));
    for record in &batch {
        assert_eq!(record.device_id, expected_id);
        assert_eq!(record.ts.to_rfc3339(), "2025-06-14T12:00:00+00:00");
    }

    cancel.cancel();
    pipeline.join().await;
}

#[tokio::test]
async fn three_records_size_two_leaves_one_pending() {
    let sink = Arc::new(RecordingSink::new());
    let cancel = CancellationToken::new();
    let pipeline = Pipeline::spawn(
        "telemetry",
        TelemetryDecoder,
        sink.clone(),
        &config(2, 60_000),
        cancel.clone(),
    );

    pipeline
        .intake()
        .push(telemetry_payload(r#"{"a": 1, "b": 2, "c": 3}"#))
        .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Exactly one automatic flush of exactly two records.
    let batches = sink.batches().await;
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 2);

    cancel.cancel();
    pipeline.join().await;

    // The third record rode out shutdown in the next batch.
    let batches = sink.batches().await;
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[1].len(), 1);
    assert_eq!(batches[1][0].key, "c");
}

#[tokio::test]
async fn idle_timer_never_calls_the_sink() {
    let sink = Arc::new(RecordingSink::<TelemetryRecord>::new());
    let cancel = CancellationToken::new();
    let pipeline = Pipeline::spawn(
        "telemetry",
        TelemetryDecoder,
        sink.clone(),
        &config(100, 10),
        cancel.clone(),
    );

    tokio::time::sleep(Duration::from_millis(50)).await;

    cancel.cancel();
    pipeline.join().await;
    assert!(sink.batches().await.is_empty());
}

#[tokio::test]
async fn termination_flushes_the_last_record_exactly_once() {
    let sink = Arc::new(RecordingSink::new());
    let cancel = CancellationToken::new();
    let pipeline = Pipeline::spawn(
        "telemetry",
        TelemetryDecoder,
        sink.clone(),
        &config(100, 60_000),
        cancel.clone(),
    );

    pipeline
        .intake()
        .push(telemetry_payload(r#"{"humidity": 40}"#))
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    cancel.cancel();
    pipeline.join().await;

    let batches = sink.batches().await;
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 1);
    assert_eq!(batches[0][0].key, "humidity");
    assert_eq!(batches[0][0].value, Value::Long(40));
}

#[tokio::test]
async fn bad_payloads_do_not_stall_good_ones() {
    let sink = Arc::new(RecordingSink::new());
    let cancel = CancellationToken::new();
    let pipeline = Pipeline::spawn(
        "telemetry",
        TelemetryDecoder,
        sink.clone(),
        &config(1, 60_000),
        cancel.clone(),
    );
    let intake = pipeline.intake();

    intake.push(b"not json".to_vec()).await;
    intake
        .push(br#"{"device_id":"invalid","ts":"2025-06-14T12:00:00Z","data":{"x":1}}"#.to_vec())
        .await;
    intake
        .push(telemetry_payload(r#"{"partial": [1,2], "fine": 1}"#))
        .await;
    intake.push(telemetry_payload(r#"{"good": 1}"#)).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();
    pipeline.join().await;

    // Only the last payload survived, as a single one-record batch.
    let batches = sink.batches().await;
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0][0].key, "good");
}

#[tokio::test]
async fn sink_failure_leaves_the_pipeline_running() {
    let sink = Arc::new(FailingSink {
        attempts: Mutex::new(0),
    });
    let cancel = CancellationToken::new();
    let pipeline = Pipeline::spawn(
        "telemetry",
        TelemetryDecoder,
        sink.clone(),
        &config(1, 60_000),
        cancel.clone(),
    );
    let intake = pipeline.intake();

    intake.push(telemetry_payload(r#"{"first": 1}"#)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*sink.attempts.lock().await, 1);

    // The failed batch is gone; later records still flow.
    intake.push(telemetry_payload(r#"{"second": 2}"#)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*sink.attempts.lock().await, 2);

    cancel.cancel();
    pipeline.join().await;
}

#[tokio::test]
async fn attribute_pipeline_stamps_ingestion_time_and_client_scope() {
    let sink = Arc::new(RecordingSink::<AttributeRecord>::new());
    let cancel = CancellationToken::new();
    let pipeline = Pipeline::spawn(
        "attributes",
        AttributeDecoder,
        sink.clone(),
        &config(100, 60_000),
        cancel.clone(),
    );

    let before = chrono::Utc::now();
    let payload = format!(
        r#"{{"device_id":"{DEVICE_ID}","ts":"2000-01-01T00:00:00Z","attributes":{{"firmware":"1.2.3"}}}}"#
    );
    pipeline.intake().push(payload.into_bytes()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    cancel.cancel();
    pipeline.join().await;
    let after = chrono::Utc::now();

    let batches = sink.batches().await;
    assert_eq!(batches.len(), 1);
    let record = &batches[0][0];
    assert_eq!(record.scope, Scope::Client);
    assert_eq!(record.value, Value::Text("1.2.3".into()));
    // The wire ts (year 2000) is ignored in favor of ingestion time.
    assert!(record.last_update >= before && record.last_update <= after);
}
