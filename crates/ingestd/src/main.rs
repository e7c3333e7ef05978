//! ingestd: telemetry/attribute ingestion daemon.
//!
//! Subscribes to the telemetry and attribute topics, runs one owned
//! pipeline per category (decode task plus accumulate/flush task), and
//! writes batches to PostgreSQL through a shared pool.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use viaduct_core::config::{load_dotenv, Config};
use viaduct_pipeline::{AttributeDecoder, IntakeHandle, Pipeline, TelemetryDecoder};
use viaduct_sink::PgStore;
use viaduct_transport::{Endpoint, PayloadSource, Subscriber};

// ── CLI ─────────────────────────────────────────────────────────────

/// Telemetry/attribute ingestion daemon.
#[derive(Parser, Debug)]
#[command(name = "ingestd", version, about)]
struct Cli {
    /// Shutdown timeout in seconds.
    #[arg(long, env = "INGESTD_SHUTDOWN_TIMEOUT", default_value_t = 10)]
    shutdown_timeout: u64,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    load_dotenv();
    let config = Config::from_env();
    config.log_summary();

    let store = Arc::new(PgStore::connect(&config.postgres).await?);

    // One owned pipeline per message category; they share only the store.
    let cancel = CancellationToken::new();
    let telemetry = Pipeline::spawn(
        "telemetry",
        TelemetryDecoder,
        store.clone(),
        &config.telemetry,
        cancel.clone(),
    );
    let attributes = Pipeline::spawn(
        "attributes",
        AttributeDecoder,
        store.clone(),
        &config.attributes,
        cancel.clone(),
    );

    let endpoint = Endpoint::tcp(
        config.transport.broker_host.clone(),
        config.transport.broker_port,
    );
    let subscriber = Subscriber::connect(&endpoint).await?;
    subscriber
        .subscribe(&config.transport.telemetry_topic)
        .await?;
    subscriber
        .subscribe(&config.transport.attribute_topic)
        .await?;

    spawn_signal_handler(cancel.clone());
    info!("ingestd started");

    deliver(
        &subscriber,
        &config.transport.telemetry_topic,
        telemetry.intake(),
        &config.transport.attribute_topic,
        attributes.intake(),
        &cancel,
    )
    .await;

    info!("shutting down, flushing pipelines");
    let drained = async {
        telemetry.join().await;
        attributes.join().await;
    };
    match tokio::time::timeout(Duration::from_secs(cli.shutdown_timeout), drained).await {
        Ok(()) => info!("ingestd exited cleanly"),
        Err(_) => warn!("pipelines did not stop within the shutdown timeout"),
    }
    Ok(())
}

// ── Delivery loop ───────────────────────────────────────────────────

/// Route received payloads to the matching pipeline's intake queue.
///
/// `push` awaits while an intake queue is full; that is the only backpressure
/// surfaced back to the broker.
async fn deliver(
    subscriber: &Subscriber,
    telemetry_topic: &str,
    telemetry_intake: IntakeHandle,
    attribute_topic: &str,
    attribute_intake: IntakeHandle,
    cancel: &CancellationToken,
) {
    loop {
        tokio::select! {
            result = subscriber.recv() => {
                match result {
                    Ok((topic, payload)) => {
                        let accepted = if topic == telemetry_topic {
                            telemetry_intake.push(payload).await
                        } else if topic == attribute_topic {
                            attribute_intake.push(payload).await
                        } else {
                            warn!(topic = %topic, "payload on unexpected topic, dropping");
                            true
                        };
                        if !accepted {
                            warn!(topic = %topic, "pipeline intake closed, dropping payload");
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "subscriber recv error");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
}

// ── Shutdown ────────────────────────────────────────────────────────

/// Cancel the shared token once an OS shutdown signal arrives.
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        os_signal().await;
        info!("shutdown signal received");
        cancel.cancel();
    });
}

/// Wait for SIGINT or SIGTERM (Unix) or Ctrl+C (cross-platform fallback).
async fn os_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT");
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl_c");
    }
}
