//! PostgreSQL storage sink.
//!
//! Telemetry writes are insert-or-ignore keyed by `(device_id, ts, key)`;
//! attribute writes are conditional upserts keyed by `(device_id, key, scope)`
//! that only touch the row when some value column actually changed.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::debug;

use viaduct_core::config::PostgresConfig;
use viaduct_core::{AttributeRecord, TelemetryRecord};
use viaduct_pipeline::BatchSink;

use crate::error::SinkError;

const INSERT_TELEMETRY: &str = "\
INSERT INTO device_data (device_id, ts, key, bool_v, str_v, long_v, double_v, json_v)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
ON CONFLICT (device_id, ts, key)
DO NOTHING";

const UPSERT_ATTRIBUTE: &str = "\
INSERT INTO device_attribute (device_id, key, scope, last_update, bool_v, str_v, long_v, double_v, json_v)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
ON CONFLICT (device_id, key, scope)
DO UPDATE SET
    last_update = EXCLUDED.last_update,
    bool_v = EXCLUDED.bool_v,
    str_v = EXCLUDED.str_v,
    long_v = EXCLUDED.long_v,
    double_v = EXCLUDED.double_v,
    json_v = EXCLUDED.json_v
WHERE
    device_attribute.bool_v IS DISTINCT FROM EXCLUDED.bool_v OR
    device_attribute.str_v IS DISTINCT FROM EXCLUDED.str_v OR
    device_attribute.long_v IS DISTINCT FROM EXCLUDED.long_v OR
    device_attribute.double_v IS DISTINCT FROM EXCLUDED.double_v OR
    CAST(device_attribute.json_v AS TEXT) IS DISTINCT FROM CAST(EXCLUDED.json_v AS TEXT)";

/// Shared PostgreSQL store; both pipelines write through the same pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect a pool sized by `max_connections`, the sink's real
    /// concurrency budget.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, SinkError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.connection_string())
            .await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl BatchSink<TelemetryRecord> for PgStore {
    type Error = SinkError;

    /// Insert one batch in a single transaction; duplicate
    /// `(device_id, ts, key)` rows are silently dropped.
    async fn write_batch(&self, batch: Vec<TelemetryRecord>) -> Result<(), SinkError> {
        if batch.is_empty() {
            return Ok(());
        }
        let count = batch.len();
        let mut tx = self.pool.begin().await?;
        for record in batch {
            let (bool_v, str_v, long_v, double_v, json_v) = record.value.into_columns();
            sqlx::query(INSERT_TELEMETRY)
                .bind(record.device_id)
                .bind(record.ts)
                .bind(record.key)
                .bind(bool_v)
                .bind(str_v)
                .bind(long_v)
                .bind(double_v)
                .bind(json_v)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        debug!(records = count, "telemetry batch written");
        Ok(())
    }
}

#[async_trait]
impl BatchSink<AttributeRecord> for PgStore {
    type Error = SinkError;

    /// Upsert one batch in a single transaction; a row is rewritten only
    /// when some value column differs from what is stored.
    async fn write_batch(&self, batch: Vec<AttributeRecord>) -> Result<(), SinkError> {
        if batch.is_empty() {
            return Ok(());
        }
        let count = batch.len();
        let mut tx = self.pool.begin().await?;
        for record in batch {
            let (bool_v, str_v, long_v, double_v, json_v) = record.value.into_columns();
            sqlx::query(UPSERT_ATTRIBUTE)
                .bind(record.device_id)
                .bind(record.key)
                .bind(record.scope.as_i16())
                .bind(record.last_update)
                .bind(bool_v)
                .bind(str_v)
                .bind(long_v)
                .bind(double_v)
                .bind(json_v)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        debug!(records = count, "attribute batch written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lazy_store() -> PgStore {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://postgres@localhost/never_connected")
            .expect("lazy pool creation cannot fail");
        PgStore::new(pool)
    }

    #[tokio::test]
    async fn empty_telemetry_batch_is_a_noop() {
        let store = lazy_store();
        // No connection is ever established for an empty batch.
        let result = BatchSink::<TelemetryRecord>::write_batch(&store, Vec::new()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn empty_attribute_batch_is_a_noop() {
        let store = lazy_store();
        let result = BatchSink::<AttributeRecord>::write_batch(&store, Vec::new()).await;
        assert!(result.is_ok());
    }

    #[test]
    fn telemetry_conflicts_are_ignored_not_updated() {
        assert!(INSERT_TELEMETRY.contains("ON CONFLICT (device_id, ts, key)"));
        assert!(INSERT_TELEMETRY.contains("DO NOTHING"));
    }

    #[test]
    fn attribute_upsert_is_conditional_on_changed_values() {
        assert!(UPSERT_ATTRIBUTE.contains("ON CONFLICT (device_id, key, scope)"));
        // Null-safe comparison on every value column guards the update.
        assert_eq!(UPSERT_ATTRIBUTE.matches("IS DISTINCT FROM").count(), 5);
    }
}
