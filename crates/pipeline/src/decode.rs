//! Parse raw wire payloads into normalized records.
//!
//! One record is produced per entry in the payload's value map. Conversion
//! is all-or-nothing: an invalid device id or a single unsupported value
//! voids the entire message.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use viaduct_core::{AttributeRecord, Scope, TelemetryRecord, Value};

use crate::error::DecodeError;

/// Decode one raw payload into normalized records.
pub trait Decode: Send + Sync + 'static {
    /// Record type this decoder produces.
    type Record: Send + 'static;

    fn decode(&self, payload: &[u8]) -> Result<Vec<Self::Record>, DecodeError>;
}

// ── Wire messages ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TelemetryMessage {
    device_id: String,
    ts: DateTime<Utc>,
    data: Map<String, JsonValue>,
}

/// Attribute payloads may carry a `ts` field; it is ignored, as attribute
/// records are always stamped with ingestion time.
#[derive(Debug, Deserialize)]
struct AttributeMessage {
    device_id: String,
    attributes: Map<String, JsonValue>,
}

// ── Value classification ────────────────────────────────────────────

/// Classify one wire value into its typed slot.
///
/// Integers that fit i64 stay integral; all other finite numbers widen to
/// f64. Null, arrays, and numbers representable as neither are unsupported.
fn classify_value(key: &str, raw: JsonValue) -> Result<Value, DecodeError> {
    match raw {
        JsonValue::Bool(b) => Ok(Value::Bool(b)),
        JsonValue::String(s) => Ok(Value::Text(s)),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Long(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Value::Double(f))
            } else {
                Err(DecodeError::UnsupportedValue {
                    key: key.to_string(),
                })
            }
        }
        JsonValue::Object(map) => Ok(Value::Json(map)),
        JsonValue::Null | JsonValue::Array(_) => Err(DecodeError::UnsupportedValue {
            key: key.to_string(),
        }),
    }
}

fn parse_device_id(raw: &str) -> Result<Uuid, DecodeError> {
    Uuid::parse_str(raw).map_err(|source| DecodeError::InvalidDeviceId {
        id: raw.to_string(),
        source,
    })
}

// ── Decoders ────────────────────────────────────────────────────────

/// Flattens telemetry payloads; records carry the device-supplied timestamp.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryDecoder;

impl Decode for TelemetryDecoder {
    type Record = TelemetryRecord;

    fn decode(&self, payload: &[u8]) -> Result<Vec<TelemetryRecord>, DecodeError> {
        let msg: TelemetryMessage = serde_json::from_slice(payload)?;
        let device_id = parse_device_id(&msg.device_id)?;

        msg.data
            .into_iter()
            .map(|(key, raw)| {
                let value = classify_value(&key, raw)?;
                Ok(TelemetryRecord {
                    device_id,
                    ts: msg.ts,
                    key,
                    value,
                })
            })
            .collect()
    }
}

/// Flattens attribute payloads; records are stamped with ingestion time and
/// scoped `Client`.
#[derive(Debug, Default, Clone, Copy)]
pub struct AttributeDecoder;

impl Decode for AttributeDecoder {
    type Record = AttributeRecord;

    fn decode(&self, payload: &[u8]) -> Result<Vec<AttributeRecord>, DecodeError> {
        let msg: AttributeMessage = serde_json::from_slice(payload)?;
        let device_id = parse_device_id(&msg.device_id)?;
        let last_update = Utc::now();

        msg.attributes
            .into_iter()
            .map(|(key, raw)| {
                let value = classify_value(&key, raw)?;
                Ok(AttributeRecord {
                    device_id,
                    key,
                    scope: Scope::Client,
                    last_update,
                    value,
                })
            })
            .collect()
    }
}
