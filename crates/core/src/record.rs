use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A device (data source) identified by a UUID.
pub type DeviceId = Uuid;

/// Authority classification of an attribute.
///
/// Ingested attributes are always `Client`; `Server` and `Shared` are
/// written by other parts of the platform and share the same table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    Server,
    Shared,
    Client,
}

impl Scope {
    /// Stable smallint encoding used by the `scope` column.
    pub fn as_i16(self) -> i16 {
        match self {
            Scope::Server => 0,
            Scope::Shared => 1,
            Scope::Client => 2,
        }
    }
}

/// A typed record value; exactly one slot is populated.
///
/// Each variant maps to one of the sink's value columns
/// (`bool_v`, `str_v`, `long_v`, `double_v`, `json_v`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Text(String),
    Long(i64),
    Double(f64),
    Json(serde_json::Map<String, serde_json::Value>),
}

impl Value {
    /// Split into the five nullable column slots the sink binds.
    ///
    /// Exactly one of the returned options is `Some`.
    pub fn into_columns(
        self,
    ) -> (
        Option<bool>,
        Option<String>,
        Option<i64>,
        Option<f64>,
        Option<serde_json::Value>,
    ) {
        match self {
            Value::Bool(b) => (Some(b), None, None, None, None),
            Value::Text(s) => (None, Some(s), None, None, None),
            Value::Long(i) => (None, None, Some(i), None, None),
            Value::Double(f) => (None, None, None, Some(f), None),
            Value::Json(m) => (None, None, None, None, Some(serde_json::Value::Object(m))),
        }
    }
}

/// One `(device, key)` telemetry fact, timestamped by the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub device_id: DeviceId,
    pub ts: DateTime<Utc>,
    pub key: String,
    pub value: Value,
}

/// One `(device, key, scope)` attribute fact, timestamped at ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeRecord {
    pub device_id: DeviceId,
    pub key: String,
    pub scope: Scope,
    pub last_update: DateTime<Utc>,
    pub value: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_encoding_is_stable() {
        assert_eq!(Scope::Server.as_i16(), 0);
        assert_eq!(Scope::Shared.as_i16(), 1);
        assert_eq!(Scope::Client.as_i16(), 2);
    }

    #[test]
    fn value_populates_exactly_one_column() {
        let cases = vec![
            Value::Bool(true),
            Value::Text("sensor1".into()),
            Value::Long(100_000_000_000_000_000),
            Value::Double(22.5),
            Value::Json(serde_json::Map::new()),
        ];
        for value in cases {
            let (b, s, l, d, j) = value.into_columns();
            let populated = [b.is_some(), s.is_some(), l.is_some(), d.is_some(), j.is_some()]
                .iter()
                .filter(|p| **p)
                .count();
            assert_eq!(populated, 1);
        }
    }

    #[test]
    fn json_value_round_trips_as_object() {
        let mut map = serde_json::Map::new();
        map.insert("key1".into(), serde_json::json!("value1"));
        let (_, _, _, _, j) = Value::Json(map.clone()).into_columns();
        assert_eq!(j, Some(serde_json::Value::Object(map)));
    }
}
