//! Decode error types.

use thiserror::Error;

/// Why a raw payload produced no records.
///
/// Every variant voids the whole message; there is no partial emission.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid device id {id:?}: {source}")]
    InvalidDeviceId { id: String, source: uuid::Error },

    #[error("unsupported value type for key {key:?}")]
    UnsupportedValue { key: String },
}
