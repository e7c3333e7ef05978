pub mod batcher;
pub mod decode;
pub mod error;
pub mod pipeline;
pub mod sink;
pub mod worker;

pub use batcher::Batcher;
pub use decode::{AttributeDecoder, Decode, TelemetryDecoder};
pub use error::DecodeError;
pub use pipeline::{IntakeHandle, Pipeline};
pub use sink::BatchSink;
pub use worker::{BatchWorker, DecodeWorker};
