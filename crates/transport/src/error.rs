use thiserror::Error;

/// Errors from the pub/sub transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("zeromq error: {0}")]
    Zmq(#[from] zeromq::ZmqError),

    #[error("transport error: {0}")]
    Transport(String),
}
