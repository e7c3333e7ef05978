use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use zeromq::prelude::*;
use zeromq::{PubSocket, SubSocket, ZmqMessage};

use crate::endpoint::Endpoint;
use crate::error::TransportError;

/// Something that delivers raw payloads per topic.
///
/// The pipeline consumes this; the concrete transport behind it is
/// interchangeable.
#[async_trait]
pub trait PayloadSource: Send + Sync {
    /// Register interest in topics matching the given prefix.
    async fn subscribe(&self, topic_prefix: &str) -> Result<(), TransportError>;

    /// Receive the next `(topic, payload)` pair. Blocks until one arrives.
    async fn recv(&self) -> Result<(String, Vec<u8>), TransportError>;
}

/// Something that publishes raw payloads to a topic.
#[async_trait]
pub trait PayloadPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;
}

/// ZeroMQ PUB socket publisher.
///
/// Messages are sent as two-frame ZMQ messages:
/// 1. Topic string (used by SUB sockets for prefix filtering)
/// 2. Raw payload bytes (JSON on the wire)
pub struct Publisher {
    socket: Mutex<PubSocket>,
}

impl Publisher {
    /// Create a new publisher that connects to the broker's ingress endpoint.
    #[instrument(skip_all, fields(endpoint = %endpoint))]
    pub async fn connect(endpoint: &Endpoint) -> Result<Self, TransportError> {
        let mut socket = PubSocket::new();
        let address = endpoint.address();
        info!(address = %address, "connecting PUB socket");
        socket.connect(&address).await?;
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }

    /// Create a new publisher that binds to the given endpoint.
    ///
    /// Use this for direct PUB/SUB without a broker (publisher binds,
    /// subscribers connect).
    #[instrument(skip_all, fields(endpoint = %endpoint))]
    pub async fn bind(endpoint: &Endpoint) -> Result<Self, TransportError> {
        let mut socket = PubSocket::new();
        endpoint.ensure_ipc_dir().map_err(|e| {
            TransportError::Transport(format!("failed to prepare IPC dir: {e}"))
        })?;
        let address = endpoint.address();
        info!(address = %address, "binding PUB socket");
        socket.bind(&address).await?;
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }
}

#[async_trait]
impl PayloadPublisher for Publisher {
    /// Publish a payload as a two-frame ZMQ message: [topic, payload].
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let mut zmq_msg = ZmqMessage::from(topic);
        zmq_msg.push_back(payload.into());

        let mut socket = self.socket.lock().await;
        socket.send(zmq_msg).await?;

        debug!(topic = %topic, "published payload");
        Ok(())
    }
}

/// ZeroMQ SUB socket subscriber.
///
/// Receives two-frame ZMQ messages: [topic, payload].
pub struct Subscriber {
    socket: Mutex<SubSocket>,
}

impl Subscriber {
    /// Create a new subscriber that connects to the broker's egress endpoint.
    #[instrument(skip_all, fields(endpoint = %endpoint))]
    pub async fn connect(endpoint: &Endpoint) -> Result<Self, TransportError> {
        let mut socket = SubSocket::new();
        let address = endpoint.address();
        info!(address = %address, "connecting SUB socket");
        socket.connect(&address).await?;
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }
}

#[async_trait]
impl PayloadSource for Subscriber {
    /// Subscribe to topics matching the given prefix.
    ///
    /// An empty string subscribes to all topics. Multiple subscriptions can
    /// be active simultaneously.
    async fn subscribe(&self, topic_prefix: &str) -> Result<(), TransportError> {
        let mut socket = self.socket.lock().await;
        socket.subscribe(topic_prefix).await?;
        info!(topic_prefix = %topic_prefix, "subscribed to topic prefix");
        Ok(())
    }

    /// Receive the next payload. Blocks until a message matching a
    /// subscription arrives.
    async fn recv(&self) -> Result<(String, Vec<u8>), TransportError> {
        let mut socket = self.socket.lock().await;
        let zmq_msg = socket.recv().await?;

        let frames: Vec<_> = zmq_msg.iter().collect();
        if frames.len() < 2 {
            return Err(TransportError::Transport(format!(
                "expected [topic, payload] frames, got {}",
                frames.len()
            )));
        }

        let topic = String::from_utf8_lossy(frames[0].as_ref()).into_owned();
        let payload = frames[1].as_ref().to_vec();
        debug!(topic = %topic, bytes = payload.len(), "received payload");
        Ok((topic, payload))
    }
}
