pub mod endpoint;
pub mod error;
pub mod pubsub;

pub use endpoint::Endpoint;
pub use error::TransportError;
pub use pubsub::{PayloadPublisher, PayloadSource, Publisher, Subscriber};
