// obsrelay-api: Async clients for obs-websocket v5 and the relay coordinator

pub mod error;
pub mod protocol;
pub mod relay;
pub mod transport;
pub mod websocket;

pub use error::Error;
pub use protocol::ObsEvent;
pub use relay::RelayClient;
pub use transport::TransportConfig;
pub use websocket::ObsSocket;
