// ── Transport adapters ──
//
// One tenant reaches its instance in exactly one of three ways. Each way
// is a `TransportAdapter`; everything above this module talks to the trait
// and never branches on which one it got.

mod direct;
mod relay;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use obsrelay_api::ObsEvent;

use crate::config::{ConnectStrategy, ConnectionSettings, TenantConnectionConfig};
use crate::error::CoreError;
use crate::relay::RelayCoordinator;

pub use direct::{DirectEndpoint, DirectTransport};
pub use relay::{CloudMagicTransport, RelayAgentTransport};

// ── TransportMode ────────────────────────────────────────────────

/// Which of the three transports a config resolves to.
///
/// Resolved once per connect attempt and carried by the `Connection`
/// until the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportMode {
    /// Persistent obs-websocket socket straight to the instance.
    Direct { host: String, port: u16 },
    /// Calls forwarded to an agent session the agent itself opened.
    RelayAgent { agent_id: String },
    /// The coordinator asks the agent to bridge to a public address.
    CloudMagic {
        agent_id: String,
        public_address: String,
    },
}

impl TransportMode {
    /// Resolve the transport from a config's address shape and strategy.
    ///
    /// - `agent@host` is cloud-magic
    /// - a pinned relay strategy, or an address with no `.`, is a relay agent id
    /// - anything else is a host for a direct socket
    pub fn resolve(config: &TenantConnectionConfig) -> Self {
        let address = config.address.trim();

        if let Some((agent_id, public_address)) = address.split_once('@') {
            return Self::CloudMagic {
                agent_id: agent_id.to_owned(),
                public_address: public_address.to_owned(),
            };
        }

        if config.strategy == ConnectStrategy::Relay || !address.contains('.') {
            return Self::RelayAgent {
                agent_id: address.to_owned(),
            };
        }

        Self::Direct {
            host: clean_host(address).to_owned(),
            port: config.port_or_default(),
        }
    }

    /// Relay-family transports share the coordinator and its longer retry delay.
    pub fn is_relay(&self) -> bool {
        !matches!(self, Self::Direct { .. })
    }

    pub fn reconnect_delay(&self, settings: &ConnectionSettings) -> Duration {
        if self.is_relay() {
            settings.relay_reconnect_delay
        } else {
            settings.direct_reconnect_delay
        }
    }

    /// Whether moving from `old` to `new` changes this transport's identity.
    ///
    /// Cloud-magic links are keyed by the address alone; the others are
    /// rebuilt on any change.
    pub fn requires_rewire(
        &self,
        old: &TenantConnectionConfig,
        new: &TenantConnectionConfig,
    ) -> bool {
        match self {
            Self::CloudMagic { .. } => old.address.trim() != new.address.trim(),
            Self::Direct { .. } | Self::RelayAgent { .. } => old != new,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Direct { .. } => "direct",
            Self::RelayAgent { .. } => "relay-agent",
            Self::CloudMagic { .. } => "cloud-magic",
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct { host, port } => write!(f, "direct {host}:{port}"),
            Self::RelayAgent { agent_id } => write!(f, "relay-agent {agent_id}"),
            Self::CloudMagic {
                agent_id,
                public_address,
            } => write!(f, "cloud-magic {agent_id}@{public_address}"),
        }
    }
}

/// Strip any scheme prefix and trailing slash an operator pasted in.
pub(crate) fn clean_host(address: &str) -> &str {
    let address = address.trim();
    let without_scheme = ["wss://", "ws://", "https://", "http://"]
        .iter()
        .find_map(|scheme| address.strip_prefix(scheme))
        .unwrap_or(address);
    without_scheme.trim_end_matches('/')
}

// ── Adapter contract ─────────────────────────────────────────────

/// What a transport can do beyond plain request/command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// The instance pushes events to us over this transport.
    pub push_events: bool,
    /// Scene-item toggling may stand in for a rejected media restart.
    pub scene_item_fallback: bool,
}

/// Handles returned by a successful [`TransportAdapter::open`].
#[derive(Debug)]
pub struct TransportLink {
    /// Cancelled when the remote side goes away.
    pub closed: CancellationToken,
    /// Raw instance events, when the transport carries them.
    pub events: Option<broadcast::Receiver<Arc<ObsEvent>>>,
}

/// One way of reaching an instance.
///
/// A fresh adapter is built for every connect attempt; `close` is final.
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    fn mode(&self) -> &TransportMode;

    fn capabilities(&self) -> Capabilities;

    /// Establish the link. Resolves once requests can be issued.
    async fn open(&self) -> Result<TransportLink, CoreError>;

    /// Read-style call returning the instance's response data.
    async fn request(&self, request_type: &str, params: Value) -> Result<Value, CoreError>;

    /// Write-style call; only the acknowledgement matters.
    async fn command(&self, request_type: &str, params: Value) -> Result<(), CoreError>;

    async fn close(&self);
}

// ── Factory ──────────────────────────────────────────────────────

/// Builds the adapter for a resolved mode. Swapped out in tests.
pub trait TransportFactory: Send + Sync {
    fn build(
        &self,
        mode: &TransportMode,
        config: &TenantConnectionConfig,
    ) -> Arc<dyn TransportAdapter>;
}

/// Production factory: direct sockets plus the relay coordinator.
pub struct DefaultTransportFactory {
    settings: Arc<ConnectionSettings>,
    relay: Arc<dyn RelayCoordinator>,
}

impl DefaultTransportFactory {
    pub fn new(settings: Arc<ConnectionSettings>, relay: Arc<dyn RelayCoordinator>) -> Self {
        Self { settings, relay }
    }
}

impl TransportFactory for DefaultTransportFactory {
    fn build(
        &self,
        mode: &TransportMode,
        config: &TenantConnectionConfig,
    ) -> Arc<dyn TransportAdapter> {
        match mode {
            TransportMode::Direct { host, port } => Arc::new(DirectTransport::new(
                host,
                *port,
                config.password.clone(),
                &self.settings,
            )),
            TransportMode::RelayAgent { agent_id } => Arc::new(RelayAgentTransport::new(
                agent_id,
                Arc::clone(&self.relay),
            )),
            TransportMode::CloudMagic {
                agent_id,
                public_address,
            } => Arc::new(CloudMagicTransport::new(
                agent_id,
                public_address,
                config.port_or_default(),
                config.password.clone(),
                Arc::clone(&self.relay),
            )),
        }
    }
}
