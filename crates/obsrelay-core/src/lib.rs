// obsrelay-core: Per-tenant connections, event fan-out, and domain commands.

pub mod broadcast;
pub mod config;
pub mod connection;
pub mod convert;
pub mod directory;
pub mod error;
pub mod facade;
pub mod model;
pub mod registry;
pub mod relay;
pub mod session;
pub mod transport;

// ── Primary re-exports ──────────────────────────────────────────────
pub use broadcast::{ChannelMessage, EventBroadcaster, ForwardedEvent, TenantSubscription};
pub use config::{ConnectStrategy, ConnectionSettings, TenantConnectionConfig, TenantId};
pub use connection::{Connection, ConnectionEvent, ConnectionState};
pub use directory::{
    InMemoryTenantDirectory, StaticTokenVerifier, TenantDirectory, TenantRecord, TokenVerifier,
};
pub use error::{CommandError, ConnectError, CoreError};
pub use facade::CommandFacade;
pub use registry::{ConnectionRegistry, InitSummary};
pub use relay::{RelayCoordinator, RelayStats, UnconfiguredRelay};
pub use session::{CommandReply, Session, SessionGateway, TenantStatus};
pub use transport::{
    Capabilities, DefaultTransportFactory, TransportAdapter, TransportFactory, TransportLink,
    TransportMode,
};

pub use model::{
    AudioSource, ProfileList, ProgramState, Scene, SceneItem, StreamState, StreamStats, Transition,
};
