// Relay coordinator client
//
// HTTP client for the service that owns relay-agent sessions. The backend
// never talks to an agent directly: it asks the coordinator whether an
// agent is live, forwards requests through it, or has it open a bridge to
// a publicly reachable instance. Every response uses the
// `{ success, data, error }` envelope.

pub mod agents;
pub mod client;
pub mod models;

pub use client::RelayClient;
pub use models::{AgentStatus, RelayStats};
