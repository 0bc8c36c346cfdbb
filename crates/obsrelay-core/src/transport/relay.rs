// ── Relay-family transports ──
//
// Neither transport opens a socket. Calls go through the relay coordinator
// to an agent session: either one the agent opened itself (relay agent),
// or one the coordinator asks the agent to bridge to a public address
// (cloud magic). A handful of request types have dedicated coordinator
// endpoints; everything else is forwarded verbatim.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{Capabilities, TransportAdapter, TransportLink, TransportMode};
use crate::error::{ConnectError, CoreError};
use crate::relay::RelayCoordinator;

const CAPABILITIES: Capabilities = Capabilities {
    push_events: false,
    scene_item_fallback: false,
};

// ── Shared forwarding ────────────────────────────────────────────

struct Forwarder {
    agent_id: String,
    relay: Arc<dyn RelayCoordinator>,
    closed: CancellationToken,
}

impl Forwarder {
    fn new(agent_id: &str, relay: Arc<dyn RelayCoordinator>) -> Self {
        Self {
            agent_id: agent_id.to_owned(),
            relay,
            closed: CancellationToken::new(),
        }
    }

    fn link(&self) -> TransportLink {
        TransportLink {
            closed: self.closed.clone(),
            events: None,
        }
    }

    async fn request(&self, request_type: &str, params: Value) -> Result<Value, CoreError> {
        let agent = self.agent_id.as_str();
        match request_type {
            "GetStats" => {
                let stats = self
                    .relay
                    .stats(agent)
                    .await?
                    .ok_or_else(|| CoreError::rejected(request_type, "agent reported no stats"))?;
                Ok(json!({
                    "cpuUsage": stats.cpu,
                    "activeFps": stats.fps,
                    "memoryUsage": stats.memory,
                    "outputSkippedFrames": stats.dropped_frames,
                    "outputTotalFrames": stats.total_frames,
                }))
            }
            "GetSourceScreenshot" => {
                let source = params["sourceName"].as_str().unwrap_or_default();
                let image = self
                    .relay
                    .preview(agent, source)
                    .await?
                    .ok_or_else(|| CoreError::rejected(request_type, "agent returned no preview"))?;
                Ok(json!({ "imageData": image }))
            }
            _ => self.relay.forward_request(agent, request_type, &params).await,
        }
    }

    async fn command(&self, request_type: &str, params: Value) -> Result<(), CoreError> {
        let agent = self.agent_id.as_str();
        match (request_type, &params) {
            ("StartStream", _) => self.relay.start_stream(agent).await,
            ("StopStream", _) => self.relay.stop_stream(agent).await,
            ("SetInputMute", p) if p["inputName"].is_string() && p["inputMuted"].is_boolean() => {
                let input = p["inputName"].as_str().unwrap_or_default();
                let muted = p["inputMuted"].as_bool().unwrap_or_default();
                self.relay.set_mute(agent, input, muted).await
            }
            ("SetCurrentProgramScene", p) if p["sceneName"].is_string() => {
                let scene = p["sceneName"].as_str().unwrap_or_default();
                self.relay.set_scene(agent, scene).await
            }
            _ => self.relay.forward_command(agent, request_type, &params).await,
        }
    }
}

// ── RelayAgentTransport ──────────────────────────────────────────

/// Calls forwarded to a live agent session named by the tenant's relay id.
pub struct RelayAgentTransport {
    mode: TransportMode,
    forwarder: Forwarder,
}

impl RelayAgentTransport {
    pub fn new(agent_id: &str, relay: Arc<dyn RelayCoordinator>) -> Self {
        Self {
            mode: TransportMode::RelayAgent {
                agent_id: agent_id.to_owned(),
            },
            forwarder: Forwarder::new(agent_id, relay),
        }
    }
}

#[async_trait]
impl TransportAdapter for RelayAgentTransport {
    fn mode(&self) -> &TransportMode {
        &self.mode
    }

    fn capabilities(&self) -> Capabilities {
        CAPABILITIES
    }

    async fn open(&self) -> Result<TransportLink, CoreError> {
        let agent_id = &self.forwarder.agent_id;
        debug!(agent_id = %agent_id, "checking relay agent session");
        if !self.forwarder.relay.is_agent_live(agent_id).await? {
            return Err(CoreError::RelayUnavailable {
                agent_id: agent_id.clone(),
            });
        }
        info!(agent_id = %agent_id, "relay agent session live");
        Ok(self.forwarder.link())
    }

    async fn request(&self, request_type: &str, params: Value) -> Result<Value, CoreError> {
        self.forwarder.request(request_type, params).await
    }

    async fn command(&self, request_type: &str, params: Value) -> Result<(), CoreError> {
        self.forwarder.command(request_type, params).await
    }

    async fn close(&self) {
        self.forwarder.closed.cancel();
    }
}

// ── CloudMagicTransport ──────────────────────────────────────────

/// The coordinator bridges an agent to `public_address:port`, then calls
/// flow exactly as for a relay agent.
pub struct CloudMagicTransport {
    mode: TransportMode,
    public_address: String,
    port: u16,
    password: Option<SecretString>,
    forwarder: Forwarder,
}

impl CloudMagicTransport {
    pub fn new(
        agent_id: &str,
        public_address: &str,
        port: u16,
        password: Option<SecretString>,
        relay: Arc<dyn RelayCoordinator>,
    ) -> Self {
        Self {
            mode: TransportMode::CloudMagic {
                agent_id: agent_id.to_owned(),
                public_address: public_address.to_owned(),
            },
            public_address: super::clean_host(public_address).to_owned(),
            port,
            password,
            forwarder: Forwarder::new(agent_id, relay),
        }
    }
}

#[async_trait]
impl TransportAdapter for CloudMagicTransport {
    fn mode(&self) -> &TransportMode {
        &self.mode
    }

    fn capabilities(&self) -> Capabilities {
        CAPABILITIES
    }

    async fn open(&self) -> Result<TransportLink, CoreError> {
        let agent_id = &self.forwarder.agent_id;
        debug!(
            agent_id = %agent_id,
            public_address = %self.public_address,
            port = self.port,
            "requesting bridge"
        );

        self.forwarder
            .relay
            .establish_bridge(agent_id, &self.public_address, self.port, self.password.as_ref())
            .await
            .map_err(|e| match e {
                CoreError::Command(err) => ConnectError::Failed {
                    url: format!("{agent_id}@{}:{}", self.public_address, self.port),
                    reason: err.to_string(),
                }
                .into(),
                other => other,
            })?;

        info!(agent_id = %agent_id, public_address = %self.public_address, "bridge established");
        Ok(self.forwarder.link())
    }

    async fn request(&self, request_type: &str, params: Value) -> Result<Value, CoreError> {
        self.forwarder.request(request_type, params).await
    }

    async fn command(&self, request_type: &str, params: Value) -> Result<(), CoreError> {
        self.forwarder.command(request_type, params).await
    }

    async fn close(&self) {
        self.forwarder.closed.cancel();
    }
}
