// ── Relay coordinator seam ──
//
// The relay-family transports never touch HTTP themselves. They talk to a
// `RelayCoordinator`, implemented for the real `RelayClient` here and by
// in-memory doubles in tests.

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::Value;

use obsrelay_api::RelayClient;
pub use obsrelay_api::relay::RelayStats;

use crate::error::CoreError;

/// Operations the relay family needs from the coordinator.
#[async_trait]
pub trait RelayCoordinator: Send + Sync {
    /// Whether `agent_id` currently holds a live agent session.
    async fn is_agent_live(&self, agent_id: &str) -> Result<bool, CoreError>;

    async fn forward_request(
        &self,
        agent_id: &str,
        request_type: &str,
        params: &Value,
    ) -> Result<Value, CoreError>;

    async fn forward_command(
        &self,
        agent_id: &str,
        request_type: &str,
        params: &Value,
    ) -> Result<(), CoreError>;

    /// Ask `agent_id` to open a bridge to the instance at `public_address:port`.
    async fn establish_bridge(
        &self,
        agent_id: &str,
        public_address: &str,
        port: u16,
        password: Option<&SecretString>,
    ) -> Result<(), CoreError>;

    // ── Convenience wrappers ─────────────────────────────────────────

    async fn stats(&self, agent_id: &str) -> Result<Option<RelayStats>, CoreError>;

    async fn preview(&self, agent_id: &str, source: &str) -> Result<Option<String>, CoreError>;

    async fn start_stream(&self, agent_id: &str) -> Result<(), CoreError>;

    async fn stop_stream(&self, agent_id: &str) -> Result<(), CoreError>;

    async fn set_mute(&self, agent_id: &str, input_name: &str, muted: bool)
    -> Result<(), CoreError>;

    async fn set_scene(&self, agent_id: &str, scene_name: &str) -> Result<(), CoreError>;
}

/// Envelope errors name the request that failed rather than "relay".
fn for_request(request_type: &str) -> impl Fn(obsrelay_api::Error) -> CoreError + '_ {
    move |err| match err {
        obsrelay_api::Error::Relay { message } => CoreError::rejected(request_type, message),
        other => other.into(),
    }
}

#[async_trait]
impl RelayCoordinator for RelayClient {
    async fn is_agent_live(&self, agent_id: &str) -> Result<bool, CoreError> {
        Ok(RelayClient::is_agent_live(self, agent_id).await?)
    }

    async fn forward_request(
        &self,
        agent_id: &str,
        request_type: &str,
        params: &Value,
    ) -> Result<Value, CoreError> {
        RelayClient::forward_request(self, agent_id, request_type, params)
            .await
            .map_err(for_request(request_type))
    }

    async fn forward_command(
        &self,
        agent_id: &str,
        request_type: &str,
        params: &Value,
    ) -> Result<(), CoreError> {
        RelayClient::forward_command(self, agent_id, request_type, params)
            .await
            .map_err(for_request(request_type))
    }

    async fn establish_bridge(
        &self,
        agent_id: &str,
        public_address: &str,
        port: u16,
        password: Option<&SecretString>,
    ) -> Result<(), CoreError> {
        RelayClient::establish_bridge(self, agent_id, public_address, port, password)
            .await
            .map_err(for_request("connect"))
    }

    async fn stats(&self, agent_id: &str) -> Result<Option<RelayStats>, CoreError> {
        RelayClient::stats(self, agent_id)
            .await
            .map_err(for_request("GetStats"))
    }

    async fn preview(&self, agent_id: &str, source: &str) -> Result<Option<String>, CoreError> {
        RelayClient::preview(self, agent_id, source)
            .await
            .map_err(for_request("GetSourceScreenshot"))
    }

    async fn start_stream(&self, agent_id: &str) -> Result<(), CoreError> {
        RelayClient::start_stream(self, agent_id)
            .await
            .map_err(for_request("StartStream"))
    }

    async fn stop_stream(&self, agent_id: &str) -> Result<(), CoreError> {
        RelayClient::stop_stream(self, agent_id)
            .await
            .map_err(for_request("StopStream"))
    }

    async fn set_mute(
        &self,
        agent_id: &str,
        input_name: &str,
        muted: bool,
    ) -> Result<(), CoreError> {
        RelayClient::set_mute(self, agent_id, input_name, muted)
            .await
            .map_err(for_request("SetInputMute"))
    }

    async fn set_scene(&self, agent_id: &str, scene_name: &str) -> Result<(), CoreError> {
        RelayClient::set_scene(self, agent_id, scene_name)
            .await
            .map_err(for_request("SetCurrentProgramScene"))
    }
}

// ── No coordinator configured ────────────────────────────────────

/// Stand-in when no relay URL is configured: every relay-family call
/// fails with a configuration error instead of a network error.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredRelay;

impl UnconfiguredRelay {
    fn error() -> CoreError {
        CoreError::Config {
            message: "no relay coordinator configured (set server.relay_url)".into(),
        }
    }
}

#[async_trait]
impl RelayCoordinator for UnconfiguredRelay {
    async fn is_agent_live(&self, _agent_id: &str) -> Result<bool, CoreError> {
        Err(Self::error())
    }

    async fn forward_request(&self, _: &str, _: &str, _: &Value) -> Result<Value, CoreError> {
        Err(Self::error())
    }

    async fn forward_command(&self, _: &str, _: &str, _: &Value) -> Result<(), CoreError> {
        Err(Self::error())
    }

    async fn establish_bridge(
        &self,
        _: &str,
        _: &str,
        _: u16,
        _: Option<&SecretString>,
    ) -> Result<(), CoreError> {
        Err(Self::error())
    }

    async fn stats(&self, _: &str) -> Result<Option<RelayStats>, CoreError> {
        Err(Self::error())
    }

    async fn preview(&self, _: &str, _: &str) -> Result<Option<String>, CoreError> {
        Err(Self::error())
    }

    async fn start_stream(&self, _: &str) -> Result<(), CoreError> {
        Err(Self::error())
    }

    async fn stop_stream(&self, _: &str) -> Result<(), CoreError> {
        Err(Self::error())
    }

    async fn set_mute(&self, _: &str, _: &str, _: bool) -> Result<(), CoreError> {
        Err(Self::error())
    }

    async fn set_scene(&self, _: &str, _: &str) -> Result<(), CoreError> {
        Err(Self::error())
    }
}
