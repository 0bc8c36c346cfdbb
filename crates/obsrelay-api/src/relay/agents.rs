// Relay coordinator agent endpoints
//
// Liveness, request forwarding, bridge setup, and the convenience
// wrappers the relay transports use for common operations.

use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::debug;

use crate::error::Error;
use crate::relay::client::RelayClient;
use crate::relay::models::{
    AgentStatus, BridgeBody, ForwardBody, MuteBody, RelayStats, SceneBody,
};

impl RelayClient {
    /// Whether the named agent currently holds a live session.
    ///
    /// `GET /api/relay/{agent}/status`
    pub async fn is_agent_live(&self, agent_id: &str) -> Result<bool, Error> {
        let url = self.api_url(&[agent_id, "status"])?;
        debug!(agent_id, "checking agent status");
        let status: Option<AgentStatus> = self.get(url).await?;
        Ok(status.is_some_and(|s| s.connected))
    }

    /// Forward a read-style request and return the instance's response data.
    ///
    /// `POST /api/relay/{agent}/request`
    pub async fn forward_request(
        &self,
        agent_id: &str,
        request_type: &str,
        request_data: &Value,
    ) -> Result<Value, Error> {
        let url = self.api_url(&[agent_id, "request"])?;
        debug!(agent_id, request_type, "forwarding request");
        let data: Option<Value> = self
            .post(
                url,
                &ForwardBody {
                    request_type,
                    request_data,
                },
            )
            .await?;
        Ok(data.unwrap_or(Value::Null))
    }

    /// Forward a write-style command.
    ///
    /// `POST /api/relay/{agent}/command`
    pub async fn forward_command(
        &self,
        agent_id: &str,
        request_type: &str,
        request_data: &Value,
    ) -> Result<(), Error> {
        let url = self.api_url(&[agent_id, "command"])?;
        debug!(agent_id, request_type, "forwarding command");
        let _: Option<Value> = self
            .post(
                url,
                &ForwardBody {
                    request_type,
                    request_data,
                },
            )
            .await?;
        Ok(())
    }

    /// Ask the agent to open a bridge to a publicly reachable instance.
    ///
    /// `POST /api/relay/connect`
    pub async fn establish_bridge(
        &self,
        agent_id: &str,
        public_address: &str,
        port: u16,
        password: Option<&SecretString>,
    ) -> Result<(), Error> {
        let url = self.api_url(&["connect"])?;
        debug!(agent_id, public_address, port, "establishing bridge");
        let _: Option<Value> = self
            .post(
                url,
                &BridgeBody {
                    agent_id,
                    ip: public_address,
                    port,
                    password: password.map(|p| p.expose_secret()),
                },
            )
            .await?;
        Ok(())
    }

    // ── Convenience wrappers ─────────────────────────────────────────

    /// `GET /api/relay/{agent}/stats`
    pub async fn stats(&self, agent_id: &str) -> Result<Option<RelayStats>, Error> {
        let url = self.api_url(&[agent_id, "stats"])?;
        self.get(url).await
    }

    /// Base64 JPEG of `source`, if the agent could capture one.
    ///
    /// `GET /api/relay/{agent}/preview?source=...`
    pub async fn preview(&self, agent_id: &str, source: &str) -> Result<Option<String>, Error> {
        let mut url = self.api_url(&[agent_id, "preview"])?;
        url.query_pairs_mut().append_pair("source", source);
        self.get(url).await
    }

    /// `POST /api/relay/{agent}/stream/start`
    pub async fn start_stream(&self, agent_id: &str) -> Result<(), Error> {
        let url = self.api_url(&[agent_id, "stream", "start"])?;
        let _: Option<Value> = self.post(url, &json!({})).await?;
        Ok(())
    }

    /// `POST /api/relay/{agent}/stream/stop`
    pub async fn stop_stream(&self, agent_id: &str) -> Result<(), Error> {
        let url = self.api_url(&[agent_id, "stream", "stop"])?;
        let _: Option<Value> = self.post(url, &json!({})).await?;
        Ok(())
    }

    /// `POST /api/relay/{agent}/mute`
    pub async fn set_mute(
        &self,
        agent_id: &str,
        input_name: &str,
        muted: bool,
    ) -> Result<(), Error> {
        let url = self.api_url(&[agent_id, "mute"])?;
        let _: Option<Value> = self.post(url, &MuteBody { input_name, muted }).await?;
        Ok(())
    }

    /// `POST /api/relay/{agent}/scene`
    pub async fn set_scene(&self, agent_id: &str, scene_name: &str) -> Result<(), Error> {
        let url = self.api_url(&[agent_id, "scene"])?;
        let _: Option<Value> = self.post(url, &SceneBody { scene_name }).await?;
        Ok(())
    }
}
