// Relay coordinator wire types
//
// Request bodies are camelCase to match the dashboard's own payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The `{ success, data, error }` envelope wrapping every response.
#[derive(Debug, Deserialize)]
pub struct RelayEnvelope<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
}

/// `GET /api/relay/{agent}/status`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentStatus {
    #[serde(default)]
    pub connected: bool,
}

/// Body for the request/command forwarding endpoints.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardBody<'a> {
    pub request_type: &'a str,
    pub request_data: &'a Value,
}

/// Body for `POST /api/relay/connect`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeBody<'a> {
    pub agent_id: &'a str,
    pub ip: &'a str,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MuteBody<'a> {
    pub input_name: &'a str,
    pub muted: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneBody<'a> {
    pub scene_name: &'a str,
}

/// Aggregated instance statistics as the agent reports them.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelayStats {
    pub cpu: f64,
    pub fps: f64,
    /// Memory in megabytes.
    pub memory: f64,
    pub dropped_frames: u64,
    pub total_frames: u64,
    /// Stream timecode, `HH:MM:SS[.mmm]`.
    pub uptime: Option<String>,
    pub streaming: bool,
    pub output_bytes: u64,
}
