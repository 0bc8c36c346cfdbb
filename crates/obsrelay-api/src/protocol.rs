//! obs-websocket v5 message types.
//!
//! Every frame is `{"op": <u8>, "d": {...}}`. Only the opcodes a
//! request/response client needs are modelled; batches and reidentify
//! are never sent.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// RPC version negotiated in `Identify`.
pub const RPC_VERSION: u32 = 1;

/// `EventSubscription::All` (every non high-volume category).
pub const EVENT_SUBSCRIPTION_ALL: u32 = 0x7FF;

// ── Opcodes ──────────────────────────────────────────────────────────

pub mod op {
    pub const HELLO: u8 = 0;
    pub const IDENTIFY: u8 = 1;
    pub const IDENTIFIED: u8 = 2;
    pub const EVENT: u8 = 5;
    pub const REQUEST: u8 = 6;
    pub const REQUEST_RESPONSE: u8 = 7;
}

// ── Envelope ─────────────────────────────────────────────────────────

/// Raw frame as it comes off the socket.
#[derive(Debug, Deserialize)]
pub struct Frame {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
}

#[derive(Debug, Serialize)]
struct OutgoingFrame<'a, T: Serialize> {
    op: u8,
    d: &'a T,
}

/// Serialize an outgoing payload with its opcode.
pub fn encode<T: Serialize>(op: u8, payload: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(&OutgoingFrame { op, d: payload })
}

// ── Handshake ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    #[serde(default)]
    pub obs_web_socket_version: Option<String>,
    pub rpc_version: u32,
    #[serde(default)]
    pub authentication: Option<AuthChallenge>,
}

#[derive(Debug, Deserialize)]
pub struct AuthChallenge {
    pub challenge: String,
    pub salt: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identify {
    pub rpc_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<String>,
    pub event_subscriptions: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identified {
    pub negotiated_rpc_version: u32,
}

/// `base64(sha256(base64(sha256(password + salt)) + challenge))`
pub fn auth_response(password: &str, salt: &str, challenge: &str) -> String {
    let secret = STANDARD.encode(Sha256::digest(format!("{password}{salt}")));
    STANDARD.encode(Sha256::digest(format!("{secret}{challenge}")))
}

// ── Requests ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Request<'a> {
    pub request_type: &'a str,
    pub request_id: &'a str,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub request_data: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    pub request_type: String,
    pub request_id: String,
    pub request_status: RequestStatus,
    #[serde(default)]
    pub response_data: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct RequestStatus {
    pub result: bool,
    pub code: u16,
    #[serde(default)]
    pub comment: Option<String>,
}

// ── Events ───────────────────────────────────────────────────────────

/// An event pushed by the instance (op 5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObsEvent {
    /// Event name, e.g. `"StreamStateChanged"`.
    pub event_type: String,

    /// Subscription category bit the event belongs to.
    #[serde(default)]
    pub event_intent: u32,

    /// Event payload, passed through untouched.
    #[serde(default)]
    pub event_data: Value,
}
