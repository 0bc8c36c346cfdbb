use thiserror::Error;

/// obs-websocket close code sent when the Identify payload fails authentication.
pub const CLOSE_AUTHENTICATION_FAILED: u16 = 4009;

/// Top-level error type for the `obsrelay-api` crate.
///
/// Covers every failure mode across both wire surfaces: the obs-websocket
/// socket and the relay coordinator's HTTP API. `obsrelay-core` maps these
/// into its connect/command taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Relay coordinator rejected our bearer token.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Relay coordinator ───────────────────────────────────────────
    /// Error reported inside the `{success, data, error}` envelope.
    #[error("Relay error: {message}")]
    Relay { message: String },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed by the remote end.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// The peer sent something the obs-websocket handshake does not allow.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The socket is gone; no response will arrive.
    #[error("Not connected")]
    NotConnected,

    /// The instance answered a request with `requestStatus.result = false`.
    #[error("{request_type} failed (code {code}): {comment}")]
    RequestFailed {
        request_type: String,
        code: u16,
        comment: String,
    },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if the instance closed the socket because the password was wrong.
    pub fn is_bad_password(&self) -> bool {
        matches!(
            self,
            Self::WebSocketClosed { code, .. } if *code == CLOSE_AUTHENTICATION_FAILED
        )
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } | Self::WebSocketConnect(_) | Self::NotConnected => true,
            _ => false,
        }
    }

    /// Returns `true` if the remote side rejected a well-formed request.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::RequestFailed { .. } | Self::Relay { .. })
    }
}
