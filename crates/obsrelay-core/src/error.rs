// ── Core error types ──
//
// User-facing errors from obsrelay-core. Consumers never see socket close
// frames or relay envelopes directly: `From<obsrelay_api::Error>`
// translates wire-level failures into the connect/command taxonomy below.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Connection errors ────────────────────────────────────────────
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(
        "Relay agent '{agent_id}' is offline. Start the agent, or connect directly \
         (host or tunnel address) or through cloud mode (use ID@PUBLIC_IP format)"
    )]
    RelayUnavailable { agent_id: String },

    // ── Command errors ───────────────────────────────────────────────
    #[error(transparent)]
    Command(#[from] CommandError),

    // ── Tenant errors ────────────────────────────────────────────────
    #[error("Tenant not found: {tenant}")]
    TenantNotFound { tenant: String },

    #[error("Tenant '{tenant}' is suspended")]
    TenantSuspended { tenant: String },

    #[error("Session token rejected")]
    Unauthorized,

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Why a connect attempt failed.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Connection to {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    #[error(
        "Secure connection to {url} failed ({reason}). Expose the instance through a \
         secure tunnel such as cloudflared or ngrok and connect to its address"
    )]
    Security { url: String, reason: String },

    #[error("Incorrect password for {url}")]
    BadCredential { url: String },

    #[error("Cannot connect to {url}: {reason}")]
    Failed { url: String, reason: String },

    /// A newer connect or a manual disconnect overtook this attempt.
    #[error("Connection attempt superseded")]
    Superseded,
}

/// Why a request or command against a tenant failed.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Not connected to the instance")]
    NotConnected,

    #[error("{request_type} rejected: {message}")]
    Rejected {
        request_type: String,
        message: String,
    },

    #[error("Request timed out after {timeout_secs}s")]
    TimedOut { timeout_secs: u64 },
}

impl CoreError {
    /// Returns `true` if the instance (or relay) refused a well-formed call.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Command(CommandError::Rejected { .. }))
    }

    /// Returns `true` if the tenant has no live transport.
    pub fn is_not_connected(&self) -> bool {
        matches!(self, Self::Command(CommandError::NotConnected))
    }

    pub(crate) fn rejected(request_type: &str, message: impl Into<String>) -> Self {
        Self::Command(CommandError::Rejected {
            request_type: request_type.to_owned(),
            message: message.into(),
        })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<obsrelay_api::Error> for CoreError {
    fn from(err: obsrelay_api::Error) -> Self {
        use obsrelay_api::Error as Api;

        match err {
            Api::Authentication { message } => CoreError::Connect(ConnectError::Failed {
                url: "relay coordinator".into(),
                reason: message,
            }),
            Api::Transport(ref e) => {
                let url = e
                    .url()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "<unknown>".into());
                if e.is_timeout() {
                    CoreError::Connect(ConnectError::Timeout {
                        url,
                        timeout_secs: 0,
                    })
                } else {
                    CoreError::Connect(ConnectError::Failed {
                        url,
                        reason: e.to_string(),
                    })
                }
            }
            Api::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            Api::Timeout { timeout_secs } => {
                CoreError::Command(CommandError::TimedOut { timeout_secs })
            }
            Api::Tls(reason) => CoreError::Connect(ConnectError::Security {
                url: String::new(),
                reason,
            }),
            Api::Relay { message } => CoreError::rejected("relay", message),
            Api::WebSocketConnect(reason) => CoreError::Connect(ConnectError::Failed {
                url: String::new(),
                reason,
            }),
            ref closed @ Api::WebSocketClosed { .. } if closed.is_bad_password() => {
                CoreError::Connect(ConnectError::BadCredential { url: String::new() })
            }
            Api::WebSocketClosed { code, reason } => CoreError::Connect(ConnectError::Failed {
                url: String::new(),
                reason: format!("socket closed (code {code}): {reason}"),
            }),
            Api::Protocol(reason) => CoreError::Connect(ConnectError::Failed {
                url: String::new(),
                reason: format!("protocol error: {reason}"),
            }),
            Api::NotConnected => CoreError::Command(CommandError::NotConnected),
            Api::RequestFailed {
                request_type,
                code,
                comment,
            } => CoreError::Command(CommandError::Rejected {
                request_type,
                message: format!("{comment} (code {code})"),
            }),
            Api::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}
