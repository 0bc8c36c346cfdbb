//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use obsrelay_config::ConfigError;
use obsrelay_core::{CommandError, ConnectError, CoreError};

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const PERMISSION: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to {target}: {message}")]
    #[diagnostic(
        code(obsrelay::connection_failed),
        help("Check that OBS is running with obs-websocket enabled and reachable.")
    )]
    ConnectionFailed { target: String, message: String },

    #[error("{message}")]
    #[diagnostic(
        code(obsrelay::relay_unavailable),
        help("Check that the relay agent is running and server.relay_url points at the coordinator.")
    )]
    RelayUnavailable { message: String },

    #[error("Not connected to the instance")]
    #[diagnostic(code(obsrelay::not_connected))]
    NotConnected,

    // ── Authentication ───────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(
        code(obsrelay::auth_failed),
        help(
            "Verify the instance password or session token.\n\
             Run: obsrelay connect <tenant> <address> <port> --password <password>"
        )
    )]
    AuthFailed { message: String },

    // ── Tenants ──────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(obsrelay::not_found),
        help("Run: obsrelay {list_command} to see what is available")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("Tenant '{tenant}' is suspended")]
    #[diagnostic(
        code(obsrelay::suspended),
        help("Clear `suspended` for the tenant in the config file.")
    )]
    Suspended { tenant: String },

    // ── Instance ─────────────────────────────────────────────────────
    #[error("{request_type} rejected: {message}")]
    #[diagnostic(code(obsrelay::rejected))]
    Rejected {
        request_type: String,
        message: String,
    },

    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(obsrelay::timeout),
        help("Raise server.connect_timeout or server.request_timeout in the config file.")
    )]
    Timeout { seconds: u64 },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(obsrelay::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(
        code(obsrelay::config),
        help("Check the config file, or override keys with OBSRELAY_SERVER__<KEY>.")
    )]
    Config(ConfigError),

    #[error("Internal error: {0}")]
    #[diagnostic(code(obsrelay::internal))]
    Internal(String),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(obsrelay::json), help("Pass a JSON object, e.g. --data '{{\"sceneName\":\"Live\"}}'"))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::RelayUnavailable { .. } | Self::NotConnected => {
                exit_code::CONNECTION
            }
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Suspended { .. } => exit_code::PERMISSION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::Json(_) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }

    pub fn unknown_tenant(tenant: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: "tenant".into(),
            identifier: tenant.into(),
            list_command: "tenants".into(),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Config { message } => Self::Validation {
                field: "tenant config".into(),
                reason: message,
            },

            CoreError::Connect(connect) => match connect {
                ConnectError::Timeout { timeout_secs, .. } => Self::Timeout {
                    seconds: timeout_secs,
                },
                ConnectError::BadCredential { .. } => Self::AuthFailed {
                    message: connect.to_string(),
                },
                ConnectError::Security { ref url, .. } | ConnectError::Failed { ref url, .. } => {
                    Self::ConnectionFailed {
                        target: url.clone(),
                        message: connect.to_string(),
                    }
                }
                ConnectError::Superseded => Self::ConnectionFailed {
                    target: "instance".into(),
                    message: connect.to_string(),
                },
            },

            err @ CoreError::RelayUnavailable { .. } => Self::RelayUnavailable {
                message: err.to_string(),
            },

            CoreError::Command(command) => match command {
                CommandError::NotConnected => Self::NotConnected,
                CommandError::Rejected {
                    request_type,
                    message,
                } => Self::Rejected {
                    request_type,
                    message,
                },
                CommandError::TimedOut { timeout_secs } => Self::Timeout {
                    seconds: timeout_secs,
                },
            },

            CoreError::TenantNotFound { tenant } => Self::unknown_tenant(tenant),

            CoreError::TenantSuspended { tenant } => Self::Suspended { tenant },

            err @ CoreError::Unauthorized => Self::AuthFailed {
                message: err.to_string(),
            },

            CoreError::Internal(message) => Self::Internal(message),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::UnknownTenant { tenant } => Self::unknown_tenant(tenant),
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let cases = [
            (CoreError::Unauthorized, exit_code::AUTH),
            (
                CoreError::TenantNotFound {
                    tenant: "acme".into(),
                },
                exit_code::NOT_FOUND,
            ),
            (
                CoreError::TenantSuspended {
                    tenant: "acme".into(),
                },
                exit_code::PERMISSION,
            ),
            (
                CoreError::RelayUnavailable {
                    agent_id: "studio".into(),
                },
                exit_code::CONNECTION,
            ),
            (
                CoreError::Command(CommandError::NotConnected),
                exit_code::CONNECTION,
            ),
            (
                CoreError::Command(CommandError::TimedOut { timeout_secs: 30 }),
                exit_code::TIMEOUT,
            ),
            (
                CoreError::Config {
                    message: "instance port is required".into(),
                },
                exit_code::USAGE,
            ),
            (
                CoreError::Connect(ConnectError::BadCredential {
                    url: "ws://studio:4455".into(),
                }),
                exit_code::AUTH,
            ),
        ];

        for (core, code) in cases {
            let label = core.to_string();
            assert_eq!(CliError::from(core).exit_code(), code, "{label}");
        }
    }

    #[test]
    fn rejection_keeps_request_type() {
        let err = CliError::from(CoreError::Command(CommandError::Rejected {
            request_type: "SetCurrentProgramScene".into(),
            message: "No source was found".into(),
        }));
        assert_eq!(
            err.to_string(),
            "SetCurrentProgramScene rejected: No source was found"
        );
        assert_eq!(err.exit_code(), exit_code::GENERAL);
    }
}
