// ── Runtime connection configuration ──
//
// These types describe *how* to reach a tenant's production instance.
// They carry credential data and connection tuning, but never touch disk.
// obsrelay-config builds them from the TOML file and hands them in.

use std::fmt;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Default obs-websocket port, used when a config omits one.
pub const DEFAULT_INSTANCE_PORT: u16 = 4455;

// ── TenantId ─────────────────────────────────────────────────────

/// Identity of one tenant (one operator account, one instance).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for TenantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ── ConnectStrategy ──────────────────────────────────────────────

/// How the operator asked us to reach the instance.
///
/// `Auto` lets the address shape decide; `Relay` pins the tenant to the
/// relay-agent bridge even when the address looks like a hostname.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConnectStrategy {
    #[default]
    Auto,
    Relay,
}

// ── TenantConnectionConfig ───────────────────────────────────────

/// Where a tenant's instance lives.
///
/// `address` may be a relay agent id (`studio-pc`), a cloud-magic
/// composite (`agent@203.0.113.7`), or a bare host (`obs.example.com`).
/// Compared by value to decide whether an update needs a rewire.
#[derive(Debug, Clone, Default)]
pub struct TenantConnectionConfig {
    pub address: String,
    pub port: Option<u16>,
    pub password: Option<SecretString>,
    pub strategy: ConnectStrategy,
}

impl PartialEq for TenantConnectionConfig {
    fn eq(&self, other: &Self) -> bool {
        let same_password = match (&self.password, &other.password) {
            (Some(a), Some(b)) => a.expose_secret() == b.expose_secret(),
            (None, None) => true,
            _ => false,
        };
        self.address == other.address
            && self.port == other.port
            && self.strategy == other.strategy
            && same_password
    }
}

impl Eq for TenantConnectionConfig {}

impl TenantConnectionConfig {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port: Some(port),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(SecretString::from(password.into()));
        self
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: ConnectStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Whether there is anything to connect to at all.
    pub fn has_address(&self) -> bool {
        !self.address.trim().is_empty()
    }

    /// Port to use, falling back to the obs-websocket default.
    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_INSTANCE_PORT)
    }

    /// Reject configs that cannot be connected: both address and port are
    /// required before any transport is built.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.has_address() {
            return Err(CoreError::Config {
                message: "instance address is required".into(),
            });
        }
        match self.port {
            None | Some(0) => Err(CoreError::Config {
                message: format!("instance port is required for '{}'", self.address.trim()),
            }),
            Some(_) => Ok(()),
        }
    }
}

// ── ConnectionSettings ───────────────────────────────────────────

/// Process-wide connection tuning shared by every tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Upper bound on a direct socket handshake.
    pub connect_timeout: Duration,
    /// Upper bound on a single request round-trip.
    pub request_timeout: Duration,
    /// Delay before retrying a direct connection.
    pub direct_reconnect_delay: Duration,
    /// Delay before retrying a relay-agent or cloud-magic connection.
    pub relay_reconnect_delay: Duration,
    /// The dashboard is served over https, so direct sockets must be `wss`.
    pub secure_origin: bool,
    /// Host suffixes of reverse-tunnel providers; always `wss` on 443.
    pub tunnel_domains: Vec<String>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(20),
            request_timeout: Duration::from_secs(30),
            direct_reconnect_delay: Duration::from_secs(10),
            relay_reconnect_delay: Duration::from_secs(15),
            secure_origin: false,
            tunnel_domains: vec![
                "trycloudflare.com".into(),
                "ngrok-free.app".into(),
                "ngrok.io".into(),
            ],
        }
    }
}

impl ConnectionSettings {
    /// Whether `host` belongs to one of the configured tunnel providers.
    pub fn is_tunnel_host(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.tunnel_domains.iter().any(|domain| {
            let domain = domain.trim_start_matches('.').to_ascii_lowercase();
            host == domain || host.ends_with(&format!(".{domain}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_requires_address_and_port() {
        assert!(TenantConnectionConfig::default().validate().is_err());
        assert!(
            TenantConnectionConfig {
                address: "studio-pc".into(),
                ..Default::default()
            }
            .validate()
            .is_err()
        );
        assert!(TenantConnectionConfig::new("   ", 4455).validate().is_err());
        assert!(TenantConnectionConfig::new("studio-pc", 4455).validate().is_ok());
    }

    #[test]
    fn equality_compares_password_by_value() {
        let a = TenantConnectionConfig::new("studio-pc", 4455).with_password("hunter2");
        let b = TenantConnectionConfig::new("studio-pc", 4455).with_password("hunter2");
        let c = TenantConnectionConfig::new("studio-pc", 4455).with_password("letmein");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, TenantConnectionConfig::new("studio-pc", 4455));
    }

    #[test]
    fn tunnel_host_matches_suffix_only() {
        let settings = ConnectionSettings::default();
        assert!(settings.is_tunnel_host("x.trycloudflare.com"));
        assert!(settings.is_tunnel_host("abc.NGROK-FREE.app"));
        assert!(!settings.is_tunnel_host("nottrycloudflare.com"));
        assert!(!settings.is_tunnel_host("192.168.1.20"));
    }

    #[test]
    fn strategy_parses_lowercase() {
        assert_eq!("relay".parse::<ConnectStrategy>().ok(), Some(ConnectStrategy::Relay));
        assert_eq!(ConnectStrategy::Auto.to_string(), "auto");
    }
}
