//! Shared configuration for the obsrelay binary.
//!
//! TOML file + `OBSRELAY_` environment overrides, credential resolution
//! (env → keyring → plaintext), and translation into the core's
//! `ConnectionSettings`, `TenantConnectionConfig`, relay coordinator and
//! tenant collaborators.

mod directory;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use obsrelay_api::RelayClient;
use obsrelay_api::transport::{TlsMode, TransportConfig};
use obsrelay_core::{
    ConnectStrategy, ConnectionSettings, RelayCoordinator, StaticTokenVerifier,
    TenantConnectionConfig, TenantId, TenantRecord, UnconfiguredRelay,
};

pub use directory::FileTenantDirectory;

const KEYRING_SERVICE: &str = "obsrelay";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("tenant '{tenant}' is not configured")]
    UnknownTenant { tenant: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    /// Tenants keyed by id.
    #[serde(default)]
    pub tenants: BTreeMap<String, TenantEntry>,
}

/// Process-wide settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Origin the dashboard is served from. An `https` origin forces
    /// secure direct sockets.
    pub dashboard_origin: Option<String>,

    /// Relay coordinator base URL. Relay-family tenants fail with a
    /// configuration error when unset.
    pub relay_url: Option<String>,

    /// Coordinator bearer token (plaintext, prefer keyring or env var).
    pub relay_token: Option<String>,

    /// Environment variable name containing the coordinator token.
    pub relay_token_env: Option<String>,

    /// Custom CA certificate for the coordinator.
    pub relay_ca_cert: Option<PathBuf>,

    /// Accept a self-signed coordinator certificate.
    #[serde(default)]
    pub relay_insecure: bool,

    /// Seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Seconds before a direct tenant is retried.
    #[serde(default = "default_direct_reconnect")]
    pub direct_reconnect: u64,

    /// Seconds before a relay-agent or cloud-magic tenant is retried.
    #[serde(default = "default_relay_reconnect")]
    pub relay_reconnect: u64,

    #[serde(default = "default_tunnel_domains")]
    pub tunnel_domains: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            dashboard_origin: None,
            relay_url: None,
            relay_token: None,
            relay_token_env: None,
            relay_ca_cert: None,
            relay_insecure: false,
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
            direct_reconnect: default_direct_reconnect(),
            relay_reconnect: default_relay_reconnect(),
            tunnel_domains: default_tunnel_domains(),
        }
    }
}

fn default_connect_timeout() -> u64 {
    20
}
fn default_request_timeout() -> u64 {
    30
}
fn default_direct_reconnect() -> u64 {
    10
}
fn default_relay_reconnect() -> u64 {
    15
}
fn default_tunnel_domains() -> Vec<String> {
    ConnectionSettings::default().tunnel_domains
}

/// One tenant's stored connection config.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TenantEntry {
    /// Relay agent id, `agent@public-ip`, or host.
    #[serde(default)]
    pub address: String,

    pub port: Option<u16>,

    /// Instance password (plaintext, prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the instance password.
    pub password_env: Option<String>,

    #[serde(default)]
    pub strategy: ConnectStrategy,

    /// Session token that attaches dashboards to this tenant.
    pub token: Option<String>,

    #[serde(default)]
    pub suspended: bool,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "obsrelay", "obsrelay").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("obsrelay");
    p
}

// ── Loading & saving ────────────────────────────────────────────────

/// Load from the canonical path plus environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` plus environment. A missing file yields defaults.
///
/// Environment keys nest with a double underscore:
/// `OBSRELAY_SERVER__RELAY_URL`, `OBSRELAY_TENANTS__ACME__PORT`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("OBSRELAY_").split("__"));

    let config: Config = figment.extract()?;
    debug!(path = %path.display(), tenants = config.tenants.len(), "config loaded");
    Ok(config)
}

/// Read only the file, without defaults or environment. Used when writing
/// back, so env overrides never end up on disk.
pub fn read_config_file(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&contents)?)
}

/// Serialize to TOML and write to `path`, creating parent directories.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

// ── Credential resolution ───────────────────────────────────────────

/// Secret from the chain: named env var, then keyring, then plaintext.
fn resolve_secret(
    env_name: Option<&str>,
    keyring_user: &str,
    plaintext: Option<&str>,
) -> Option<SecretString> {
    if let Some(env_name) = env_name {
        if let Ok(value) = std::env::var(env_name) {
            return Some(SecretString::from(value));
        }
    }

    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, keyring_user) {
        if let Ok(secret) = entry.get_password() {
            return Some(SecretString::from(secret));
        }
    }

    plaintext.map(|value| SecretString::from(value.to_owned()))
}

/// Instance password for `tenant`, if any is configured.
pub fn resolve_password(entry: &TenantEntry, tenant: &str) -> Option<SecretString> {
    resolve_secret(
        entry.password_env.as_deref(),
        &format!("{tenant}/password"),
        entry.password.as_deref(),
    )
}

/// Store an instance password in the system keyring.
pub fn store_password(tenant: &str, password: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{tenant}/password"))
        .and_then(|entry| entry.set_password(password))
        .map_err(|e| ConfigError::Validation {
            field: "password".into(),
            reason: format!("keyring unavailable: {e}"),
        })
}

/// Coordinator bearer token, if any is configured.
pub fn resolve_relay_token(server: &ServerConfig) -> Option<SecretString> {
    resolve_secret(
        server.relay_token_env.as_deref(),
        "relay/token",
        server.relay_token.as_deref(),
    )
}

// ── Translation to core types ───────────────────────────────────────

impl ServerConfig {
    /// Whether the dashboard origin is served over https.
    pub fn secure_origin(&self) -> bool {
        self.dashboard_origin
            .as_deref()
            .and_then(|origin| Url::parse(origin).ok())
            .is_some_and(|url| url.scheme() == "https")
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout),
            request_timeout: Duration::from_secs(self.request_timeout),
            direct_reconnect_delay: Duration::from_secs(self.direct_reconnect),
            relay_reconnect_delay: Duration::from_secs(self.relay_reconnect),
            secure_origin: self.secure_origin(),
            tunnel_domains: self.tunnel_domains.clone(),
        }
    }

    /// Parsed coordinator URL, `None` when unset.
    pub fn relay_base_url(&self) -> Result<Option<Url>, ConfigError> {
        let Some(raw) = self.relay_url.as_deref().map(str::trim) else {
            return Ok(None);
        };
        if raw.is_empty() {
            return Ok(None);
        }
        Url::parse(raw)
            .map(Some)
            .map_err(|e| ConfigError::Validation {
                field: "server.relay_url".into(),
                reason: format!("invalid URL '{raw}': {e}"),
            })
    }

    pub fn relay_transport(&self) -> TransportConfig {
        let tls = if self.relay_insecure {
            TlsMode::DangerAcceptInvalid
        } else if let Some(ref ca_path) = self.relay_ca_cert {
            TlsMode::CustomCa(ca_path.clone())
        } else {
            TlsMode::System
        };
        TransportConfig {
            tls,
            timeout: Duration::from_secs(self.request_timeout),
        }
    }

    /// The relay coordinator client, or a stand-in that rejects every
    /// relay-family call when no URL is configured.
    pub fn relay_coordinator(&self) -> Result<Arc<dyn RelayCoordinator>, ConfigError> {
        let Some(url) = self.relay_base_url()? else {
            debug!("no relay coordinator configured");
            return Ok(Arc::new(UnconfiguredRelay));
        };
        let token = resolve_relay_token(self);
        let client = RelayClient::new(url, token.as_ref(), &self.relay_transport()).map_err(
            |e| ConfigError::Validation {
                field: "server.relay_url".into(),
                reason: e.to_string(),
            },
        )?;
        Ok(Arc::new(client))
    }
}

impl TenantEntry {
    /// Build from a core config. The password is not carried over; it is
    /// stored separately.
    pub fn from_connection_config(config: &TenantConnectionConfig) -> Self {
        Self {
            address: config.address.trim().to_owned(),
            port: config.port,
            strategy: config.strategy,
            ..Self::default()
        }
    }

    /// Core connection config with the password resolved.
    pub fn connection_config(&self, tenant: &str) -> TenantConnectionConfig {
        TenantConnectionConfig {
            address: self.address.trim().to_owned(),
            port: self.port,
            password: resolve_password(self, tenant),
            strategy: self.strategy,
        }
    }

    pub fn record(&self, tenant: &str) -> TenantRecord {
        TenantRecord {
            id: TenantId::from(tenant),
            config: self.connection_config(tenant),
            suspended: self.suspended,
        }
    }
}

impl Config {
    pub fn tenant(&self, tenant: &str) -> Result<&TenantEntry, ConfigError> {
        self.tenants
            .get(tenant)
            .ok_or_else(|| ConfigError::UnknownTenant {
                tenant: tenant.into(),
            })
    }

    pub fn tenant_records(&self) -> Vec<TenantRecord> {
        self.tenants
            .iter()
            .map(|(id, entry)| entry.record(id))
            .collect()
    }

    /// Session tokens from every tenant that has one.
    pub fn token_verifier(&self) -> StaticTokenVerifier {
        StaticTokenVerifier::new(self.tenants.iter().filter_map(|(id, entry)| {
            entry
                .token
                .as_deref()
                .filter(|token| !token.is_empty())
                .map(|token| (SecretString::from(token.to_owned()), TenantId::from(id.as_str())))
        }))
    }
}
