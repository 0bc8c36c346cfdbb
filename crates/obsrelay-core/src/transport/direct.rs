// ── Direct socket transport ──
//
// Opens an obs-websocket connection straight to the instance. The URL
// scheme follows the dashboard's origin, tunnel hosts are pinned to
// `wss` on 443, and implicit default ports are left out of the URL.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::Value;
use tracing::{debug, info};

use obsrelay_api::transport::TransportConfig;
use obsrelay_api::ObsSocket;

use super::{Capabilities, TransportAdapter, TransportLink, TransportMode, clean_host};
use crate::config::ConnectionSettings;
use crate::error::{CommandError, ConnectError, CoreError};

/// Resolved socket address for a direct transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectEndpoint {
    pub url: String,
    pub secure: bool,
    pub host: String,
    pub port: u16,
}

impl DirectEndpoint {
    pub fn resolve(host: &str, port: u16, settings: &ConnectionSettings) -> Self {
        let host = clean_host(host).to_owned();
        let (secure, port) = if settings.is_tunnel_host(&host) {
            (true, 443)
        } else {
            (settings.secure_origin, port)
        };

        let scheme = if secure { "wss" } else { "ws" };
        let implicit_port = (secure && port == 443) || (!secure && port == 80);
        let url = if implicit_port {
            format!("{scheme}://{host}")
        } else {
            format!("{scheme}://{host}:{port}")
        };

        Self {
            url,
            secure,
            host,
            port,
        }
    }
}

/// Persistent socket to one instance.
pub struct DirectTransport {
    mode: TransportMode,
    endpoint: DirectEndpoint,
    password: Option<SecretString>,
    connect_timeout: Duration,
    api: TransportConfig,
    socket: ArcSwapOption<ObsSocket>,
}

impl DirectTransport {
    pub fn new(
        host: &str,
        port: u16,
        password: Option<SecretString>,
        settings: &ConnectionSettings,
    ) -> Self {
        Self {
            mode: TransportMode::Direct {
                host: host.to_owned(),
                port,
            },
            endpoint: DirectEndpoint::resolve(host, port, settings),
            password,
            connect_timeout: settings.connect_timeout,
            api: TransportConfig {
                timeout: settings.request_timeout,
                ..TransportConfig::default()
            },
            socket: ArcSwapOption::empty(),
        }
    }

    pub fn endpoint(&self) -> &DirectEndpoint {
        &self.endpoint
    }

    fn live_socket(&self) -> Result<Arc<ObsSocket>, CoreError> {
        self.socket
            .load_full()
            .filter(|socket| socket.is_open())
            .ok_or(CoreError::Command(CommandError::NotConnected))
    }

    fn classify(&self, err: obsrelay_api::Error) -> CoreError {
        let url = self.endpoint.url.clone();
        let kind = match err {
            ref e if e.is_bad_password() => ConnectError::BadCredential { url },
            obsrelay_api::Error::Tls(reason) => ConnectError::Security { url, reason },
            obsrelay_api::Error::Timeout { timeout_secs } => {
                ConnectError::Timeout { url, timeout_secs }
            }
            other => ConnectError::Failed {
                url,
                reason: other.to_string(),
            },
        };
        kind.into()
    }
}

#[async_trait]
impl TransportAdapter for DirectTransport {
    fn mode(&self) -> &TransportMode {
        &self.mode
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            push_events: true,
            scene_item_fallback: true,
        }
    }

    async fn open(&self) -> Result<TransportLink, CoreError> {
        let url = &self.endpoint.url;
        debug!(url = %url, "opening direct socket");

        // Dropping the handshake future on timeout abandons the attempt, so
        // a late success can never surface after we reported failure.
        let attempt = ObsSocket::connect(url, self.password.as_ref(), &self.api);
        let socket = match tokio::time::timeout(self.connect_timeout, attempt).await {
            Err(_) => {
                return Err(ConnectError::Timeout {
                    url: url.clone(),
                    timeout_secs: self.connect_timeout.as_secs(),
                }
                .into());
            }
            Ok(Err(e)) => return Err(self.classify(e)),
            Ok(Ok(socket)) => Arc::new(socket),
        };

        match socket.call("GetVersion", Value::Null).await {
            Ok(version) => info!(
                url = %url,
                obs_version = version["obsVersion"].as_str().unwrap_or("unknown"),
                rpc_version = socket.rpc_version(),
                "direct socket identified"
            ),
            Err(e) => {
                socket.close();
                return Err(self.classify(e));
            }
        }

        let link = TransportLink {
            closed: socket.closed(),
            events: Some(socket.subscribe()),
        };
        if let Some(previous) = self.socket.swap(Some(socket)) {
            previous.close();
        }
        Ok(link)
    }

    async fn request(&self, request_type: &str, params: Value) -> Result<Value, CoreError> {
        let socket = self.live_socket()?;
        Ok(socket.call(request_type, params).await?)
    }

    async fn command(&self, request_type: &str, params: Value) -> Result<(), CoreError> {
        self.request(request_type, params).await.map(|_| ())
    }

    async fn close(&self) {
        if let Some(socket) = self.socket.swap(None) {
            debug!(url = %self.endpoint.url, "closing direct socket");
            socket.close();
        }
    }
}
