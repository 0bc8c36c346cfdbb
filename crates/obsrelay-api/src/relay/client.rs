// Relay coordinator HTTP client
//
// Wraps `reqwest::Client` with coordinator URL construction and envelope
// unwrapping. Endpoint methods live in `agents.rs` as inherent methods so
// this module stays focused on transport mechanics.

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::relay::models::RelayEnvelope;
use crate::transport::TransportConfig;

/// Raw HTTP client for the relay coordinator.
///
/// All methods return the unwrapped `data` payload; the envelope is
/// stripped before the caller sees it.
#[derive(Debug, Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    base_url: Url,
}

impl RelayClient {
    /// Create a client from a `TransportConfig`.
    ///
    /// `token`, when present, is sent as `Authorization: Bearer <token>` on
    /// every request.
    pub fn new(
        base_url: Url,
        token: Option<&SecretString>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = match token {
            Some(token) => {
                let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
                    .map_err(|e| Error::Authentication {
                        message: format!("invalid relay token: {e}"),
                    })?;
                value.set_sensitive(true);
                let mut headers = HeaderMap::new();
                headers.insert(AUTHORIZATION, value);
                transport.build_client_with_headers(headers)?
            }
            None => transport.build_client()?,
        };
        Ok(Self { http, base_url })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// The coordinator base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// `{base}/api/relay/{segments...}`, each segment percent-encoded.
    pub(crate) fn api_url(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::Relay {
                message: format!("relay URL cannot be a base: {}", self.base_url),
            })?
            .pop_if_empty()
            .extend(["api", "relay"])
            .extend(segments);
        Ok(url)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Send a GET request and unwrap the envelope.
    pub(crate) async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>, Error> {
        debug!("GET {}", url);

        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;

        parse_envelope(resp).await
    }

    /// Send a POST request with JSON body and unwrap the envelope.
    pub(crate) async fn post<T: DeserializeOwned>(
        &self,
        url: Url,
        body: &(impl Serialize + Sync),
    ) -> Result<Option<T>, Error> {
        debug!("POST {}", url);

        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(Error::Transport)?;

        parse_envelope(resp).await
    }
}

/// Parse the `{ success, data, error }` envelope.
///
/// Returns `data` (possibly absent) on success, or [`Error::Relay`] with
/// the coordinator's message when `success` is false.
async fn parse_envelope<T: DeserializeOwned>(resp: reqwest::Response) -> Result<Option<T>, Error> {
    let status = resp.status();

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(Error::Authentication {
            message: format!("relay coordinator refused credentials (HTTP {status})"),
        });
    }

    let body = resp.text().await.map_err(Error::Transport)?;

    let envelope: RelayEnvelope<T> = match serde_json::from_str(&body) {
        Ok(envelope) => envelope,
        Err(_) if !status.is_success() => {
            return Err(Error::Relay {
                message: format!("HTTP {status}: {}", preview(&body)),
            });
        }
        Err(e) => {
            return Err(Error::Deserialization {
                message: format!("{e} (body preview: {:?})", preview(&body)),
                body,
            });
        }
    };

    if envelope.success && status.is_success() {
        Ok(envelope.data)
    } else {
        Err(Error::Relay {
            message: envelope
                .error
                .unwrap_or_else(|| format!("request failed (HTTP {status})")),
        })
    }
}

fn preview(body: &str) -> &str {
    let end = body
        .char_indices()
        .nth(200)
        .map_or(body.len(), |(idx, _)| idx);
    &body[..end]
}
