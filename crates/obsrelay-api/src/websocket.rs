//! obs-websocket v5 client.
//!
//! One [`ObsSocket`] is one identified session with one instance. The
//! handshake (Hello → Identify → Identified) completes inside
//! [`ObsSocket::connect`]; afterwards a reader task correlates
//! `RequestResponse` frames to callers by `requestId` and pushes events
//! through a [`tokio::sync::broadcast`] channel.
//!
//! Reconnection is not handled here. When the socket drops, the
//! [`closed`](ObsSocket::closed) token fires and every in-flight request
//! fails with [`Error::NotConnected`]; the owner decides what happens next.
//!
//! # Example
//!
//! ```rust,ignore
//! use obsrelay_api::{ObsSocket, TransportConfig};
//!
//! let socket = ObsSocket::connect("ws://127.0.0.1:4455", None, &TransportConfig::default()).await?;
//! let scenes = socket.call("GetSceneList", serde_json::Value::Null).await?;
//! socket.close();
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::error::Error;
use crate::protocol::{
    self, EVENT_SUBSCRIPTION_ALL, Frame, Hello, Identified, Identify, ObsEvent, RPC_VERSION,
    Request, RequestResponse, op,
};
use crate::transport::TransportConfig;

// ── Broadcast channel capacity ───────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 256;

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<Result<Value, Error>>>>>;

// ── ObsSocket ────────────────────────────────────────────────────────

/// An identified obs-websocket session.
///
/// Dropping the socket shuts down its background tasks.
pub struct ObsSocket {
    outgoing: mpsc::UnboundedSender<Message>,
    pending: PendingMap,
    event_tx: broadcast::Sender<Arc<ObsEvent>>,
    closed: CancellationToken,
    cancel: CancellationToken,
    request_timeout: Duration,
    rpc_version: u32,
}

impl ObsSocket {
    /// Open the socket and complete the identification handshake.
    ///
    /// When the instance requires authentication and `password` is `None`,
    /// an empty password is sent and the instance answers with close code
    /// 4009, surfaced as [`Error::WebSocketClosed`].
    pub async fn connect(
        url: &str,
        password: Option<&SecretString>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        info!(url, "connecting to obs-websocket");

        let (ws_stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(map_connect_error)?;

        let (mut write, mut read) = ws_stream.split();

        let hello: Hello = expect_frame(&mut read, op::HELLO).await?;
        debug!(
            version = hello.obs_web_socket_version.as_deref().unwrap_or("unknown"),
            rpc = hello.rpc_version,
            auth = hello.authentication.is_some(),
            "received Hello"
        );

        let authentication = hello.authentication.as_ref().map(|challenge| {
            let password = password.map_or("", |p| p.expose_secret());
            protocol::auth_response(password, &challenge.salt, &challenge.challenge)
        });

        let identify = Identify {
            rpc_version: RPC_VERSION,
            authentication,
            event_subscriptions: EVENT_SUBSCRIPTION_ALL,
        };
        let text = protocol::encode(op::IDENTIFY, &identify)
            .map_err(|e| Error::Protocol(e.to_string()))?;
        write
            .send(Message::text(text))
            .await
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        let identified: Identified = expect_frame(&mut read, op::IDENTIFIED).await?;
        info!(rpc = identified.negotiated_rpc_version, "obs-websocket identified");

        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let pending: PendingMap = Arc::default();
        let closed = CancellationToken::new();
        let cancel = CancellationToken::new();

        tokio::spawn(write_loop(write, outgoing_rx, cancel.clone()));
        tokio::spawn(read_loop(
            read,
            Arc::clone(&pending),
            event_tx.clone(),
            cancel.clone(),
            closed.clone(),
        ));

        Ok(Self {
            outgoing,
            pending,
            event_tx,
            closed,
            cancel,
            request_timeout: transport.timeout,
            rpc_version: identified.negotiated_rpc_version,
        })
    }

    /// Send a request and wait for its `responseData`.
    ///
    /// Requests are independent: concurrent calls resolve in whatever order
    /// the instance answers them.
    pub async fn call(&self, request_type: &str, request_data: Value) -> Result<Value, Error> {
        if self.closed.is_cancelled() {
            return Err(Error::NotConnected);
        }

        let request_id = Uuid::new_v4().to_string();
        let frame = protocol::encode(
            op::REQUEST,
            &Request {
                request_type,
                request_id: &request_id,
                request_data,
            },
        )
        .map_err(|e| Error::Protocol(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending lock poisoned")
            .insert(request_id.clone(), tx);

        // The reader drains `pending` when it exits; re-check so a request
        // registered after that drain does not wait out the full timeout.
        if self.closed.is_cancelled() || self.outgoing.send(Message::text(frame)).is_err() {
            self.forget(&request_id);
            return Err(Error::NotConnected);
        }
        debug!(request_type, request_id = %request_id, "request sent");

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::NotConnected),
            Err(_) => {
                self.forget(&request_id);
                Err(Error::Timeout {
                    timeout_secs: self.request_timeout.as_secs(),
                })
            }
        }
    }

    /// Get a new receiver for pushed events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ObsEvent>> {
        self.event_tx.subscribe()
    }

    /// Token cancelled once the socket is gone, for whatever reason.
    pub fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Whether the session is still up.
    pub fn is_open(&self) -> bool {
        !self.closed.is_cancelled()
    }

    /// RPC version agreed during the handshake.
    pub fn rpc_version(&self) -> u32 {
        self.rpc_version
    }

    /// Send a close frame and stop the background tasks.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    fn forget(&self, request_id: &str) {
        self.pending
            .lock()
            .expect("pending lock poisoned")
            .remove(request_id);
    }
}

impl Drop for ObsSocket {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Handshake helpers ────────────────────────────────────────────────

fn map_connect_error(err: tungstenite::Error) -> Error {
    match err {
        tungstenite::Error::Tls(e) => Error::Tls(e.to_string()),
        tungstenite::Error::Http(response) => {
            Error::WebSocketConnect(format!("HTTP {}", response.status()))
        }
        other => Error::WebSocketConnect(other.to_string()),
    }
}

/// Read frames until one with opcode `expected` arrives, then decode its `d`.
async fn expect_frame<R, T>(read: &mut R, expected: u8) -> Result<T, Error>
where
    R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    T: DeserializeOwned,
{
    loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => {
                let frame: Frame = serde_json::from_str(&text).map_err(|e| Error::Deserialization {
                    message: e.to_string(),
                    body: text.as_str().to_owned(),
                })?;
                if frame.op != expected {
                    return Err(Error::Protocol(format!(
                        "expected op {expected} during handshake, got op {}",
                        frame.op
                    )));
                }
                return serde_json::from_value(frame.d).map_err(|e| Error::Deserialization {
                    message: e.to_string(),
                    body: text.as_str().to_owned(),
                });
            }
            Some(Ok(Message::Close(frame))) => {
                return Err(match frame {
                    Some(cf) => Error::WebSocketClosed {
                        code: u16::from(cf.code),
                        reason: cf.reason.as_str().to_owned(),
                    },
                    None => Error::WebSocketClosed {
                        code: 1005,
                        reason: String::new(),
                    },
                });
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
            None => {
                return Err(Error::WebSocketClosed {
                    code: 1006,
                    reason: "stream ended during handshake".into(),
                });
            }
        }
    }
}

// ── Background tasks ─────────────────────────────────────────────────

async fn write_loop<W>(
    mut write: W,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
    cancel: CancellationToken,
) where
    W: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                break;
            }
            msg = outgoing.recv() => {
                let Some(msg) = msg else { break };
                if let Err(e) = write.send(msg).await {
                    warn!(error = %e, "obs-websocket write failed");
                    break;
                }
            }
        }
    }
    trace!("obs-websocket writer exiting");
}

async fn read_loop<R>(
    mut read: R,
    pending: PendingMap,
    event_tx: broadcast::Sender<Arc<ObsEvent>>,
    cancel: CancellationToken,
    closed: CancellationToken,
) where
    R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => dispatch_frame(&text, &pending, &event_tx),
                    Some(Ok(Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            info!(
                                code = %cf.code,
                                reason = %cf.reason,
                                "obs-websocket closed by instance"
                            );
                        } else {
                            info!("obs-websocket closed by instance");
                        }
                        break;
                    }
                    Some(Ok(_)) => {
                        // Ping/pong is answered by tungstenite; binary frames are unused.
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "obs-websocket read failed");
                        break;
                    }
                    None => {
                        info!("obs-websocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    closed.cancel();
    cancel.cancel();

    let drained: Vec<_> = pending
        .lock()
        .expect("pending lock poisoned")
        .drain()
        .map(|(_, tx)| tx)
        .collect();
    for tx in drained {
        let _ = tx.send(Err(Error::NotConnected));
    }
}

// ── Frame dispatch ───────────────────────────────────────────────────

/// Route one post-handshake frame: responses to their waiter, events to subscribers.
fn dispatch_frame(
    text: &str,
    pending: &PendingMap,
    event_tx: &broadcast::Sender<Arc<ObsEvent>>,
) {
    let frame: Frame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            debug!(error = %e, "unparseable obs-websocket frame");
            return;
        }
    };

    match frame.op {
        op::EVENT => match serde_json::from_value::<ObsEvent>(frame.d) {
            Ok(event) => {
                trace!(event = %event.event_type, "event received");
                // No subscribers is fine.
                let _ = event_tx.send(Arc::new(event));
            }
            Err(e) => debug!(error = %e, "malformed event frame"),
        },
        op::REQUEST_RESPONSE => match serde_json::from_value::<RequestResponse>(frame.d) {
            Ok(response) => resolve(pending, response),
            Err(e) => debug!(error = %e, "malformed request response"),
        },
        other => trace!(op = other, "ignoring frame"),
    }
}

fn resolve(pending: &PendingMap, response: RequestResponse) {
    let waiter = pending
        .lock()
        .expect("pending lock poisoned")
        .remove(&response.request_id);
    let Some(tx) = waiter else {
        debug!(request_id = %response.request_id, "response for unknown request");
        return;
    };

    let result = if response.request_status.result {
        Ok(response.response_data.unwrap_or(Value::Null))
    } else {
        Err(Error::RequestFailed {
            request_type: response.request_type,
            code: response.request_status.code,
            comment: response.request_status.comment.unwrap_or_default(),
        })
    };
    let _ = tx.send(result);
}

// ── Tests ────────────────────────────────────────────────────────────
