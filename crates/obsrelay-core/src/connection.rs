// ── Per-tenant connection ──
//
// Owns one tenant's transport and its lifecycle:
//
//   Disconnected --connect--> Connecting --ok--> Connected
//   Connected --remote close--> Reconnecting --timer--> Connecting
//   any --disconnect--> Disconnected
//
// At most one transport link is live and at most one reconnect task is
// pending at any time. Every transition that invalidates in-flight work
// bumps `generation`; work that finishes under a stale generation is
// discarded.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use arc_swap::ArcSwap;
use serde_json::Value;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use obsrelay_api::ObsEvent;

use crate::config::{ConnectionSettings, TenantConnectionConfig, TenantId};
use crate::error::{CommandError, ConnectError, CoreError};
use crate::transport::{
    Capabilities, TransportAdapter, TransportFactory, TransportLink, TransportMode,
};

const EVENT_CHANNEL_SIZE: usize = 256;

// ── ConnectionState ──────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
}

/// What a Connection publishes to its subscribers.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// A transport link came up.
    Opened,
    /// The link went away (remote close, failed attempt, or disconnect).
    Closed,
    /// Raw event pushed by the instance.
    Instance(Arc<ObsEvent>),
}

// ── Connection ───────────────────────────────────────────────────

/// One tenant's link to its instance.
///
/// Cheaply cloneable via `Arc<ConnectionInner>`. Background tasks hold
/// only a `Weak` reference, so dropping every clone stops them.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    tenant: TenantId,
    config: ArcSwap<TenantConnectionConfig>,
    settings: Arc<ConnectionSettings>,
    factory: Arc<dyn TransportFactory>,
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<ConnectionEvent>,
    /// The live link. Also serialises link hand-over against disconnect.
    link: Mutex<Option<ActiveLink>>,
    mode: std::sync::Mutex<Option<TransportMode>>,
    reconnect: std::sync::Mutex<Option<PendingReconnect>>,
    generation: AtomicU64,
    reconnect_seq: AtomicU64,
    attempts: AtomicU32,
}

struct ActiveLink {
    adapter: Arc<dyn TransportAdapter>,
    monitor: CancellationToken,
    generation: u64,
}

struct PendingReconnect {
    id: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PendingReconnect {
    fn cancel(self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

impl Connection {
    /// Create a Connection. Does NOT connect; call [`connect()`](Self::connect).
    pub fn new(
        tenant: TenantId,
        config: TenantConnectionConfig,
        settings: Arc<ConnectionSettings>,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            inner: Arc::new(ConnectionInner {
                tenant,
                config: ArcSwap::from_pointee(config),
                settings,
                factory,
                state,
                events,
                link: Mutex::new(None),
                mode: std::sync::Mutex::new(None),
                reconnect: std::sync::Mutex::new(None),
                generation: AtomicU64::new(0),
                reconnect_seq: AtomicU64::new(0),
                attempts: AtomicU32::new(0),
            }),
        }
    }

    pub fn tenant(&self) -> &TenantId {
        &self.inner.tenant
    }

    pub fn config(&self) -> Arc<TenantConnectionConfig> {
        self.inner.config.load_full()
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Link open/close notifications and raw instance events.
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    /// Transport mode of the current (or most recent) link.
    pub fn mode(&self) -> Option<TransportMode> {
        self.inner.mode.lock().expect("mode lock poisoned").clone()
    }

    pub fn has_pending_reconnect(&self) -> bool {
        self.inner
            .reconnect
            .lock()
            .expect("reconnect lock poisoned")
            .is_some()
    }

    /// Capabilities of the live link; empty when not connected.
    pub async fn capabilities(&self) -> Capabilities {
        self.inner
            .link
            .lock()
            .await
            .as_ref()
            .map(|active| active.adapter.capabilities())
            .unwrap_or_default()
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Connect using the current config.
    ///
    /// No-op while already connected or connecting. A config without an
    /// address or port fails immediately and schedules nothing. Any other
    /// failure is returned to the caller and a reconnect is scheduled.
    pub async fn connect(&self) -> Result<(), CoreError> {
        if matches!(
            self.state(),
            ConnectionState::Connected | ConnectionState::Connecting
        ) {
            debug!(tenant = %self.inner.tenant, "connect skipped, already active");
            return Ok(());
        }

        self.inner.config.load().validate()?;

        let Some(generation) = self.claim_connecting(|state| {
            matches!(
                state,
                ConnectionState::Disconnected | ConnectionState::Reconnecting { .. }
            )
        }) else {
            return Ok(());
        };

        self.open_transport(generation).await
    }

    /// Tear down the link, cancel any pending reconnect, and stay down.
    pub async fn disconnect(&self) {
        let previous = {
            let mut previous = ConnectionState::Disconnected;
            self.inner.state.send_modify(|state| {
                previous = *state;
                *state = ConnectionState::Disconnected;
                self.inner.generation.fetch_add(1, Ordering::SeqCst);
            });
            previous
        };

        // Taking the link lock first lets any close handler that already
        // holds it finish scheduling, so the cancel below catches it.
        let had_link = self.teardown_link().await;
        self.cancel_reconnect();
        self.inner.attempts.store(0, Ordering::SeqCst);

        if had_link || previous == ConnectionState::Connected {
            let _ = self.inner.events.send(ConnectionEvent::Closed);
        }
        if previous != ConnectionState::Disconnected {
            info!(tenant = %self.inner.tenant, "disconnected");
        }
    }

    /// Replace the config, rewiring only when the change touches the
    /// current transport's identity.
    pub async fn update_config(&self, config: TenantConnectionConfig) -> Result<(), CoreError> {
        let current = self.inner.config.load_full();
        if *current == config {
            debug!(tenant = %self.inner.tenant, "config unchanged");
            return Ok(());
        }

        let mode = self
            .mode()
            .unwrap_or_else(|| TransportMode::resolve(&current));
        let rewire = mode.requires_rewire(&current, &config);
        self.inner.config.store(Arc::new(config));

        if !rewire {
            debug!(
                tenant = %self.inner.tenant,
                mode = mode.label(),
                "config change keeps transport"
            );
            return Ok(());
        }

        info!(tenant = %self.inner.tenant, "config changed, reconnecting");
        self.disconnect().await;
        self.connect().await
    }

    // ── Calls ────────────────────────────────────────────────────

    /// Read-style call through the live transport.
    pub async fn request(&self, request_type: &str, params: Value) -> Result<Value, CoreError> {
        let adapter = self.live_adapter().await?;
        debug!(tenant = %self.inner.tenant, request_type, "request");
        adapter.request(request_type, params).await
    }

    /// Write-style call through the live transport.
    pub async fn command(&self, request_type: &str, params: Value) -> Result<(), CoreError> {
        let adapter = self.live_adapter().await?;
        debug!(tenant = %self.inner.tenant, request_type, "command");
        adapter.command(request_type, params).await
    }

    async fn live_adapter(&self) -> Result<Arc<dyn TransportAdapter>, CoreError> {
        if !self.is_connected() {
            return Err(CommandError::NotConnected.into());
        }
        self.inner
            .link
            .lock()
            .await
            .as_ref()
            .map(|active| Arc::clone(&active.adapter))
            .ok_or(CoreError::Command(CommandError::NotConnected))
    }

    // ── Internals ────────────────────────────────────────────────

    /// Move to `Connecting` if `from` accepts the current state, bumping the
    /// generation under the same lock. Returns the new generation.
    fn claim_connecting(&self, from: impl Fn(&ConnectionState) -> bool) -> Option<u64> {
        let mut claimed = None;
        self.inner.state.send_if_modified(|state| {
            if !from(state) {
                return false;
            }
            *state = ConnectionState::Connecting;
            claimed = Some(self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1);
            true
        });
        claimed
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.generation.load(Ordering::SeqCst) == generation
    }

    async fn open_transport(&self, generation: u64) -> Result<(), CoreError> {
        self.cancel_reconnect();
        self.teardown_link().await;

        let config = self.inner.config.load_full();
        let mode = TransportMode::resolve(&config);
        *self.inner.mode.lock().expect("mode lock poisoned") = Some(mode.clone());
        info!(tenant = %self.inner.tenant, mode = %mode, "connecting");

        let adapter = self.inner.factory.build(&mode, &config);
        let result = adapter.open().await;

        let mut slot = self.inner.link.lock().await;
        if !self.is_current(generation) {
            drop(slot);
            adapter.close().await;
            debug!(tenant = %self.inner.tenant, "connect attempt superseded");
            return Err(ConnectError::Superseded.into());
        }

        match result {
            Ok(link) => {
                // `send` stores nothing without receivers. A disconnect that
                // bumped the generation since the check above wins.
                let promoted = self.inner.state.send_if_modified(|state| {
                    if !self.is_current(generation) {
                        return false;
                    }
                    *state = ConnectionState::Connected;
                    true
                });
                if !promoted {
                    drop(slot);
                    adapter.close().await;
                    debug!(tenant = %self.inner.tenant, "connect attempt superseded");
                    return Err(ConnectError::Superseded.into());
                }

                let monitor = CancellationToken::new();
                *slot = Some(ActiveLink {
                    adapter,
                    monitor: monitor.clone(),
                    generation,
                });
                self.inner.attempts.store(0, Ordering::SeqCst);
                drop(slot);

                let _ = self.inner.events.send(ConnectionEvent::Opened);
                tokio::spawn(monitor_link(
                    Arc::downgrade(&self.inner),
                    generation,
                    link,
                    monitor,
                ));
                info!(tenant = %self.inner.tenant, mode = %mode, "connected");
                Ok(())
            }
            Err(e) => {
                warn!(tenant = %self.inner.tenant, mode = %mode, error = %e, "connect failed");
                self.enter_reconnecting(generation, &mode);
                drop(slot);
                adapter.close().await;
                Err(e)
            }
        }
    }

    /// Take the live link (if any), stop its monitor, and close it.
    async fn teardown_link(&self) -> bool {
        let active = self.inner.link.lock().await.take();
        match active {
            Some(active) => {
                active.monitor.cancel();
                active.adapter.close().await;
                true
            }
            None => false,
        }
    }

    /// Called with the link lock held. Moves to `Reconnecting` and schedules
    /// the retry, unless a newer transition already happened.
    fn enter_reconnecting(&self, generation: u64, mode: &TransportMode) {
        let attempt = self.inner.attempts.load(Ordering::SeqCst) + 1;
        let entered = self.inner.state.send_if_modified(|state| {
            if !self.is_current(generation) {
                return false;
            }
            *state = ConnectionState::Reconnecting { attempt };
            true
        });
        if !entered {
            return;
        }

        self.inner.attempts.store(attempt, Ordering::SeqCst);
        let _ = self.inner.events.send(ConnectionEvent::Closed);
        self.schedule_reconnect(mode.reconnect_delay(&self.inner.settings), attempt);
    }

    /// Install a reconnect task, replacing (never stacking) any previous one.
    fn schedule_reconnect(&self, delay: Duration, attempt: u32) {
        let id = self.inner.reconnect_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let weak = Arc::downgrade(&self.inner);
        // Fixed from the moment of scheduling, not from first poll.
        let deadline = tokio::time::Instant::now() + delay;

        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                () = task_cancel.cancelled() => {}
                () = tokio::time::sleep_until(deadline) => {
                    if let Some(inner) = weak.upgrade() {
                        Connection { inner }.fire_reconnect(id).await;
                    }
                }
            }
        });

        let previous = self
            .inner
            .reconnect
            .lock()
            .expect("reconnect lock poisoned")
            .replace(PendingReconnect { id, cancel, handle });
        if let Some(previous) = previous {
            previous.cancel();
        }

        info!(
            tenant = %self.inner.tenant,
            attempt,
            delay_secs = delay.as_secs(),
            "reconnect scheduled"
        );
    }

    fn cancel_reconnect(&self) {
        let pending = self
            .inner
            .reconnect
            .lock()
            .expect("reconnect lock poisoned")
            .take();
        if let Some(pending) = pending {
            debug!(tenant = %self.inner.tenant, "pending reconnect cancelled");
            pending.cancel();
        }
    }

    async fn fire_reconnect(&self, id: u64) {
        {
            let mut slot = self.inner.reconnect.lock().expect("reconnect lock poisoned");
            let is_ours = slot.as_ref().is_some_and(|pending| pending.id == id);
            if !is_ours {
                return;
            }
            // Dropping our own JoinHandle detaches; it does not abort us.
            slot.take();
        }

        let claimed = self.claim_connecting(|state| {
            matches!(state, ConnectionState::Reconnecting { .. })
        });
        let Some(generation) = claimed else {
            return;
        };

        if let Err(e) = self.open_transport(generation).await {
            debug!(tenant = %self.inner.tenant, error = %e, "reconnect attempt failed");
        }
    }

    async fn handle_remote_close(&self, generation: u64) {
        let mut slot = self.inner.link.lock().await;
        let owns_link = slot
            .as_ref()
            .is_some_and(|active| active.generation == generation);
        if !owns_link || !self.is_current(generation) {
            return;
        }

        let Some(active) = slot.take() else {
            return;
        };
        let mode = active.adapter.mode().clone();
        warn!(tenant = %self.inner.tenant, mode = %mode, "transport closed");
        self.enter_reconnecting(generation, &mode);
        drop(slot);

        active.adapter.close().await;
    }
}

// ── Link monitor ─────────────────────────────────────────────────

/// Forward instance events until the link closes or we are told to stop.
async fn monitor_link(
    inner: Weak<ConnectionInner>,
    generation: u64,
    link: TransportLink,
    stop: CancellationToken,
) {
    let TransportLink { closed, mut events } = link;

    loop {
        tokio::select! {
            biased;
            () = stop.cancelled() => return,
            () = closed.cancelled() => break,
            event = next_event(&mut events) => {
                let Some(event) = event else { break };
                let Some(inner) = inner.upgrade() else { return };
                let _ = inner.events.send(ConnectionEvent::Instance(event));
            }
        }
    }

    if let Some(inner) = inner.upgrade() {
        Connection { inner }.handle_remote_close(generation).await;
    }
}

async fn next_event(
    events: &mut Option<broadcast::Receiver<Arc<ObsEvent>>>,
) -> Option<Arc<ObsEvent>> {
    let Some(rx) = events.as_mut() else {
        return std::future::pending().await;
    };
    loop {
        match rx.recv().await {
            Ok(event) => return Some(event),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "instance event subscriber lagged");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}
