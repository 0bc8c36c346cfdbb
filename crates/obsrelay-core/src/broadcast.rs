// ── Tenant event channels ──
//
// Each tenant gets one pub/sub channel. A forwarder task per Connection
// turns link open/close into status messages and republishes the
// allow-listed instance events, tagged with the tenant.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_core::Stream;
use futures_util::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::TenantId;
use crate::connection::{Connection, ConnectionEvent};

const CHANNEL_SIZE: usize = 128;

// ── Message types ────────────────────────────────────────────────

/// Instance events dashboards care about. Everything else is dropped.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
    strum::EnumIter,
)]
pub enum ForwardedEvent {
    StreamStateChanged,
    RecordStateChanged,
    ReplayBufferStateChanged,
    SceneItemEnableStateChanged,
    CurrentProgramSceneChanged,
}

impl ForwardedEvent {
    /// Look up an instance event name in the allow-list.
    pub fn from_name(name: &str) -> Option<Self> {
        name.parse().ok()
    }
}

/// One message on a tenant channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ChannelMessage {
    /// Link state, so late subscribers learn it without polling.
    #[serde(rename = "obs_status")]
    Status {
        tenant: TenantId,
        connected: bool,
        at: DateTime<Utc>,
    },
    /// An allow-listed instance event, payload verbatim.
    #[serde(rename = "obs_event")]
    Event {
        tenant: TenantId,
        event: ForwardedEvent,
        data: Value,
        at: DateTime<Utc>,
    },
}

impl ChannelMessage {
    pub fn tenant(&self) -> &TenantId {
        match self {
            Self::Status { tenant, .. } | Self::Event { tenant, .. } => tenant,
        }
    }
}

// ── EventBroadcaster ─────────────────────────────────────────────

/// Fan-out hub for every tenant channel. Cheap to clone.
#[derive(Clone, Default)]
pub struct EventBroadcaster {
    inner: Arc<BroadcasterInner>,
}

#[derive(Default)]
struct BroadcasterInner {
    channels: DashMap<TenantId, broadcast::Sender<Arc<ChannelMessage>>>,
    status: DashMap<TenantId, bool>,
    forwarders: DashMap<TenantId, CancellationToken>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start republishing `connection`'s events, replacing any forwarder
    /// already attached for the same tenant.
    pub fn attach(&self, connection: &Connection) {
        let tenant = connection.tenant().clone();
        let cancel = CancellationToken::new();
        if let Some(previous) = self.inner.forwarders.insert(tenant.clone(), cancel.clone()) {
            previous.cancel();
        }
        self.inner
            .status
            .insert(tenant.clone(), connection.is_connected());

        let events = connection.events();
        tokio::spawn(forward(self.clone(), tenant.clone(), events, cancel));
        debug!(tenant = %tenant, "broadcaster attached");
    }

    /// Stop forwarding for `tenant` and drop its channel.
    ///
    /// Subscribers get a final `connected: false` if the last status was
    /// up, then their stream ends. Later subscribers start from a fresh
    /// channel that reports the tenant as down.
    pub fn detach(&self, tenant: &TenantId) {
        if let Some((_, cancel)) = self.inner.forwarders.remove(tenant) {
            cancel.cancel();
        }
        if self.is_connected(tenant) {
            self.publish_status(tenant, false);
        }
        self.inner.status.remove(tenant);
        self.inner.channels.remove(tenant);
        debug!(tenant = %tenant, "broadcaster detached");
    }

    /// Subscribe to a tenant's channel, with the last known link state.
    pub fn subscribe(&self, tenant: &TenantId) -> TenantSubscription {
        let rx = self.sender(tenant).subscribe();
        TenantSubscription {
            tenant: tenant.clone(),
            connected: self.is_connected(tenant),
            rx,
        }
    }

    /// Last status published for `tenant` (false if never seen).
    pub fn is_connected(&self, tenant: &TenantId) -> bool {
        self.inner.status.get(tenant).is_some_and(|s| *s)
    }

    pub fn publish_status(&self, tenant: &TenantId, connected: bool) {
        self.inner.status.insert(tenant.clone(), connected);
        self.publish(ChannelMessage::Status {
            tenant: tenant.clone(),
            connected,
            at: Utc::now(),
        });
    }

    pub fn publish_event(&self, tenant: &TenantId, event: ForwardedEvent, data: Value) {
        self.publish(ChannelMessage::Event {
            tenant: tenant.clone(),
            event,
            data,
            at: Utc::now(),
        });
    }

    fn publish(&self, message: ChannelMessage) {
        let tx = self.sender(message.tenant());
        // No subscribers is fine.
        let _ = tx.send(Arc::new(message));
    }

    fn sender(&self, tenant: &TenantId) -> broadcast::Sender<Arc<ChannelMessage>> {
        self.inner
            .channels
            .entry(tenant.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_SIZE).0)
            .clone()
    }
}

async fn forward(
    hub: EventBroadcaster,
    tenant: TenantId,
    mut events: broadcast::Receiver<ConnectionEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => event,
        };

        match event {
            Ok(ConnectionEvent::Opened) => hub.publish_status(&tenant, true),
            Ok(ConnectionEvent::Closed) => hub.publish_status(&tenant, false),
            Ok(ConnectionEvent::Instance(raw)) => match ForwardedEvent::from_name(&raw.event_type) {
                Some(kind) => hub.publish_event(&tenant, kind, raw.event_data.clone()),
                None => trace!(tenant = %tenant, event = %raw.event_type, "event not forwarded"),
            },
            Err(RecvError::Lagged(skipped)) => {
                warn!(tenant = %tenant, skipped, "broadcaster lagged behind connection");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

// ── Subscription ─────────────────────────────────────────────────

/// A dashboard session's view of one tenant channel.
pub struct TenantSubscription {
    tenant: TenantId,
    connected: bool,
    rx: broadcast::Receiver<Arc<ChannelMessage>>,
}

impl TenantSubscription {
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Link state at the moment of subscribing.
    pub fn initial_status(&self) -> ChannelMessage {
        ChannelMessage::Status {
            tenant: self.tenant.clone(),
            connected: self.connected,
            at: Utc::now(),
        }
    }

    /// Next message, skipping over any we lagged past. `None` once the
    /// channel is gone.
    pub async fn recv(&mut self) -> Option<Arc<ChannelMessage>> {
        loop {
            match self.rx.recv().await {
                Ok(message) => return Some(message),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(tenant = %self.tenant, skipped, "subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Arc<ChannelMessage>> + Send + 'static {
        BroadcastStream::new(self.rx).filter_map(|message| async move { message.ok() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strum::IntoEnumIterator;

    #[test]
    fn allow_list_matches_event_names_exactly() {
        for kind in ForwardedEvent::iter() {
            assert_eq!(ForwardedEvent::from_name(kind.as_ref()), Some(kind));
        }
        assert_eq!(ForwardedEvent::from_name("InputVolumeMeters"), None);
        assert_eq!(ForwardedEvent::from_name("streamstatechanged"), None);
    }

    #[test]
    fn messages_serialize_with_type_tag() {
        let at = DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_default();

        let status = ChannelMessage::Status {
            tenant: "acme".into(),
            connected: true,
            at,
        };
        let value = serde_json::to_value(&status).unwrap_or_default();
        assert_eq!(value["type"], "obs_status");
        assert_eq!(value["tenant"], "acme");
        assert_eq!(value["connected"], true);

        let event = ChannelMessage::Event {
            tenant: "acme".into(),
            event: ForwardedEvent::CurrentProgramSceneChanged,
            data: json!({ "sceneName": "BRB" }),
            at,
        };
        let value = serde_json::to_value(&event).unwrap_or_default();
        assert_eq!(value["type"], "obs_event");
        assert_eq!(value["event"], "CurrentProgramSceneChanged");
        assert_eq!(value["data"]["sceneName"], "BRB");
    }

    #[tokio::test]
    async fn subscribers_see_published_status() {
        let hub = EventBroadcaster::new();
        let tenant = TenantId::from("acme");
        let mut sub = hub.subscribe(&tenant);

        hub.publish_status(&tenant, true);

        let message = sub.recv().await;
        assert!(matches!(
            message.as_deref(),
            Some(ChannelMessage::Status { connected: true, .. })
        ));
        assert!(hub.is_connected(&tenant));

        let late = hub.subscribe(&tenant);
        assert!(matches!(
            late.initial_status(),
            ChannelMessage::Status { connected: true, .. }
        ));
    }

    #[tokio::test]
    async fn detach_closes_with_final_status_and_forgets_tenant() {
        let hub = EventBroadcaster::new();
        let tenant = TenantId::from("acme");
        hub.publish_status(&tenant, true);
        let mut sub = hub.subscribe(&tenant);

        hub.detach(&tenant);

        assert!(matches!(
            sub.recv().await.as_deref(),
            Some(ChannelMessage::Status { connected: false, .. })
        ));
        assert!(sub.recv().await.is_none());
        assert!(hub.inner.channels.is_empty());
        assert!(hub.inner.status.is_empty());
        assert!(!hub.is_connected(&tenant));
    }

    #[tokio::test]
    async fn detach_of_down_tenant_publishes_nothing() {
        let hub = EventBroadcaster::new();
        let tenant = TenantId::from("acme");
        let mut sub = hub.subscribe(&tenant);

        hub.detach(&tenant);

        assert!(sub.recv().await.is_none());
    }
}
