#![allow(clippy::unwrap_used)]
// Tenant channel fan-out driven by real Connections.

mod support;

use std::sync::Arc;
use std::time::Duration;

use obsrelay_core::{
    ChannelMessage, ConnectionRegistry, ConnectionSettings, EventBroadcaster, ForwardedEvent,
    TenantConnectionConfig, TenantId, TenantSubscription,
};
use serde_json::json;
use support::{FakeInstance, ScriptedFactory};

fn setup() -> (Arc<FakeInstance>, ConnectionRegistry) {
    let instance = FakeInstance::new();
    let registry = ConnectionRegistry::new(
        ScriptedFactory::direct(Arc::clone(&instance)),
        Arc::new(ConnectionSettings::default()),
        EventBroadcaster::new(),
    );
    (instance, registry)
}

async fn next(sub: &mut TenantSubscription) -> Arc<ChannelMessage> {
    tokio::time::timeout(Duration::from_millis(200), sub.recv())
        .await
        .expect("timed out waiting for channel message")
        .expect("channel closed")
}

#[tokio::test(start_paused = true)]
async fn test_connect_publishes_status() {
    let (_instance, registry) = setup();
    let tenant = TenantId::from("acme");
    let mut sub = registry.broadcaster().subscribe(&tenant);
    assert!(matches!(
        sub.initial_status(),
        ChannelMessage::Status { connected: false, .. }
    ));

    registry
        .get_or_create(&tenant, TenantConnectionConfig::new("10.0.0.5", 4455))
        .await
        .unwrap();

    let message = next(&mut sub).await;
    assert!(matches!(
        &*message,
        ChannelMessage::Status { connected: true, tenant: t, .. } if t.as_str() == "acme"
    ));
    assert!(registry.broadcaster().is_connected(&tenant));
}

#[tokio::test(start_paused = true)]
async fn test_only_allow_listed_events_are_forwarded() {
    let (instance, registry) = setup();
    let tenant = TenantId::from("acme");
    registry
        .get_or_create(&tenant, TenantConnectionConfig::new("10.0.0.5", 4455))
        .await
        .unwrap();
    support::settle().await;
    let mut sub = registry.broadcaster().subscribe(&tenant);

    instance.emit("InputVolumeMeters", json!({ "inputs": [] }));
    instance.emit("CurrentProgramSceneChanged", json!({ "sceneName": "BRB" }));

    let message = next(&mut sub).await;
    match &*message {
        ChannelMessage::Event { event, data, .. } => {
            assert_eq!(*event, ForwardedEvent::CurrentProgramSceneChanged);
            assert_eq!(data["sceneName"], "BRB");
        }
        other => panic!("expected event, got: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_remote_close_publishes_disconnected() {
    let (instance, registry) = setup();
    let tenant = TenantId::from("acme");
    registry
        .get_or_create(&tenant, TenantConnectionConfig::new("10.0.0.5", 4455))
        .await
        .unwrap();
    support::settle().await;
    let mut sub = registry.broadcaster().subscribe(&tenant);
    assert!(matches!(
        sub.initial_status(),
        ChannelMessage::Status { connected: true, .. }
    ));

    instance.drop_links();

    let message = next(&mut sub).await;
    assert!(matches!(
        &*message,
        ChannelMessage::Status { connected: false, .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_channels_are_isolated_per_tenant() {
    let (_instance, registry) = setup();
    let acme = TenantId::from("acme");
    let other = TenantId::from("globex");
    let mut other_sub = registry.broadcaster().subscribe(&other);

    registry
        .get_or_create(&acme, TenantConnectionConfig::new("10.0.0.5", 4455))
        .await
        .unwrap();
    support::settle().await;

    let received = tokio::time::timeout(Duration::from_millis(50), other_sub.recv()).await;
    assert!(received.is_err(), "other tenant received: {received:?}");
}

#[tokio::test(start_paused = true)]
async fn test_removed_tenant_reports_down_then_stops_forwarding() {
    let (instance, registry) = setup();
    let tenant = TenantId::from("acme");
    registry
        .get_or_create(&tenant, TenantConnectionConfig::new("10.0.0.5", 4455))
        .await
        .unwrap();
    support::settle().await;
    let mut sub = registry.broadcaster().subscribe(&tenant);
    assert!(registry.broadcaster().is_connected(&tenant));

    assert!(registry.remove(&tenant).await);

    let last = next(&mut sub).await;
    assert!(matches!(
        &*last,
        ChannelMessage::Status { connected: false, .. }
    ));

    instance.emit("StreamStateChanged", json!({ "outputActive": true }));
    support::settle().await;
    let received = tokio::time::timeout(Duration::from_millis(50), sub.recv()).await;
    assert!(
        matches!(received, Ok(None)),
        "received after removal: {received:?}"
    );

    assert!(registry.is_empty());
    assert!(!registry.broadcaster().is_connected(&tenant));
    let late = registry.broadcaster().subscribe(&tenant);
    assert!(matches!(
        late.initial_status(),
        ChannelMessage::Status { connected: false, .. }
    ));
}
