#![allow(clippy::unwrap_used)]
// ConnectionRegistry lifecycle against scripted instances.

mod support;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use obsrelay_core::{
    ConnectionRegistry, ConnectionSettings, ConnectionState, EventBroadcaster, InitSummary,
    TenantConnectionConfig, TenantId, TransportAdapter, TransportFactory, TransportMode,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use support::{FakeInstance, ScriptedFactory};

/// Sends each address to its own scripted instance.
struct RoutedFactory {
    routes: Vec<(&'static str, Arc<ScriptedFactory>)>,
}

impl TransportFactory for RoutedFactory {
    fn build(
        &self,
        mode: &TransportMode,
        config: &TenantConnectionConfig,
    ) -> Arc<dyn TransportAdapter> {
        let (_, factory) = self
            .routes
            .iter()
            .find(|(address, _)| *address == config.address)
            .unwrap();
        factory.build(mode, config)
    }
}

fn registry(factory: Arc<dyn TransportFactory>) -> ConnectionRegistry {
    ConnectionRegistry::new(
        factory,
        Arc::new(ConnectionSettings::default()),
        EventBroadcaster::new(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_created_connection_is_connected_without_observers() {
    let instance = FakeInstance::new();
    let registry = registry(ScriptedFactory::direct(Arc::clone(&instance)));
    let tenant = TenantId::from("acme");

    let connection = registry
        .get_or_create(&tenant, TenantConnectionConfig::new("10.0.0.5", 4455))
        .await
        .unwrap();

    assert_eq!(connection.state(), ConnectionState::Connected);
    assert!(registry.get(&tenant).unwrap().is_connected());
    let version = connection.request("GetVersion", json!({})).await.unwrap();
    assert_eq!(version["obsVersion"], "30.2.0");
    assert_eq!(instance.calls_of("GetVersion").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_get_or_create_reuses_the_connection() {
    let instance = FakeInstance::new();
    let registry = registry(ScriptedFactory::direct(Arc::clone(&instance)));
    let tenant = TenantId::from("acme");
    let config = TenantConnectionConfig::new("10.0.0.5", 4455);

    registry.get_or_create(&tenant, config.clone()).await.unwrap();
    let again = registry.get_or_create(&tenant, config).await.unwrap();

    assert!(again.is_connected());
    assert_eq!(registry.len(), 1);
    assert_eq!(instance.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_initialize_all_survives_one_unreachable_tenant() {
    let up = FakeInstance::new();
    let down = FakeInstance::new();
    down.fail_open.store(true, Ordering::SeqCst);
    let registry = registry(Arc::new(RoutedFactory {
        routes: vec![
            ("10.0.0.5", ScriptedFactory::direct(Arc::clone(&up))),
            ("10.0.0.6", ScriptedFactory::direct(Arc::clone(&down))),
        ],
    }));

    let summary = registry
        .initialize_all([
            (TenantId::from("acme"), TenantConnectionConfig::new("10.0.0.5", 4455)),
            (TenantId::from("globex"), TenantConnectionConfig::new("10.0.0.6", 4455)),
            (TenantId::from("initech"), TenantConnectionConfig::default()),
        ])
        .await;

    assert_eq!(
        summary,
        InitSummary {
            connected: 1,
            failed: 1,
            skipped: 1,
        }
    );
    assert_eq!(
        registry.tenants(),
        vec![TenantId::from("acme"), TenantId::from("globex")]
    );
    assert!(registry.get(&"acme".into()).unwrap().is_connected());

    let globex = registry.get(&"globex".into()).unwrap();
    assert_eq!(globex.state(), ConnectionState::Reconnecting { attempt: 1 });
    assert!(globex.has_pending_reconnect());
    assert_eq!(down.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_disconnects_and_evicts_everything() {
    let instance = FakeInstance::new();
    let registry = registry(ScriptedFactory::direct(Arc::clone(&instance)));
    let acme = registry
        .get_or_create(&"acme".into(), TenantConnectionConfig::new("10.0.0.5", 4455))
        .await
        .unwrap();

    registry.shutdown().await;

    assert!(registry.is_empty());
    assert_eq!(acme.state(), ConnectionState::Disconnected);
    assert!(!registry.broadcaster().is_connected(&"acme".into()));
}
