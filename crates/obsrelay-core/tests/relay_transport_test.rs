#![allow(clippy::unwrap_used)]
// Relay-family transports built by the production factory over a
// recording coordinator.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use obsrelay_core::{
    ConnectError, ConnectionSettings, CoreError, DefaultTransportFactory, RelayCoordinator,
    RelayStats, TenantConnectionConfig, TransportFactory, TransportMode, UnconfiguredRelay,
};

// ── Recording coordinator ───────────────────────────────────────────

#[derive(Default)]
struct RecordingRelay {
    live: bool,
    bridge_fails: bool,
    calls: Mutex<Vec<String>>,
    bridges: Mutex<Vec<(String, String, u16, Option<String>)>>,
}

impl RecordingRelay {
    fn live() -> Arc<Self> {
        Arc::new(Self {
            live: true,
            ..Self::default()
        })
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RelayCoordinator for RecordingRelay {
    async fn is_agent_live(&self, agent_id: &str) -> Result<bool, CoreError> {
        self.record(format!("live:{agent_id}"));
        Ok(self.live)
    }

    async fn forward_request(
        &self,
        agent_id: &str,
        request_type: &str,
        params: &Value,
    ) -> Result<Value, CoreError> {
        self.record(format!("request:{agent_id}:{request_type}"));
        Ok(json!({ "echo": params }))
    }

    async fn forward_command(
        &self,
        agent_id: &str,
        request_type: &str,
        _params: &Value,
    ) -> Result<(), CoreError> {
        self.record(format!("command:{agent_id}:{request_type}"));
        Ok(())
    }

    async fn establish_bridge(
        &self,
        agent_id: &str,
        public_address: &str,
        port: u16,
        password: Option<&SecretString>,
    ) -> Result<(), CoreError> {
        self.bridges.lock().unwrap().push((
            agent_id.into(),
            public_address.into(),
            port,
            password.map(|p| p.expose_secret().to_owned()),
        ));
        if self.bridge_fails {
            return Err(CoreError::Command(obsrelay_core::CommandError::Rejected {
                request_type: "connect".into(),
                message: "agent unreachable".into(),
            }));
        }
        Ok(())
    }

    async fn stats(&self, agent_id: &str) -> Result<Option<RelayStats>, CoreError> {
        self.record(format!("stats:{agent_id}"));
        Ok(Some(RelayStats {
            cpu: 7.5,
            fps: 60.0,
            memory: 256.0,
            dropped_frames: 2,
            total_frames: 1200,
            ..RelayStats::default()
        }))
    }

    async fn preview(&self, agent_id: &str, source: &str) -> Result<Option<String>, CoreError> {
        self.record(format!("preview:{agent_id}:{source}"));
        Ok(Some("data:image/jpeg;base64,AAAA".into()))
    }

    async fn start_stream(&self, agent_id: &str) -> Result<(), CoreError> {
        self.record(format!("start:{agent_id}"));
        Ok(())
    }

    async fn stop_stream(&self, agent_id: &str) -> Result<(), CoreError> {
        self.record(format!("stop:{agent_id}"));
        Ok(())
    }

    async fn set_mute(
        &self,
        agent_id: &str,
        input_name: &str,
        muted: bool,
    ) -> Result<(), CoreError> {
        self.record(format!("mute:{agent_id}:{input_name}:{muted}"));
        Ok(())
    }

    async fn set_scene(&self, agent_id: &str, scene_name: &str) -> Result<(), CoreError> {
        self.record(format!("scene:{agent_id}:{scene_name}"));
        Ok(())
    }
}

fn factory(relay: Arc<dyn RelayCoordinator>) -> DefaultTransportFactory {
    DefaultTransportFactory::new(Arc::new(ConnectionSettings::default()), relay)
}

fn resolve(config: &TenantConnectionConfig) -> TransportMode {
    TransportMode::resolve(config)
}

// ── Relay agent ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_offline_agent_is_relay_unavailable() {
    let relay = Arc::new(RecordingRelay::default());
    let config = TenantConnectionConfig::new("studio-pc", 4455);
    let adapter = factory(relay.clone()).build(&resolve(&config), &config);

    let result = adapter.open().await;

    match result {
        Err(CoreError::RelayUnavailable { agent_id }) => assert_eq!(agent_id, "studio-pc"),
        other => panic!("expected RelayUnavailable, got: {:?}", other.err()),
    }
    assert_eq!(relay.calls(), vec!["live:studio-pc"]);
}

#[tokio::test]
async fn test_relay_link_has_no_events_or_fallback() {
    let relay = RecordingRelay::live();
    let config = TenantConnectionConfig::new("studio-pc", 4455);
    let adapter = factory(relay).build(&resolve(&config), &config);

    let link = adapter.open().await.unwrap();

    assert!(link.events.is_none());
    assert!(!link.closed.is_cancelled());
    assert!(!adapter.capabilities().push_events);
    assert!(!adapter.capabilities().scene_item_fallback);

    adapter.close().await;
    assert!(link.closed.is_cancelled());
}

#[tokio::test]
async fn test_dedicated_endpoints_are_intercepted() {
    let relay = RecordingRelay::live();
    let config = TenantConnectionConfig::new("studio-pc", 4455);
    let adapter = factory(relay.clone()).build(&resolve(&config), &config);
    adapter.open().await.unwrap();

    let stats = adapter.request("GetStats", json!({})).await.unwrap();
    let preview = adapter
        .request("GetSourceScreenshot", json!({ "sourceName": "SRT Camera" }))
        .await
        .unwrap();
    adapter.command("StartStream", json!({})).await.unwrap();
    adapter.command("StopStream", json!({})).await.unwrap();
    adapter
        .command("SetInputMute", json!({ "inputName": "SRT Camera", "inputMuted": true }))
        .await
        .unwrap();
    adapter
        .command("SetCurrentProgramScene", json!({ "sceneName": "BRB" }))
        .await
        .unwrap();

    assert_eq!(stats["cpuUsage"], 7.5);
    assert_eq!(stats["activeFps"], 60.0);
    assert_eq!(stats["memoryUsage"], 256.0);
    assert_eq!(stats["outputSkippedFrames"], 2);
    assert_eq!(stats["outputTotalFrames"], 1200);
    assert_eq!(preview["imageData"], "data:image/jpeg;base64,AAAA");
    assert_eq!(
        relay.calls()[1..],
        [
            "stats:studio-pc",
            "preview:studio-pc:SRT Camera",
            "start:studio-pc",
            "stop:studio-pc",
            "mute:studio-pc:SRT Camera:true",
            "scene:studio-pc:BRB",
        ]
    );
}

#[tokio::test]
async fn test_other_calls_are_forwarded_verbatim() {
    let relay = RecordingRelay::live();
    let config = TenantConnectionConfig::new("studio-pc", 4455);
    let adapter = factory(relay.clone()).build(&resolve(&config), &config);
    adapter.open().await.unwrap();

    let response = adapter
        .request("GetSceneList", json!({ "x": 1 }))
        .await
        .unwrap();
    adapter
        .command("SetInputMute", json!({ "inputUuid": "abc", "inputMuted": true }))
        .await
        .unwrap();

    assert_eq!(response["echo"]["x"], 1);
    assert_eq!(
        relay.calls()[1..],
        [
            "request:studio-pc:GetSceneList",
            "command:studio-pc:SetInputMute",
        ]
    );
}

// ── Cloud magic ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_cloud_magic_requests_bridge_with_credentials() {
    let relay = RecordingRelay::live();
    let config = TenantConnectionConfig::new("abc123@203.0.113.7", 4460).with_password("pw");
    let adapter = factory(relay.clone()).build(&resolve(&config), &config);

    adapter.open().await.unwrap();
    adapter.command("StartStream", json!({})).await.unwrap();

    let bridges = relay.bridges.lock().unwrap().clone();
    assert_eq!(
        bridges,
        vec![(
            "abc123".to_owned(),
            "203.0.113.7".to_owned(),
            4460,
            Some("pw".to_owned())
        )]
    );
    assert_eq!(relay.calls(), vec!["start:abc123"]);
}

#[tokio::test]
async fn test_cloud_magic_bridge_failure_is_connect_error() {
    let relay = Arc::new(RecordingRelay {
        live: true,
        bridge_fails: true,
        ..RecordingRelay::default()
    });
    let config = TenantConnectionConfig::new("abc123@203.0.113.7", 4455);
    let adapter = factory(relay).build(&resolve(&config), &config);

    let result = adapter.open().await;

    match result {
        Err(CoreError::Connect(ConnectError::Failed { url, reason })) => {
            assert_eq!(url, "abc123@203.0.113.7:4455");
            assert!(reason.contains("agent unreachable"));
        }
        other => panic!("expected connect failure, got: {:?}", other.err()),
    }
}

// ── No coordinator ──────────────────────────────────────────────────

#[tokio::test]
async fn test_unconfigured_relay_is_config_error() {
    let config = TenantConnectionConfig::new("studio-pc", 4455);
    let adapter = factory(Arc::new(UnconfiguredRelay)).build(&resolve(&config), &config);

    let result = adapter.open().await;

    assert!(matches!(result, Err(CoreError::Config { .. })));
}
