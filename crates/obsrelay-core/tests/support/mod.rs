// Scripted in-memory instance and transport for core integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use obsrelay_api::ObsEvent;
use obsrelay_core::{
    Capabilities, CommandError, ConnectError, ConnectionState, CoreError, TenantConnectionConfig,
    TransportAdapter, TransportFactory, TransportLink, TransportMode,
};

// ── Fake instance ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FakeInput {
    pub name: String,
    pub muted: bool,
    pub volume_mul: f64,
}

#[derive(Debug, Clone)]
pub struct FakeItem {
    pub scene: String,
    pub id: i64,
    pub source: String,
    pub enabled: bool,
}

#[derive(Debug, Default)]
struct InstanceState {
    /// Bottom-up, the way the instance lists them.
    scenes: Vec<String>,
    program: String,
    items: Vec<FakeItem>,
    inputs: Vec<FakeInput>,
    /// Listed by `GetInputList` but unknown to every other input call.
    phantom_inputs: Vec<String>,
    outputs: Vec<String>,
    broken_outputs: HashSet<String>,
    rejected: HashSet<String>,
    timed_out: HashSet<String>,
    streaming: bool,
    output_bytes: u64,
    calls: Vec<(String, Value)>,
    links: Vec<CancellationToken>,
}

/// State of one remote instance, shared by every adapter built for it.
pub struct FakeInstance {
    state: Mutex<InstanceState>,
    events: broadcast::Sender<Arc<ObsEvent>>,
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub fail_open: AtomicBool,
    pub open_delay: Mutex<Option<Duration>>,
}

impl FakeInstance {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            state: Mutex::new(InstanceState {
                scenes: vec!["BRB".into(), "Live".into(), "Intro".into()],
                program: "Live".into(),
                ..InstanceState::default()
            }),
            events,
            opens: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            fail_open: AtomicBool::new(false),
            open_delay: Mutex::new(None),
        })
    }

    // ── Scripting ───────────────────────────────────────────────────

    pub fn add_input(&self, name: &str, muted: bool, volume_mul: f64) {
        self.state.lock().unwrap().inputs.push(FakeInput {
            name: name.into(),
            muted,
            volume_mul,
        });
    }

    pub fn add_phantom_input(&self, name: &str) {
        self.state.lock().unwrap().phantom_inputs.push(name.into());
    }

    pub fn add_item(&self, scene: &str, id: i64, source: &str) {
        self.state.lock().unwrap().items.push(FakeItem {
            scene: scene.into(),
            id,
            source: source.into(),
            enabled: true,
        });
    }

    pub fn add_output(&self, name: &str, broken: bool) {
        let mut state = self.state.lock().unwrap();
        state.outputs.push(name.into());
        if broken {
            state.broken_outputs.insert(name.into());
        }
    }

    pub fn reject(&self, request_type: &str) {
        self.state.lock().unwrap().rejected.insert(request_type.into());
    }

    /// Make `request_type` fail as if the instance never answered.
    pub fn time_out(&self, request_type: &str) {
        self.state.lock().unwrap().timed_out.insert(request_type.into());
    }

    pub fn set_streaming(&self, streaming: bool, output_bytes: u64) {
        let mut state = self.state.lock().unwrap();
        state.streaming = streaming;
        state.output_bytes = output_bytes;
    }

    pub fn set_open_delay(&self, delay: Duration) {
        *self.open_delay.lock().unwrap() = Some(delay);
    }

    /// Push an instance event to every live link.
    pub fn emit(&self, event_type: &str, data: Value) {
        let _ = self.events.send(Arc::new(ObsEvent {
            event_type: event_type.into(),
            event_intent: 0,
            event_data: data,
        }));
    }

    /// Simulate the instance going away.
    pub fn drop_links(&self) {
        for link in self.state.lock().unwrap().links.drain(..) {
            link.cancel();
        }
    }

    // ── Inspection ──────────────────────────────────────────────────

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_of(&self, request_type: &str) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter(|(t, _)| t == request_type)
            .map(|(_, p)| p)
            .collect()
    }

    pub fn item(&self, scene: &str, source: &str) -> Option<FakeItem> {
        self.state
            .lock()
            .unwrap()
            .items
            .iter()
            .find(|i| i.scene == scene && i.source == source)
            .cloned()
    }

    pub fn input(&self, name: &str) -> Option<FakeInput> {
        self.state
            .lock()
            .unwrap()
            .inputs
            .iter()
            .find(|i| i.name == name)
            .cloned()
    }

    // ── Request handling ────────────────────────────────────────────

    fn handle(&self, request_type: &str, params: &Value) -> Result<Value, CoreError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push((request_type.into(), params.clone()));

        if state.rejected.contains(request_type) {
            return Err(rejected(request_type, "scripted rejection"));
        }
        if state.timed_out.contains(request_type) {
            return Err(CommandError::TimedOut { timeout_secs: 30 }.into());
        }

        let input_name = params["inputName"].as_str().unwrap_or_default().to_owned();
        let response = match request_type {
            "GetVersion" => json!({ "obsVersion": "30.2.0" }),
            "GetSceneList" => json!({
                "currentProgramSceneName": state.program,
                "scenes": state.scenes.iter().map(|s| json!({ "sceneName": s })).collect::<Vec<_>>(),
            }),
            "GetCurrentProgramScene" => json!({ "currentProgramSceneName": state.program }),
            "SetCurrentProgramScene" => {
                state.program = params["sceneName"].as_str().unwrap_or_default().into();
                Value::Null
            }
            "GetSceneItemList" => {
                let scene = params["sceneName"].as_str().unwrap_or_default();
                let items: Vec<Value> = state
                    .items
                    .iter()
                    .filter(|i| i.scene == scene)
                    .map(|i| {
                        json!({
                            "sceneItemId": i.id,
                            "sourceName": i.source,
                            "sceneItemEnabled": i.enabled,
                        })
                    })
                    .collect();
                json!({ "sceneItems": items })
            }
            "SetSceneItemEnabled" => {
                let scene = params["sceneName"].as_str().unwrap_or_default().to_owned();
                let id = params["sceneItemId"].as_i64().unwrap_or_default();
                let enabled = params["sceneItemEnabled"].as_bool().unwrap_or_default();
                let item = state
                    .items
                    .iter_mut()
                    .find(|i| i.scene == scene && i.id == id)
                    .ok_or_else(|| rejected(request_type, "no such scene item"))?;
                item.enabled = enabled;
                Value::Null
            }
            "GetInputList" => {
                let mut inputs: Vec<Value> = state
                    .inputs
                    .iter()
                    .map(|i| json!({ "inputName": i.name }))
                    .collect();
                inputs.extend(state.phantom_inputs.iter().map(|n| json!({ "inputName": n })));
                json!({ "inputs": inputs })
            }
            "GetInputMute" | "GetInputVolume" | "SetInputMute" | "SetInputVolume" => {
                let input = state
                    .inputs
                    .iter_mut()
                    .find(|i| i.name == input_name)
                    .ok_or_else(|| rejected(request_type, "no source was found"))?;
                match request_type {
                    "GetInputMute" => json!({ "inputMuted": input.muted }),
                    "GetInputVolume" => json!({ "inputVolumeMul": input.volume_mul }),
                    "SetInputMute" => {
                        input.muted = params["inputMuted"].as_bool().unwrap_or_default();
                        Value::Null
                    }
                    _ => {
                        input.volume_mul = params["inputVolumeMul"].as_f64().unwrap_or_default();
                        Value::Null
                    }
                }
            }
            "GetOutputList" => json!({
                "outputs": state.outputs.iter().map(|o| json!({ "outputName": o })).collect::<Vec<_>>(),
            }),
            "SetOutputSettings" => {
                let output = params["outputName"].as_str().unwrap_or_default();
                if state.broken_outputs.contains(output) {
                    return Err(rejected(request_type, "output is busy"));
                }
                Value::Null
            }
            "GetStats" => json!({
                "cpuUsage": 12.5,
                "activeFps": 30.0,
                "memoryUsage": 512.0,
                "outputSkippedFrames": 3,
                "outputTotalFrames": 900,
                "availableDiskSpace": 20480.0,
            }),
            "GetStreamStatus" => json!({
                "outputActive": state.streaming,
                "outputReconnecting": false,
                "outputTimecode": if state.streaming { "00:01:30.000" } else { "00:00:00.000" },
                "outputBytes": state.output_bytes,
            }),
            _ => Value::Null,
        };
        Ok(response)
    }
}

fn rejected(request_type: &str, message: &str) -> CoreError {
    CoreError::Command(CommandError::Rejected {
        request_type: request_type.into(),
        message: message.into(),
    })
}

// ── Scripted transport ──────────────────────────────────────────────

pub struct ScriptedTransport {
    mode: TransportMode,
    capabilities: Capabilities,
    instance: Arc<FakeInstance>,
    closed: CancellationToken,
    open: AtomicBool,
}

#[async_trait]
impl TransportAdapter for ScriptedTransport {
    fn mode(&self) -> &TransportMode {
        &self.mode
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn open(&self) -> Result<TransportLink, CoreError> {
        self.instance.opens.fetch_add(1, Ordering::SeqCst);
        let delay = *self.instance.open_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.instance.fail_open.load(Ordering::SeqCst) {
            return Err(ConnectError::Failed {
                url: self.mode.to_string(),
                reason: "connection refused".into(),
            }
            .into());
        }

        self.open.store(true, Ordering::SeqCst);
        self.instance
            .state
            .lock()
            .unwrap()
            .links
            .push(self.closed.clone());
        Ok(TransportLink {
            closed: self.closed.clone(),
            events: self
                .capabilities
                .push_events
                .then(|| self.instance.events.subscribe()),
        })
    }

    async fn request(&self, request_type: &str, params: Value) -> Result<Value, CoreError> {
        if !self.open.load(Ordering::SeqCst) || self.closed.is_cancelled() {
            return Err(CommandError::NotConnected.into());
        }
        self.instance.handle(request_type, &params)
    }

    async fn command(&self, request_type: &str, params: Value) -> Result<(), CoreError> {
        self.request(request_type, params).await.map(|_| ())
    }

    async fn close(&self) {
        self.instance.closes.fetch_add(1, Ordering::SeqCst);
        self.open.store(false, Ordering::SeqCst);
        self.closed.cancel();
    }
}

/// Builds scripted transports for one shared instance.
pub struct ScriptedFactory {
    pub instance: Arc<FakeInstance>,
    pub capabilities: Capabilities,
    pub built: AtomicUsize,
}

impl ScriptedFactory {
    /// Behaves like a direct socket: pushes events, allows the restart fallback.
    pub fn direct(instance: Arc<FakeInstance>) -> Arc<Self> {
        Self::with_capabilities(
            instance,
            Capabilities {
                push_events: true,
                scene_item_fallback: true,
            },
        )
    }

    /// Behaves like a relay: no events, no restart fallback.
    pub fn relay(instance: Arc<FakeInstance>) -> Arc<Self> {
        Self::with_capabilities(instance, Capabilities::default())
    }

    fn with_capabilities(instance: Arc<FakeInstance>, capabilities: Capabilities) -> Arc<Self> {
        Arc::new(Self {
            instance,
            capabilities,
            built: AtomicUsize::new(0),
        })
    }
}

impl TransportFactory for ScriptedFactory {
    fn build(
        &self,
        mode: &TransportMode,
        _config: &TenantConnectionConfig,
    ) -> Arc<dyn TransportAdapter> {
        self.built.fetch_add(1, Ordering::SeqCst);
        Arc::new(ScriptedTransport {
            mode: mode.clone(),
            capabilities: self.capabilities,
            instance: Arc::clone(&self.instance),
            closed: CancellationToken::new(),
            open: AtomicBool::new(false),
        })
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Let spawned tasks run without advancing the clock.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Wait (bounded) until the connection reaches a state matching `pred`.
pub async fn wait_for_state(
    connection: &obsrelay_core::Connection,
    pred: impl FnMut(&ConnectionState) -> bool,
) -> ConnectionState {
    let mut rx = connection.subscribe_state();
    let state = tokio::time::timeout(Duration::from_millis(500), rx.wait_for(pred))
        .await
        .expect("timed out waiting for state")
        .expect("state channel closed");
    *state
}
