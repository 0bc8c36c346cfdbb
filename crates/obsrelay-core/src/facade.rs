// ── Command facade ──
//
// Domain operations for the dashboard, built from one or more transport
// calls. Reads never fail: they log and fall back to an empty value so
// polling survives a flapping instance. Writes return typed errors.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::join_all;
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::TenantId;
use crate::connection::Connection;
use crate::convert;
use crate::error::{CommandError, CoreError};
use crate::model::{
    AudioSource, ProfileList, ProgramState, Scene, SceneItem, StreamState, StreamStats,
    Transition, volume_multiplier, volume_percent,
};
use crate::registry::ConnectionRegistry;

/// Pause between hiding and re-showing a scene item when a media restart
/// has to be emulated.
pub const RESTART_TOGGLE_DELAY: Duration = Duration::from_millis(500);

const SCREENSHOT_WIDTH: u32 = 480;
const SCREENSHOT_QUALITY: u32 = 30;

/// Previous `outputBytes` reading, for bitrate deltas.
#[derive(Debug, Clone, Copy)]
struct ByteSample {
    bytes: u64,
    at: Instant,
}

pub struct CommandFacade {
    registry: Arc<ConnectionRegistry>,
    samples: DashMap<TenantId, ByteSample>,
}

/// Log a failed read and substitute the empty value.
fn or_default<T: Default>(tenant: &TenantId, operation: &str, result: Result<T, CoreError>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            warn!(tenant = %tenant, operation, error = %e, "read failed, returning empty result");
            T::default()
        }
    }
}

impl CommandFacade {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            samples: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    fn connection(&self, tenant: &TenantId) -> Result<Connection, CoreError> {
        self.registry
            .get(tenant)
            .ok_or(CoreError::Command(CommandError::NotConnected))
    }

    async fn request(
        &self,
        tenant: &TenantId,
        request_type: &str,
        params: Value,
    ) -> Result<Value, CoreError> {
        self.connection(tenant)?.request(request_type, params).await
    }

    async fn command(
        &self,
        tenant: &TenantId,
        request_type: &str,
        params: Value,
    ) -> Result<(), CoreError> {
        self.connection(tenant)?.command(request_type, params).await
    }

    // ── Reads ────────────────────────────────────────────────────

    /// Scenes top-down, with the program scene flagged.
    pub async fn get_scenes(&self, tenant: &TenantId) -> Vec<Scene> {
        let result = self.request(tenant, "GetSceneList", json!({})).await;
        or_default(tenant, "scenes", result.map(|r| convert::scenes(&r)))
    }

    pub async fn get_scene_items(&self, tenant: &TenantId, scene: &str) -> Vec<SceneItem> {
        let result = self
            .request(tenant, "GetSceneItemList", json!({ "sceneName": scene }))
            .await;
        or_default(tenant, "scene items", result.map(|r| convert::scene_items(&r)))
    }

    pub async fn get_transitions(&self, tenant: &TenantId) -> Vec<Transition> {
        let result = self.request(tenant, "GetSceneTransitionList", json!({})).await;
        or_default(tenant, "transitions", result.map(|r| convert::transitions(&r)))
    }

    pub async fn get_profiles(&self, tenant: &TenantId) -> ProfileList {
        let result = self.request(tenant, "GetProfileList", json!({})).await;
        or_default(tenant, "profiles", result.map(|r| convert::profiles(&r)))
    }

    /// Ingest inputs with their mute state and volume.
    ///
    /// Every input is fetched concurrently, mute and volume in parallel per
    /// input. An input whose fetch fails is left out.
    pub async fn get_audio_sources(&self, tenant: &TenantId) -> Vec<AudioSource> {
        let result = self.try_audio_sources(tenant).await;
        or_default(tenant, "audio sources", result)
    }

    async fn try_audio_sources(&self, tenant: &TenantId) -> Result<Vec<AudioSource>, CoreError> {
        let connection = self.connection(tenant)?;
        let inputs = connection.request("GetInputList", json!({})).await?;

        let fetches = convert::ingest_inputs(&inputs).into_iter().map(|(id, name)| {
            let connection = connection.clone();
            async move {
                let params = json!({ "inputName": name });
                let (mute, volume) = tokio::join!(
                    connection.request("GetInputMute", params.clone()),
                    connection.request("GetInputVolume", params),
                );
                match (mute, volume) {
                    (Ok(mute), Ok(volume)) => Some(AudioSource {
                        id,
                        is_muted: mute["inputMuted"].as_bool().unwrap_or(false),
                        volume_percent: volume_percent(
                            volume["inputVolumeMul"].as_f64().unwrap_or(0.0),
                        ),
                        name,
                    }),
                    (Err(e), _) | (_, Err(e)) => {
                        warn!(
                            tenant = %connection.tenant(),
                            input = %name,
                            error = %e,
                            "dropping input"
                        );
                        None
                    }
                }
            }
        });

        Ok(join_all(fetches).await.into_iter().flatten().collect())
    }

    pub async fn get_stream_state(&self, tenant: &TenantId) -> StreamState {
        let result = self.request(tenant, "GetStreamStatus", json!({})).await;
        or_default(tenant, "stream state", result.map(|r| convert::stream_state(&r)))
    }

    /// Performance counters plus uptime and measured bitrate.
    ///
    /// Bitrate is the `outputBytes` delta since this tenant's previous
    /// poll, so the first poll of a stream reports 0.
    pub async fn get_stream_stats(&self, tenant: &TenantId) -> StreamStats {
        let result = self.try_stream_stats(tenant).await;
        or_default(tenant, "stream stats", result)
    }

    async fn try_stream_stats(&self, tenant: &TenantId) -> Result<StreamStats, CoreError> {
        let connection = self.connection(tenant)?;
        let stats = connection.request("GetStats", json!({})).await?;

        let (uptime, kbits_per_sec) = match connection.request("GetStreamStatus", json!({})).await {
            Ok(status) if status["outputActive"].as_bool().unwrap_or(false) => {
                let bytes = status["outputBytes"].as_u64().unwrap_or(0);
                (
                    status["outputTimecode"].as_str().map(str::to_owned),
                    self.sample_bitrate(tenant, bytes),
                )
            }
            Ok(_) => {
                self.samples.remove(tenant);
                (None, 0)
            }
            Err(e) => {
                debug!(tenant = %tenant, error = %e, "stream status unavailable");
                self.samples.remove(tenant);
                (None, 0)
            }
        };

        Ok(convert::stream_stats(&stats, uptime, kbits_per_sec))
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::as_conversions
    )]
    fn sample_bitrate(&self, tenant: &TenantId, bytes: u64) -> u64 {
        let now = Instant::now();
        let previous = self
            .samples
            .insert(tenant.clone(), ByteSample { bytes, at: now });

        let Some(previous) = previous else {
            return 0;
        };
        let elapsed = now.duration_since(previous.at).as_secs_f64();
        if elapsed <= 0.0 || bytes < previous.bytes {
            return 0;
        }
        let bits = (bytes - previous.bytes) as f64 * 8.0;
        (bits / elapsed / 1000.0).round() as u64
    }

    /// Small JPEG of `source` as a data URI, if the instance produced one.
    pub async fn get_preview_screenshot(&self, tenant: &TenantId, source: &str) -> Option<String> {
        let params = json!({
            "sourceName": source,
            "imageFormat": "jpg",
            "imageWidth": SCREENSHOT_WIDTH,
            "imageCompressionQuality": SCREENSHOT_QUALITY,
        });
        let result = self.request(tenant, "GetSourceScreenshot", params).await;
        or_default(
            tenant,
            "preview screenshot",
            result.map(|r| r["imageData"].as_str().map(str::to_owned)),
        )
    }

    pub async fn get_studio_mode_enabled(&self, tenant: &TenantId) -> bool {
        let result = self.request(tenant, "GetStudioModeEnabled", json!({})).await;
        or_default(
            tenant,
            "studio mode",
            result.map(|r| r["studioModeEnabled"].as_bool().unwrap_or(false)),
        )
    }

    /// Program scene and streaming flag, fetched together.
    pub async fn get_program_state(&self, tenant: &TenantId) -> Option<ProgramState> {
        let result = self.try_program_state(tenant).await.map(Some);
        or_default(tenant, "program state", result)
    }

    async fn try_program_state(&self, tenant: &TenantId) -> Result<ProgramState, CoreError> {
        let connection = self.connection(tenant)?;
        let (scene, stream) = tokio::join!(
            connection.request("GetCurrentProgramScene", json!({})),
            connection.request("GetStreamStatus", json!({})),
        );
        let scene = scene?;
        let stream = stream?;
        Ok(ProgramState {
            scene: program_scene_name(&scene).unwrap_or_default(),
            streaming: stream["outputActive"].as_bool().unwrap_or(false),
        })
    }

    // ── Composite writes ─────────────────────────────────────────

    /// Restart a media source.
    ///
    /// A missing link is reported as `NotConnected`. Any other failure is
    /// absorbed: when the transport supports it, the source's scene item in
    /// the program scene is hidden and shown again instead; otherwise the
    /// failure is only logged. The fallback is best-effort as well.
    pub async fn restart_source(&self, tenant: &TenantId, source: &str) -> Result<(), CoreError> {
        let connection = self.connection(tenant)?;
        let result = connection
            .command("RestartMedia", json!({ "inputName": source }))
            .await;

        let e = match result {
            Ok(()) => return Ok(()),
            Err(e) if e.is_not_connected() => return Err(e),
            Err(e) => e,
        };

        if !connection.capabilities().await.scene_item_fallback {
            warn!(
                tenant = %tenant,
                source,
                error = %e,
                "media restart failed, no fallback on this transport"
            );
            return Ok(());
        }

        warn!(tenant = %tenant, source, error = %e, "media restart failed, toggling scene item");
        if let Err(fallback) = toggle_scene_item_off_on(&connection, source).await {
            warn!(tenant = %tenant, source, error = %fallback, "scene item toggle failed");
        }
        Ok(())
    }

    /// Set the bitrate on every output. Individual output failures are
    /// logged; success means every output was attempted.
    pub async fn set_stream_bitrate(&self, tenant: &TenantId, kbps: u32) -> Result<(), CoreError> {
        let connection = self.connection(tenant)?;
        let outputs = connection.request("GetOutputList", json!({})).await?;

        let updates = convert::output_names(&outputs).into_iter().map(|name| {
            let connection = connection.clone();
            async move {
                let params = json!({
                    "outputName": name,
                    "outputSettings": { "bitrate": kbps, "video_bitrate": kbps },
                });
                if let Err(e) = connection.command("SetOutputSettings", params).await {
                    warn!(
                        tenant = %connection.tenant(),
                        output = %name,
                        error = %e,
                        "bitrate not applied"
                    );
                }
            }
        });
        join_all(updates).await;
        Ok(())
    }

    // ── Thin writes ──────────────────────────────────────────────

    /// Start the stream unless it is live, in which case stop it.
    pub async fn toggle_stream(
        &self,
        tenant: &TenantId,
        current: StreamState,
    ) -> Result<(), CoreError> {
        let request_type = match current {
            StreamState::Live => "StopStream",
            StreamState::Starting | StreamState::Offline => "StartStream",
        };
        self.command(tenant, request_type, json!({})).await
    }

    pub async fn toggle_mute(
        &self,
        tenant: &TenantId,
        input: &str,
        currently_muted: bool,
    ) -> Result<(), CoreError> {
        self.set_mute(tenant, input, !currently_muted).await
    }

    pub async fn set_mute(
        &self,
        tenant: &TenantId,
        input: &str,
        muted: bool,
    ) -> Result<(), CoreError> {
        let params = json!({ "inputName": input, "inputMuted": muted });
        self.command(tenant, "SetInputMute", params).await
    }

    pub async fn switch_scene(&self, tenant: &TenantId, scene: &str) -> Result<(), CoreError> {
        self.command(tenant, "SetCurrentProgramScene", json!({ "sceneName": scene }))
            .await
    }

    /// Set an input's volume from a displayed percentage.
    pub async fn set_volume(
        &self,
        tenant: &TenantId,
        input: &str,
        percent: f64,
    ) -> Result<(), CoreError> {
        let params = json!({
            "inputName": input,
            "inputVolumeMul": volume_multiplier(percent),
        });
        self.command(tenant, "SetInputVolume", params).await
    }

    pub async fn set_studio_mode(&self, tenant: &TenantId, enabled: bool) -> Result<(), CoreError> {
        self.command(tenant, "SetStudioModeEnabled", json!({ "studioModeEnabled": enabled }))
            .await
    }

    pub async fn set_preview_scene(&self, tenant: &TenantId, scene: &str) -> Result<(), CoreError> {
        self.command(tenant, "SetCurrentPreviewScene", json!({ "sceneName": scene }))
            .await
    }

    pub async fn trigger_transition(&self, tenant: &TenantId) -> Result<(), CoreError> {
        self.command(tenant, "TriggerStudioModeTransition", json!({}))
            .await
    }

    pub async fn set_current_transition(
        &self,
        tenant: &TenantId,
        name: &str,
    ) -> Result<(), CoreError> {
        self.command(tenant, "SetCurrentSceneTransition", json!({ "transitionName": name }))
            .await
    }

    pub async fn toggle_scene_item(
        &self,
        tenant: &TenantId,
        scene: &str,
        item_id: i64,
        enabled: bool,
    ) -> Result<(), CoreError> {
        let params = json!({
            "sceneName": scene,
            "sceneItemId": item_id,
            "sceneItemEnabled": enabled,
        });
        self.command(tenant, "SetSceneItemEnabled", params).await
    }

    pub async fn set_profile(&self, tenant: &TenantId, name: &str) -> Result<(), CoreError> {
        self.command(tenant, "SetCurrentProfile", json!({ "profileName": name }))
            .await
    }

    /// Pass a request through verbatim and return the response data.
    pub async fn send_raw(
        &self,
        tenant: &TenantId,
        request_type: &str,
        data: Value,
    ) -> Result<Value, CoreError> {
        self.request(tenant, request_type, data).await
    }
}

fn program_scene_name(response: &Value) -> Option<String> {
    response["currentProgramSceneName"]
        .as_str()
        .or_else(|| response["sceneName"].as_str())
        .map(str::to_owned)
}

async fn toggle_scene_item_off_on(connection: &Connection, source: &str) -> Result<(), CoreError> {
    let program = connection
        .request("GetCurrentProgramScene", json!({}))
        .await?;
    let scene = program_scene_name(&program)
        .ok_or_else(|| CoreError::rejected("GetCurrentProgramScene", "no program scene"))?;

    let items = connection
        .request("GetSceneItemList", json!({ "sceneName": scene }))
        .await?;
    let item_id = convert::scene_item_id(&items, source).ok_or_else(|| {
        CoreError::rejected(
            "GetSceneItemList",
            format!("'{source}' is not in scene '{scene}'"),
        )
    })?;

    let set_enabled = |enabled: bool| {
        json!({ "sceneName": scene, "sceneItemId": item_id, "sceneItemEnabled": enabled })
    };
    connection
        .command("SetSceneItemEnabled", set_enabled(false))
        .await?;
    tokio::time::sleep(RESTART_TOGGLE_DELAY).await;
    connection
        .command("SetSceneItemEnabled", set_enabled(true))
        .await
}
