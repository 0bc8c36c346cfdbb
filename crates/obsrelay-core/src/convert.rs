// ── Response conversion ──
//
// obs-websocket responses are loose JSON. These helpers pull the fields we
// use into the snapshot types, treating anything missing as empty rather
// than failing the whole read.

use serde_json::Value;

use crate::model::{
    IDLE_UPTIME, ProfileList, Scene, SceneItem, StreamState, StreamStats, Transition,
};

/// Input-name keywords (matched case-insensitively) that mark ingest sources.
pub const INGEST_KEYWORDS: [&str; 3] = ["SRT", "SRTLA", "RTMP"];

fn array<'a>(value: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    value[key].as_array().into_iter().flatten()
}

fn string(value: &Value, key: &str) -> Option<String> {
    value[key].as_str().map(str::to_owned)
}

/// `GetSceneList`. The instance lists scenes bottom-up; the dashboard
/// shows them top-down.
pub(crate) fn scenes(response: &Value) -> Vec<Scene> {
    let current = response["currentProgramSceneName"].as_str();
    let mut scenes: Vec<Scene> = array(response, "scenes")
        .filter_map(|scene| string(scene, "sceneName"))
        .map(|name| Scene {
            id: name.clone(),
            is_active: current == Some(name.as_str()),
            name,
        })
        .collect();
    scenes.reverse();
    scenes
}

/// `GetSceneItemList`
pub(crate) fn scene_items(response: &Value) -> Vec<SceneItem> {
    array(response, "sceneItems")
        .filter_map(|item| {
            Some(SceneItem {
                id: item["sceneItemId"].as_i64()?,
                source_name: string(item, "sourceName")?,
                is_enabled: item["sceneItemEnabled"].as_bool().unwrap_or(false),
                is_group: item["isGroup"].as_bool().unwrap_or(false),
            })
        })
        .collect()
}

/// Scene item id of `source_name` in a `GetSceneItemList` response.
pub(crate) fn scene_item_id(response: &Value, source_name: &str) -> Option<i64> {
    array(response, "sceneItems")
        .find(|item| item["sourceName"].as_str() == Some(source_name))
        .and_then(|item| item["sceneItemId"].as_i64())
}

/// `GetSceneTransitionList`
pub(crate) fn transitions(response: &Value) -> Vec<Transition> {
    let current = response["currentSceneTransitionName"].as_str();
    array(response, "transitions")
        .filter_map(|transition| {
            let name = string(transition, "transitionName")?;
            Some(Transition {
                kind: string(transition, "transitionKind").unwrap_or_default(),
                is_current: current == Some(name.as_str()),
                name,
            })
        })
        .collect()
}

/// `GetProfileList`
pub(crate) fn profiles(response: &Value) -> ProfileList {
    ProfileList {
        current: string(response, "currentProfileName"),
        profiles: array(response, "profiles")
            .filter_map(|p| p.as_str().map(str::to_owned))
            .collect(),
    }
}

pub(crate) fn is_ingest_input(name: &str) -> bool {
    let upper = name.to_uppercase();
    INGEST_KEYWORDS.iter().any(|keyword| upper.contains(keyword))
}

/// `(id, name)` of every ingest input in a `GetInputList` response.
pub(crate) fn ingest_inputs(response: &Value) -> Vec<(String, String)> {
    array(response, "inputs")
        .filter_map(|input| {
            let name = string(input, "inputName")?;
            if !is_ingest_input(&name) {
                return None;
            }
            let id = string(input, "inputUuid").unwrap_or_else(|| name.clone());
            Some((id, name))
        })
        .collect()
}

/// `GetOutputList`
pub(crate) fn output_names(response: &Value) -> Vec<String> {
    array(response, "outputs")
        .filter_map(|output| string(output, "outputName"))
        .collect()
}

/// `GetStreamStatus`
pub(crate) fn stream_state(response: &Value) -> StreamState {
    StreamState::from_status(
        response["outputActive"].as_bool().unwrap_or(false),
        response["outputReconnecting"].as_bool().unwrap_or(false),
    )
}

/// `GetStats` plus the stream's uptime and measured bitrate.
pub(crate) fn stream_stats(
    stats: &Value,
    uptime: Option<String>,
    kbits_per_sec: u64,
) -> StreamStats {
    let number = |key: &str| stats[key].as_f64().unwrap_or(0.0);
    let count = |key: &str| stats[key].as_u64().unwrap_or(0);
    StreamStats {
        cpu: number("cpuUsage"),
        fps: number("activeFps"),
        memory_mb: number("memoryUsage"),
        dropped_frames: count("outputSkippedFrames"),
        total_frames: count("outputTotalFrames"),
        uptime: uptime.unwrap_or_else(|| IDLE_UPTIME.into()),
        kbits_per_sec,
        disk_space_mb: number("availableDiskSpace"),
    }
}
