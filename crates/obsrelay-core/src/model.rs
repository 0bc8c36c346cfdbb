// ── Instance snapshot types ──
//
// Derived views of an instance's state. Nothing here is persisted; every
// query rebuilds them from fresh responses (see `convert.rs`).

use serde::{Deserialize, Serialize};

/// Uptime reported when no stream is running.
pub const IDLE_UPTIME: &str = "00:00:00";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: String,
    pub name: String,
    pub is_active: bool,
}

/// One placed source within a scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneItem {
    pub id: i64,
    pub source_name: String,
    pub is_enabled: bool,
    pub is_group: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioSource {
    pub id: String,
    pub name: String,
    pub is_muted: bool,
    pub volume_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub name: String,
    pub kind: String,
    pub is_current: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileList {
    pub current: Option<String>,
    pub profiles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStats {
    pub cpu: f64,
    pub fps: f64,
    #[serde(rename = "memoryMB")]
    pub memory_mb: f64,
    pub dropped_frames: u64,
    pub total_frames: u64,
    pub uptime: String,
    pub kbits_per_sec: u64,
    pub disk_space_mb: f64,
}

impl Default for StreamStats {
    fn default() -> Self {
        Self {
            cpu: 0.0,
            fps: 0.0,
            memory_mb: 0.0,
            dropped_frames: 0,
            total_frames: 0,
            uptime: IDLE_UPTIME.into(),
            kbits_per_sec: 0,
            disk_space_mb: 0.0,
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum StreamState {
    Live,
    Starting,
    #[default]
    Offline,
}

impl StreamState {
    pub fn from_status(output_active: bool, output_reconnecting: bool) -> Self {
        if output_reconnecting {
            Self::Starting
        } else if output_active {
            Self::Live
        } else {
            Self::Offline
        }
    }
}

/// What is on air right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramState {
    pub scene: String,
    pub streaming: bool,
}

// ── Volume curve ─────────────────────────────────────────────────

/// Linear multiplier → displayed percentage (cube-root curve).
pub fn volume_percent(multiplier: f64) -> f64 {
    multiplier.max(0.0).cbrt() * 100.0
}

/// Displayed percentage → linear multiplier (cube curve).
pub fn volume_multiplier(percent: f64) -> f64 {
    (percent.max(0.0) / 100.0).powi(3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_curve_round_trips() {
        for percent in [0.0, 1.0, 25.0, 50.0, 73.3, 100.0] {
            let back = volume_percent(volume_multiplier(percent));
            assert!((back - percent).abs() < 1e-9, "{percent} -> {back}");
        }
        assert!((volume_multiplier(50.0) - 0.125).abs() < f64::EPSILON);
    }

    #[test]
    fn stream_state_prefers_reconnecting() {
        assert_eq!(StreamState::from_status(true, true), StreamState::Starting);
        assert_eq!(StreamState::from_status(true, false), StreamState::Live);
        assert_eq!(StreamState::from_status(false, false), StreamState::Offline);
        assert_eq!(StreamState::Live.to_string(), "LIVE");
    }

    #[test]
    fn stats_default_to_idle_uptime() {
        let stats = StreamStats::default();
        assert_eq!(stats.uptime, IDLE_UPTIME);
        let json = serde_json::to_value(&stats).unwrap_or_default();
        assert!(json.get("memoryMB").is_some());
        assert!(json.get("kbitsPerSec").is_some());
    }
}
