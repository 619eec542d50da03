use serde::{Deserialize, Serialize};
use ts_rs::TS;

#[derive(TS, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "playback.ts")]
pub enum PlaybackStatus {
    Stopped,
    Playing,
    Paused,
}

/// Snapshot of playback state sent to observers
#[derive(TS, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "playback.ts")]
pub struct PlaybackSnapshot {
    pub status: PlaybackStatus,
    /// Playhead position in seconds
    pub current_time: f64,
    pub duration_seconds: f64,
    pub frame_rate: f64,
    pub loop_enabled: bool,
    /// Frames handed to the transport since the engine was created
    #[ts(type = "number")]
    pub frames_emitted: u64,
    #[ts(type = "number")]
    pub transport_failures: u64,
    /// Last emitted universe, channel 0 first
    pub universe: Vec<u8>,
}
