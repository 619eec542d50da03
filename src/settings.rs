use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::artnet::ArtNetConfig;
use crate::error::{ShowError, ShowResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowSettings {
    pub frame_rate: f64,
    pub artnet_enabled: bool,
    pub artnet_interface: String,
    pub artnet_broadcast: bool,
    pub artnet_unicast_ip: String,
    pub artnet_net: u8,
    pub artnet_subnet: u8,
    pub artnet_universe: u8,
    /// Emit an all-zero frame when playback stops or runs off the end
    pub blackout_at_end: bool,
    /// Re-anchor to the audio clock once it drifts further than this
    pub drift_tolerance_ms: f64,
    /// Steps between checkpoints of a background render
    pub checkpoint_interval: usize,
    /// Empty keeps checkpoints in memory only
    pub checkpoint_dir: Option<PathBuf>,
}

impl Default for ShowSettings {
    fn default() -> Self {
        Self {
            frame_rate: 60.0,
            artnet_enabled: false,
            artnet_interface: "0.0.0.0".to_string(),
            artnet_broadcast: true,
            artnet_unicast_ip: "".to_string(),
            artnet_net: 0,
            artnet_subnet: 0,
            artnet_universe: 0,
            blackout_at_end: true,
            drift_tolerance_ms: 20.0,
            checkpoint_interval: 25,
            checkpoint_dir: None,
        }
    }
}

impl ShowSettings {
    /// Parse the flat key/value form. Missing or unparsable keys fall back to
    /// their defaults.
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        let defaults = Self::default();
        Self {
            frame_rate: map
                .get("frame_rate")
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|v| v.is_finite())
                .map(|v| v.clamp(1.0, 240.0))
                .unwrap_or(defaults.frame_rate),
            artnet_enabled: map
                .get("artnet_enabled")
                .map(|v| v == "true")
                .unwrap_or(defaults.artnet_enabled),
            artnet_interface: map
                .get("artnet_interface")
                .cloned()
                .unwrap_or(defaults.artnet_interface),
            artnet_broadcast: map
                .get("artnet_broadcast")
                .map(|v| v == "true")
                .unwrap_or(defaults.artnet_broadcast),
            artnet_unicast_ip: map.get("artnet_unicast_ip").cloned().unwrap_or_default(),
            artnet_net: map
                .get("artnet_net")
                .and_then(|v| v.parse::<u8>().ok())
                .map(|v| v.min(127))
                .unwrap_or(defaults.artnet_net),
            artnet_subnet: map
                .get("artnet_subnet")
                .and_then(|v| v.parse::<u8>().ok())
                .map(|v| v.min(15))
                .unwrap_or(defaults.artnet_subnet),
            artnet_universe: map
                .get("artnet_universe")
                .and_then(|v| v.parse::<u8>().ok())
                .map(|v| v.min(15))
                .unwrap_or(defaults.artnet_universe),
            blackout_at_end: map
                .get("blackout_at_end")
                .map(|v| v == "true")
                .unwrap_or(defaults.blackout_at_end),
            drift_tolerance_ms: map
                .get("drift_tolerance_ms")
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|v| v.is_finite() && *v >= 0.0)
                .unwrap_or(defaults.drift_tolerance_ms),
            checkpoint_interval: map
                .get("checkpoint_interval")
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.checkpoint_interval),
            checkpoint_dir: map
                .get("checkpoint_dir")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }

    /// Load a JSON object of settings. Values may be strings, numbers or
    /// booleans; they are flattened to strings before parsing.
    pub fn load(path: &Path) -> ShowResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ShowError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        let value: serde_json::Value = serde_json::from_str(&content)?;
        let object = value.as_object().ok_or_else(|| {
            ShowError::Serialization(format!("{} must hold a JSON object", path.display()))
        })?;

        let map = object
            .iter()
            .map(|(key, value)| {
                let flat = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), flat)
            })
            .collect();
        Ok(Self::from_map(&map))
    }

    pub fn artnet_config(&self) -> ArtNetConfig {
        ArtNetConfig {
            interface: self.artnet_interface.clone(),
            broadcast: self.artnet_broadcast,
            unicast_ip: Some(self.artnet_unicast_ip.clone()).filter(|s| !s.is_empty()),
            net: self.artnet_net,
            subnet: self.artnet_subnet,
            universe: self.artnet_universe,
        }
    }
}
