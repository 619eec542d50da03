use serde::{Deserialize, Serialize};

/// Channels in one DMX universe.
pub const UNIVERSE_SIZE: usize = 512;

/// Canvas and compiler timestamps are keyed in whole microseconds so that a
/// sample written at `t` and a query at `t` land on the same key even when the
/// two `f64`s were produced by slightly different arithmetic.
pub type TimeKey = u64;

pub fn time_key(seconds: f64) -> TimeKey {
    if seconds <= 0.0 {
        0
    } else {
        (seconds * 1_000_000.0).round() as TimeKey
    }
}

pub fn key_seconds(key: TimeKey) -> f64 {
    key as f64 / 1_000_000.0
}

/// A full universe snapshot, channel 0 first.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DmxFrame(pub [u8; UNIVERSE_SIZE]);

impl DmxFrame {
    pub fn blackout() -> Self {
        DmxFrame([0; UNIVERSE_SIZE])
    }

    pub fn get(&self, channel: u16) -> u8 {
        self.0.get(channel as usize).copied().unwrap_or(0)
    }

    pub fn set(&mut self, channel: u16, value: u8) {
        if let Some(slot) = self.0.get_mut(channel as usize) {
            *slot = value;
        }
    }

    pub fn as_bytes(&self) -> &[u8; UNIVERSE_SIZE] {
        &self.0
    }

    pub fn is_blackout(&self) -> bool {
        self.0.iter().all(|v| *v == 0)
    }
}

impl Default for DmxFrame {
    fn default() -> Self {
        Self::blackout()
    }
}

impl std::fmt::Debug for DmxFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only the lit channels; 512 zeros is noise in test output
        let lit: Vec<(usize, u8)> = self
            .0
            .iter()
            .enumerate()
            .filter(|(_, v)| **v != 0)
            .map(|(i, v)| (i, *v))
            .collect();
        f.debug_tuple("DmxFrame").field(&lit).finish()
    }
}

impl Serialize for DmxFrame {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.as_slice().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DmxFrame {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let values = Vec::<u8>::deserialize(deserializer)?;
        if values.len() != UNIVERSE_SIZE {
            return Err(serde::de::Error::invalid_length(
                values.len(),
                &"512 channel values",
            ));
        }
        let mut frame = DmxFrame::blackout();
        frame.0.copy_from_slice(&values);
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_keys_absorb_float_noise() {
        assert_eq!(time_key(0.1 * 3.0), time_key(0.3));
        assert_eq!(time_key(-1.0), 0);
        assert_eq!(key_seconds(time_key(12.5)), 12.5);
    }

    #[test]
    fn frame_ignores_out_of_universe_channels() {
        let mut frame = DmxFrame::blackout();
        frame.set(600, 255);
        frame.set(511, 7);
        assert_eq!(frame.get(600), 0);
        assert_eq!(frame.get(511), 7);
        assert!(!frame.is_blackout());
    }

    #[test]
    fn frame_serializes_as_flat_list() {
        let mut frame = DmxFrame::blackout();
        frame.set(0, 9);
        let json = serde_json::to_string(&frame).unwrap();
        let back: DmxFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(back, frame);
        assert!(serde_json::from_str::<DmxFrame>("[1,2,3]").is_err());
    }
}
