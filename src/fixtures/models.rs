use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::actions::ParamValue;

/// Static fixture definition: where its channels sit in the universe and
/// which action templates it accepts.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Fixture {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    pub channels: Vec<FixtureChannel>,
    /// Action name -> parameter schema
    #[serde(default)]
    pub actions: BTreeMap<String, ActionSchema>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FixtureChannel {
    /// Universe channel, 0-511
    pub number: u16,
    pub name: String,
    #[serde(default)]
    pub kind: Option<ChannelKind>,
    #[serde(default)]
    pub min: u8,
    #[serde(default = "full_scale")]
    pub max: u8,
    /// Resting value
    #[serde(default)]
    pub default: u8,
}

fn full_scale() -> u8 {
    255
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Intensity,
    Red,
    Green,
    Blue,
    White,
    Shutter,
    Pan,
    PanFine,
    Tilt,
    TiltFine,
    Other,
}

impl FixtureChannel {
    pub fn new(number: u16, name: &str) -> Self {
        Self {
            number,
            name: name.to_string(),
            kind: None,
            min: 0,
            max: 255,
            default: 0,
        }
    }

    /// Declared kind, or one inferred from the channel name.
    pub fn kind(&self) -> ChannelKind {
        if let Some(kind) = self.kind {
            return kind;
        }
        let name = self.name.to_lowercase().replace(['-', ' '], "_");
        match name.as_str() {
            "dimmer" | "intensity" | "master" | "master_dimmer" => ChannelKind::Intensity,
            "red" | "r" => ChannelKind::Red,
            "green" | "g" => ChannelKind::Green,
            "blue" | "b" => ChannelKind::Blue,
            "white" | "w" => ChannelKind::White,
            "shutter" | "strobe" => ChannelKind::Shutter,
            "pan" | "x" => ChannelKind::Pan,
            "pan_fine" | "x_fine" => ChannelKind::PanFine,
            "tilt" | "y" => ChannelKind::Tilt,
            "tilt_fine" | "y_fine" => ChannelKind::TiltFine,
            _ => ChannelKind::Other,
        }
    }

    pub fn clamp(&self, value: u8) -> u8 {
        value.clamp(self.min, self.max.max(self.min))
    }
}

impl Fixture {
    pub fn channel_named(&self, name: &str) -> Option<&FixtureChannel> {
        self.channels
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn channels_of_kind(&self, kind: ChannelKind) -> Vec<&FixtureChannel> {
        self.channels.iter().filter(|c| c.kind() == kind).collect()
    }

    pub fn channel(&self, number: u16) -> Option<&FixtureChannel> {
        self.channels.iter().find(|c| c.number == number)
    }

    pub fn action(&self, name: &str) -> Option<&ActionSchema> {
        self.actions.get(name)
    }

    /// Channel number uniqueness and value-range sanity.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = std::collections::HashSet::new();
        for channel in &self.channels {
            if channel.number as usize >= crate::models::universe::UNIVERSE_SIZE {
                return Err(format!(
                    "Fixture '{}' channel '{}' number {} is outside 0-511",
                    self.id, channel.name, channel.number
                ));
            }
            if !seen.insert(channel.number) {
                return Err(format!(
                    "Fixture '{}' uses channel {} twice",
                    self.id, channel.number
                ));
            }
            if channel.min > channel.max || channel.default < channel.min || channel.default > channel.max
            {
                return Err(format!(
                    "Fixture '{}' channel '{}' default {} is outside [{}, {}]",
                    self.id, channel.name, channel.default, channel.min, channel.max
                ));
            }
        }
        Ok(())
    }
}

/// Parameters accepted by one action template on one fixture.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct ActionSchema {
    /// Instantaneous actions accept a zero duration
    #[serde(default)]
    pub instantaneous: bool,
    #[serde(default)]
    pub params: Vec<ParamSpec>,
}

impl ActionSchema {
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: ParamKind,
    /// A parameter without a default is required
    #[serde(default)]
    pub default: Option<ParamValue>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamKind {
    Number {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    Integer {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    Boolean,
    Text,
    Choice {
        options: Vec<String>,
    },
}

impl ParamSpec {
    pub fn number(name: &str, min: f64, max: f64, default: Option<f64>) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamKind::Number {
                min: Some(min),
                max: Some(max),
            },
            default: default.map(ParamValue::Number),
        }
    }

    pub fn integer(name: &str, min: f64, max: f64, default: Option<f64>) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamKind::Integer {
                min: Some(min),
                max: Some(max),
            },
            default: default.map(ParamValue::Number),
        }
    }

    pub fn text(name: &str, default: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamKind::Text,
            default: default.map(ParamValue::from),
        }
    }

    pub fn choice(name: &str, options: &[&str], default: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamKind::Choice {
                options: options.iter().map(|s| s.to_string()).collect(),
            },
            default: Some(ParamValue::from(default)),
        }
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}
