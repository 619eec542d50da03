use std::collections::BTreeMap;

use crate::compiler::templates::ActionTemplate;
use crate::error::{ShowError, ShowResult};
use crate::fixtures::models::{ChannelKind, Fixture, FixtureChannel};
use crate::models::universe::DmxFrame;

/// Read-only fixture lookup, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct FixtureCatalog {
    fixtures: BTreeMap<String, Fixture>,
}

impl FixtureCatalog {
    pub fn from_fixtures(fixtures: Vec<Fixture>) -> ShowResult<Self> {
        let mut map = BTreeMap::new();
        for fixture in fixtures {
            fixture.validate().map_err(ShowError::InvalidCommand)?;
            if map.contains_key(&fixture.id) {
                return Err(ShowError::InvalidCommand(format!(
                    "Fixture id '{}' defined twice",
                    fixture.id
                )));
            }
            map.insert(fixture.id.clone(), fixture);
        }
        Ok(Self { fixtures: map })
    }

    pub fn get(&self, id: &str) -> ShowResult<&Fixture> {
        self.fixtures
            .get(id)
            .ok_or_else(|| ShowError::FixtureNotFound(id.to_string()))
    }

    pub fn fixtures(&self) -> impl Iterator<Item = &Fixture> {
        self.fixtures.values()
    }

    pub fn len(&self) -> usize {
        self.fixtures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixtures.is_empty()
    }

    /// Every patched channel at its resting value, everything else 0.
    pub fn resting_frame(&self) -> DmxFrame {
        let mut frame = DmxFrame::blackout();
        for fixture in self.fixtures.values() {
            for channel in &fixture.channels {
                frame.set(channel.number, channel.default);
            }
        }
        frame
    }
}

fn channel(number: u16, name: &str, kind: ChannelKind) -> FixtureChannel {
    let mut ch = FixtureChannel::new(number, name);
    ch.kind = Some(kind);
    ch
}

fn with_templates(id: &str, channels: Vec<FixtureChannel>, templates: &[ActionTemplate]) -> Fixture {
    Fixture {
        id: id.to_string(),
        label: None,
        channels,
        actions: templates
            .iter()
            .map(|t| (t.name().to_string(), t.standard_schema()))
            .collect(),
    }
}

const INTENSITY_TEMPLATES: [ActionTemplate; 6] = [
    ActionTemplate::Flash,
    ActionTemplate::Strobe,
    ActionTemplate::FadeIn,
    ActionTemplate::FadeOut,
    ActionTemplate::Fade,
    ActionTemplate::Set,
];

/// Single-channel dimmer at `address`.
pub fn generic_dimmer(id: &str, address: u16) -> Fixture {
    with_templates(
        id,
        vec![channel(address, "dimmer", ChannelKind::Intensity)],
        &INTENSITY_TEMPLATES,
    )
}

/// Dimmer + RGB, four consecutive channels from `address`.
pub fn rgb_par(id: &str, address: u16) -> Fixture {
    with_templates(
        id,
        vec![
            channel(address, "dimmer", ChannelKind::Intensity),
            channel(address + 1, "red", ChannelKind::Red),
            channel(address + 2, "green", ChannelKind::Green),
            channel(address + 3, "blue", ChannelKind::Blue),
        ],
        &INTENSITY_TEMPLATES,
    )
}

/// 16-bit pan/tilt, dimmer and RGB, eight consecutive channels from `address`.
pub fn moving_head(id: &str, address: u16) -> Fixture {
    let mut templates = INTENSITY_TEMPLATES.to_vec();
    templates.extend([ActionTemplate::Pan, ActionTemplate::Tilt, ActionTemplate::Move]);
    with_templates(
        id,
        vec![
            channel(address, "pan", ChannelKind::Pan),
            channel(address + 1, "pan_fine", ChannelKind::PanFine),
            channel(address + 2, "tilt", ChannelKind::Tilt),
            channel(address + 3, "tilt_fine", ChannelKind::TiltFine),
            channel(address + 4, "dimmer", ChannelKind::Intensity),
            channel(address + 5, "red", ChannelKind::Red),
            channel(address + 6, "green", ChannelKind::Green),
            channel(address + 7, "blue", ChannelKind::Blue),
        ],
        &templates,
    )
}
