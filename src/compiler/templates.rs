use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::fixtures::models::{ActionSchema, ParamSpec};

/// Action templates the compiler knows how to expand. A fixture opts into a
/// template by listing its name (with a parameter schema) in `actions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionTemplate {
    Flash,
    Strobe,
    FadeIn,
    FadeOut,
    Fade,
    Set,
    Pan,
    Tilt,
    Move,
}

pub const CURVES: [&str; 4] = ["linear", "ease_in", "ease_out", "ease_in_out"];

impl ActionTemplate {
    pub const ALL: [ActionTemplate; 9] = [
        ActionTemplate::Flash,
        ActionTemplate::Strobe,
        ActionTemplate::FadeIn,
        ActionTemplate::FadeOut,
        ActionTemplate::Fade,
        ActionTemplate::Set,
        ActionTemplate::Pan,
        ActionTemplate::Tilt,
        ActionTemplate::Move,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            ActionTemplate::Flash => "flash",
            ActionTemplate::Strobe => "strobe",
            ActionTemplate::FadeIn => "fade_in",
            ActionTemplate::FadeOut => "fade_out",
            ActionTemplate::Fade => "fade",
            ActionTemplate::Set => "set",
            ActionTemplate::Pan => "pan",
            ActionTemplate::Tilt => "tilt",
            ActionTemplate::Move => "move",
        }
    }

    /// Schema used by the built-in fixture presets.
    pub fn standard_schema(self) -> ActionSchema {
        STANDARD_SCHEMAS
            .get(&self)
            .cloned()
            .unwrap_or_default()
    }
}

fn level(name: &str, default: Option<f64>) -> ParamSpec {
    ParamSpec::integer(name, 0.0, 255.0, default)
}

fn position(name: &str) -> ParamSpec {
    ParamSpec::number(name, 0.0, 1.0, None)
}

fn curve() -> ParamSpec {
    ParamSpec::choice("curve", &CURVES, "linear")
}

fn target() -> ParamSpec {
    ParamSpec::text("target", Some(""))
}

static STANDARD_SCHEMAS: Lazy<HashMap<ActionTemplate, ActionSchema>> = Lazy::new(|| {
    let timed = |params: Vec<ParamSpec>| ActionSchema {
        instantaneous: false,
        params,
    };
    let mut map = HashMap::new();
    map.insert(
        ActionTemplate::Flash,
        timed(vec![level("level", Some(255.0)), target()]),
    );
    map.insert(
        ActionTemplate::Strobe,
        timed(vec![
            ParamSpec::number("rate", 0.1, 50.0, None),
            ParamSpec::number("duty", 0.05, 0.95, Some(0.5)),
            level("level", Some(255.0)),
            target(),
        ]),
    );
    map.insert(
        ActionTemplate::FadeIn,
        timed(vec![
            level("from", Some(0.0)),
            level("to", Some(255.0)),
            curve(),
            target(),
        ]),
    );
    map.insert(
        ActionTemplate::FadeOut,
        timed(vec![
            level("from", Some(255.0)),
            level("to", Some(0.0)),
            curve(),
            target(),
        ]),
    );
    map.insert(
        ActionTemplate::Fade,
        timed(vec![level("from", None), level("to", None), curve(), target()]),
    );
    map.insert(
        ActionTemplate::Set,
        ActionSchema {
            instantaneous: true,
            params: vec![level("level", Some(255.0)), target()],
        },
    );
    map.insert(
        ActionTemplate::Pan,
        timed(vec![position("from"), position("to"), curve()]),
    );
    map.insert(
        ActionTemplate::Tilt,
        timed(vec![position("from"), position("to"), curve()]),
    );
    map.insert(
        ActionTemplate::Move,
        timed(vec![
            position("from_x"),
            position("from_y"),
            position("to_x"),
            position("to_y"),
            curve(),
        ]),
    );
    map
});
