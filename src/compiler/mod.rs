//! Action Compiler
//!
//! Turns one `ActionModel` plus its fixture's channel map into explicit
//! per-channel sample curves. Pure and deterministic: the same action and
//! catalog always compile to the same curves. An action either compiles
//! completely or fails with a single error; there is no partial output.

pub mod effects;
pub mod params;
pub mod templates;

use serde::{Deserialize, Serialize};

use crate::error::{ShowError, ShowResult};
use crate::fixtures::catalog::FixtureCatalog;
use crate::fixtures::models::{ChannelKind, Fixture, FixtureChannel};
use crate::models::actions::{ActionKey, ActionModel};

use effects::{Axis, Curve};
use params::ResolvedParams;
use templates::ActionTemplate;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: f64,
    pub value: u8,
}

/// What a channel shows once a curve's window is over.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CurveTail {
    /// Window is `[start, end)`; at `end` the channel goes back to whatever was
    /// painted before this curve, or to `resting` if nothing was.
    Restore { resting: u8 },
    /// Window is `[start, end]`; the last sample holds until the next
    /// previously painted sample.
    Hold,
}

/// Samples for one universe channel over one action window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelCurve {
    pub channel: u16,
    pub start: f64,
    pub end: f64,
    pub samples: Vec<Sample>,
    pub tail: CurveTail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledAction {
    pub key: ActionKey,
    pub start: f64,
    pub end: f64,
    pub curves: Vec<ChannelCurve>,
}

impl CompiledAction {
    /// Flattened `(time, channel, value)` samples in curve order.
    pub fn samples(&self) -> impl Iterator<Item = (f64, u16, u8)> + '_ {
        self.curves
            .iter()
            .flat_map(|c| c.samples.iter().map(move |s| (s.time, c.channel, s.value)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompileOptions {
    /// Upper bound on the gap between ramp samples, in seconds
    pub sample_interval: f64,
}

impl CompileOptions {
    /// Ramps sampled at half the playback tick interval or finer, so a tick
    /// never falls more than half a frame behind the curve.
    pub fn for_frame_rate(frame_rate: f64) -> Self {
        let frame_rate = if frame_rate.is_finite() && frame_rate > 0.0 {
            frame_rate
        } else {
            60.0
        };
        Self {
            sample_interval: 1.0 / (frame_rate * 2.0),
        }
    }
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self::for_frame_rate(60.0)
    }
}

pub struct ActionCompiler<'a> {
    catalog: &'a FixtureCatalog,
    options: CompileOptions,
}

impl<'a> ActionCompiler<'a> {
    pub fn new(catalog: &'a FixtureCatalog, options: CompileOptions) -> Self {
        Self { catalog, options }
    }

    pub fn options(&self) -> CompileOptions {
        self.options
    }

    /// Validate without producing samples. Used before an action is admitted
    /// to an Actions Sheet.
    pub fn validate(&self, action: &ActionModel) -> ShowResult<()> {
        self.prepare(action).map(|_| ())
    }

    pub fn compile(&self, action: &ActionModel) -> ShowResult<CompiledAction> {
        let (fixture, template, params) = self.prepare(action)?;
        let start = action.start_time;
        let duration = if template == ActionTemplate::Set {
            0.0
        } else {
            action.duration
        };
        let interval = self.options.sample_interval;
        let curve = Curve::from_name(params.text("curve").unwrap_or("linear"));
        let invalid = |reason: &str| {
            ShowError::invalid_action(&action.fixture_id, &action.action_type, reason)
        };

        let mut curves = Vec::new();
        match template {
            ActionTemplate::Flash => {
                let level = params.level("level").unwrap_or(255);
                for ch in intensity_targets(fixture, &params, action)? {
                    curves.push(effects::flash(ch, start, duration, level));
                }
            }
            ActionTemplate::Strobe => {
                let rate = params
                    .number("rate")
                    .filter(|r| *r > 0.0)
                    .ok_or_else(|| invalid("strobe rate must be positive"))?;
                let duty = params.number("duty").unwrap_or(0.5).clamp(0.01, 0.99);
                let level = params.level("level").unwrap_or(255);
                for ch in intensity_targets(fixture, &params, action)? {
                    curves.push(effects::strobe(ch, start, duration, rate, duty, level));
                }
            }
            ActionTemplate::FadeIn | ActionTemplate::FadeOut | ActionTemplate::Fade => {
                let from = params
                    .level("from")
                    .ok_or_else(|| invalid("missing fade start level"))?;
                let to = params
                    .level("to")
                    .ok_or_else(|| invalid("missing fade end level"))?;
                for ch in intensity_targets(fixture, &params, action)? {
                    curves.push(effects::fade(ch, start, duration, from, to, curve, interval));
                }
            }
            ActionTemplate::Set => {
                let level = params.level("level").unwrap_or(255);
                for ch in intensity_targets(fixture, &params, action)? {
                    curves.push(effects::set(ch, start, level));
                }
            }
            ActionTemplate::Pan | ActionTemplate::Tilt => {
                let (coarse, fine) = if template == ActionTemplate::Pan {
                    (ChannelKind::Pan, ChannelKind::PanFine)
                } else {
                    (ChannelKind::Tilt, ChannelKind::TiltFine)
                };
                let axis = axis(fixture, coarse, fine).ok_or_else(|| {
                    invalid(&format!("fixture has no {:?} channel", coarse).to_lowercase())
                })?;
                let from = params.number("from").unwrap_or(0.0);
                let to = params.number("to").unwrap_or(0.0);
                curves.extend(effects::sweep(
                    &axis, start, duration, from, to, curve, interval,
                ));
            }
            ActionTemplate::Move => {
                let x = axis(fixture, ChannelKind::Pan, ChannelKind::PanFine)
                    .ok_or_else(|| invalid("fixture has no pan channel"))?;
                let y = axis(fixture, ChannelKind::Tilt, ChannelKind::TiltFine)
                    .ok_or_else(|| invalid("fixture has no tilt channel"))?;
                let get = |name: &str| params.number(name).unwrap_or(0.0);
                curves.extend(effects::sweep(
                    &x,
                    start,
                    duration,
                    get("from_x"),
                    get("to_x"),
                    curve,
                    interval,
                ));
                curves.extend(effects::sweep(
                    &y,
                    start,
                    duration,
                    get("from_y"),
                    get("to_y"),
                    curve,
                    interval,
                ));
            }
        }

        if template == ActionTemplate::Strobe {
            let rate = params.number("rate").unwrap_or(0.0);
            if rate * 2.0 * interval > 1.0 {
                log::debug!(
                    "[compiler] strobe at {:.1} Hz on {} is faster than the playback tick can show",
                    rate,
                    action.fixture_id
                );
            }
        }

        Ok(CompiledAction {
            key: action.key(),
            start,
            end: start + duration,
            curves,
        })
    }

    fn prepare(
        &self,
        action: &ActionModel,
    ) -> ShowResult<(&'a Fixture, ActionTemplate, ResolvedParams)> {
        let invalid = |reason: String| {
            ShowError::invalid_action(&action.fixture_id, &action.action_type, reason)
        };

        let fixture = self.catalog.get(&action.fixture_id)?;
        let schema = fixture.action(&action.action_type).ok_or_else(|| {
            invalid(format!(
                "fixture '{}' does not support '{}'",
                fixture.id, action.action_type
            ))
        })?;
        let template = ActionTemplate::from_name(&action.action_type)
            .ok_or_else(|| invalid("no compiler for this action type".to_string()))?;

        if !action.start_time.is_finite() || action.start_time < 0.0 {
            return Err(invalid(format!(
                "start_time must be >= 0, got {}",
                action.start_time
            )));
        }
        if !action.duration.is_finite() || action.duration < 0.0 {
            return Err(invalid(format!(
                "duration must be >= 0, got {}",
                action.duration
            )));
        }
        if action.duration == 0.0 && !schema.instantaneous {
            return Err(invalid("duration must be > 0".to_string()));
        }

        let params = params::resolve(action, schema)?;
        Ok((fixture, template, params))
    }
}

/// Channels an intensity-style action drives: the named `target` if given,
/// otherwise the fixture's intensity channels, otherwise its color channels.
fn intensity_targets<'f>(
    fixture: &'f Fixture,
    params: &ResolvedParams,
    action: &ActionModel,
) -> ShowResult<Vec<&'f FixtureChannel>> {
    if let Some(target) = params.text("target").filter(|t| !t.is_empty()) {
        return fixture.channel_named(target).map(|c| vec![c]).ok_or_else(|| {
            ShowError::invalid_action(
                &action.fixture_id,
                &action.action_type,
                format!("unknown target channel '{}'", target),
            )
        });
    }

    let dimmers = fixture.channels_of_kind(ChannelKind::Intensity);
    if !dimmers.is_empty() {
        return Ok(dimmers);
    }
    let colors: Vec<&FixtureChannel> = fixture
        .channels
        .iter()
        .filter(|c| {
            matches!(
                c.kind(),
                ChannelKind::Red | ChannelKind::Green | ChannelKind::Blue | ChannelKind::White
            )
        })
        .collect();
    if colors.is_empty() {
        return Err(ShowError::invalid_action(
            &action.fixture_id,
            &action.action_type,
            "fixture has no intensity channel",
        ));
    }
    Ok(colors)
}

fn axis(fixture: &Fixture, coarse: ChannelKind, fine: ChannelKind) -> Option<Axis<'_>> {
    let coarse = fixture.channels_of_kind(coarse).into_iter().next()?;
    let fine = fixture.channels_of_kind(fine).into_iter().next();
    Some(Axis { coarse, fine })
}
