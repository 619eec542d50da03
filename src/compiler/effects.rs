//! Sample generators for each action template.

use crate::compiler::{ChannelCurve, CurveTail, Sample};
use crate::fixtures::models::FixtureChannel;

/// Ramp easing applied to the normalized progress of a fade or move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Curve {
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
}

impl Curve {
    pub fn from_name(name: &str) -> Self {
        match name {
            "ease_in" => Curve::EaseIn,
            "ease_out" => Curve::EaseOut,
            "ease_in_out" => Curve::EaseInOut,
            _ => Curve::Linear,
        }
    }

    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Curve::Linear => t,
            Curve::EaseIn => t * t,
            Curve::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
            Curve::EaseInOut => t * t * (3.0 - 2.0 * t),
        }
    }
}

/// Jump to `level` at `start`, hold, then release at `start + duration`.
pub fn flash(channel: &FixtureChannel, start: f64, duration: f64, level: u8) -> ChannelCurve {
    ChannelCurve {
        channel: channel.number,
        start,
        end: start + duration,
        samples: vec![Sample {
            time: start,
            value: channel.clamp(level),
        }],
        tail: CurveTail::Restore {
            resting: channel.default,
        },
    }
}

/// On/off square wave. One cycle per `1 / rate` seconds, `duty` of it on.
/// Every transition is an explicit sample, so a query exactly on a switch
/// instant resolves to the new state.
pub fn strobe(
    channel: &FixtureChannel,
    start: f64,
    duration: f64,
    rate: f64,
    duty: f64,
    level: u8,
) -> ChannelCurve {
    let end = start + duration;
    let period = 1.0 / rate;
    let on_len = period * duty;
    let on = channel.clamp(level);
    let off = channel.clamp(0);
    // A trailing sliver shorter than float noise is not a cycle
    let cycles = ((duration * rate) - 1e-9).ceil().max(1.0) as usize;

    let mut samples = Vec::with_capacity(cycles * 2);
    for k in 0..cycles {
        let t_on = start + k as f64 * period;
        samples.push(Sample {
            time: t_on,
            value: on,
        });
        let t_off = t_on + on_len;
        if t_off < end - 1e-9 {
            samples.push(Sample {
                time: t_off,
                value: off,
            });
        }
    }

    ChannelCurve {
        channel: channel.number,
        start,
        end,
        samples,
        tail: CurveTail::Restore {
            resting: channel.default,
        },
    }
}

/// Sample instants from `start` to `start + duration` inclusive, evenly
/// spaced no further apart than `interval`.
fn ramp_times(start: f64, duration: f64, interval: f64) -> Vec<f64> {
    if duration <= 0.0 {
        return vec![start];
    }
    let steps = ((duration / interval) - 1e-9).ceil().max(1.0) as usize;
    (0..=steps)
        .map(|i| start + duration * (i as f64 / steps as f64))
        .collect()
}

/// Level ramp from `from` to `to`. Holds `to` after the window.
pub fn fade(
    channel: &FixtureChannel,
    start: f64,
    duration: f64,
    from: u8,
    to: u8,
    curve: Curve,
    interval: f64,
) -> ChannelCurve {
    let from = from as f64;
    let to = to as f64;
    let samples = ramp_times(start, duration, interval)
        .into_iter()
        .map(|time| {
            let progress = if duration > 0.0 {
                (time - start) / duration
            } else {
                1.0
            };
            let value = from + (to - from) * curve.apply(progress);
            Sample {
                time,
                value: channel.clamp(value.round().clamp(0.0, 255.0) as u8),
            }
        })
        .collect();

    ChannelCurve {
        channel: channel.number,
        start,
        end: start + duration.max(0.0),
        samples,
        tail: CurveTail::Hold,
    }
}

/// Single value painted at one instant and held.
pub fn set(channel: &FixtureChannel, start: f64, level: u8) -> ChannelCurve {
    ChannelCurve {
        channel: channel.number,
        start,
        end: start,
        samples: vec![Sample {
            time: start,
            value: channel.clamp(level),
        }],
        tail: CurveTail::Hold,
    }
}

/// One positional axis: a coarse channel and an optional fine channel.
pub struct Axis<'a> {
    pub coarse: &'a FixtureChannel,
    pub fine: Option<&'a FixtureChannel>,
}

impl Axis<'_> {
    /// Map a normalized position into the coarse channel's declared range,
    /// returning (coarse, fine) bytes. Without a fine channel the value is
    /// 8-bit and the fine byte is 0.
    pub fn encode(&self, position: f64) -> (u8, u8) {
        let position = position.clamp(0.0, 1.0);
        let min = self.coarse.min.min(self.coarse.max);
        let max = self.coarse.max.max(min);
        match self.fine {
            Some(_) => {
                let lo = (min as u32) << 8;
                let hi = ((max as u32) << 8) | 0xFF;
                let value = lo + ((hi - lo) as f64 * position).round() as u32;
                let value = value.clamp(lo, hi);
                ((value >> 8) as u8, (value & 0xFF) as u8)
            }
            None => {
                let value = min as f64 + (max - min) as f64 * position;
                (value.round().clamp(min as f64, max as f64) as u8, 0)
            }
        }
    }
}

/// Positional ramp for one axis; yields one curve per physical channel.
pub fn sweep(
    axis: &Axis<'_>,
    start: f64,
    duration: f64,
    from: f64,
    to: f64,
    curve: Curve,
    interval: f64,
) -> Vec<ChannelCurve> {
    let times = ramp_times(start, duration, interval);
    let encoded: Vec<(f64, (u8, u8))> = times
        .into_iter()
        .map(|time| {
            let progress = if duration > 0.0 {
                (time - start) / duration
            } else {
                1.0
            };
            (time, axis.encode(from + (to - from) * curve.apply(progress)))
        })
        .collect();

    let end = start + duration.max(0.0);
    let mut curves = vec![ChannelCurve {
        channel: axis.coarse.number,
        start,
        end,
        samples: encoded
            .iter()
            .map(|(time, (coarse, _))| Sample {
                time: *time,
                value: *coarse,
            })
            .collect(),
        tail: CurveTail::Hold,
    }];
    if let Some(fine) = axis.fine {
        curves.push(ChannelCurve {
            channel: fine.number,
            start,
            end,
            samples: encoded
                .iter()
                .map(|(time, (_, fine))| Sample {
                    time: *time,
                    value: *fine,
                })
                .collect(),
            tail: CurveTail::Hold,
        });
    }
    curves
}
