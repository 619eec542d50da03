//! Timeline Canvas
//!
//! Per-channel step functions over `[0, duration]`. Each channel is an ordered
//! map from time key to value; the value at `t` is the entry at or before `t`,
//! or the channel default when nothing was painted that early.
//!
//! Painting overwrites the painted window on the affected channels, so the
//! observed value at any instant comes from the last paint call whose window
//! covers it. Overlap between actions is therefore resolved by paint order,
//! and the renderer paints in Actions Sheet insertion order.
//!
//! Coverage is the window only. Every entry remembers the end of the window
//! that painted it. Once a later curve's window is over, an earlier window
//! still covering that instant shows again. Past every window a channel
//! shows the tail of the last window before it: the resting value for
//! restore curves, the final sample for hold curves.
//!
//! The playback side never sees a canvas being painted: renders build a new
//! canvas and publish it through a [`CanvasHandle`] in one store.

use arc_swap::ArcSwap;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::compiler::{ChannelCurve, CompiledAction, CurveTail, Sample};
use crate::error::{ShowError, ShowResult};
use crate::models::universe::{time_key, DmxFrame, TimeKey, UNIVERSE_SIZE};

/// Shared, atomically swappable canvas. Readers `load()` a snapshot and keep
/// it for as long as they need; writers `store()` a complete replacement.
pub type CanvasHandle = Arc<ArcSwap<TimelineCanvas>>;

pub fn shared(canvas: TimelineCanvas) -> CanvasHandle {
    Arc::new(ArcSwap::from_pointee(canvas))
}

/// One painted value and the last key of the window that painted it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Step {
    value: u8,
    window_end: Option<TimeKey>,
}

impl Step {
    fn covers(&self, key: TimeKey) -> bool {
        self.window_end.map_or(false, |end| key <= end)
    }
}

type Track = BTreeMap<TimeKey, Step>;

#[derive(Clone, Debug, PartialEq)]
pub struct TimelineCanvas {
    duration: f64,
    resolution: f64,
    defaults: DmxFrame,
    tracks: Vec<Track>,
}

impl TimelineCanvas {
    /// Empty canvas for a song of `duration` seconds. `resolution` is the
    /// sampling step used by [`paint_range`](Self::paint_range).
    pub fn new(duration: f64, resolution: f64) -> Self {
        Self {
            duration: if duration.is_finite() { duration.max(0.0) } else { 0.0 },
            resolution: if resolution.is_finite() && resolution > 0.0 {
                resolution
            } else {
                1.0 / 120.0
            },
            defaults: DmxFrame::blackout(),
            tracks: vec![Track::new(); UNIVERSE_SIZE],
        }
    }

    pub fn with_defaults(mut self, defaults: DmxFrame) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn defaults(&self) -> &DmxFrame {
        &self.defaults
    }

    /// Total stored paint entries across all channels.
    pub fn sample_count(&self) -> usize {
        self.tracks.iter().map(|t| t.len()).sum()
    }

    fn check_window(&self, start: f64, end: f64) -> ShowResult<()> {
        let out_of_bounds = || ShowError::OutOfBounds {
            start,
            end,
            duration: self.duration,
        };
        if !start.is_finite() || !end.is_finite() || start < 0.0 || end < start {
            return Err(out_of_bounds());
        }
        if time_key(end) > time_key(self.duration) {
            return Err(out_of_bounds());
        }
        Ok(())
    }

    fn check_channel(channel: u16) -> ShowResult<()> {
        if channel as usize >= UNIVERSE_SIZE {
            return Err(ShowError::InvalidCommand(format!(
                "Channel {} is outside the universe",
                channel
            )));
        }
        Ok(())
    }

    /// Exact values at one instant. Afterwards they hold until the next
    /// painted entry, unless an earlier window still covers the channel.
    pub fn paint_frame(&mut self, time: f64, channel_values: &[(u16, u8)]) -> ShowResult<()> {
        self.check_window(time, time)?;
        for (channel, _) in channel_values {
            Self::check_channel(*channel)?;
        }
        for (channel, value) in channel_values {
            self.apply_curve(&ChannelCurve {
                channel: *channel,
                start: time,
                end: time,
                samples: vec![Sample {
                    time,
                    value: *value,
                }],
                tail: CurveTail::Hold,
            });
        }
        Ok(())
    }

    /// Sample `value_function` every `resolution` seconds across
    /// `[start, end)`. After `end` the channel reverts to what was there
    /// before, or its default.
    pub fn paint_range<F>(&mut self, channel: u16, start: f64, end: f64, value_function: F) -> ShowResult<()>
    where
        F: Fn(f64) -> u8,
    {
        self.check_window(start, end)?;
        Self::check_channel(channel)?;

        let mut samples = Vec::new();
        let mut i = 0usize;
        loop {
            let time = start + i as f64 * self.resolution;
            if time_key(time) >= time_key(end) {
                break;
            }
            samples.push(Sample {
                time,
                value: value_function(time),
            });
            i += 1;
        }

        let curve = ChannelCurve {
            channel,
            start,
            end,
            samples,
            tail: CurveTail::Restore {
                resting: self.defaults.get(channel),
            },
        };
        self.apply_curve(&curve);
        Ok(())
    }

    pub fn paint_curve(&mut self, curve: &ChannelCurve) -> ShowResult<()> {
        self.check_window(curve.start, curve.end)?;
        Self::check_channel(curve.channel)?;
        self.apply_curve(curve);
        Ok(())
    }

    /// Paint every curve of one action, or none of them.
    pub fn paint_compiled(&mut self, action: &CompiledAction) -> ShowResult<()> {
        for curve in &action.curves {
            self.check_window(curve.start, curve.end)?;
            Self::check_channel(curve.channel)?;
        }
        for curve in &action.curves {
            self.apply_curve(curve);
        }
        Ok(())
    }

    fn apply_curve(&mut self, curve: &ChannelCurve) {
        let track = &mut self.tracks[curve.channel as usize];
        let start = time_key(curve.start);
        let end = time_key(curve.end);

        match curve.tail {
            CurveTail::Restore { resting } if end > start => {
                let prior = step_at(track, end);
                remove_window(track, start, end);
                track.entry(end).or_insert(prior.unwrap_or(Step {
                    value: resting,
                    window_end: None,
                }));
                for sample in &curve.samples {
                    let key = time_key(sample.time);
                    if key >= start && key < end {
                        track.insert(
                            key,
                            Step {
                                value: sample.value,
                                window_end: Some(end - 1),
                            },
                        );
                    }
                }
            }
            _ => {
                let after = end.saturating_add(1);
                let resume = step_at(track, after).filter(|step| step.covers(after));
                remove_window(track, start, after);
                for sample in &curve.samples {
                    let key = time_key(sample.time);
                    if key >= start && key <= end {
                        track.insert(
                            key,
                            Step {
                                value: sample.value,
                                window_end: Some(end),
                            },
                        );
                    }
                }
                if let Some(step) = resume {
                    track.entry(after).or_insert(step);
                }
            }
        }
    }

    /// Drop all paint history in `[start, end)` on every channel. Inside the
    /// window the channel falls back to whatever was painted before `start`
    /// (or its default); values from `end` on are unchanged.
    pub fn clear_range(&mut self, start: f64, end: f64) -> ShowResult<()> {
        self.check_window(start, end)?;
        let start = time_key(start);
        let end = time_key(end);
        if end <= start {
            return Ok(());
        }
        for track in &mut self.tracks {
            if track.is_empty() {
                continue;
            }
            let prior = step_at(track, end);
            remove_window(track, start, end);
            if let Some(step) = prior {
                track.entry(end).or_insert(step);
            }
        }
        Ok(())
    }

    /// Like [`clear_range`](Self::clear_range) but also drops entries at
    /// exactly `end`, so nothing painted inside `[start, end]` survives.
    /// Used before re-rendering a span.
    pub fn clear_through(&mut self, start: f64, end: f64) -> ShowResult<()> {
        self.check_window(start, end)?;
        let start = time_key(start);
        let end = time_key(end).saturating_add(1);
        for track in &mut self.tracks {
            remove_window(track, start, end);
        }
        Ok(())
    }

    pub fn value_at(&self, channel: u16, time: f64) -> u8 {
        match self.tracks.get(channel as usize) {
            Some(track) => value_entry(track, time_key(time))
                .unwrap_or_else(|| self.defaults.get(channel)),
            None => 0,
        }
    }

    /// Full universe at `time`: per channel, the last entry at or before
    /// `time`, or the channel default.
    pub fn get_frame(&self, time: f64) -> DmxFrame {
        let key = time_key(time);
        let mut frame = self.defaults;
        for (channel, track) in self.tracks.iter().enumerate() {
            if let Some(value) = value_entry(track, key) {
                frame.0[channel] = value;
            }
        }
        frame
    }

    /// SHA-256 over duration, defaults and every stored entry.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(time_key(self.duration).to_le_bytes());
        hasher.update(self.defaults.as_bytes());
        for (channel, track) in self.tracks.iter().enumerate() {
            if track.is_empty() {
                continue;
            }
            hasher.update((channel as u16).to_le_bytes());
            for (key, step) in track {
                hasher.update(key.to_le_bytes());
                hasher.update([step.value]);
                hasher.update(step.window_end.unwrap_or(u64::MAX).to_le_bytes());
            }
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Entry in effect at `key`: `None` if nothing was ever painted at or before it.
fn step_at(track: &Track, key: TimeKey) -> Option<Step> {
    track.range(..=key).next_back().map(|(_, step)| *step)
}

fn value_entry(track: &Track, key: TimeKey) -> Option<u8> {
    step_at(track, key).map(|step| step.value)
}

/// Remove every key in `[start, end)`.
fn remove_window(track: &mut Track, start: TimeKey, end: TimeKey) {
    if end <= start {
        return;
    }
    let mut tail = track.split_off(&start);
    let mut after = tail.split_off(&end);
    track.append(&mut after);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canvas() -> TimelineCanvas {
        TimelineCanvas::new(10.0, 0.01)
    }

    fn restore_curve(channel: u16, start: f64, end: f64, value: u8) -> ChannelCurve {
        ChannelCurve {
            channel,
            start,
            end,
            samples: vec![Sample { time: start, value }],
            tail: CurveTail::Restore { resting: 0 },
        }
    }

    #[test]
    fn unpainted_channels_report_defaults() {
        let mut defaults = DmxFrame::blackout();
        defaults.set(3, 42);
        let canvas = canvas().with_defaults(defaults);
        assert_eq!(canvas.get_frame(5.0).get(3), 42);
        assert_eq!(canvas.get_frame(5.0).get(4), 0);
    }

    #[test]
    fn paint_frame_is_exact_at_its_instant_and_holds() {
        let mut canvas = canvas();
        canvas.paint_frame(2.0, &[(1, 100), (2, 200)]).unwrap();
        assert_eq!(canvas.get_frame(2.0).get(1), 100);
        assert_eq!(canvas.get_frame(1.999).get(1), 0);
        assert_eq!(canvas.get_frame(7.0).get(2), 200);
    }

    #[test]
    fn painting_outside_duration_is_rejected() {
        let mut canvas = canvas();
        assert_eq!(
            canvas.paint_frame(10.5, &[(0, 1)]).unwrap_err().kind(),
            "OutOfBounds"
        );
        assert!(canvas.paint_range(0, 9.0, 11.0, |_| 1).is_err());
        assert!(canvas.paint_curve(&restore_curve(0, -1.0, 1.0, 5)).is_err());
        assert_eq!(canvas.sample_count(), 0);
    }

    #[test]
    fn paint_range_samples_at_resolution_then_reverts() {
        let mut canvas = canvas();
        canvas
            .paint_range(0, 1.0, 2.0, |t| ((t - 1.0) * 255.0) as u8)
            .unwrap();
        assert_eq!(canvas.value_at(0, 1.0), 0);
        assert_eq!(canvas.value_at(0, 1.5), 127);
        // Held between samples
        assert_eq!(canvas.value_at(0, 1.505), 127);
        assert_eq!(canvas.value_at(0, 2.0), 0);
        // 100 samples across [1, 2) plus the revert entry
        assert_eq!(canvas.sample_count(), 101);
    }

    #[test]
    fn later_paint_wins_on_overlap_and_earlier_resumes_after() {
        let mut canvas = canvas();
        canvas.paint_curve(&restore_curve(5, 0.0, 4.0, 255)).unwrap();
        canvas.paint_curve(&restore_curve(5, 1.0, 2.0, 100)).unwrap();
        assert_eq!(canvas.value_at(5, 0.5), 255);
        assert_eq!(canvas.value_at(5, 1.0), 100);
        assert_eq!(canvas.value_at(5, 1.9), 100);
        // Earlier, longer paint still covers 2..4
        assert_eq!(canvas.value_at(5, 3.0), 255);
        assert_eq!(canvas.value_at(5, 4.0), 0);

        // Reverse order: the long paint overwrites the short one entirely
        let mut canvas = TimelineCanvas::new(10.0, 0.01);
        canvas.paint_curve(&restore_curve(5, 1.0, 2.0, 100)).unwrap();
        canvas.paint_curve(&restore_curve(5, 0.0, 4.0, 255)).unwrap();
        assert_eq!(canvas.value_at(5, 1.5), 255);
    }

    #[test]
    fn hold_curves_keep_final_value() {
        let mut canvas = canvas();
        let curve = ChannelCurve {
            channel: 0,
            start: 1.0,
            end: 2.0,
            samples: vec![
                Sample { time: 1.0, value: 0 },
                Sample { time: 2.0, value: 255 },
            ],
            tail: CurveTail::Hold,
        };
        canvas.paint_curve(&curve).unwrap();
        assert_eq!(canvas.value_at(0, 2.0), 255);
        assert_eq!(canvas.value_at(0, 9.0), 255);
    }

    #[test]
    fn earlier_window_shows_again_after_a_shorter_hold() {
        let mut canvas = canvas();
        canvas.paint_curve(&restore_curve(0, 1.0, 3.0, 100)).unwrap();
        let fade = ChannelCurve {
            channel: 0,
            start: 0.0,
            end: 2.0,
            samples: vec![
                Sample { time: 0.0, value: 0 },
                Sample { time: 2.0, value: 255 },
            ],
            tail: CurveTail::Hold,
        };
        canvas.paint_curve(&fade).unwrap();
        assert_eq!(canvas.value_at(0, 1.5), 0);
        assert_eq!(canvas.value_at(0, 2.0), 255);
        // The flash window runs to 3.0 and is not covered by the fade past 2.0
        assert_eq!(canvas.value_at(0, 2.5), 100);
        assert_eq!(canvas.value_at(0, 3.5), 0);
    }

    #[test]
    fn hold_tail_wins_over_an_expired_window() {
        let mut canvas = canvas();
        canvas.paint_curve(&restore_curve(0, 1.0, 2.0, 100)).unwrap();
        let hold = ChannelCurve {
            channel: 0,
            start: 0.5,
            end: 1.5,
            samples: vec![Sample { time: 1.5, value: 30 }],
            tail: CurveTail::Hold,
        };
        canvas.paint_curve(&hold).unwrap();
        assert_eq!(canvas.value_at(0, 1.7), 100);
        // Past the flash window the restore entry is the last paint
        assert_eq!(canvas.value_at(0, 2.5), 0);

        let mut canvas = TimelineCanvas::new(10.0, 0.01);
        canvas.paint_curve(&restore_curve(0, 1.0, 2.0, 100)).unwrap();
        canvas.paint_curve(&ChannelCurve { start: 0.5, end: 2.5, ..hold }).unwrap();
        assert_eq!(canvas.value_at(0, 1.2), 0);
        assert_eq!(canvas.value_at(0, 2.0), 30);
        assert_eq!(canvas.value_at(0, 6.0), 30);
    }

    #[test]
    fn paint_frame_inside_a_window_does_not_end_it() {
        let mut canvas = canvas();
        canvas.paint_curve(&restore_curve(0, 1.0, 3.0, 100)).unwrap();
        canvas.paint_frame(2.0, &[(0, 7)]).unwrap();
        assert_eq!(canvas.value_at(0, 2.0), 7);
        assert_eq!(canvas.value_at(0, 2.5), 100);
        assert_eq!(canvas.value_at(0, 3.0), 0);
    }

    #[test]
    fn clear_range_drops_window_history_only() {
        let mut canvas = canvas();
        canvas.paint_frame(0.0, &[(0, 50)]).unwrap();
        canvas.paint_curve(&restore_curve(0, 2.0, 6.0, 200)).unwrap();
        canvas.clear_range(2.0, 4.0).unwrap();
        assert_eq!(canvas.value_at(0, 1.0), 50);
        assert_eq!(canvas.value_at(0, 3.0), 50);
        assert_eq!(canvas.value_at(0, 4.0), 200);
        assert_eq!(canvas.value_at(0, 6.0), 50);
    }

    #[test]
    fn clear_through_removes_end_entry_too() {
        let mut canvas = canvas();
        let hold = ChannelCurve {
            channel: 0,
            start: 1.0,
            end: 3.0,
            samples: vec![
                Sample { time: 1.0, value: 10 },
                Sample { time: 3.0, value: 200 },
            ],
            tail: CurveTail::Hold,
        };
        canvas.paint_curve(&hold).unwrap();
        canvas.clear_through(1.0, 3.0).unwrap();
        assert_eq!(canvas.sample_count(), 0);
        assert_eq!(canvas.value_at(0, 5.0), 0);
    }

    #[test]
    fn paint_compiled_is_all_or_nothing() {
        let mut canvas = canvas();
        let action = CompiledAction {
            key: crate::models::actions::ActionKey::new("a", "flash", 9.0),
            start: 9.0,
            end: 11.0,
            curves: vec![restore_curve(0, 9.0, 9.5, 10), restore_curve(1, 9.0, 11.0, 10)],
        };
        assert!(canvas.paint_compiled(&action).is_err());
        assert_eq!(canvas.sample_count(), 0);
    }

    #[test]
    fn digest_tracks_content() {
        let mut a = canvas();
        let mut b = canvas();
        assert_eq!(a.digest(), b.digest());
        a.paint_frame(1.0, &[(0, 1)]).unwrap();
        assert_ne!(a.digest(), b.digest());
        b.paint_frame(1.0, &[(0, 1)]).unwrap();
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn handle_swap_is_atomic_for_readers() {
        let handle = shared(canvas());
        let before = handle.load_full();
        let mut next = (*before).clone();
        next.paint_frame(0.0, &[(0, 255)]).unwrap();
        handle.store(Arc::new(next));
        // A reader holding the old snapshot keeps seeing the old canvas
        assert_eq!(before.get_frame(0.0).get(0), 0);
        assert_eq!(handle.load().get_frame(0.0).get(0), 255);
    }
}
