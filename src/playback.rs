//! Playback Engine
//!
//! `Stopped -> Playing -> Paused -> Playing -> Stopped`. While playing, each
//! tick derives the playhead from the clock (`anchor_time + elapsed since
//! anchor`), samples the committed canvas there and hands the frame to the
//! transport. Because elapsed wall time drives the playhead, a late tick just
//! sees a bigger delta and jitter never accumulates.
//!
//! Ticks and control calls share one lock, so a seek is never followed by a
//! frame for the old position. The canvas itself is read lock-free from the
//! last committed snapshot.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant as TokioInstant};

use crate::canvas::CanvasHandle;
use crate::clock::Clock;
use crate::error::{ShowError, ShowResult};
use crate::events::{EventBus, ShowEvent};
use crate::models::playback::{PlaybackSnapshot, PlaybackStatus};
use crate::models::universe::DmxFrame;
use crate::settings::ShowSettings;
use crate::transport::FrameTransport;

/// Snapshots go out on every Nth tick
const SNAPSHOT_EVERY: u64 = 4;
/// Log the first transport failure and then every Nth
const FAILURE_LOG_EVERY: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackConfig {
    pub frame_rate: f64,
    pub blackout_at_end: bool,
    /// Seconds of disagreement with the audio clock tolerated before
    /// re-anchoring
    pub drift_tolerance: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            frame_rate: 60.0,
            blackout_at_end: true,
            drift_tolerance: 0.02,
        }
    }
}

impl PlaybackConfig {
    pub fn from_settings(settings: &ShowSettings) -> Self {
        Self {
            frame_rate: settings.frame_rate,
            blackout_at_end: settings.blackout_at_end,
            drift_tolerance: settings.drift_tolerance_ms / 1000.0,
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Not playing; nothing sent
    Idle,
    Emitted { time: f64 },
    /// Ran past the end with looping on; frame sent for the wrapped time
    Looped { time: f64 },
    /// Ran past the end; now stopped
    Ended,
}

#[derive(Clone)]
pub struct PlaybackEngine {
    inner: Arc<Mutex<PlaybackInner>>,
    canvas: CanvasHandle,
    transport: Arc<dyn FrameTransport>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    config: PlaybackConfig,
}

struct PlaybackInner {
    status: PlaybackStatus,
    current_time: f64,
    /// Playhead position at `anchor_instant`
    anchor_time: f64,
    anchor_instant: Option<Duration>,
    loop_enabled: bool,
    ticks: u64,
    frames_emitted: u64,
    transport_failures: u64,
    last_frame: DmxFrame,
}

impl PlaybackInner {
    fn position(&self, now: Duration) -> f64 {
        match (self.status, self.anchor_instant) {
            (PlaybackStatus::Playing, Some(anchor)) => {
                self.anchor_time + now.saturating_sub(anchor).as_secs_f64()
            }
            _ => self.current_time,
        }
    }

    fn anchor(&mut self, time: f64, now: Duration) {
        self.current_time = time;
        self.anchor_time = time;
        self.anchor_instant = Some(now);
    }
}

impl PlaybackEngine {
    pub fn new(
        canvas: CanvasHandle,
        transport: Arc<dyn FrameTransport>,
        clock: Arc<dyn Clock>,
        events: EventBus,
        config: PlaybackConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PlaybackInner {
                status: PlaybackStatus::Stopped,
                current_time: 0.0,
                anchor_time: 0.0,
                anchor_instant: None,
                loop_enabled: false,
                ticks: 0,
                frames_emitted: 0,
                transport_failures: 0,
                last_frame: DmxFrame::blackout(),
            })),
            canvas,
            transport,
            clock,
            events,
            config,
        }
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.config.frame_rate.clamp(1.0, 240.0))
    }

    fn duration(&self) -> f64 {
        self.canvas.load().duration()
    }

    pub fn play(&self) -> ShowResult<PlaybackSnapshot> {
        let duration = self.duration();
        if duration <= 0.0 {
            return Err(ShowError::InvalidCommand(
                "Canvas is empty; nothing to play".into(),
            ));
        }
        let snapshot = {
            let mut guard = self.inner.lock().expect("playback state poisoned");
            if guard.status != PlaybackStatus::Playing {
                let start = if guard.current_time >= duration {
                    0.0
                } else {
                    guard.current_time
                };
                guard.anchor(start, self.clock.now());
                guard.status = PlaybackStatus::Playing;
                log::info!("[playback] playing from {:.3}s", start);
            }
            self.snapshot_locked(&guard, duration)
        };
        self.events.publish(ShowEvent::Playback(snapshot.clone()));
        Ok(snapshot)
    }

    pub fn pause(&self) -> PlaybackSnapshot {
        let duration = self.duration();
        let snapshot = {
            let mut guard = self.inner.lock().expect("playback state poisoned");
            if guard.status == PlaybackStatus::Playing {
                guard.current_time = guard.position(self.clock.now()).min(duration);
                guard.anchor_time = guard.current_time;
                guard.anchor_instant = None;
                guard.status = PlaybackStatus::Paused;
                log::info!("[playback] paused at {:.3}s", guard.current_time);
            }
            self.snapshot_locked(&guard, duration)
        };
        self.events.publish(ShowEvent::Playback(snapshot.clone()));
        snapshot
    }

    /// Move the playhead. While playing, the next tick samples exactly `time`
    /// plus whatever wall time passes in between.
    pub fn seek(&self, time: f64) -> ShowResult<PlaybackSnapshot> {
        if !time.is_finite() {
            return Err(ShowError::InvalidCommand(format!(
                "Cannot seek to {}",
                time
            )));
        }
        let duration = self.duration();
        let target = time.clamp(0.0, duration.max(0.0));
        let snapshot = {
            let mut guard = self.inner.lock().expect("playback state poisoned");
            if guard.status == PlaybackStatus::Playing {
                guard.anchor(target, self.clock.now());
            } else {
                guard.current_time = target;
                guard.anchor_time = target;
            }
            log::debug!("[playback] seek to {:.3}s", target);
            self.snapshot_locked(&guard, duration)
        };
        self.events.publish(ShowEvent::Playback(snapshot.clone()));
        Ok(snapshot)
    }

    /// Back to 0 and Stopped; sends a blackout frame.
    pub fn stop(&self) -> PlaybackSnapshot {
        let duration = self.duration();
        let snapshot = {
            let mut guard = self.inner.lock().expect("playback state poisoned");
            guard.status = PlaybackStatus::Stopped;
            guard.current_time = 0.0;
            guard.anchor_time = 0.0;
            guard.anchor_instant = None;
            self.emit(&mut guard, DmxFrame::blackout());
            log::info!("[playback] stopped");
            self.snapshot_locked(&guard, duration)
        };
        self.events.publish(ShowEvent::Playback(snapshot.clone()));
        snapshot
    }

    pub fn set_loop(&self, enabled: bool) -> PlaybackSnapshot {
        let duration = self.duration();
        let snapshot = {
            let mut guard = self.inner.lock().expect("playback state poisoned");
            guard.loop_enabled = enabled;
            self.snapshot_locked(&guard, duration)
        };
        self.events.publish(ShowEvent::Playback(snapshot.clone()));
        snapshot
    }

    /// Report the audio player's position. If the playhead has drifted from
    /// it by more than the tolerance, re-anchor on the audio position.
    /// Returns whether a correction was made.
    pub fn sync_to_audio(&self, audio_position: f64) -> bool {
        if !audio_position.is_finite() {
            return false;
        }
        let duration = self.duration();
        let mut guard = self.inner.lock().expect("playback state poisoned");
        if guard.status != PlaybackStatus::Playing {
            return false;
        }
        let now = self.clock.now();
        let drift = guard.position(now) - audio_position;
        if drift.abs() <= self.config.drift_tolerance {
            return false;
        }
        log::debug!(
            "[playback] drifted {:+.1}ms from audio, re-anchoring",
            drift * 1000.0
        );
        guard.anchor(audio_position.clamp(0.0, duration.max(0.0)), now);
        true
    }

    /// One sampling step. Called by the tick loop at the frame rate, or
    /// directly in tests.
    pub fn tick(&self) -> TickOutcome {
        let canvas = self.canvas.load();
        let duration = canvas.duration();

        let (outcome, snapshot) = {
            let mut guard = self.inner.lock().expect("playback state poisoned");
            if guard.status != PlaybackStatus::Playing {
                return TickOutcome::Idle;
            }

            let now = self.clock.now();
            let position = guard.position(now);
            let outcome = if position < duration {
                guard.current_time = position;
                self.emit(&mut guard, canvas.get_frame(position));
                TickOutcome::Emitted { time: position }
            } else if guard.loop_enabled && duration > 0.0 {
                let wrapped = position % duration;
                guard.anchor(wrapped, now);
                self.emit(&mut guard, canvas.get_frame(wrapped));
                log::debug!("[playback] looped to {:.3}s", wrapped);
                TickOutcome::Looped { time: wrapped }
            } else {
                guard.status = PlaybackStatus::Stopped;
                guard.current_time = duration;
                guard.anchor_time = duration;
                guard.anchor_instant = None;
                if self.config.blackout_at_end {
                    self.emit(&mut guard, DmxFrame::blackout());
                }
                log::info!("[playback] reached end of song at {:.3}s", duration);
                TickOutcome::Ended
            };

            guard.ticks += 1;
            let publish = outcome == TickOutcome::Ended || guard.ticks % SNAPSHOT_EVERY == 0;
            (outcome, publish.then(|| self.snapshot_locked(&guard, duration)))
        };

        if let Some(snapshot) = snapshot {
            self.events.publish(ShowEvent::Playback(snapshot));
        }
        outcome
    }

    fn emit(&self, guard: &mut PlaybackInner, frame: DmxFrame) {
        guard.last_frame = frame;
        match self.transport.send_frame(&frame) {
            Ok(()) => guard.frames_emitted += 1,
            Err(e) => {
                guard.transport_failures += 1;
                let failures = guard.transport_failures;
                if failures == 1 || failures % FAILURE_LOG_EVERY == 0 {
                    log::warn!(
                        "[playback] {} send failed ({} so far): {}",
                        self.transport.name(),
                        failures,
                        e
                    );
                }
            }
        }
    }

    pub fn status(&self) -> PlaybackStatus {
        self.inner.lock().expect("playback state poisoned").status
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        let duration = self.duration();
        let guard = self.inner.lock().expect("playback state poisoned");
        self.snapshot_locked(&guard, duration)
    }

    fn snapshot_locked(&self, guard: &PlaybackInner, duration: f64) -> PlaybackSnapshot {
        PlaybackSnapshot {
            status: guard.status,
            current_time: guard.position(self.clock.now()).clamp(0.0, duration.max(0.0)),
            duration_seconds: duration,
            frame_rate: self.config.frame_rate,
            loop_enabled: guard.loop_enabled,
            frames_emitted: guard.frames_emitted,
            transport_failures: guard.transport_failures,
            universe: guard.last_frame.as_bytes().to_vec(),
        }
    }

    /// Run `tick` at the frame rate on the tokio runtime until shut down.
    /// Deadlines are absolute; if the loop falls behind it skips ahead
    /// rather than bursting to catch up.
    pub fn spawn_tick_loop(&self) -> PlaybackLoop {
        let engine = self.clone();
        let interval = self.frame_interval();
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut deadline = TokioInstant::now();
            loop {
                deadline += interval;
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = sleep_until(deadline) => {}
                }
                engine.tick();
                let now = TokioInstant::now();
                if now > deadline + interval {
                    deadline = now;
                }
            }
            log::debug!("[playback] tick loop stopped");
        });

        PlaybackLoop { shutdown, handle }
    }
}

pub struct PlaybackLoop {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PlaybackLoop {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            log::error!("[playback] tick loop panicked: {}", e);
        }
    }
}
