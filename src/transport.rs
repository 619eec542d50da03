use std::sync::Mutex;

use crate::error::{ShowError, ShowResult};
use crate::models::universe::DmxFrame;

/// Sink for one full-universe frame per playback tick.
///
/// A failed send is reported, never retried: the next tick supersedes it.
pub trait FrameTransport: Send + Sync {
    fn send_frame(&self, frame: &DmxFrame) -> ShowResult<()>;

    fn name(&self) -> &str;
}

/// Keeps every frame it is handed. Can be told to fail the next few sends.
#[derive(Default)]
pub struct MemoryTransport {
    frames: Mutex<Vec<DmxFrame>>,
    failures_pending: Mutex<usize>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, count: usize) {
        *self.failures_pending.lock().expect("transport poisoned") = count;
    }

    pub fn frames(&self) -> Vec<DmxFrame> {
        self.frames.lock().expect("transport poisoned").clone()
    }

    pub fn last_frame(&self) -> Option<DmxFrame> {
        self.frames.lock().expect("transport poisoned").last().copied()
    }
}

impl FrameTransport for MemoryTransport {
    fn send_frame(&self, frame: &DmxFrame) -> ShowResult<()> {
        {
            let mut pending = self.failures_pending.lock().expect("transport poisoned");
            if *pending > 0 {
                *pending -= 1;
                return Err(ShowError::TransportFailure("simulated send failure".into()));
            }
        }
        self.frames.lock().expect("transport poisoned").push(*frame);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Logs a summary of lit channels at trace level and drops the frame.
#[derive(Default)]
pub struct DryRunTransport;

impl FrameTransport for DryRunTransport {
    fn send_frame(&self, frame: &DmxFrame) -> ShowResult<()> {
        log::trace!("[dry-run] {:?}", frame);
        Ok(())
    }

    fn name(&self) -> &str {
        "dry-run"
    }
}
