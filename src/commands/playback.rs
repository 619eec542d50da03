//! Transport commands for the Playback Engine

use serde_json::{json, Value};

use crate::error::ShowResult;
use crate::runtime::ShowRuntime;

pub fn play(runtime: &ShowRuntime) -> ShowResult<Value> {
    Ok(serde_json::to_value(runtime.playback().play()?)?)
}

pub fn pause(runtime: &ShowRuntime) -> ShowResult<Value> {
    Ok(serde_json::to_value(runtime.playback().pause())?)
}

pub fn stop(runtime: &ShowRuntime) -> ShowResult<Value> {
    Ok(serde_json::to_value(runtime.playback().stop())?)
}

pub fn seek(runtime: &ShowRuntime, time: f64) -> ShowResult<Value> {
    Ok(serde_json::to_value(runtime.playback().seek(time)?)?)
}

pub fn set_loop(runtime: &ShowRuntime, enabled: bool) -> ShowResult<Value> {
    Ok(serde_json::to_value(runtime.playback().set_loop(enabled))?)
}

pub fn sync_audio(runtime: &ShowRuntime, position: f64) -> ShowResult<Value> {
    let corrected = runtime.playback().sync_to_audio(position);
    Ok(json!({ "corrected": corrected }))
}

pub fn snapshot(runtime: &ShowRuntime) -> ShowResult<Value> {
    Ok(serde_json::to_value(runtime.playback().snapshot())?)
}
