//! Commands for Actions Sheet edits, renders and render tasks

use std::sync::Arc;

use serde_json::{json, Value};

use crate::error::{ShowError, ShowResult};
use crate::models::actions::{ActionKey, ActionModel};
use crate::runtime::ShowRuntime;

pub fn load_actions(runtime: &ShowRuntime, actions: Vec<ActionModel>) -> ShowResult<Value> {
    let count = runtime.load_actions(actions)?;
    Ok(json!({ "count": count }))
}

pub fn add_action(runtime: &ShowRuntime, action: ActionModel) -> ShowResult<Value> {
    let count = runtime.add_action(action)?;
    Ok(json!({ "count": count }))
}

pub fn remove_action(
    runtime: &ShowRuntime,
    fixture_id: &str,
    action_type: &str,
    start_time: f64,
) -> ShowResult<Value> {
    let removed = runtime.remove_action(&ActionKey::new(fixture_id, action_type, start_time))?;
    Ok(serde_json::to_value(removed)?)
}

pub fn replace_action(
    runtime: &ShowRuntime,
    fixture_id: &str,
    action_type: &str,
    start_time: f64,
    action: ActionModel,
) -> ShowResult<Value> {
    let previous = runtime.replace_action(
        &ActionKey::new(fixture_id, action_type, start_time),
        action,
    )?;
    Ok(serde_json::to_value(previous)?)
}

pub fn export_actions(runtime: &ShowRuntime) -> ShowResult<Value> {
    Ok(serde_json::to_value(runtime.sheet())?)
}

/// Foreground renders run on the blocking pool and answer with the report;
/// background renders answer with the task id and report through task
/// events.
pub async fn render(
    runtime: &Arc<ShowRuntime>,
    background: bool,
    task_id: Option<String>,
) -> ShowResult<Value> {
    if background {
        let (task_id, _handle) = runtime.spawn_background_render(task_id)?;
        return Ok(json!({ "taskId": task_id }));
    }

    let worker = Arc::clone(runtime);
    let report = tokio::task::spawn_blocking(move || worker.render_now())
        .await
        .map_err(|e| ShowError::TaskFailure {
            task_id: "render".to_string(),
            message: e.to_string(),
        })?
        .into_result()?;
    Ok(serde_json::to_value(report)?)
}

pub fn list_tasks(runtime: &ShowRuntime) -> ShowResult<Value> {
    Ok(serde_json::to_value(runtime.tasks().list())?)
}

pub fn get_task(runtime: &ShowRuntime, task_id: &str) -> ShowResult<Value> {
    Ok(serde_json::to_value(runtime.tasks().get(task_id)?)?)
}
