//! Control surface: JSON commands in, JSON responses out.
//!
//! Every command is validated before it touches state, and every failure is
//! flattened to `{ ok: false, kind, error }` so a transport layer can forward
//! it without knowing the error type.

pub mod actions;
pub mod playback;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{ShowError, ShowResult};
use crate::models::actions::ActionModel;
use crate::runtime::ShowRuntime;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum ControlCommand {
    LoadActions {
        actions: Vec<ActionModel>,
    },
    AddAction {
        action: ActionModel,
    },
    RemoveAction {
        fixture_id: String,
        action_type: String,
        start_time: f64,
    },
    ReplaceAction {
        fixture_id: String,
        action_type: String,
        start_time: f64,
        action: ActionModel,
    },
    ExportActions,
    Render {
        #[serde(default)]
        background: bool,
        #[serde(default)]
        task_id: Option<String>,
    },
    Play,
    Pause,
    Stop,
    Seek {
        time: f64,
    },
    SetLoop {
        enabled: bool,
    },
    SyncAudio {
        position: f64,
    },
    Snapshot,
    ListTasks,
    GetTask {
        task_id: String,
    },
}

impl ControlCommand {
    pub fn from_json(json: &str) -> ShowResult<Self> {
        serde_json::from_str(json).map_err(|e| ShowError::InvalidCommand(e.to_string()))
    }
}

#[derive(TS, Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "commands.ts")]
pub struct ControlResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[ts(type = "unknown")]
    pub data: serde_json::Value,
}

impl ControlResponse {
    pub fn success(data: serde_json::Value) -> Self {
        Self {
            ok: true,
            kind: None,
            error: None,
            data,
        }
    }

    pub fn failure(error: &ShowError) -> Self {
        // A partial render still committed; hand back the report
        let data = match error {
            ShowError::RenderPartialFailure(report) => {
                serde_json::to_value(report.as_ref()).unwrap_or(serde_json::Value::Null)
            }
            _ => serde_json::Value::Null,
        };
        Self {
            ok: false,
            kind: Some(error.kind().to_string()),
            error: Some(error.to_string()),
            data,
        }
    }
}

pub async fn dispatch(runtime: &Arc<ShowRuntime>, command: ControlCommand) -> ControlResponse {
    let result = match command {
        ControlCommand::LoadActions { actions } => actions::load_actions(runtime, actions),
        ControlCommand::AddAction { action } => actions::add_action(runtime, action),
        ControlCommand::RemoveAction {
            fixture_id,
            action_type,
            start_time,
        } => actions::remove_action(runtime, &fixture_id, &action_type, start_time),
        ControlCommand::ReplaceAction {
            fixture_id,
            action_type,
            start_time,
            action,
        } => actions::replace_action(runtime, &fixture_id, &action_type, start_time, action),
        ControlCommand::ExportActions => actions::export_actions(runtime),
        ControlCommand::Render {
            background,
            task_id,
        } => actions::render(runtime, background, task_id).await,
        ControlCommand::Play => playback::play(runtime),
        ControlCommand::Pause => playback::pause(runtime),
        ControlCommand::Stop => playback::stop(runtime),
        ControlCommand::Seek { time } => playback::seek(runtime, time),
        ControlCommand::SetLoop { enabled } => playback::set_loop(runtime, enabled),
        ControlCommand::SyncAudio { position } => playback::sync_audio(runtime, position),
        ControlCommand::Snapshot => playback::snapshot(runtime),
        ControlCommand::ListTasks => actions::list_tasks(runtime),
        ControlCommand::GetTask { task_id } => actions::get_task(runtime, &task_id),
    };

    match result {
        Ok(data) => ControlResponse::success(data),
        Err(e) => {
            log::debug!("[control] {} failed: {}", e.kind(), e);
            ControlResponse::failure(&e)
        }
    }
}

/// Parse and run one JSON command. Malformed input is an `InvalidCommand`
/// response, not an error.
pub async fn handle_json(runtime: &Arc<ShowRuntime>, json: &str) -> ControlResponse {
    match ControlCommand::from_json(json) {
        Ok(command) => dispatch(runtime, command).await,
        Err(e) => ControlResponse::failure(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::fixtures::catalog::{rgb_par, FixtureCatalog};
    use crate::settings::ShowSettings;
    use crate::transport::MemoryTransport;

    fn runtime() -> Arc<ShowRuntime> {
        let catalog = FixtureCatalog::from_fixtures(vec![rgb_par("par1", 0)]).unwrap();
        Arc::new(
            ShowRuntime::new(
                ShowSettings::default(),
                catalog,
                30.0,
                Arc::new(MemoryTransport::new()),
                Arc::new(ManualClock::new()),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn add_render_play_round_trip() {
        let runtime = runtime();
        let add = handle_json(
            &runtime,
            r#"{"command": "addAction", "action": {"fixture_id": "par1", "action_type": "flash", "start_time": 2.0, "duration": 1.0}}"#,
        )
        .await;
        assert!(add.ok, "{:?}", add);

        let render = handle_json(&runtime, r#"{"command": "render"}"#).await;
        assert!(render.ok);
        assert_eq!(render.data["rendered"], 1);

        let seek = handle_json(&runtime, r#"{"command": "seek", "time": 2.5}"#).await;
        assert!(seek.ok);
        let play = handle_json(&runtime, r#"{"command": "play"}"#).await;
        assert_eq!(play.data["status"], "playing");
    }

    #[tokio::test]
    async fn failures_carry_kind() {
        let runtime = runtime();
        let response = handle_json(
            &runtime,
            r#"{"command": "addAction", "action": {"fixture_id": "nope", "action_type": "flash", "start_time": 0.0, "duration": 1.0}}"#,
        )
        .await;
        assert!(!response.ok);
        assert_eq!(response.kind.as_deref(), Some("FixtureNotFound"));

        let response = handle_json(&runtime, r#"{"command": "explode"}"#).await;
        assert_eq!(response.kind.as_deref(), Some("InvalidCommand"));

        let response = handle_json(
            &runtime,
            r#"{"command": "removeAction", "fixture_id": "par1", "action_type": "flash", "start_time": 9.0}"#,
        )
        .await;
        assert_eq!(response.kind.as_deref(), Some("ActionNotFound"));
    }

    #[tokio::test]
    async fn background_render_reports_task_id() {
        let runtime = runtime();
        let response = handle_json(
            &runtime,
            r#"{"command": "render", "background": true, "task_id": "bg-1"}"#,
        )
        .await;
        assert!(response.ok);
        assert_eq!(response.data["taskId"], "bg-1");
    }
}
