//! Process-wide show state: catalog, Actions Sheet, renderer, player, task
//! registry and event bus, wired together from `ShowSettings`. Control
//! commands are thin wrappers over the methods here.

use std::path::Path;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use crate::canvas::{self, TimelineCanvas};
use crate::clock::Clock;
use crate::compiler::CompileOptions;
use crate::error::{ShowError, ShowResult};
use crate::events::EventBus;
use crate::fixtures::catalog::FixtureCatalog;
use crate::models::actions::{ActionKey, ActionModel};
use crate::playback::{PlaybackConfig, PlaybackEngine};
use crate::render_engine::{RenderEngine, RenderReport};
use crate::settings::ShowSettings;
use crate::sheet::ActionsSheet;
use crate::tasks::{
    new_task_id, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore, TaskTracker,
};
use crate::transport::FrameTransport;

pub struct ShowRuntime {
    settings: ShowSettings,
    sheet: Mutex<ActionsSheet>,
    renderer: Arc<RenderEngine>,
    playback: PlaybackEngine,
    tasks: Arc<TaskTracker>,
    events: EventBus,
}

impl ShowRuntime {
    /// Runtime for one song of `duration` seconds.
    pub fn new(
        settings: ShowSettings,
        catalog: FixtureCatalog,
        duration: f64,
        transport: Arc<dyn FrameTransport>,
        clock: Arc<dyn Clock>,
    ) -> ShowResult<Self> {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(ShowError::InvalidCommand(format!(
                "Song length must be positive, got {}",
                duration
            )));
        }

        let events = EventBus::new();
        let store: Arc<dyn CheckpointStore> = match &settings.checkpoint_dir {
            Some(dir) => Arc::new(FileCheckpointStore::new(dir)?),
            None => Arc::new(MemoryCheckpointStore::new()),
        };
        let tasks = Arc::new(TaskTracker::new(store, events.clone()));

        let options = CompileOptions::for_frame_rate(settings.frame_rate);
        let canvas = canvas::shared(
            TimelineCanvas::new(duration, options.sample_interval)
                .with_defaults(catalog.resting_frame()),
        );
        let renderer = Arc::new(RenderEngine::new(
            Arc::new(catalog),
            canvas.clone(),
            options,
            events.clone(),
        ));
        let playback = PlaybackEngine::new(
            canvas,
            transport,
            clock,
            events.clone(),
            PlaybackConfig::from_settings(&settings),
        );

        Ok(Self {
            settings,
            sheet: Mutex::new(ActionsSheet::new()),
            renderer,
            playback,
            tasks,
            events,
        })
    }

    pub fn settings(&self) -> &ShowSettings {
        &self.settings
    }

    pub fn renderer(&self) -> &RenderEngine {
        &self.renderer
    }

    pub fn playback(&self) -> &PlaybackEngine {
        &self.playback
    }

    pub fn tasks(&self) -> &TaskTracker {
        &self.tasks
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Copy of the current sheet.
    pub fn sheet(&self) -> ActionsSheet {
        self.sheet.lock().expect("actions sheet poisoned").clone()
    }

    /// Replace the whole sheet. All entries are validated first; on any
    /// failure the current sheet is left untouched.
    pub fn load_actions(&self, actions: Vec<ActionModel>) -> ShowResult<usize> {
        let loaded = ActionsSheet::from_actions(actions, &self.renderer.compiler())?;
        let count = loaded.len();
        *self.sheet.lock().expect("actions sheet poisoned") = loaded;
        log::info!("[sheet] loaded {} action(s)", count);
        Ok(count)
    }

    pub fn load_actions_file(&self, path: &Path) -> ShowResult<usize> {
        let loaded = ActionsSheet::load(path, &self.renderer.compiler())?;
        let count = loaded.len();
        *self.sheet.lock().expect("actions sheet poisoned") = loaded;
        log::info!("[sheet] loaded {} action(s) from {}", count, path.display());
        Ok(count)
    }

    pub fn add_action(&self, action: ActionModel) -> ShowResult<usize> {
        let mut sheet = self.sheet.lock().expect("actions sheet poisoned");
        sheet.add(action, &self.renderer.compiler())?;
        Ok(sheet.len())
    }

    pub fn remove_action(&self, key: &ActionKey) -> ShowResult<ActionModel> {
        self.sheet
            .lock()
            .expect("actions sheet poisoned")
            .remove(key)
    }

    pub fn replace_action(&self, key: &ActionKey, action: ActionModel) -> ShowResult<ActionModel> {
        self.sheet
            .lock()
            .expect("actions sheet poisoned")
            .replace(key, action, &self.renderer.compiler())
    }

    /// Render the current sheet on this thread.
    pub fn render_now(&self) -> RenderReport {
        let sheet = self.sheet();
        self.renderer.render_sheet(&sheet)
    }

    /// Render the current sheet as a tracked background task on the blocking
    /// pool. Returns the task id straight away; the handle resolves to the
    /// report once the canvas is committed.
    pub fn spawn_background_render(
        self: &Arc<Self>,
        task_id: Option<String>,
    ) -> ShowResult<(String, JoinHandle<ShowResult<RenderReport>>)> {
        let task_id = task_id.unwrap_or_else(new_task_id);
        if let Ok(existing) = self.tasks.get(&task_id) {
            if !existing.status.is_terminal() {
                return Err(ShowError::InvalidCommand(format!(
                    "Task {} is already running",
                    task_id
                )));
            }
        }

        let actions = self.sheet().actions().to_vec();
        let runtime = Arc::clone(self);
        let id = task_id.clone();
        let handle = tokio::task::spawn_blocking(move || {
            runtime.renderer.render_in_background(
                &runtime.tasks,
                &id,
                actions,
                runtime.settings.checkpoint_interval,
            )
        });
        Ok((task_id, handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::fixtures::catalog::generic_dimmer;
    use crate::models::tasks::TaskStatus;
    use crate::transport::MemoryTransport;

    fn runtime() -> Arc<ShowRuntime> {
        let catalog = FixtureCatalog::from_fixtures(vec![generic_dimmer("dim1", 0)]).unwrap();
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

    #[test]
    fn load_is_all_or_nothing() {
        let runtime = runtime();
        runtime
            .add_action(ActionModel::new("dim1", "flash", 0.0, 1.0))
            .unwrap();
        let err = runtime
            .load_actions(vec![
                ActionModel::new("dim1", "flash", 5.0, 1.0),
                ActionModel::new("dim1", "flash", 5.0, 1.0),
            ])
            .unwrap_err();
        assert_eq!(err.kind(), "DuplicateAction");
        assert_eq!(runtime.sheet().actions()[0].start_time, 0.0);
    }

    #[test]
    fn sheet_edits_do_not_touch_canvas_until_render() {
        let runtime = runtime();
        runtime
            .add_action(ActionModel::new("dim1", "flash", 1.0, 1.0))
            .unwrap();
        let canvas = runtime.renderer().canvas();
        assert_eq!(canvas.load().value_at(0, 1.5), 0);
        runtime.render_now();
        assert_eq!(canvas.load().value_at(0, 1.5), 255);
    }

    #[test]
    fn zero_length_song_is_rejected() {
        let catalog = FixtureCatalog::default();
        let result = ShowRuntime::new(
            ShowSettings::default(),
            catalog,
            0.0,
            Arc::new(MemoryTransport::new()),
            Arc::new(ManualClock::new()),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn background_render_completes_task() {
        let runtime = runtime();
        runtime
            .add_action(ActionModel::new("dim1", "fade_in", 0.0, 2.0))
            .unwrap();
        let (task_id, handle) = runtime.spawn_background_render(None).unwrap();
        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.rendered, 1);
        assert_eq!(
            runtime.tasks().get(&task_id).unwrap().status,
            TaskStatus::Completed
        );
    }
}
