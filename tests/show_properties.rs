use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use lumasync_lib::canvas::{self, TimelineCanvas};
use lumasync_lib::clock::ManualClock;
use lumasync_lib::events::EventBus;
use lumasync_lib::fixtures::catalog::{generic_dimmer, moving_head, rgb_par};
use lumasync_lib::playback::PlaybackConfig;
use lumasync_lib::tasks::{FileCheckpointStore, ResumableOperation};
use lumasync_lib::transport::MemoryTransport;
use lumasync_lib::{
    ActionCompiler, ActionModel, ActionsSheet, CompileOptions, FixtureCatalog, PlaybackEngine,
    RenderEngine, TaskTracker, TickOutcome,
};

const SONG_LENGTH: f64 = 30.0;

fn catalog() -> Arc<FixtureCatalog> {
    Arc::new(
        FixtureCatalog::from_fixtures(vec![
            generic_dimmer("dim1", 0),
            rgb_par("par1", 10),
            moving_head("head1", 20),
        ])
        .unwrap(),
    )
}

fn renderer(catalog: Arc<FixtureCatalog>) -> RenderEngine {
    let options = CompileOptions::default();
    RenderEngine::new(
        catalog,
        canvas::shared(TimelineCanvas::new(SONG_LENGTH, options.sample_interval)),
        options,
        EventBus::new(),
    )
}

fn build_sheet(catalog: &FixtureCatalog) -> ActionsSheet {
    let compiler = ActionCompiler::new(catalog, CompileOptions::default());
    ActionsSheet::from_actions(
        vec![
            ActionModel::new("dim1", "fade_in", 0.0, 2.0),
            ActionModel::new("par1", "strobe", 4.0, 1.0).with_param("rate", 10.0),
            ActionModel::new("head1", "move", 6.0, 3.0)
                .with_param("from_x", 0.0)
                .with_param("from_y", 0.25)
                .with_param("to_x", 1.0)
                .with_param("to_y", 0.75)
                .with_param("curve", "ease_in_out"),
            ActionModel::new("head1", "flash", 10.0, 0.5).with_param("level", 200.0),
            ActionModel::new("par1", "flash", 12.0, 1.0).with_param("target", "red"),
        ],
        &compiler,
    )
    .unwrap()
}

#[test]
fn render_reflects_each_actions_initial_sample() {
    let catalog = catalog();
    let engine = renderer(catalog.clone());
    let sheet = build_sheet(&catalog);
    let report = engine.render_sheet(&sheet);
    assert!(report.is_clean(), "{:?}", report.failures);

    let compiler = engine.compiler();
    let canvas = engine.canvas().load();
    for action in sheet.actions() {
        let compiled = compiler.compile(action).unwrap();
        let frame = canvas.get_frame(action.start_time);
        for curve in &compiled.curves {
            assert_eq!(
                frame.get(curve.channel),
                curve.samples[0].value,
                "{} channel {}",
                compiled.key,
                curve.channel
            );
        }
    }
}

#[test]
fn later_insertion_wins_at_shared_instant() {
    let catalog = catalog();
    let engine = renderer(catalog);
    engine.render(&[
        ActionModel::new("dim1", "flash", 1.0, 1.0).with_param("level", 40.0),
        ActionModel::new("dim1", "set", 1.0, 0.0).with_param("level", 90.0),
    ]);
    assert_eq!(engine.canvas().load().get_frame(1.0).get(0), 90);

    engine.render(&[
        ActionModel::new("dim1", "set", 1.0, 0.0).with_param("level", 90.0),
        ActionModel::new("dim1", "flash", 1.0, 1.0).with_param("level", 40.0),
    ]);
    assert_eq!(engine.canvas().load().get_frame(1.0).get(0), 40);
}

#[test]
fn rendering_the_same_sheet_twice_is_identical() {
    let catalog = catalog();
    let engine = renderer(catalog.clone());
    let sheet = build_sheet(&catalog);

    let first = engine.render_sheet(&sheet);
    let snapshot1 = engine.canvas().load_full();
    let second = engine.render_sheet(&sheet);
    let snapshot2 = engine.canvas().load_full();

    assert_eq!(first.digest, second.digest);
    assert_eq!(*snapshot1, *snapshot2);
}

#[test]
fn strobe_at_ten_hertz_gives_ten_cycles() {
    let catalog = catalog();
    let engine = renderer(catalog);
    let strobe = ActionModel::new("dim1", "strobe", 3.0, 1.0).with_param("rate", 10.0);
    let compiled = engine.compiler().compile(&strobe).unwrap();
    let ons = compiled.curves[0]
        .samples
        .iter()
        .filter(|s| s.value == 255)
        .count();
    assert_eq!(ons, 10);

    engine.render(&[strobe]);
    let canvas = engine.canvas().load();
    for k in 0..10 {
        let on = 3.0 + k as f64 * 0.1;
        let off = on + 0.1 * 0.5;
        assert_eq!(canvas.get_frame(on).get(0), 255, "on at {}", on);
        assert_eq!(canvas.get_frame(off).get(0), 0, "off at {}", off);
    }
    assert_eq!(canvas.get_frame(4.0).get(0), 0);
}

#[test]
fn fade_in_midpoint_is_half_level() {
    let catalog = catalog();
    let engine = renderer(catalog);
    engine.render(&[ActionModel::new("dim1", "fade_in", 0.0, 2.0)]);
    let mid = engine.canvas().load().get_frame(1.0).get(0);
    assert!((126..=128).contains(&mid), "midpoint was {}", mid);
    assert_eq!(engine.canvas().load().get_frame(2.0).get(0), 255);
}

#[test]
fn seek_then_play_first_frame_matches_canvas() {
    let catalog = catalog();
    let engine = renderer(catalog.clone());
    engine.render_sheet(&build_sheet(&catalog));

    let clock = ManualClock::new();
    let transport = Arc::new(MemoryTransport::new());
    let player = PlaybackEngine::new(
        engine.canvas().clone(),
        transport.clone(),
        Arc::new(clock.clone()),
        EventBus::new(),
        PlaybackConfig::default(),
    );

    player.seek(12.0).unwrap();
    player.play().unwrap();
    assert_eq!(player.tick(), TickOutcome::Emitted { time: 12.0 });

    let frames = transport.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0], engine.canvas().load().get_frame(12.0));
    assert_eq!(frames[0].get(11), 255);
}

#[test]
fn serialized_sheet_rerenders_identically() {
    let catalog = catalog();
    let first = renderer(catalog.clone());
    let sheet = build_sheet(&catalog);
    first.render_sheet(&sheet);

    let json = sheet.to_json().unwrap();
    let restored_engine = renderer(catalog.clone());
    let restored = ActionsSheet::from_json(&json, &restored_engine.compiler()).unwrap();
    assert_eq!(restored, sheet);
    restored_engine.render_sheet(&restored);

    assert_eq!(
        **first.canvas().load(),
        **restored_engine.canvas().load()
    );
}

/// Adds up index * 3 over ten steps, optionally stopping with an error.
struct Tally {
    stop_at: Option<usize>,
    processed: Vec<usize>,
}

#[derive(Serialize, Deserialize, Default)]
struct TallyState {
    sum: u64,
    steps: Vec<usize>,
}

impl ResumableOperation for Tally {
    type Aggregate = TallyState;

    fn operation(&self) -> &str {
        "tally"
    }

    fn total(&self) -> usize {
        10
    }

    fn process(&mut self, index: usize, state: &mut TallyState) -> Result<(), String> {
        if self.stop_at == Some(index) {
            return Err("process killed".to_string());
        }
        self.processed.push(index);
        state.sum += index as u64 * 3;
        state.steps.push(index);
        Ok(())
    }

    fn finish(&mut self, state: TallyState) -> Result<serde_json::Value, String> {
        Ok(json!({ "sum": state.sum, "steps": state.steps }))
    }
}

#[test]
fn interrupted_task_resumes_after_last_checkpoint() {
    let dir = tempfile::tempdir().unwrap();

    // First process: checkpoints at index 4, dies at index 7
    {
        let store = Arc::new(FileCheckpointStore::new(dir.path()).unwrap());
        let tracker = TaskTracker::new(store, EventBus::new());
        let mut op = Tally {
            stop_at: Some(7),
            processed: Vec::new(),
        };
        assert!(tracker.run("job-1", &mut op, 5).is_err());
        assert_eq!(
            tracker.resume_point("job-1").unwrap().unwrap().last_processed_index,
            4
        );
    }

    // Restarted process picks up the checkpoint from disk
    let store = Arc::new(FileCheckpointStore::new(dir.path()).unwrap());
    let tracker = TaskTracker::new(store, EventBus::new());
    let mut resumed = Tally {
        stop_at: None,
        processed: Vec::new(),
    };
    let result = tracker.run("job-1", &mut resumed, 5).unwrap();
    assert_eq!(resumed.processed, vec![5, 6, 7, 8, 9]);

    let mut uninterrupted = Tally {
        stop_at: None,
        processed: Vec::new(),
    };
    let expected = tracker.run("job-2", &mut uninterrupted, 5).unwrap();
    assert_eq!(result, expected);
    assert_eq!(result["sum"], 135);
}
