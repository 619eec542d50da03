//! Render Orchestrator
//!
//! Compiles a whole Actions Sheet into the Timeline Canvas in one pass. The
//! new canvas is built off to the side from a copy of the committed one and
//! published with a single swap, so playback sees either the old or the new
//! canvas and never a half-painted one.
//!
//! Before painting, the union of the previously rendered span and the new
//! span is cleared, so removed or moved actions leave nothing behind. Actions
//! are then painted in sheet order; later entries win where they overlap.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::canvas::{CanvasHandle, TimelineCanvas};
use crate::compiler::{ActionCompiler, CompileOptions, CompiledAction};
use crate::error::{ShowError, ShowResult};
use crate::events::{EventBus, ShowEvent};
use crate::fixtures::catalog::FixtureCatalog;
use crate::models::actions::{span_of, ActionKey, ActionModel};
use crate::sheet::ActionsSheet;
use crate::tasks::{ResumableOperation, TaskTracker};

/// One action that did not make it onto the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionFailure {
    /// Position in the rendered sheet
    pub index: usize,
    pub key: ActionKey,
    pub kind: String,
    pub error: String,
}

impl ActionFailure {
    fn new(index: usize, action: &ActionModel, error: &ShowError) -> Self {
        Self {
            index,
            key: action.key(),
            kind: error.kind().to_string(),
            error: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderReport {
    pub rendered: usize,
    pub failures: Vec<ActionFailure>,
    /// Time window touched by the rendered sheet
    pub span: Option<(f64, f64)>,
    /// SHA-256 of the committed canvas
    pub digest: String,
}

impl RenderReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// The report as an error if anything was skipped. The canvas is
    /// committed either way.
    pub fn into_result(self) -> ShowResult<RenderReport> {
        if self.is_clean() {
            Ok(self)
        } else {
            Err(ShowError::RenderPartialFailure(Box::new(self)))
        }
    }
}

type Compiled = Result<CompiledAction, ActionFailure>;

pub struct RenderEngine {
    catalog: Arc<FixtureCatalog>,
    canvas: CanvasHandle,
    options: CompileOptions,
    events: EventBus,
    /// Span of the last commit. Held for the whole commit, so commits are
    /// serialized.
    last_span: Mutex<Option<(f64, f64)>>,
}

impl RenderEngine {
    pub fn new(
        catalog: Arc<FixtureCatalog>,
        canvas: CanvasHandle,
        options: CompileOptions,
        events: EventBus,
    ) -> Self {
        Self {
            catalog,
            canvas,
            options,
            events,
            last_span: Mutex::new(None),
        }
    }

    pub fn canvas(&self) -> &CanvasHandle {
        &self.canvas
    }

    pub fn catalog(&self) -> &FixtureCatalog {
        &self.catalog
    }

    pub fn compiler(&self) -> ActionCompiler<'_> {
        ActionCompiler::new(&self.catalog, self.options)
    }

    pub fn render_sheet(&self, sheet: &ActionsSheet) -> RenderReport {
        self.render(sheet.actions())
    }

    /// Compile every action (in parallel, results kept in order) and commit.
    /// Invalid actions are reported and skipped; the rest still render.
    pub fn render(&self, actions: &[ActionModel]) -> RenderReport {
        let compiler = self.compiler();
        let compiled: Vec<Compiled> = actions
            .par_iter()
            .enumerate()
            .map(|(index, action)| {
                compiler
                    .compile(action)
                    .map_err(|e| ActionFailure::new(index, action, &e))
            })
            .collect();
        self.commit(span_of(actions), compiled)
    }

    /// Compile as a resumable background task, checkpointing the compiled
    /// actions every `checkpoint_interval` steps. The canvas is committed
    /// once, after the last action.
    pub fn render_in_background(
        &self,
        tracker: &TaskTracker,
        task_id: &str,
        actions: Vec<ActionModel>,
        checkpoint_interval: usize,
    ) -> ShowResult<RenderReport> {
        let mut job = RenderJob::new(self, actions);
        tracker.run(task_id, &mut job, checkpoint_interval)?;
        job.report.ok_or_else(|| ShowError::TaskFailure {
            task_id: task_id.to_string(),
            message: "render finished without a report".to_string(),
        })
    }

    fn commit(&self, span: Option<(f64, f64)>, compiled: Vec<Compiled>) -> RenderReport {
        let started = Instant::now();
        let mut last_span = self.last_span.lock().expect("render state poisoned");

        let mut next: TimelineCanvas = (**self.canvas.load()).clone();
        let duration = next.duration();
        if let Some((start, end)) = union(*last_span, span) {
            let start = start.clamp(0.0, duration);
            let end = end.clamp(start, duration);
            if let Err(e) = next.clear_through(start, end) {
                log::warn!("[render] could not clear {:.3}..{:.3}: {}", start, end, e);
            }
        }

        let mut rendered = 0;
        let mut failures = Vec::new();
        for (index, entry) in compiled.into_iter().enumerate() {
            match entry {
                Ok(action) => match next.paint_compiled(&action) {
                    Ok(()) => rendered += 1,
                    Err(e) => failures.push(ActionFailure {
                        index,
                        key: action.key,
                        kind: e.kind().to_string(),
                        error: e.to_string(),
                    }),
                },
                Err(failure) => failures.push(failure),
            }
        }

        let digest = next.digest();
        self.canvas.store(Arc::new(next));
        *last_span = span;
        drop(last_span);

        for failure in &failures {
            log::warn!("[render] skipped {}: {}", failure.key, failure.error);
        }
        log::info!(
            "[render] committed {} action(s), {} failed in {:?}",
            rendered,
            failures.len(),
            started.elapsed()
        );
        self.events.publish(ShowEvent::RenderCommitted {
            digest: digest.clone(),
            rendered,
            failed: failures.len(),
        });

        RenderReport {
            rendered,
            failures,
            span,
            digest,
        }
    }
}

fn union(a: Option<(f64, f64)>, b: Option<(f64, f64)>) -> Option<(f64, f64)> {
    match (a, b) {
        (Some((s1, e1)), Some((s2, e2))) => Some((s1.min(s2), e1.max(e2))),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Background render: compile one action per step, commit in `finish`.
struct RenderJob<'a> {
    engine: &'a RenderEngine,
    compiler: ActionCompiler<'a>,
    actions: Vec<ActionModel>,
    operation: String,
    report: Option<RenderReport>,
}

impl<'a> RenderJob<'a> {
    fn new(engine: &'a RenderEngine, actions: Vec<ActionModel>) -> Self {
        // A checkpoint only resumes a render of the very same action list
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(&actions).unwrap_or_default());
        let fingerprint = format!("{:x}", hasher.finalize());
        Self {
            engine,
            compiler: engine.compiler(),
            actions,
            operation: format!("render:{}", &fingerprint[..12]),
            report: None,
        }
    }
}

impl ResumableOperation for RenderJob<'_> {
    type Aggregate = Vec<Compiled>;

    fn operation(&self) -> &str {
        &self.operation
    }

    fn total(&self) -> usize {
        self.actions.len()
    }

    fn process(&mut self, index: usize, aggregate: &mut Vec<Compiled>) -> Result<(), String> {
        let action = &self.actions[index];
        aggregate.push(
            self.compiler
                .compile(action)
                .map_err(|e| ActionFailure::new(index, action, &e)),
        );
        Ok(())
    }

    fn finish(&mut self, aggregate: Vec<Compiled>) -> Result<serde_json::Value, String> {
        if aggregate.len() != self.actions.len() {
            return Err(format!(
                "compiled {} of {} actions",
                aggregate.len(),
                self.actions.len()
            ));
        }
        let report = self.engine.commit(span_of(&self.actions), aggregate);
        let value = serde_json::to_value(&report).map_err(|e| e.to_string())?;
        self.report = Some(report);
        Ok(value)
    }
}
