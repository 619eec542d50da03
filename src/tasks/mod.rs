//! Background Task Tracker
//!
//! Process-wide registry of long-running operations. Every progress change is
//! published on the [`EventBus`], so any observer sees it, not only the
//! caller that started the task. Tasks outlive whoever started them; they are
//! only ever removed by [`TaskTracker::prune_finished`].

pub mod runner;
pub mod store;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;

use crate::error::{ShowError, ShowResult};
use crate::events::{EventBus, ShowEvent};
use crate::models::tasks::{Checkpoint, TaskSnapshot, TaskStatus};

pub use runner::ResumableOperation;
pub use store::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};

pub fn new_task_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn percent(current: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    ((current.min(total) * 100) / total) as u8
}

pub struct TaskTracker {
    tasks: RwLock<HashMap<String, TaskSnapshot>>,
    store: Arc<dyn CheckpointStore>,
    events: EventBus,
}

impl TaskTracker {
    pub fn new(store: Arc<dyn CheckpointStore>, events: EventBus) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            store,
            events,
        }
    }

    /// Tracker with an in-memory checkpoint store.
    pub fn in_memory(events: EventBus) -> Self {
        Self::new(Arc::new(MemoryCheckpointStore::new()), events)
    }

    /// Register a task. A finished task with the same id is replaced so a
    /// failed operation can be restarted under its old id and pick up its
    /// checkpoint; a running one is not.
    pub fn create(&self, task_id: &str, operation: &str, total: u64) -> ShowResult<TaskSnapshot> {
        let snapshot = {
            let mut tasks = self.tasks.write().expect("task registry poisoned");
            if let Some(existing) = tasks.get(task_id) {
                if !existing.status.is_terminal() {
                    return Err(ShowError::InvalidCommand(format!(
                        "Task {} is already running",
                        task_id
                    )));
                }
            }
            let stamp = now();
            let snapshot = TaskSnapshot {
                task_id: task_id.to_string(),
                operation: operation.to_string(),
                progress: 0,
                current: 0,
                total,
                status: TaskStatus::Running,
                message: None,
                result: None,
                error: None,
                created_at: stamp.clone(),
                updated_at: stamp,
            };
            tasks.insert(task_id.to_string(), snapshot.clone());
            snapshot
        };
        log::info!("[tasks] {} started ({}, {} steps)", task_id, operation, total);
        self.events.publish(ShowEvent::Task(snapshot.clone()));
        Ok(snapshot)
    }

    pub fn update_progress(
        &self,
        task_id: &str,
        current: u64,
        message: Option<&str>,
    ) -> ShowResult<TaskSnapshot> {
        let snapshot = self.mutate(task_id, |task| {
            if task.status.is_terminal() {
                return Err(ShowError::InvalidCommand(format!(
                    "Task {} already finished",
                    task_id
                )));
            }
            task.current = current.min(task.total);
            task.progress = percent(task.current, task.total);
            if let Some(message) = message {
                task.message = Some(message.to_string());
            }
            Ok(())
        })?;
        self.events.publish(ShowEvent::Task(snapshot.clone()));
        Ok(snapshot)
    }

    /// Mark a task terminal. On success the checkpoint is dropped; on failure
    /// it is kept so a later run can resume.
    pub fn complete(
        &self,
        task_id: &str,
        outcome: Result<serde_json::Value, String>,
    ) -> ShowResult<TaskSnapshot> {
        let succeeded = outcome.is_ok();
        let snapshot = self.mutate(task_id, |task| {
            if task.status.is_terminal() {
                return Err(ShowError::InvalidCommand(format!(
                    "Task {} already finished",
                    task_id
                )));
            }
            match outcome {
                Ok(result) => {
                    task.status = TaskStatus::Completed;
                    task.current = task.total;
                    task.progress = 100;
                    task.result = Some(result);
                }
                Err(error) => {
                    task.status = TaskStatus::Failed;
                    task.error = Some(error);
                }
            }
            Ok(())
        })?;

        if succeeded {
            self.store.clear(task_id)?;
            log::info!("[tasks] {} completed", task_id);
        } else {
            log::warn!(
                "[tasks] {} failed: {}",
                task_id,
                snapshot.error.as_deref().unwrap_or("unknown error")
            );
        }
        self.events.publish(ShowEvent::Task(snapshot.clone()));
        Ok(snapshot)
    }

    pub fn checkpoint(
        &self,
        task_id: &str,
        last_processed_index: usize,
        partial_results: serde_json::Value,
    ) -> ShowResult<()> {
        let operation = self.get(task_id)?.operation;
        self.store.save(&Checkpoint {
            task_id: task_id.to_string(),
            operation,
            last_processed_index,
            partial_results,
        })?;
        log::debug!(
            "[tasks] {} checkpoint at index {}",
            task_id,
            last_processed_index
        );
        Ok(())
    }

    pub fn resume_point(&self, task_id: &str) -> ShowResult<Option<Checkpoint>> {
        self.store.load(task_id)
    }

    pub fn get(&self, task_id: &str) -> ShowResult<TaskSnapshot> {
        self.tasks
            .read()
            .expect("task registry poisoned")
            .get(task_id)
            .cloned()
            .ok_or_else(|| ShowError::TaskNotFound(task_id.to_string()))
    }

    /// All known tasks, oldest first.
    pub fn list(&self) -> Vec<TaskSnapshot> {
        let mut tasks: Vec<TaskSnapshot> = self
            .tasks
            .read()
            .expect("task registry poisoned")
            .values()
            .cloned()
            .collect();
        tasks.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.task_id.cmp(&b.task_id))
        });
        tasks
    }

    pub fn prune_finished(&self) -> usize {
        let mut tasks = self.tasks.write().expect("task registry poisoned");
        let before = tasks.len();
        tasks.retain(|_, t| !t.status.is_terminal());
        before - tasks.len()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    fn mutate<F>(&self, task_id: &str, f: F) -> ShowResult<TaskSnapshot>
    where
        F: FnOnce(&mut TaskSnapshot) -> ShowResult<()>,
    {
        let mut tasks = self.tasks.write().expect("task registry poisoned");
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| ShowError::TaskNotFound(task_id.to_string()))?;
        f(task)?;
        task.updated_at = now();
        Ok(task.clone())
    }

    /// Drive `op` to completion under `task_id`, resuming from a stored
    /// checkpoint if one exists for the same operation. The aggregate is
    /// checkpointed every `checkpoint_interval` steps.
    pub fn run<O: ResumableOperation>(
        &self,
        task_id: &str,
        op: &mut O,
        checkpoint_interval: usize,
    ) -> ShowResult<serde_json::Value> {
        let total = op.total();
        let resume = self
            .store
            .load(task_id)?
            .filter(|c| c.operation == op.operation() && c.last_processed_index < total);

        let (start, mut aggregate) = match resume {
            Some(checkpoint) => {
                let aggregate: O::Aggregate =
                    serde_json::from_value(checkpoint.partial_results)?;
                (checkpoint.last_processed_index + 1, aggregate)
            }
            None => (0, O::Aggregate::default()),
        };

        self.create(task_id, op.operation(), total as u64)?;
        if start > 0 {
            log::info!("[tasks] {} resuming at index {}", task_id, start);
            self.update_progress(task_id, start as u64, Some("Resumed from checkpoint"))?;
        }

        let interval = checkpoint_interval.max(1);
        let mut last_percent = percent(start as u64, total as u64);
        for index in start..total {
            if let Err(message) = op.process(index, &mut aggregate) {
                return Err(self.fail(task_id, message));
            }

            let done = index + 1;
            if done % interval == 0 && done < total {
                self.checkpoint(task_id, index, serde_json::to_value(&aggregate)?)?;
            }
            let pct = percent(done as u64, total as u64);
            if pct != last_percent {
                last_percent = pct;
                self.update_progress(task_id, done as u64, None)?;
            }
        }

        match op.finish(aggregate) {
            Ok(result) => {
                self.complete(task_id, Ok(result.clone()))?;
                Ok(result)
            }
            Err(message) => Err(self.fail(task_id, message)),
        }
    }

    fn fail(&self, task_id: &str, message: String) -> ShowError {
        if let Err(e) = self.complete(task_id, Err(message.clone())) {
            log::error!("[tasks] could not mark {} failed: {}", task_id, e);
        }
        ShowError::TaskFailure {
            task_id: task_id.to_string(),
            message,
        }
    }
}
