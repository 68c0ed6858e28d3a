//! Build state machine

use super::flows::{Flow, IMPLICIT_PHASE};
use super::{RunOutcome, RunReport, WorkflowState};
use crate::exec_log::ExecutionLog;
use crate::memory::MemoryStore;
use crate::rules::{RuleCatalog, RuleSet, BUILD_MODE};
use sdk::errors::EngineError;
use sdk::types::{Task, TaskDelta, TaskId, TaskStatus};
use tracing::{debug, info, warn};

/// Drives one task through the build workflow.
///
/// The engine holds no state between invocations. Everything it knows about
/// a task comes from the store, and every checklist completion is written
/// before the next item is looked at, so an interrupted run resumes cleanly.
pub struct WorkflowEngine<'a> {
    store: &'a dyn MemoryStore,
    catalog: &'a RuleCatalog,
    mode: String,
}

/// Bookkeeping for a single invocation
struct Run {
    task_id: TaskId,
    trail: Vec<WorkflowState>,
    rules: Option<RuleSet>,
}

impl Run {
    fn new(task_id: &TaskId) -> Self {
        Self {
            task_id: task_id.clone(),
            trail: vec![WorkflowState::Init],
            rules: None,
        }
    }

    fn enter(&mut self, state: WorkflowState) {
        info!("Task {}: {}", self.task_id, state);
        self.trail.push(state);
    }

    fn finish(self, state: WorkflowState, outcome: RunOutcome, task: Option<Task>) -> RunReport {
        RunReport {
            task_id: self.task_id,
            state,
            trail: self.trail,
            rules: self.rules,
            outcome,
            task,
        }
    }

    fn blocked(mut self, err: EngineError, task: Option<Task>) -> RunReport {
        warn!("Task {} blocked: {}", self.task_id, err);
        self.enter(WorkflowState::Blocked);
        self.finish(WorkflowState::Blocked, RunOutcome::Blocked(err), task)
    }

    fn paused(self, state: WorkflowState, err: EngineError, task: Task) -> RunReport {
        warn!("Task {} paused in {}: {}", self.task_id, state, err);
        self.finish(state, RunOutcome::Paused(err), Some(task))
    }
}

impl<'a> WorkflowEngine<'a> {
    pub fn new(store: &'a dyn MemoryStore, catalog: &'a RuleCatalog) -> Self {
        Self {
            store,
            catalog,
            mode: BUILD_MODE.to_string(),
        }
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = mode.into();
        self
    }

    /// Run the build for the task named by the active context
    pub fn run_current(&self) -> Result<RunReport, EngineError> {
        let id = self.store.current_task()?;
        self.run(&id)
    }

    /// One build invocation.
    ///
    /// Store failures are returned as `Err`. Workflow gates end the run with
    /// a report: `Blocked` for missing prerequisites or an unknown complexity
    /// level, `Paused` for an unlogged action or an incomplete checklist.
    pub fn run(&self, id: &TaskId) -> Result<RunReport, EngineError> {
        let mut run = Run::new(id);

        let task = match self.store.read(id) {
            Ok(task) => task,
            Err(err @ EngineError::UnknownComplexityLevel(_)) => return Ok(run.blocked(err, None)),
            Err(err) => return Err(err),
        };

        if task.status == TaskStatus::Done {
            info!("Task {} is already done", id);
            run.rules = self
                .catalog
                .lookup_level(&self.mode, task.complexity_level)
                .ok();
            run.trail.push(WorkflowState::Done);
            return Ok(run.finish(WorkflowState::Done, RunOutcome::Done, Some(task)));
        }

        // A configuration error must not leave the task changed
        let rules = self.catalog.lookup_level(&self.mode, task.complexity_level)?;

        if let Some(missing) = self.missing_prerequisite(&task)? {
            let err = EngineError::PrerequisitesMissing {
                task: id.to_string(),
                missing,
            };
            return Ok(run.blocked(err, Some(task)));
        }
        let task = if task.status == TaskStatus::NotStarted {
            self.store.write(
                id,
                &TaskDelta::new()
                    .status(TaskStatus::PrerequisitesVerified)
                    .progress("prerequisites verified"),
            )?
        } else {
            task
        };
        run.enter(WorkflowState::PrerequisitesChecked);

        // Decided once; later reads never re-resolve it
        let level = task.complexity_level;
        run.enter(WorkflowState::ComplexityResolved);

        debug!("Rule modules for {}: {:?}", level, rules.modules);
        run.rules = Some(rules);
        run.enter(WorkflowState::RulesLoaded);

        let flow = Flow::for_level(level);
        let flow_state = WorkflowState::Flow(level);
        run.enter(flow_state);
        let task = self.enter_flow(task, flow)?;
        let task = self.walk(task, flow)?;

        if let Some(item) = ExecutionLog::first_gap(&task) {
            return Ok(run.paused(flow_state, EngineError::UnloggedAction { item }, task));
        }
        run.enter(WorkflowState::LogReviewed);

        if let Some(item) = task.next_pending() {
            let err = EngineError::IncompleteChecklist { item: item.key() };
            run.enter(flow_state);
            return Ok(run.paused(flow_state, err, task));
        }
        let task = if task.status.rank() < TaskStatus::Verified.rank() {
            self.store.write(
                id,
                &TaskDelta::new()
                    .status(TaskStatus::Verified)
                    .progress("checklist verified"),
            )?
        } else {
            task
        };
        run.enter(WorkflowState::Verified);

        let summary = format!(
            "build complete: {}/{} checklist items, {} commands logged",
            task.done_count(),
            task.checklist.len(),
            task.log.len()
        );
        let task = self
            .store
            .write(id, &TaskDelta::new().status(TaskStatus::Done).progress(summary))?;
        run.enter(WorkflowState::Done);

        Ok(run.finish(WorkflowState::Done, RunOutcome::Done, Some(task)))
    }

    fn missing_prerequisite(&self, task: &Task) -> Result<Option<String>, EngineError> {
        if task.checklist.is_empty() {
            return Ok(Some(format!(
                "task plan '{}' has no checklist items",
                task.id
            )));
        }

        let level = task.complexity_level;
        if level.requires_creative_records() && self.store.creative_records(&task.id)?.is_empty() {
            return Ok(Some(format!(
                "{} ({}) needs at least one creative-phase record for '{}'",
                level,
                level.label(),
                task.id
            )));
        }

        Ok(None)
    }

    /// Merge the flow's steps into the plan and mark the build started
    fn enter_flow(&self, task: Task, flow: Flow) -> Result<Task, EngineError> {
        let checklist = flow.checklist(&task);
        let total = checklist.len();
        let mut delta = TaskDelta::new();

        if checklist != task.checklist {
            debug!(
                "Adding {} workflow step(s) to {}",
                total - task.checklist.len(),
                task.id
            );
            delta = delta.checklist(checklist);
        }
        if task.status.rank() < TaskStatus::InProgress.rank() {
            let level = flow.level();
            delta = delta.status(TaskStatus::InProgress).progress(format!(
                "build started: {} ({}) with {} checklist items",
                level,
                level.label(),
                total
            ));
        }

        if delta.is_empty() {
            return Ok(task);
        }
        self.store.write(&task.id, &delta)
    }

    /// Complete logged items in order, one write each, up to the first
    /// item that still has no log entry.
    fn walk(&self, mut task: Task, flow: Flow) -> Result<Task, EngineError> {
        let mut idx = 0;
        while idx < task.checklist.len() {
            let item = &task.checklist[idx];
            idx += 1;
            if item.done {
                continue;
            }

            let key = item.key();
            if !task.is_logged(&key) {
                debug!("Waiting on checklist item '{}'", key);
                break;
            }

            let mut delta = TaskDelta::new().complete(key.clone());
            if flow.is_phase_gate(item) && task.status == TaskStatus::InProgress {
                let phase = item.phase.as_deref().unwrap_or(IMPLICIT_PHASE);
                info!("Task {}: phase '{}' complete", task.id, phase);
                delta = delta
                    .status(TaskStatus::PhaseComplete)
                    .progress(format!("phase complete: {}", phase));
            } else if task.status == TaskStatus::PhaseComplete {
                delta = delta.status(TaskStatus::InProgress);
            }

            task = self.store.write(&task.id, &delta)?;
            debug!("Completed checklist item '{}'", key);
        }
        Ok(task)
    }
}
