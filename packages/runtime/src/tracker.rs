//! Run tracking: every discrete mutation operation (set / animate /
//! timeline) is recorded as an auditable run while it applies synchronously
//! through the state store.
//!
//! "Plan, not play": animation timing (duration, ease, delay, timeline `at`
//! offsets) is recorded as metadata only. Nothing is scheduled, ticked, or
//! interpolated; a run's end state is in the store before the call returns.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::StateError;
use crate::store::{LayerPatch, LayerState, StateStore};
use scenelayer_common::iso_now;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Set,
    AnimateLayer,
    Timeline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepAction {
    Set,
    From,
    To,
}

/// Relative timeline position, recorded verbatim and ignored for execution
/// order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimelineOffset {
    Seconds(f64),
    Label(String),
}

/// Recorded-only animation timing metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimationTiming {
    pub duration: f64,
    pub ease: String,
    #[serde(default)]
    pub delay: f64,
}

/// One applied step inside a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStep {
    pub layer_id: String,
    pub action: StepAction,
    pub props: LayerPatch,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ease: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at: Option<TimelineOffset>,
}

/// Auditable record of one mutation operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub run_id: String,
    pub kind: RunKind,
    pub status: RunStatus,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub steps: Vec<RunStep>,
}

/// One declared step of a timeline request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineStep {
    pub layer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<LayerPatch>,
    pub to: LayerPatch,
    pub duration: f64,
    pub ease: String,
    #[serde(default)]
    pub delay: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<TimelineOffset>,
}

/// Result of a set/animate run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub run_id: String,
    pub planned_end_state: LayerState,
}

/// Result of a timeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineOutcome {
    pub run_id: String,
    pub step_count: usize,
}

/// Records runs against a shared state store.
///
/// Run ids are strictly increasing and fixed width, from an in-process
/// counter that does not survive restarts. Completed runs accumulate in an
/// unbounded log.
#[derive(Debug, Default)]
pub struct RunTracker {
    counter: u64,
    active: HashMap<String, RunRecord>,
    completed: HashMap<String, RunRecord>,
}

impl RunTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_run_id(&mut self) -> String {
        self.counter += 1;
        format!("run_{:06}", self.counter)
    }

    fn begin(&mut self, kind: RunKind) -> String {
        let run_id = self.next_run_id();
        let record = RunRecord {
            run_id: run_id.clone(),
            kind,
            status: RunStatus::Running,
            started_at: iso_now(),
            finished_at: None,
            steps: Vec::new(),
        };
        self.active.insert(run_id.clone(), record);
        run_id
    }

    fn push_step(&mut self, run_id: &str, step: RunStep) {
        if let Some(run) = self.active.get_mut(run_id) {
            run.steps.push(step);
        }
    }

    fn finish(&mut self, run_id: &str) {
        if let Some(mut run) = self.active.remove(run_id) {
            run.status = RunStatus::Completed;
            run.finished_at = Some(iso_now());
            info!(run_id = %run.run_id, kind = ?run.kind, steps = run.steps.len(), "run completed");
            self.completed.insert(run.run_id.clone(), run);
        }
    }

    /// Cancel a run still in the active set. Cancellation is bookkeeping
    /// only; state already written stays written.
    pub fn cancel(&mut self, run_id: &str) -> bool {
        match self.active.remove(run_id) {
            Some(mut run) => {
                run.status = RunStatus::Cancelled;
                run.finished_at = Some(iso_now());
                info!(run_id = %run.run_id, "run cancelled");
                self.completed.insert(run.run_id.clone(), run);
                true
            }
            None => false,
        }
    }

    /// One immediate property application, propagation on.
    #[instrument(skip(self, store, props), fields(layer_id = %layer_id))]
    pub fn run_set(
        &mut self,
        store: &mut StateStore,
        layer_id: &str,
        props: &LayerPatch,
    ) -> Result<RunOutcome, StateError> {
        let run_id = self.begin(RunKind::Set);

        let applied = store.set(layer_id, props, true);
        self.push_step(
            &run_id,
            RunStep {
                layer_id: layer_id.to_string(),
                action: StepAction::Set,
                props: applied,
                duration: None,
                ease: None,
                delay: None,
                at: None,
            },
        );

        self.finish(&run_id);
        let planned_end_state = store.layer_state(layer_id)?;
        Ok(RunOutcome {
            run_id,
            planned_end_state,
        })
    }

    /// Optional from-state apply followed by the to-state apply. The timing
    /// is recorded on the to-step and never scheduled.
    #[instrument(skip(self, store, from, to, timing), fields(layer_id = %layer_id))]
    pub fn run_animate(
        &mut self,
        store: &mut StateStore,
        layer_id: &str,
        from: Option<&LayerPatch>,
        to: &LayerPatch,
        timing: &AnimationTiming,
    ) -> Result<RunOutcome, StateError> {
        let run_id = self.begin(RunKind::AnimateLayer);

        if let Some(from_props) = from {
            let applied = store.set(layer_id, from_props, true);
            self.push_step(
                &run_id,
                RunStep {
                    layer_id: layer_id.to_string(),
                    action: StepAction::From,
                    props: applied,
                    duration: None,
                    ease: None,
                    delay: None,
                    at: None,
                },
            );
        }

        let applied = store.set(layer_id, to, true);
        self.push_step(
            &run_id,
            RunStep {
                layer_id: layer_id.to_string(),
                action: StepAction::To,
                props: applied,
                duration: Some(timing.duration),
                ease: Some(timing.ease.clone()),
                delay: Some(timing.delay),
                at: None,
            },
        );

        self.finish(&run_id);
        let planned_end_state = store.layer_state(layer_id)?;
        Ok(RunOutcome {
            run_id,
            planned_end_state,
        })
    }

    /// Apply timeline steps immediately in request order. Declared `at`
    /// offsets are recorded but never reorder execution.
    #[instrument(skip(self, store, steps), fields(steps = steps.len()))]
    pub fn run_timeline(
        &mut self,
        store: &mut StateStore,
        steps: &[TimelineStep],
    ) -> TimelineOutcome {
        let run_id = self.begin(RunKind::Timeline);

        for step in steps {
            if let Some(from_props) = &step.from {
                store.set(&step.layer_id, from_props, true);
            }
            let applied = store.set(&step.layer_id, &step.to, true);
            self.push_step(
                &run_id,
                RunStep {
                    layer_id: step.layer_id.clone(),
                    action: StepAction::To,
                    props: applied,
                    duration: Some(step.duration),
                    ease: Some(step.ease.clone()),
                    delay: Some(step.delay),
                    at: step.at.clone(),
                },
            );
        }

        self.finish(&run_id);
        TimelineOutcome {
            run_id,
            step_count: steps.len(),
        }
    }

    pub fn run(&self, run_id: &str) -> Option<&RunRecord> {
        self.active.get(run_id).or_else(|| self.completed.get(run_id))
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    /// Completed runs, unordered; callers sort for presentation.
    pub fn completed_runs(&self) -> impl Iterator<Item = &RunRecord> {
        self.completed.values()
    }
}
