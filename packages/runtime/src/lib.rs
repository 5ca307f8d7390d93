pub mod error;
pub mod reconcile;
pub mod store;
pub mod tracker;

#[cfg(test)]
mod tests_store;

#[cfg(test)]
mod tests_reconcile;

#[cfg(test)]
mod tests_tracker;

pub use error::{ReconcileError, StateError};
pub use reconcile::{reconcile, Authority, ReconcileOptions, ReconcileOutcome, DEFAULT_TOLERANCE};
pub use store::{
    AppliedChange, BatchChange, LayerPatch, LayerState, LayerStateDocument, LayerStatus,
    StateStore, STATE_SCHEMA_VERSION,
};
pub use tracker::{
    AnimationTiming, RunKind, RunOutcome, RunRecord, RunStatus, RunStep, RunTracker, StepAction,
    TimelineOffset, TimelineOutcome, TimelineStep,
};
