use scenelayer_compiler::CompileError;
use scenelayer_runtime::{ReconcileError, StateError};
use thiserror::Error;

/// Boundary errors for the runtime facade.
///
/// Out-of-range values are never an error anywhere in the system: they are
/// clamped on the way in. What does fail: unknown ids on reads, properties
/// outside a layer's declared capability set, malformed source.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("unknown layer id: {0}")]
    UnknownLayer(String),

    #[error("layer '{layer_id}' does not allow '{property}'")]
    CapabilityDenied {
        layer_id: String,
        property: &'static str,
    },

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}
