pub mod error;
pub mod filter;
pub mod presets;
pub mod service;


pub use error::ServiceError;
pub use filter::{LayerFilter, LayerPage};
pub use presets::{AnimationPreset, PresetPlan};
pub use service::{
    CompileStatus, Diagnostics, JitterParams, OriginPreset, OriginSpec, RenderOptions, RenderSize,
    RunSummary, RuntimeService, SetOutcome, PLACEHOLDER_PNG_DATA_URI,
};
