pub mod artifacts;
pub mod compiler;
pub mod error;
pub mod schema;


pub use artifacts::{
    load_manifest, CompileOutcome, COMPILE_MANIFEST_FILE, LAYER_MAP_FULL_FILE, LAYER_MAP_MIN_FILE,
};
pub use compiler::{CompileOutput, DocumentCompiler, RecompileReason, DEFAULT_COMPILER_VERSION};
pub use error::{CompileError, CompileResult};
pub use schema::{
    BBox, CapabilityKind, CompileManifest, FullLayerMap, LayerCapabilities, LayerConstraints,
    LayerMapDocument, LayerMetadata, LayerRecord, LayerType, MinimalLayerMap, MinimalLayerRecord,
    Origin, SCHEMA_VERSION,
};
