//! On-disk artifact form: the two layer-map projections plus the manifest,
//! written byte-for-byte from the in-memory documents. Presence of all three
//! files with a non-stale manifest allows skipping recompilation.

use std::fs;
use std::path::Path;

use tracing::{debug, info, instrument};

use crate::compiler::{CompileOutput, DocumentCompiler, RecompileReason};
use crate::error::CompileError;
use crate::schema::{CompileManifest, FullLayerMap, MinimalLayerMap};

pub const LAYER_MAP_MIN_FILE: &str = "layer_map_min.json";
pub const LAYER_MAP_FULL_FILE: &str = "layer_map_full.json";
pub const COMPILE_MANIFEST_FILE: &str = "compile_manifest.json";

/// Result of a directory compile: the documents plus whether a fresh compile
/// actually ran and why.
#[derive(Debug, Clone)]
pub struct CompileOutcome {
    pub output: CompileOutput,
    pub recompiled: bool,
    pub reason: Option<RecompileReason>,
}

/// Read a previously written manifest back, if one exists and parses.
pub fn load_manifest(dir: &Path) -> Option<CompileManifest> {
    let text = fs::read_to_string(dir.join(COMPILE_MANIFEST_FILE)).ok()?;
    serde_json::from_str(&text).ok()
}

impl DocumentCompiler {
    /// Compile into `dir`, reusing the artifacts already there when the
    /// manifest says nothing changed and all three files are present.
    ///
    /// A stale-free manifest with missing artifact files still recompiles;
    /// in that case `recompiled` is true while `reason` stays `None`.
    #[instrument(skip(self, source, previous_manifest), fields(dir = %dir.display()))]
    pub fn compile_to_directory(
        &self,
        source: &str,
        dir: &Path,
        previous_manifest: Option<&CompileManifest>,
        manual: bool,
    ) -> Result<CompileOutcome, CompileError> {
        fs::create_dir_all(dir)?;

        let reason = self.needs_recompile(source, previous_manifest, manual);
        let min_path = dir.join(LAYER_MAP_MIN_FILE);
        let full_path = dir.join(LAYER_MAP_FULL_FILE);
        let manifest_path = dir.join(COMPILE_MANIFEST_FILE);

        if reason.is_none() && min_path.exists() && full_path.exists() && manifest_path.exists() {
            let minimal: MinimalLayerMap = serde_json::from_str(&fs::read_to_string(&min_path)?)?;
            let full: FullLayerMap = serde_json::from_str(&fs::read_to_string(&full_path)?)?;
            let manifest: CompileManifest =
                serde_json::from_str(&fs::read_to_string(&manifest_path)?)?;
            debug!("artifacts fresh, recompile skipped");
            return Ok(CompileOutcome {
                output: CompileOutput {
                    minimal,
                    full,
                    manifest,
                },
                recompiled: false,
                reason: None,
            });
        }

        let output = self.compile(source)?;
        fs::write(&min_path, serde_json::to_string_pretty(&output.minimal)?)?;
        fs::write(&full_path, serde_json::to_string_pretty(&output.full)?)?;
        fs::write(&manifest_path, serde_json::to_string_pretty(&output.manifest)?)?;
        info!(reason = reason.map(|r| r.as_str()), "compile artifacts written");

        Ok(CompileOutcome {
            output,
            recompiled: true,
            reason,
        })
    }
}
