//! Runtime facade: the caller-side surface over compiler, store, tracker,
//! and reconciliation.
//!
//! This layer owns the policies the core deliberately leaves to its caller:
//! strict layer lookup, capability enforcement, constraint clamping, the
//! external-state mirror, and the state-version key that scopes render
//! caching. It performs no transport, no budgeting, and no rasterization.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};

use crate::error::ServiceError;
use crate::filter::{paginate, LayerFilter, LayerPage};
use crate::presets::AnimationPreset;
use scenelayer_compiler::{
    CapabilityKind, CompileManifest, DocumentCompiler, FullLayerMap, LayerRecord, MinimalLayerMap,
    Origin,
};
use scenelayer_runtime::{
    reconcile, AnimationTiming, Authority, LayerPatch, LayerStateDocument, LayerStatus,
    ReconcileOptions, RunKind, RunOutcome, RunRecord, RunStatus, RunTracker, StateStore,
    TimelineOutcome, TimelineStep,
};

/// 1x1 transparent PNG stand-in for every render request. Real rasterization
/// lives behind the rendering surface; the runtime only supplies the
/// state-version cache key.
pub const PLACEHOLDER_PNG_DATA_URI: &str = "data:image/png;base64,\
iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mP8/x8AAwMCAO5Xn5kAAAAASUVORK5CYII=";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderOptions {
    pub size: Option<RenderSize>,
    pub background: Option<String>,
    pub layers: Option<Vec<String>>,
}

/// Named or explicit transform anchor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OriginSpec {
    Preset(OriginPreset),
    Point(Origin),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OriginPreset {
    #[serde(rename = "center")]
    Center,
    #[serde(rename = "top")]
    Top,
    #[serde(rename = "bottom-left")]
    BottomLeft,
}

impl OriginPreset {
    fn resolve(&self, bbox: &scenelayer_compiler::BBox) -> Origin {
        match self {
            OriginPreset::Center => Origin {
                x: bbox.cx,
                y: bbox.cy,
            },
            OriginPreset::Top => Origin {
                x: bbox.cx,
                y: bbox.y,
            },
            OriginPreset::BottomLeft => Origin {
                x: bbox.x,
                y: bbox.y + bbox.height,
            },
        }
    }
}

/// Jitter configuration, validated and echoed back; the effect itself is a
/// renderer concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JitterParams {
    pub seed: u64,
    #[serde(rename = "maxXY")]
    pub max_xy: f64,
    pub max_z: f64,
    pub point_limit: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetOutcome {
    pub layer_id: String,
    pub applied: LayerPatch,
    pub run_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileStatus {
    pub compiler_version: String,
    pub source_checksum: String,
    pub generated_at: String,
    pub layer_count: usize,
    pub state_version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub kind: RunKind,
    pub status: RunStatus,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub step_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub snapshot_cache_entries: usize,
    pub undo_depth: usize,
    pub redo_depth: usize,
    pub state_version: u64,
    pub active_runs: usize,
    pub completed_runs: usize,
}

/// One compiled document plus its live runtime, behind capability and
/// constraint policy.
pub struct RuntimeService {
    source: String,
    compiler: DocumentCompiler,
    minimal_map: MinimalLayerMap,
    full_map: FullLayerMap,
    manifest: CompileManifest,
    store: StateStore,
    tracker: RunTracker,
    dom_layers: HashMap<String, LayerPatch>,
    snapshot_cache: HashMap<String, serde_json::Value>,
    state_version: u64,
}

fn mirror_of(store: &StateStore) -> HashMap<String, LayerPatch> {
    store
        .state()
        .iter()
        .map(|(id, state)| (id.clone(), LayerPatch::from(state)))
        .collect()
}

impl RuntimeService {
    pub fn new(source: &str) -> Result<Self, ServiceError> {
        Self::with_compiler(DocumentCompiler::default(), source)
    }

    pub fn with_compiler(compiler: DocumentCompiler, source: &str) -> Result<Self, ServiceError> {
        let output = compiler.compile(source)?;
        let store = StateStore::from_layer_map(&output.full);
        let dom_layers = mirror_of(&store);
        Ok(Self {
            source: source.to_string(),
            compiler,
            minimal_map: output.minimal,
            full_map: output.full,
            manifest: output.manifest,
            store,
            tracker: RunTracker::new(),
            dom_layers,
            snapshot_cache: HashMap::new(),
            state_version: 0,
        })
    }

    /// Swap in new source. Skips the rebuild when the manifest says nothing
    /// changed and `force` is off. Rebuilding resets runtime state, run
    /// history, the external mirror, caches, and the state version.
    #[instrument(skip(self, source))]
    pub fn compile_source(&mut self, source: &str, force: bool) -> Result<bool, ServiceError> {
        let reason = self
            .compiler
            .needs_recompile(source, Some(&self.manifest), force);
        let Some(reason) = reason else {
            return Ok(false);
        };

        let output = self.compiler.compile(source)?;
        info!(reason = reason.as_str(), layers = output.full.layer_count, "source recompiled");

        self.source = source.to_string();
        self.minimal_map = output.minimal;
        self.full_map = output.full;
        self.manifest = output.manifest;
        self.store = StateStore::from_layer_map(&self.full_map);
        self.tracker = RunTracker::new();
        self.dom_layers = mirror_of(&self.store);
        self.snapshot_cache.clear();
        self.state_version = 0;
        Ok(true)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn minimal_map(&self) -> &MinimalLayerMap {
        &self.minimal_map
    }

    pub fn full_map(&self) -> &FullLayerMap {
        &self.full_map
    }

    pub fn manifest(&self) -> &CompileManifest {
        &self.manifest
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn state_version(&self) -> u64 {
        self.state_version
    }

    /// Strict lookup into the full projection.
    fn layer_record(&self, layer_id: &str) -> Result<&LayerRecord, ServiceError> {
        self.full_map
            .layers
            .iter()
            .find(|layer| layer.id == layer_id)
            .ok_or_else(|| ServiceError::UnknownLayer(layer_id.to_string()))
    }

    /// Reject any carried property outside the layer's capability set.
    /// Untracked properties (visibility, origin, status) are always allowed.
    fn check_capabilities(&self, layer_id: &str, patch: &LayerPatch) -> Result<(), ServiceError> {
        let capabilities = &self.layer_record(layer_id)?.capabilities;
        let denied = |property: &'static str| ServiceError::CapabilityDenied {
            layer_id: layer_id.to_string(),
            property,
        };

        if patch.x.is_some() && !capabilities.allows(CapabilityKind::Move) {
            return Err(denied("x"));
        }
        if patch.y.is_some() && !capabilities.allows(CapabilityKind::Move) {
            return Err(denied("y"));
        }
        if patch.scale.is_some() && !capabilities.allows(CapabilityKind::Scale) {
            return Err(denied("scale"));
        }
        if patch.rotation.is_some() && !capabilities.allows(CapabilityKind::Rotate) {
            return Err(denied("rotation"));
        }
        if patch.opacity.is_some() && !capabilities.allows(CapabilityKind::Opacity) {
            return Err(denied("opacity"));
        }
        if patch.z.is_some() && !capabilities.allows(CapabilityKind::Depth) {
            return Err(denied("z"));
        }
        Ok(())
    }

    /// Clamp carried values into the layer's declared constraints. This is
    /// normalization, not validation: out-of-range input never errors.
    fn clamp_patch(&self, layer_id: &str, patch: &LayerPatch) -> Result<LayerPatch, ServiceError> {
        let constraints = self.layer_record(layer_id)?.constraints;
        let mut out = patch.clone();
        if let Some(opacity) = out.opacity {
            out.opacity = Some(opacity.clamp(0.0, 1.0));
        }
        if let Some(rotation) = out.rotation {
            let max_rotation = constraints.max_rotation.abs();
            out.rotation = Some(rotation.clamp(-max_rotation, max_rotation));
        }
        if let Some(z) = out.z {
            out.z = Some(z.clamp(constraints.min_depth, constraints.max_depth));
        }
        Ok(out)
    }

    /// Every state-touching operation lands here: bump the version, refresh
    /// the external mirror from the store, drop version-keyed caches.
    fn touch_state(&mut self) {
        self.state_version += 1;
        self.dom_layers = mirror_of(&self.store);
        self.snapshot_cache.clear();
    }

    pub fn list_layers(
        &self,
        filter: Option<&LayerFilter>,
        limit: usize,
        cursor: Option<&str>,
    ) -> LayerPage {
        let items: Vec<_> = self
            .minimal_map
            .layers
            .iter()
            .filter(|layer| filter.map_or(true, |f| f.matches(layer)))
            .cloned()
            .collect();
        paginate(items, limit, cursor)
    }

    pub fn layer_detail(&self, layer_id: &str) -> Result<LayerRecord, ServiceError> {
        Ok(self.layer_record(layer_id)?.clone())
    }

    /// Runtime-state document, optionally restricted to a subset of ids.
    pub fn layer_state_document(&self, layer_ids: Option<&[String]>) -> LayerStateDocument {
        let mut doc = self.store.export_state_document();
        if let Some(ids) = layer_ids {
            doc.layers.retain(|id, _| ids.iter().any(|want| want == id));
        }
        doc
    }

    #[instrument(skip(self, props), fields(layer_id = %layer_id))]
    pub fn set_layer_state(
        &mut self,
        layer_id: &str,
        props: &LayerPatch,
    ) -> Result<SetOutcome, ServiceError> {
        self.check_capabilities(layer_id, props)?;
        let clamped = self.clamp_patch(layer_id, props)?;

        let outcome = self.tracker.run_set(&mut self.store, layer_id, &clamped)?;
        self.touch_state();
        Ok(SetOutcome {
            layer_id: layer_id.to_string(),
            applied: clamped,
            run_id: outcome.run_id,
        })
    }

    /// Resolve a named or explicit anchor against the compiled bbox and
    /// store it.
    pub fn set_origin(
        &mut self,
        layer_id: &str,
        spec: &OriginSpec,
    ) -> Result<Origin, ServiceError> {
        let bbox = self.layer_record(layer_id)?.bbox;
        let resolved = match spec {
            OriginSpec::Preset(preset) => preset.resolve(&bbox),
            OriginSpec::Point(point) => *point,
        };
        self.set_layer_state(layer_id, &LayerPatch::default().with_origin(resolved))?;
        Ok(resolved)
    }

    #[instrument(skip(self, from, to, timing), fields(layer_id = %layer_id))]
    pub fn animate_layer(
        &mut self,
        layer_id: &str,
        from: Option<&LayerPatch>,
        to: &LayerPatch,
        timing: &AnimationTiming,
    ) -> Result<RunOutcome, ServiceError> {
        self.layer_record(layer_id)?;
        if let Some(from_props) = from {
            self.check_capabilities(layer_id, from_props)?;
        }
        self.check_capabilities(layer_id, to)?;

        let from_clamped = match from {
            Some(from_props) => Some(self.clamp_patch(layer_id, from_props)?),
            None => None,
        };
        let to_clamped = self.clamp_patch(layer_id, to)?;

        let outcome = self.tracker.run_animate(
            &mut self.store,
            layer_id,
            from_clamped.as_ref(),
            &to_clamped,
            timing,
        )?;
        self.touch_state();
        Ok(outcome)
    }

    /// Validate and clamp every declared step, then apply them in request
    /// order as one run.
    pub fn timeline(&mut self, steps: &[TimelineStep]) -> Result<TimelineOutcome, ServiceError> {
        let mut normalized = Vec::with_capacity(steps.len());
        for step in steps {
            self.layer_record(&step.layer_id)?;
            if let Some(from_props) = &step.from {
                self.check_capabilities(&step.layer_id, from_props)?;
            }
            self.check_capabilities(&step.layer_id, &step.to)?;

            let from = match &step.from {
                Some(from_props) => Some(self.clamp_patch(&step.layer_id, from_props)?),
                None => None,
            };
            normalized.push(TimelineStep {
                layer_id: step.layer_id.clone(),
                from,
                to: self.clamp_patch(&step.layer_id, &step.to)?,
                duration: step.duration,
                ease: step.ease.clone(),
                delay: step.delay,
                at: step.at.clone(),
            });
        }

        let outcome = self.tracker.run_timeline(&mut self.store, &normalized);
        self.touch_state();
        Ok(outcome)
    }

    pub fn set_layer_depth(&mut self, layer_id: &str, z: f64) -> Result<f64, ServiceError> {
        let outcome = self.set_layer_state(layer_id, &LayerPatch::default().with_z(z))?;
        Ok(outcome.applied.z.unwrap_or(z))
    }

    pub fn animate_layer_depth(
        &mut self,
        layer_id: &str,
        from: Option<f64>,
        to: f64,
        duration: f64,
        ease: &str,
    ) -> Result<RunOutcome, ServiceError> {
        let from_patch = from.map(|z| LayerPatch::default().with_z(z));
        self.animate_layer(
            layer_id,
            from_patch.as_ref(),
            &LayerPatch::default().with_z(to),
            &AnimationTiming {
                duration,
                ease: ease.to_string(),
                delay: 0.0,
            },
        )
    }

    pub fn run_preset(
        &mut self,
        layer_id: &str,
        preset: AnimationPreset,
    ) -> Result<RunOutcome, ServiceError> {
        let plan = preset.plan();
        self.animate_layer(layer_id, plan.from.as_ref(), &plan.to, &plan.timing)
    }

    /// Effects are gated on the layer's capability and echoed back; applying
    /// one is the rendering surface's job.
    pub fn set_effect(
        &mut self,
        layer_id: &str,
        effect: &serde_json::Value,
    ) -> Result<serde_json::Value, ServiceError> {
        if !self.layer_record(layer_id)?.capabilities.effect {
            return Err(ServiceError::CapabilityDenied {
                layer_id: layer_id.to_string(),
                property: "effect",
            });
        }
        self.set_layer_state(layer_id, &LayerPatch::default().with_status(LayerStatus::Idle))?;
        Ok(effect.clone())
    }

    pub fn set_jitter(
        &mut self,
        layer_id: &str,
        params: &JitterParams,
    ) -> Result<JitterParams, ServiceError> {
        if !self.layer_record(layer_id)?.capabilities.jitter {
            return Err(ServiceError::CapabilityDenied {
                layer_id: layer_id.to_string(),
                property: "jitter",
            });
        }
        self.set_layer_state(layer_id, &LayerPatch::default().with_status(LayerStatus::Idle))?;
        Ok(params.clone())
    }

    /// Record externally observed layer state (e.g. what the rendering
    /// surface actually shows) into the mirror that reconciliation compares
    /// against.
    pub fn record_external_state(&mut self, layer_id: &str, patch: &LayerPatch) {
        self.dom_layers
            .entry(layer_id.to_string())
            .or_default()
            .merge(patch);
    }

    pub fn external_state(&self) -> &HashMap<String, LayerPatch> {
        &self.dom_layers
    }

    /// Reconcile the store against the external mirror, external side
    /// preferred. Live runs fold the resulting patch back into the mirror.
    #[instrument(skip(self))]
    pub fn reconcile(&mut self, dry_run: bool) -> Vec<String> {
        let options = ReconcileOptions {
            prefer: Authority::Dom,
            dry_run,
            ..Default::default()
        };
        let outcome = reconcile(&mut self.store, &self.dom_layers, &options);

        if !dry_run {
            for (layer_id, patch) in &outcome.dom_patch {
                self.dom_layers
                    .entry(layer_id.clone())
                    .or_default()
                    .merge(patch);
            }
            self.touch_state();
        }
        outcome.changed_layer_ids
    }

    fn render_key(&self, kind: &str, frames: Option<u32>, options: &RenderOptions) -> String {
        let mut layers = options.layers.clone().unwrap_or_default();
        layers.sort();
        json!({
            "kind": kind,
            "frames": frames,
            "size": options.size,
            "background": options.background,
            "layers": layers,
            "stateVersion": self.state_version,
        })
        .to_string()
    }

    /// Placeholder artifact keyed by (size, background, layer subset,
    /// state version). Identical keys hit the cache until the next state
    /// touch.
    pub fn render_snapshot(&mut self, options: &RenderOptions) -> String {
        let key = self.render_key("snapshot", None, options);
        if let Some(cached) = self.snapshot_cache.get(&key).and_then(|v| v.as_str()) {
            return cached.to_string();
        }
        self.snapshot_cache
            .insert(key, json!(PLACEHOLDER_PNG_DATA_URI));
        PLACEHOLDER_PNG_DATA_URI.to_string()
    }

    pub fn render_sequence(&mut self, frames: u32, options: &RenderOptions) -> Vec<String> {
        let key = self.render_key("sequence", Some(frames), options);
        if let Some(cached) = self.snapshot_cache.get(&key) {
            if let Some(list) = cached.as_array() {
                return list
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect();
            }
        }
        let output = vec![PLACEHOLDER_PNG_DATA_URI.to_string(); frames as usize];
        self.snapshot_cache.insert(key, json!(output));
        output
    }

    pub fn undo(&mut self) -> bool {
        let ok = self.store.undo();
        if ok {
            self.touch_state();
        }
        ok
    }

    pub fn redo(&mut self) -> bool {
        let ok = self.store.redo();
        if ok {
            self.touch_state();
        }
        ok
    }

    pub fn compile_status(&self) -> CompileStatus {
        CompileStatus {
            compiler_version: self.manifest.compiler_version.clone(),
            source_checksum: self.manifest.source_checksum.clone(),
            generated_at: self.manifest.generated_at.clone(),
            layer_count: self.minimal_map.layer_count,
            state_version: self.state_version,
        }
    }

    /// Completed runs, most recent first.
    pub fn run_log(&self, limit: usize) -> Vec<RunSummary> {
        let mut runs: Vec<&RunRecord> = self.tracker.completed_runs().collect();
        runs.sort_by(|a, b| {
            let key_a = (a.finished_at.as_deref().unwrap_or(""), a.run_id.as_str());
            let key_b = (b.finished_at.as_deref().unwrap_or(""), b.run_id.as_str());
            key_b.cmp(&key_a)
        });
        runs.into_iter()
            .take(limit)
            .map(|run| RunSummary {
                run_id: run.run_id.clone(),
                kind: run.kind,
                status: run.status,
                started_at: run.started_at.clone(),
                finished_at: run.finished_at.clone(),
                step_count: run.steps.len(),
            })
            .collect()
    }

    pub fn cancel_run(&mut self, run_id: &str) -> bool {
        self.tracker.cancel(run_id)
    }

    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            snapshot_cache_entries: self.snapshot_cache.len(),
            undo_depth: self.store.history_depth(),
            redo_depth: self.store.future_depth(),
            state_version: self.state_version,
            active_runs: self.tracker.active_count(),
            completed_runs: self.tracker.completed_count(),
        }
    }
}
