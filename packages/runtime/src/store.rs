//! Versioned runtime state for compiled layers.
//!
//! The store owns one mutable state record per layer id plus the child
//! adjacency lists the compiler produced. Mutations are normalized at the
//! boundary, snapshotted into an undo stack on every call, and optionally
//! propagated down the subtree as relative deltas. Reads hand out owned
//! copies; callers can never alias into the live map.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::StateError;
use scenelayer_common::iso_now;
use scenelayer_compiler::{FullLayerMap, Origin};

pub const STATE_SCHEMA_VERSION: &str = "1.0";

/// Lifecycle status of a layer's runtime state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerStatus {
    Idle,
    Animating,
    Locked,
}

/// Mutable per-layer runtime record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerState {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
    pub rotation: f64,
    pub opacity: f64,
    pub visible: bool,
    pub origin: Option<Origin>,
    pub status: LayerStatus,
    pub last_update: String,
    pub z: f64,
}

impl LayerState {
    fn new_default(origin: Option<Origin>) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            scale: 1.0,
            rotation: 0.0,
            opacity: 1.0,
            visible: true,
            origin,
            status: LayerStatus::Idle,
            last_update: iso_now(),
            z: 0.0,
        }
    }
}

impl Default for LayerState {
    fn default() -> Self {
        Self::new_default(None)
    }
}

fn clamp_opacity(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Partial state update: every tracked field, each optional.
///
/// One struct serves as the mutation payload, the batch entry body, the
/// external-snapshot shape, and the reconcile patch. An absent field means
/// "not carried". Unknown keys in incoming JSON are dropped by serde, which
/// is the documented lenient-write behavior.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayerPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<LayerStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

impl LayerPatch {
    pub fn is_empty(&self) -> bool {
        self == &LayerPatch::default()
    }

    pub fn with_x(mut self, x: f64) -> Self {
        self.x = Some(x);
        self
    }

    pub fn with_y(mut self, y: f64) -> Self {
        self.y = Some(y);
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn with_rotation(mut self, rotation: f64) -> Self {
        self.rotation = Some(rotation);
        self
    }

    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = Some(opacity);
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = Some(visible);
        self
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn with_status(mut self, status: LayerStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_z(mut self, z: f64) -> Self {
        self.z = Some(z);
        self
    }

    /// Fill in fields from `other` that this patch does not carry yet are
    /// present there, overwriting on overlap.
    pub fn merge(&mut self, other: &LayerPatch) {
        if other.x.is_some() {
            self.x = other.x;
        }
        if other.y.is_some() {
            self.y = other.y;
        }
        if other.scale.is_some() {
            self.scale = other.scale;
        }
        if other.rotation.is_some() {
            self.rotation = other.rotation;
        }
        if other.opacity.is_some() {
            self.opacity = other.opacity;
        }
        if other.visible.is_some() {
            self.visible = other.visible;
        }
        if other.origin.is_some() {
            self.origin = other.origin;
        }
        if other.status.is_some() {
            self.status = other.status;
        }
        if other.last_update.is_some() {
            self.last_update = other.last_update.clone();
        }
        if other.z.is_some() {
            self.z = other.z;
        }
    }

    /// Boundary normalization: opacity clamped into [0, 1], lastUpdate
    /// defaulted to now when not supplied.
    fn normalized(&self) -> LayerPatch {
        let mut out = self.clone();
        if let Some(opacity) = out.opacity {
            out.opacity = Some(clamp_opacity(opacity));
        }
        if out.last_update.is_none() {
            out.last_update = Some(iso_now());
        }
        out
    }

    /// Shallow per-field merge into a state record. Origin is replaced
    /// wholesale, never deep-merged.
    fn apply_to(&self, state: &mut LayerState) {
        if let Some(x) = self.x {
            state.x = x;
        }
        if let Some(y) = self.y {
            state.y = y;
        }
        if let Some(scale) = self.scale {
            state.scale = scale;
        }
        if let Some(rotation) = self.rotation {
            state.rotation = rotation;
        }
        if let Some(opacity) = self.opacity {
            state.opacity = opacity;
        }
        if let Some(visible) = self.visible {
            state.visible = visible;
        }
        if let Some(origin) = self.origin {
            state.origin = Some(origin);
        }
        if let Some(status) = self.status {
            state.status = status;
        }
        if let Some(last_update) = &self.last_update {
            state.last_update = last_update.clone();
        }
        if let Some(z) = self.z {
            state.z = z;
        }
    }
}

impl From<&LayerState> for LayerPatch {
    fn from(state: &LayerState) -> Self {
        Self {
            x: Some(state.x),
            y: Some(state.y),
            scale: Some(state.scale),
            rotation: Some(state.rotation),
            opacity: Some(state.opacity),
            visible: Some(state.visible),
            origin: state.origin,
            status: Some(state.status),
            last_update: Some(state.last_update.clone()),
            z: Some(state.z),
        }
    }
}

/// One entry of a batched mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchChange {
    pub layer_id: String,
    pub props: LayerPatch,
}

/// What a batch entry actually applied after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedChange {
    pub layer_id: String,
    pub applied: LayerPatch,
}

/// Exported runtime-state envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerStateDocument {
    pub schema_version: String,
    pub timestamp: String,
    pub layers: HashMap<String, LayerState>,
}

/// State store with deterministic history and group propagation.
#[derive(Debug, Clone, Default)]
pub struct StateStore {
    layer_tree: HashMap<String, Vec<String>>,
    current: HashMap<String, LayerState>,
    history: Vec<HashMap<String, LayerState>>,
    future: Vec<HashMap<String, LayerState>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Eagerly seed default state for every compiled layer. Duplicate ids in
    /// the layer list resolve last-one-wins, matching every other id-indexed
    /// consumer of the compiled document.
    pub fn from_layer_map(layer_map: &FullLayerMap) -> Self {
        let mut store = Self::new();
        for layer in &layer_map.layers {
            store
                .layer_tree
                .insert(layer.id.clone(), layer.children.clone());
            store
                .current
                .insert(layer.id.clone(), LayerState::new_default(layer.default_origin));
        }
        store
    }

    pub fn contains_layer(&self, layer_id: &str) -> bool {
        self.current.contains_key(layer_id)
    }

    pub fn children(&self, layer_id: &str) -> &[String] {
        self.layer_tree
            .get(layer_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn ensure_layer(&mut self, layer_id: &str) {
        if !self.current.contains_key(layer_id) {
            self.current
                .insert(layer_id.to_string(), LayerState::default());
        }
        self.layer_tree.entry(layer_id.to_string()).or_default();
    }

    fn commit_history(&mut self) {
        self.history.push(self.current.clone());
        self.future.clear();
    }

    fn apply_direct(&mut self, layer_id: &str, patch: &LayerPatch) -> LayerPatch {
        self.ensure_layer(layer_id);
        let normalized = patch.normalized();
        if let Some(state) = self.current.get_mut(layer_id) {
            normalized.apply_to(state);
        }
        normalized
    }

    /// Apply a patch to one layer.
    ///
    /// Unknown ids auto-create a default entry first (lenient writes). A
    /// history snapshot is pushed on every call, no-ops included; the redo
    /// stack is cleared. Returns the normalized props that were applied.
    #[instrument(skip(self, patch), fields(layer_id = %layer_id, propagate))]
    pub fn set(&mut self, layer_id: &str, patch: &LayerPatch, propagate: bool) -> LayerPatch {
        self.ensure_layer(layer_id);
        self.commit_history();

        let before = self.current.get(layer_id).cloned().unwrap_or_default();
        let applied = self.apply_direct(layer_id, patch);

        if propagate && !self.children(layer_id).is_empty() {
            let after = self.current.get(layer_id).cloned().unwrap_or_default();
            self.propagate_delta(layer_id, &before, &after);
        }

        applied
    }

    /// Apply many patches under a single history snapshot: one `undo()`
    /// reverts the whole batch.
    pub fn batch_set(&mut self, changes: &[BatchChange], propagate: bool) -> Vec<AppliedChange> {
        self.commit_history();

        let mut applied_changes = Vec::with_capacity(changes.len());
        for change in changes {
            self.ensure_layer(&change.layer_id);
            let before = self.current.get(&change.layer_id).cloned().unwrap_or_default();
            let applied = self.apply_direct(&change.layer_id, &change.props);

            if propagate && !self.children(&change.layer_id).is_empty() {
                let after = self
                    .current
                    .get(&change.layer_id)
                    .cloned()
                    .unwrap_or_default();
                self.propagate_delta(&change.layer_id, &before, &after);
            }

            applied_changes.push(AppliedChange {
                layer_id: change.layer_id.clone(),
                applied,
            });
        }

        applied_changes
    }

    /// Distribute a parent's state change to its descendants.
    ///
    /// x, y, rotation, and z move by the parent's additive delta; scale and
    /// opacity multiply by the parent's ratio (ratio pinned to 1.0 when the
    /// before-value is zero). Each child's own before/after pair becomes the
    /// basis for its subtree, so a clamped child opacity shapes what its
    /// descendants receive. Driven by an explicit work stack; rotation adds
    /// to child rotation values and never rotates positional offsets.
    fn propagate_delta(&mut self, layer_id: &str, before: &LayerState, after: &LayerState) {
        let mut work: Vec<(String, LayerState, LayerState)> =
            vec![(layer_id.to_string(), before.clone(), after.clone())];

        while let Some((parent_id, before, after)) = work.pop() {
            let children = self.layer_tree.get(&parent_id).cloned().unwrap_or_default();
            if children.is_empty() {
                continue;
            }

            let dx = after.x - before.x;
            let dy = after.y - before.y;
            let drotation = after.rotation - before.rotation;
            let dz = after.z - before.z;
            let scale_ratio = if before.scale == 0.0 {
                1.0
            } else {
                after.scale / before.scale
            };
            let opacity_ratio = if before.opacity == 0.0 {
                1.0
            } else {
                after.opacity / before.opacity
            };

            for child_id in children {
                self.ensure_layer(&child_id);
                let child_before = self.current.get(&child_id).cloned().unwrap_or_default();
                if let Some(child) = self.current.get_mut(&child_id) {
                    child.x += dx;
                    child.y += dy;
                    child.rotation += drotation;
                    child.z += dz;
                    child.scale *= scale_ratio;
                    child.opacity = clamp_opacity(child.opacity * opacity_ratio);
                    child.last_update = iso_now();

                    debug!(child_id = %child_id, dx, dy, "propagated group delta");
                    work.push((child_id.clone(), child_before, child.clone()));
                }
            }
        }
    }

    /// Restore the previous snapshot. Returns false when there is nothing to
    /// undo; never an error.
    pub fn undo(&mut self) -> bool {
        match self.history.pop() {
            Some(previous) => {
                let replaced = std::mem::replace(&mut self.current, previous);
                self.future.push(replaced);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.future.pop() {
            Some(next) => {
                let replaced = std::mem::replace(&mut self.current, next);
                self.history.push(replaced);
                true
            }
            None => false,
        }
    }

    /// Strict read: unknown ids are a lookup failure, not an auto-create.
    pub fn layer_state(&self, layer_id: &str) -> Result<LayerState, StateError> {
        self.current
            .get(layer_id)
            .cloned()
            .ok_or_else(|| StateError::UnknownLayer(layer_id.to_string()))
    }

    /// Owned copy of the whole state map.
    pub fn state(&self) -> HashMap<String, LayerState> {
        self.current.clone()
    }

    pub fn history_depth(&self) -> usize {
        self.history.len()
    }

    pub fn future_depth(&self) -> usize {
        self.future.len()
    }

    pub fn export_state_document(&self) -> LayerStateDocument {
        LayerStateDocument {
            schema_version: STATE_SCHEMA_VERSION.to_string(),
            timestamp: iso_now(),
            layers: self.current.clone(),
        }
    }
}
