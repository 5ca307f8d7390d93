//! Conflict resolution between the store and an externally mutated copy of
//! the same state (e.g. a live rendering surface).
//!
//! Rules, in order:
//! 1. A layer whose store status is `locked` is store-authoritative.
//! 2. Otherwise the caller's preference picks the authority.
//! 3. Only tracked runtime fields reconcile, and only when the
//!    authoritative side actually carries a value for the field.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::ReconcileError;
use crate::store::{LayerPatch, LayerState, LayerStatus, StateStore};

pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Which copy wins a conflict for a given field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Authority {
    Dom,
    Store,
}

impl FromStr for Authority {
    type Err = ReconcileError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "dom" => Ok(Authority::Dom),
            "store" => Ok(Authority::Store),
            other => Err(ReconcileError::InvalidAuthority(other.to_string())),
        }
    }
}

impl std::fmt::Display for Authority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Authority::Dom => "dom",
            Authority::Store => "store",
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReconcileOptions {
    pub prefer: Authority,
    pub dry_run: bool,
    pub tolerance: f64,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            prefer: Authority::Dom,
            dry_run: false,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// Outcome of one reconciliation pass: which layers diverged, and the field
/// values the external side must adopt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileOutcome {
    pub changed_layer_ids: Vec<String>,
    pub dom_patch: HashMap<String, LayerPatch>,
}

fn numeric_differs(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() > tolerance
}

/// Per-layer divergence between a store record and an external snapshot
/// entry, split by which side must change.
struct FieldDiff {
    update_for_store: LayerPatch,
    update_for_dom: LayerPatch,
}

impl FieldDiff {
    fn any(&self) -> bool {
        !self.update_for_store.is_empty() || !self.update_for_dom.is_empty()
    }
}

fn diff_layer(
    store_state: &LayerState,
    dom_state: &LayerPatch,
    authority: Authority,
    tolerance: f64,
) -> FieldDiff {
    let mut update_for_store = LayerPatch::default();
    let mut update_for_dom = LayerPatch::default();

    // Numeric fields compare within tolerance. The authoritative side must
    // carry the field; the store always carries numerics, so only the dom
    // side can skip them.
    macro_rules! numeric_field {
        ($field:ident) => {
            match authority {
                Authority::Dom => {
                    if let Some(dom_value) = dom_state.$field {
                        if numeric_differs(store_state.$field, dom_value, tolerance) {
                            update_for_store.$field = Some(dom_value);
                        }
                    }
                }
                Authority::Store => {
                    let differs = match dom_state.$field {
                        Some(dom_value) => {
                            numeric_differs(store_state.$field, dom_value, tolerance)
                        }
                        None => true,
                    };
                    if differs {
                        update_for_dom.$field = Some(store_state.$field);
                    }
                }
            }
        };
    }

    numeric_field!(x);
    numeric_field!(y);
    numeric_field!(scale);
    numeric_field!(rotation);
    numeric_field!(opacity);
    numeric_field!(z);

    match authority {
        Authority::Dom => {
            if let Some(dom_visible) = dom_state.visible {
                if store_state.visible != dom_visible {
                    update_for_store.visible = Some(dom_visible);
                }
            }
            if let Some(dom_origin) = dom_state.origin {
                if store_state.origin != Some(dom_origin) {
                    update_for_store.origin = Some(dom_origin);
                }
            }
            if let Some(dom_status) = dom_state.status {
                if store_state.status != dom_status {
                    update_for_store.status = Some(dom_status);
                }
            }
        }
        Authority::Store => {
            if dom_state.visible != Some(store_state.visible) {
                update_for_dom.visible = Some(store_state.visible);
            }
            // Origin must be present on the store side to be authoritative.
            if let Some(store_origin) = store_state.origin {
                if dom_state.origin != Some(store_origin) {
                    update_for_dom.origin = Some(store_origin);
                }
            }
            if dom_state.status != Some(store_state.status) {
                update_for_dom.status = Some(store_state.status);
            }
        }
    }

    FieldDiff {
        update_for_store,
        update_for_dom,
    }
}

/// Reconcile the store against an external snapshot.
///
/// Only ids present in both copies are considered. With dom authority the
/// store is updated in place (propagation off); with store authority the
/// external patch accumulates what the caller must apply. A dry run computes
/// the changed-id set and the patch without touching the store. The changed
/// id list is sorted and deduplicated.
#[instrument(skip(store, dom_layers), fields(layers = dom_layers.len(), prefer = %options.prefer, dry_run = options.dry_run))]
pub fn reconcile(
    store: &mut StateStore,
    dom_layers: &HashMap<String, LayerPatch>,
    options: &ReconcileOptions,
) -> ReconcileOutcome {
    let mut changed_layer_ids: Vec<String> = Vec::new();
    let mut dom_patch: HashMap<String, LayerPatch> = HashMap::new();

    let mut layer_ids: Vec<&String> = dom_layers.keys().collect();
    layer_ids.sort();

    for layer_id in layer_ids {
        let Ok(store_state) = store.layer_state(layer_id) else {
            continue;
        };
        let Some(dom_state) = dom_layers.get(layer_id) else {
            continue;
        };

        // Lock beats preference.
        let authority = if store_state.status == LayerStatus::Locked {
            Authority::Store
        } else {
            options.prefer
        };

        let diff = diff_layer(&store_state, dom_state, authority, options.tolerance);
        if !diff.any() {
            continue;
        }

        debug!(layer_id = %layer_id, authority = %authority, "layer diverged");
        changed_layer_ids.push(layer_id.clone());

        if !diff.update_for_store.is_empty() && !options.dry_run {
            store.set(layer_id, &diff.update_for_store, false);
        }
        if !diff.update_for_dom.is_empty() {
            dom_patch.insert(layer_id.clone(), diff.update_for_dom);
        }
    }

    changed_layer_ids.sort();
    changed_layer_ids.dedup();

    ReconcileOutcome {
        changed_layer_ids,
        dom_patch,
    }
}
