/// Reconciliation test suite: authority rules, lock override, tolerance,
/// and dry runs.
use std::collections::HashMap;

use crate::reconcile::{reconcile, Authority, ReconcileOptions, ReconcileOutcome};
use crate::store::{LayerPatch, LayerStatus, StateStore};

fn store_with(layer_id: &str, patch: LayerPatch) -> StateStore {
    let mut store = StateStore::new();
    store.set(layer_id, &patch, false);
    store
}

fn snapshot(entries: &[(&str, LayerPatch)]) -> HashMap<String, LayerPatch> {
    entries
        .iter()
        .map(|(id, patch)| (id.to_string(), patch.clone()))
        .collect()
}

#[test]
fn test_authority_parse() {
    assert_eq!("dom".parse::<Authority>().unwrap(), Authority::Dom);
    assert_eq!("store".parse::<Authority>().unwrap(), Authority::Store);
    assert!("upstream".parse::<Authority>().is_err());
}

#[test]
fn test_dom_authority_updates_store_in_place() {
    let mut store = store_with("badge", LayerPatch::default().with_x(1.0));
    let dom = snapshot(&[("badge", LayerPatch::default().with_x(50.0))]);

    let outcome = reconcile(&mut store, &dom, &ReconcileOptions::default());
    assert_eq!(outcome.changed_layer_ids, vec!["badge"]);
    assert!(outcome.dom_patch.is_empty());
    assert_eq!(store.layer_state("badge").unwrap().x, 50.0);
}

#[test]
fn test_store_authority_emits_dom_patch() {
    let mut store = store_with("badge", LayerPatch::default().with_x(7.0));
    let dom = snapshot(&[("badge", LayerPatch::default().with_x(50.0))]);

    let options = ReconcileOptions {
        prefer: Authority::Store,
        ..Default::default()
    };
    let outcome = reconcile(&mut store, &dom, &options);

    assert_eq!(outcome.changed_layer_ids, vec!["badge"]);
    assert_eq!(outcome.dom_patch["badge"].x, Some(7.0));
    // Store side untouched.
    assert_eq!(store.layer_state("badge").unwrap().x, 7.0);
}

#[test]
fn test_lock_beats_dom_preference() {
    let mut store = store_with(
        "badge",
        LayerPatch::default()
            .with_x(7.0)
            .with_status(LayerStatus::Locked),
    );
    let dom = snapshot(&[(
        "badge",
        LayerPatch::default()
            .with_x(99.0)
            .with_status(LayerStatus::Idle),
    )]);

    let outcome = reconcile(&mut store, &dom, &ReconcileOptions::default());

    assert_eq!(outcome.changed_layer_ids, vec!["badge"]);
    let patch = &outcome.dom_patch["badge"];
    assert_eq!(patch.x, Some(7.0));
    assert_eq!(patch.status, Some(LayerStatus::Locked));
    assert_eq!(store.layer_state("badge").unwrap().x, 7.0);
}

#[test]
fn test_dry_run_mutates_nothing_but_reports_everything() {
    let mut store = store_with("badge", LayerPatch::default().with_x(7.0));
    let dom = snapshot(&[("badge", LayerPatch::default().with_x(99.0))]);
    let before = store.state();
    let history_before = store.history_depth();

    let dry = reconcile(
        &mut store,
        &dom,
        &ReconcileOptions {
            dry_run: true,
            ..Default::default()
        },
    );
    assert_eq!(dry.changed_layer_ids, vec!["badge"]);
    assert_eq!(store.state(), before);
    assert_eq!(store.history_depth(), history_before);

    // Live run reports the same changed-id set.
    let live = reconcile(&mut store, &dom, &ReconcileOptions::default());
    assert_eq!(live.changed_layer_ids, dry.changed_layer_ids);
}

#[test]
fn test_dry_run_with_store_authority_computes_patch() {
    let mut store = store_with("badge", LayerPatch::default().with_x(7.0));
    let dom = snapshot(&[("badge", LayerPatch::default().with_x(99.0))]);
    let before = store.state();

    let outcome = reconcile(
        &mut store,
        &dom,
        &ReconcileOptions {
            prefer: Authority::Store,
            dry_run: true,
            ..Default::default()
        },
    );
    assert_eq!(outcome.dom_patch["badge"].x, Some(7.0));
    assert_eq!(store.state(), before);
}

#[test]
fn test_tolerance_suppresses_float_noise() {
    let mut store = store_with("badge", LayerPatch::default().with_x(1.0));
    let dom = snapshot(&[("badge", LayerPatch::default().with_x(1.0 + 1e-9))]);

    let outcome = reconcile(&mut store, &dom, &ReconcileOptions::default());
    assert_eq!(outcome, ReconcileOutcome::default());

    // A looser tolerance can swallow real drift too; that is the caller's
    // dial.
    let dom = snapshot(&[("badge", LayerPatch::default().with_x(1.4))]);
    let outcome = reconcile(
        &mut store,
        &dom,
        &ReconcileOptions {
            tolerance: 0.5,
            ..Default::default()
        },
    );
    assert!(outcome.changed_layer_ids.is_empty());
}

#[test]
fn test_external_only_layers_ignored() {
    let mut store = store_with("badge", LayerPatch::default().with_x(1.0));
    let dom = snapshot(&[("phantom", LayerPatch::default().with_x(5.0))]);

    let outcome = reconcile(&mut store, &dom, &ReconcileOptions::default());
    assert!(outcome.changed_layer_ids.is_empty());
    assert!(!store.contains_layer("phantom"));
}

#[test]
fn test_changed_ids_sorted() {
    let mut store = StateStore::new();
    store.set("zeta", &LayerPatch::default().with_x(0.0), false);
    store.set("alpha", &LayerPatch::default().with_x(0.0), false);

    let dom = snapshot(&[
        ("zeta", LayerPatch::default().with_x(2.0)),
        ("alpha", LayerPatch::default().with_x(3.0)),
    ]);

    let outcome = reconcile(&mut store, &dom, &ReconcileOptions::default());
    assert_eq!(outcome.changed_layer_ids, vec!["alpha", "zeta"]);
}

#[test]
fn test_dom_side_missing_field_skipped_under_dom_authority() {
    let mut store = store_with(
        "badge",
        LayerPatch::default().with_x(5.0).with_opacity(0.3),
    );
    // Snapshot carries only x; opacity must not be dragged toward a default.
    let dom = snapshot(&[("badge", LayerPatch::default().with_x(5.0))]);

    let outcome = reconcile(&mut store, &dom, &ReconcileOptions::default());
    assert!(outcome.changed_layer_ids.is_empty());
    assert_eq!(store.layer_state("badge").unwrap().opacity, 0.3);
}
