/// State store test suite: defaults, normalization, history, and group
/// propagation.
use crate::store::{BatchChange, LayerPatch, LayerStatus, StateStore};
use scenelayer_compiler::DocumentCompiler;

const TREE_SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg">
    <g id="root_group">
        <rect id="child_a" x="0" y="0" width="10" height="10" />
        <rect id="child_b" x="20" y="0" width="10" height="10" />
    </g>
</svg>"#;

const NESTED_SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg">
    <g id="outer">
        <g id="inner">
            <rect id="leaf" x="0" y="0" width="5" height="5" />
        </g>
    </g>
</svg>"#;

fn store_from(svg: &str) -> StateStore {
    let output = DocumentCompiler::default().compile(svg).expect("compile failed");
    StateStore::from_layer_map(&output.full)
}

#[test]
fn test_from_layer_map_seeds_defaults() {
    let store = store_from(TREE_SVG);

    let state = store.layer_state("child_a").unwrap();
    assert_eq!(state.x, 0.0);
    assert_eq!(state.scale, 1.0);
    assert_eq!(state.opacity, 1.0);
    assert!(state.visible);
    assert_eq!(state.status, LayerStatus::Idle);

    // Default origin comes from the compiled bbox center.
    let origin = state.origin.unwrap();
    assert_eq!((origin.x, origin.y), (5.0, 5.0));

    assert_eq!(store.children("root_group"), &["child_a", "child_b"]);
}

#[test]
fn test_set_merges_and_returns_applied() {
    let mut store = store_from(TREE_SVG);

    let applied = store.set(
        "child_a",
        &LayerPatch::default().with_x(3.0).with_rotation(12.0),
        false,
    );
    assert_eq!(applied.x, Some(3.0));
    assert_eq!(applied.rotation, Some(12.0));
    assert!(applied.last_update.is_some());

    let state = store.layer_state("child_a").unwrap();
    assert_eq!(state.x, 3.0);
    assert_eq!(state.rotation, 12.0);
    // Untouched fields survive the merge.
    assert_eq!(state.scale, 1.0);
}

#[test]
fn test_set_clamps_opacity() {
    let mut store = store_from(TREE_SVG);

    let applied = store.set("child_a", &LayerPatch::default().with_opacity(-2.0), false);
    assert_eq!(applied.opacity, Some(0.0));
    assert_eq!(store.layer_state("child_a").unwrap().opacity, 0.0);

    let applied = store.set("child_a", &LayerPatch::default().with_opacity(3.5), false);
    assert_eq!(applied.opacity, Some(1.0));
}

#[test]
fn test_lenient_writes_strict_reads() {
    let mut store = StateStore::new();

    // Writing an unknown id creates default state.
    store.set("ghost", &LayerPatch::default().with_x(5.0), false);
    assert_eq!(store.layer_state("ghost").unwrap().x, 5.0);

    // Reading an unknown id is a lookup failure.
    assert!(store.layer_state("nobody").is_err());
}

#[test]
fn test_history_pushed_on_every_call_including_noops() {
    let mut store = store_from(TREE_SVG);
    assert_eq!(store.history_depth(), 0);

    store.set("child_a", &LayerPatch::default(), false);
    store.set("child_a", &LayerPatch::default(), false);
    assert_eq!(store.history_depth(), 2);
}

#[test]
fn test_undo_redo_exactness() {
    let mut store = store_from(TREE_SVG);
    let initial = store.state();

    for i in 1..=4 {
        store.set("child_a", &LayerPatch::default().with_x(i as f64), false);
    }

    for _ in 0..4 {
        assert!(store.undo());
    }
    assert!(!store.undo());

    // lastUpdate is part of the snapshot, so deep equality holds.
    assert_eq!(store.state(), initial);

    assert!(store.redo());
    assert_eq!(store.layer_state("child_a").unwrap().x, 1.0);
    assert!(store.redo());
    assert_eq!(store.layer_state("child_a").unwrap().x, 2.0);
}

#[test]
fn test_new_mutation_clears_redo_stack() {
    let mut store = store_from(TREE_SVG);

    store.set("child_a", &LayerPatch::default().with_x(1.0), false);
    store.set("child_a", &LayerPatch::default().with_x(2.0), false);
    assert!(store.undo());
    assert_eq!(store.future_depth(), 1);

    store.set("child_a", &LayerPatch::default().with_x(9.0), false);
    assert_eq!(store.future_depth(), 0);
    assert!(!store.redo());
}

#[test]
fn test_group_propagation_end_to_end() {
    let mut store = store_from(TREE_SVG);

    store.set(
        "child_a",
        &LayerPatch::default()
            .with_x(2.0)
            .with_y(4.0)
            .with_scale(1.5)
            .with_rotation(10.0)
            .with_z(1.0),
        true,
    );
    store.set(
        "root_group",
        &LayerPatch::default()
            .with_x(10.0)
            .with_y(-3.0)
            .with_scale(2.0)
            .with_rotation(5.0)
            .with_z(7.0),
        true,
    );

    let a = store.layer_state("child_a").unwrap();
    assert_eq!(a.x, 12.0);
    assert_eq!(a.y, 1.0);
    assert_eq!(a.rotation, 15.0);
    assert_eq!(a.z, 8.0);
    assert_eq!(a.scale, 3.0);

    let b = store.layer_state("child_b").unwrap();
    assert_eq!(b.x, 10.0);
    assert_eq!(b.y, -3.0);
    assert_eq!(b.rotation, 5.0);
    assert_eq!(b.z, 7.0);
    assert_eq!(b.scale, 2.0);
}

#[test]
fn test_propagation_recurses_through_nested_groups() {
    let mut store = store_from(NESTED_SVG);

    store.set(
        "outer",
        &LayerPatch::default().with_x(5.0).with_opacity(0.5),
        true,
    );

    let inner = store.layer_state("inner").unwrap();
    assert_eq!(inner.x, 5.0);
    assert_eq!(inner.opacity, 0.5);

    let leaf = store.layer_state("leaf").unwrap();
    assert_eq!(leaf.x, 5.0);
    assert_eq!(leaf.opacity, 0.5);
}

#[test]
fn test_propagation_ratio_guard_on_zero() {
    let mut store = store_from(TREE_SVG);

    store.set("root_group", &LayerPatch::default().with_scale(0.0), true);
    // Children followed the ratio down to zero.
    assert_eq!(store.layer_state("child_a").unwrap().scale, 0.0);

    // From zero the ratio pins to 1.0 instead of dividing by zero.
    store.set("root_group", &LayerPatch::default().with_scale(2.0), true);
    assert_eq!(store.layer_state("child_a").unwrap().scale, 0.0);
}

#[test]
fn test_propagation_clamps_child_opacity() {
    let mut store = store_from(TREE_SVG);

    store.set("root_group", &LayerPatch::default().with_opacity(0.5), true);
    store.set("child_a", &LayerPatch::default().with_opacity(0.9), false);

    // Parent going 0.5 -> 1.0 doubles children; child_a would hit 1.8.
    store.set("root_group", &LayerPatch::default().with_opacity(1.0), true);
    assert_eq!(store.layer_state("child_a").unwrap().opacity, 1.0);
    assert_eq!(store.layer_state("child_b").unwrap().opacity, 1.0);
}

#[test]
fn test_propagation_does_not_rotate_offsets() {
    let mut store = store_from(TREE_SVG);

    store.set("child_a", &LayerPatch::default().with_x(10.0), true);
    store.set("root_group", &LayerPatch::default().with_rotation(90.0), true);

    // Rotation only adds to the child's rotation value; its positional
    // offset is untouched.
    let a = store.layer_state("child_a").unwrap();
    assert_eq!(a.rotation, 90.0);
    assert_eq!(a.x, 10.0);
}

#[test]
fn test_batch_set_single_history_snapshot() {
    let mut store = store_from(TREE_SVG);
    let initial = store.state();

    let applied = store.batch_set(
        &[
            BatchChange {
                layer_id: "child_a".to_string(),
                props: LayerPatch::default().with_x(1.0),
            },
            BatchChange {
                layer_id: "child_b".to_string(),
                props: LayerPatch::default().with_x(2.0),
            },
        ],
        false,
    );
    assert_eq!(applied.len(), 2);
    assert_eq!(applied[0].layer_id, "child_a");
    assert_eq!(applied[1].applied.x, Some(2.0));
    assert_eq!(store.history_depth(), 1);

    // One undo reverts the whole batch.
    assert!(store.undo());
    assert_eq!(store.state(), initial);
}

#[test]
fn test_copy_on_read_isolation() {
    let mut store = store_from(TREE_SVG);

    let mut copy = store.layer_state("child_a").unwrap();
    copy.x = 999.0;
    assert_eq!(store.layer_state("child_a").unwrap().x, 0.0);

    let mut map = store.state();
    if let Some(state) = map.get_mut("child_b") {
        state.y = 999.0;
    }
    assert_eq!(store.layer_state("child_b").unwrap().y, 0.0);

    store.set("child_a", &LayerPatch::default().with_x(1.0), false);
    assert_eq!(map.get("child_a").map(|s| s.x), Some(0.0));
}

#[test]
fn test_export_state_document_envelope() {
    let store = store_from(TREE_SVG);
    let doc = store.export_state_document();

    assert_eq!(doc.schema_version, "1.0");
    assert!(doc.timestamp.ends_with('Z'));
    assert!(doc.layers.contains_key("root_group"));
    assert!(doc.layers.contains_key("child_a"));

    let json = serde_json::to_value(&doc).unwrap();
    assert!(json.get("schemaVersion").is_some());
    assert!(json["layers"]["child_a"].get("lastUpdate").is_some());
}

#[test]
fn test_patch_drops_unknown_json_keys() {
    let patch: LayerPatch =
        serde_json::from_str(r#"{"x": 4.0, "sparkle": true, "depth": 9}"#).unwrap();
    assert_eq!(patch.x, Some(4.0));
    assert_eq!(patch, LayerPatch::default().with_x(4.0));
}
