/// Run tracker test suite: id generation, run records, and plan-not-play
/// semantics.
use crate::store::{LayerPatch, StateStore};
use crate::tracker::{
    AnimationTiming, RunKind, RunStatus, RunTracker, StepAction, TimelineOffset, TimelineStep,
};
use scenelayer_compiler::DocumentCompiler;

const TREE_SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg">
    <g id="root_group">
        <rect id="child_a" x="0" y="0" width="10" height="10" />
    </g>
</svg>"#;

fn store_from(svg: &str) -> StateStore {
    let output = DocumentCompiler::default().compile(svg).expect("compile failed");
    StateStore::from_layer_map(&output.full)
}

fn timing(duration: f64, ease: &str) -> AnimationTiming {
    AnimationTiming {
        duration,
        ease: ease.to_string(),
        delay: 0.0,
    }
}

#[test]
fn test_run_ids_fixed_width_increasing() {
    let mut store = StateStore::new();
    let mut tracker = RunTracker::new();

    let a = tracker
        .run_set(&mut store, "layer", &LayerPatch::default())
        .unwrap();
    let b = tracker
        .run_set(&mut store, "layer", &LayerPatch::default())
        .unwrap();

    assert_eq!(a.run_id, "run_000001");
    assert_eq!(b.run_id, "run_000002");
    assert!(a.run_id < b.run_id);
}

#[test]
fn test_run_set_applies_and_completes() {
    let mut store = store_from(TREE_SVG);
    let mut tracker = RunTracker::new();

    let outcome = tracker
        .run_set(
            &mut store,
            "child_a",
            &LayerPatch::default().with_x(8.0),
        )
        .unwrap();

    assert_eq!(outcome.planned_end_state.x, 8.0);
    assert_eq!(store.layer_state("child_a").unwrap().x, 8.0);

    let run = tracker.run(&outcome.run_id).unwrap();
    assert_eq!(run.kind, RunKind::Set);
    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.finished_at.is_some());
    assert_eq!(run.steps.len(), 1);
    assert_eq!(run.steps[0].action, StepAction::Set);
    assert_eq!(run.steps[0].props.x, Some(8.0));
}

#[test]
fn test_run_set_propagates_to_children() {
    let mut store = store_from(TREE_SVG);
    let mut tracker = RunTracker::new();

    tracker
        .run_set(
            &mut store,
            "root_group",
            &LayerPatch::default().with_x(10.0),
        )
        .unwrap();

    assert_eq!(store.layer_state("child_a").unwrap().x, 10.0);
}

#[test]
fn test_run_animate_records_from_and_to() {
    let mut store = store_from(TREE_SVG);
    let mut tracker = RunTracker::new();

    let outcome = tracker
        .run_animate(
            &mut store,
            "child_a",
            Some(&LayerPatch::default().with_x(-120.0)),
            &LayerPatch::default().with_x(0.0),
            &timing(0.4, "power2.out"),
        )
        .unwrap();

    // End state is the to-state: nothing ticks through time.
    assert_eq!(outcome.planned_end_state.x, 0.0);

    let run = tracker.run(&outcome.run_id).unwrap();
    assert_eq!(run.kind, RunKind::AnimateLayer);
    assert_eq!(run.steps.len(), 2);
    assert_eq!(run.steps[0].action, StepAction::From);
    assert_eq!(run.steps[0].props.x, Some(-120.0));
    assert_eq!(run.steps[1].action, StepAction::To);
    assert_eq!(run.steps[1].duration, Some(0.4));
    assert_eq!(run.steps[1].ease.as_deref(), Some("power2.out"));
}

#[test]
fn test_run_animate_without_from_has_single_step() {
    let mut store = store_from(TREE_SVG);
    let mut tracker = RunTracker::new();

    let outcome = tracker
        .run_animate(
            &mut store,
            "child_a",
            None,
            &LayerPatch::default().with_y(4.0),
            &timing(0.2, "linear"),
        )
        .unwrap();

    let run = tracker.run(&outcome.run_id).unwrap();
    assert_eq!(run.steps.len(), 1);
    assert_eq!(run.steps[0].action, StepAction::To);
}

#[test]
fn test_run_timeline_applies_in_request_order() {
    let mut store = store_from(TREE_SVG);
    let mut tracker = RunTracker::new();

    let steps = vec![
        TimelineStep {
            layer_id: "child_a".to_string(),
            from: None,
            to: LayerPatch::default().with_x(5.0),
            duration: 0.3,
            ease: "linear".to_string(),
            delay: 0.0,
            // Declared offset points backwards; execution order ignores it.
            at: Some(TimelineOffset::Seconds(9.0)),
        },
        TimelineStep {
            layer_id: "child_a".to_string(),
            from: None,
            to: LayerPatch::default().with_x(1.0),
            duration: 0.3,
            ease: "linear".to_string(),
            delay: 0.0,
            at: Some(TimelineOffset::Label("intro".to_string())),
        },
    ];

    let outcome = tracker.run_timeline(&mut store, &steps);
    assert_eq!(outcome.step_count, 2);

    // Last step in request order wins.
    assert_eq!(store.layer_state("child_a").unwrap().x, 1.0);

    let run = tracker.run(&outcome.run_id).unwrap();
    assert_eq!(run.kind, RunKind::Timeline);
    assert_eq!(run.steps[0].at, Some(TimelineOffset::Seconds(9.0)));
    assert_eq!(
        run.steps[1].at,
        Some(TimelineOffset::Label("intro".to_string()))
    );
}

#[test]
fn test_cancel_only_while_active() {
    let mut store = StateStore::new();
    let mut tracker = RunTracker::new();

    let outcome = tracker
        .run_set(&mut store, "layer", &LayerPatch::default())
        .unwrap();

    // Runs complete synchronously, so a finished run cannot be cancelled.
    assert!(!tracker.cancel(&outcome.run_id));
    assert_eq!(
        tracker.run(&outcome.run_id).unwrap().status,
        RunStatus::Completed
    );

    assert!(!tracker.cancel("run_999999"));
}

#[test]
fn test_completed_runs_accumulate() {
    let mut store = StateStore::new();
    let mut tracker = RunTracker::new();

    for _ in 0..3 {
        tracker
            .run_set(&mut store, "layer", &LayerPatch::default())
            .unwrap();
    }

    assert_eq!(tracker.completed_count(), 3);
    assert_eq!(tracker.active_count(), 0);
    assert_eq!(tracker.completed_runs().count(), 3);
}
