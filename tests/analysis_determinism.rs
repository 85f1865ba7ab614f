mod common;

use common::arb_app;
use corebound::analyze;
use corebound::dsl::AppBuilder;
use proptest::prelude::*;

#[test]
fn analysis_deterministic_compilation() {
    let mut builder = AppBuilder::new(2);
    builder.late_resource("log", "Log", 1).unwrap();
    builder.resource("state", "State").unwrap();
    builder
        .task("sample", 0, 2)
        .writes("state")
        .writes("log")
        .schedules("sample", 2)
        .spawns("report", 1)
        .add()
        .unwrap();
    builder
        .task("report", 1, 1)
        .message("Reading")
        .reads("log")
        .reads("state")
        .add()
        .unwrap();
    let app = builder.build().unwrap();

    let first = analyze(&app).unwrap();
    let second = analyze(&app).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn declaration_order_does_not_matter() {
    let mut forward = AppBuilder::new(2);
    forward.resource("a", "A").unwrap();
    forward.resource("b", "B").unwrap();
    forward.task("x", 0, 1).writes("a").spawns("y", 1).add().unwrap();
    forward.task("y", 1, 2).writes("a").reads("b").add().unwrap();
    forward.task("z", 1, 3).reads("b").add().unwrap();

    let mut backward = AppBuilder::new(2);
    backward.resource("b", "B").unwrap();
    backward.resource("a", "A").unwrap();
    backward.task("z", 1, 3).reads("b").add().unwrap();
    backward.task("y", 1, 2).reads("b").writes("a").add().unwrap();
    backward.task("x", 0, 1).spawns("y", 1).writes("a").add().unwrap();

    let forward = analyze(&forward.build().unwrap()).unwrap();
    let backward = analyze(&backward.build().unwrap()).unwrap();
    assert_eq!(forward, backward);
}

proptest! {
    #[test]
    fn analysis_is_idempotent(app in arb_app()) {
        let first = analyze(&app).unwrap();
        let second = analyze(&app).unwrap();
        prop_assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
        prop_assert_eq!(first, second);
    }
}
