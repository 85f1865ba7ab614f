//! Contract tests for the analysis invariants.
//!
//! Each test drives an application through the analysis and checks that
//! the stages actually asserted the properties of their outputs.

use corebound::app::{App, Resource, Task};
use corebound::dsl::AppBuilder;
use corebound::invariant_ppt::{
    contract_test, ANALYSIS_CONSISTENT, APP_LEGALITY, APP_REJECTS_INVALID, BARRIER_COALESCED,
    CEILING_TIGHT, CHANNEL_PARTITION, CROSS_CORE_OBLIGATION, DIAGNOSTICS_BATCHED,
    FREE_QUEUE_DECLARED, LOCATION_UNIQUE, OWNERSHIP_PARTITION, TIMER_QUEUE_BOUNDED,
};
use corebound::{analyze, Core};

fn full_app() -> App {
    let mut builder = AppBuilder::new(2);
    builder.late_resource("shared", "Buffer", 0).unwrap();
    builder.resource("counter", "u32").unwrap();
    builder
        .task("producer", 0, 1)
        .writes("shared")
        .writes("counter")
        .spawns("consumer", 2)
        .schedules("producer", 1)
        .add()
        .unwrap();
    builder
        .task("consumer", 1, 2)
        .message("Frame")
        .reads("shared")
        .add()
        .unwrap();
    builder.build().unwrap()
}

#[test]
fn contract_successful_analysis() {
    let analysis = analyze(&full_app()).unwrap();
    assert!(analysis.waits_for_initialization(Core(1), Core(0)));
    assert!(analysis.waits_for_dispatcher(Core(0), Core(1)));

    contract_test(
        "successful analysis",
        &[
            APP_LEGALITY,
            OWNERSHIP_PARTITION,
            CEILING_TIGHT,
            LOCATION_UNIQUE,
            CROSS_CORE_OBLIGATION,
            CHANNEL_PARTITION,
            FREE_QUEUE_DECLARED,
            TIMER_QUEUE_BOUNDED,
            BARRIER_COALESCED,
            ANALYSIS_CONSISTENT,
        ],
    );
}

#[test]
fn contract_rejected_analysis() {
    let mut app = App::new([Core(0)]);
    app.add_resource(Resource::eager("unused", "u8")).unwrap();
    assert!(app.add_task(Task::new("stray", Core(3), 1)).is_err());
    assert!(app.add_resource(Resource::late("late", "u8", Core(3))).is_err());
    app.add_task(Task::new("idle", Core(0), 1)).unwrap();

    let err = analyze(&app).unwrap_err();
    assert_eq!(err.diagnostics().len(), 1);

    contract_test("rejected analysis", &[APP_REJECTS_INVALID, DIAGNOSTICS_BATCHED]);
}
