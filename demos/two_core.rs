use corebound::dsl::AppBuilder;
use corebound::{analyze, Core};

fn main() {
    // Core 0 samples a sensor and hands readings to a logger on core 1
    let mut builder = AppBuilder::new(2);
    builder.late_resource("sensor", "Sensor", 0).unwrap();
    builder.resource("readings", "Ring<u16, 8>").unwrap();
    builder
        .task("sample", 0, 2)
        .writes("sensor")
        .writes("readings")
        .schedules("sample", 1)
        .spawns("log", 4)
        .add()
        .unwrap();
    builder
        .task("log", 1, 1)
        .message("u16")
        .reads("readings")
        .add()
        .unwrap();
    let app = builder.build().unwrap();

    let analysis = analyze(&app).unwrap();
    println!("{}", serde_json::to_string_pretty(&analysis).unwrap());
    println!(
        "core 0 waits for core 1 dispatcher: {}",
        analysis.waits_for_dispatcher(Core(0), Core(1))
    );
}
