//! Random well-formed applications for property tests.

#![allow(dead_code)]

use corebound::app::Resource;
use corebound::dsl::AppBuilder;
use corebound::{App, Core};
use proptest::collection::vec;
use proptest::option;
use proptest::prelude::*;

/// One generated task: core, priority, read and written resource indices,
/// spawned task indices (with `true` for a delayed spawn).
pub type TaskSpec = (u8, u8, Vec<usize>, Vec<usize>, Vec<(usize, bool)>);

/// Applications that analyze cleanly: every resource is used and
/// transferable, priorities are in range and every target has one capacity.
pub fn arb_app() -> impl Strategy<Value = App> {
    (1u8..=3, 1usize..=4, 1usize..=6)
        .prop_flat_map(|(cores, resources, tasks)| {
            let task = (
                0..cores,
                1u8..=8,
                vec(0..resources, 0..3),
                vec(0..resources, 0..3),
                vec((0..tasks, any::<bool>()), 0..3),
            );
            (
                Just(cores),
                vec(task, tasks),
                vec(option::of(0..cores), resources),
            )
        })
        .prop_map(|(cores, tasks, late)| build_app(cores, &tasks, &late))
}

/// Declared capacity of every spawn of task `index`.
pub fn capacity_of(index: usize) -> u8 {
    (index % 3) as u8 + 1
}

pub fn build_app(cores: u8, tasks: &[TaskSpec], late: &[Option<u8>]) -> App {
    let mut builder = AppBuilder::new(cores);
    for (i, init) in late.iter().enumerate() {
        let resource = match init {
            Some(core) => Resource::late(format!("r{}", i), format!("T{}", i), Core(*core)),
            None => Resource::eager(format!("r{}", i), format!("T{}", i)),
        };
        builder.resource_with(resource.transferable()).unwrap();
    }
    for (j, (core, priority, reads, writes, spawns)) in tasks.iter().enumerate() {
        let mut task = builder
            .task(&format!("t{}", j), *core, *priority)
            .message(&format!("M{}", j));
        for r in reads {
            task = task.reads(&format!("r{}", r));
        }
        for r in writes {
            task = task.writes(&format!("r{}", r));
        }
        // Keep every resource used
        for r in (0..late.len()).filter(|r| r % tasks.len() == j) {
            task = task.writes(&format!("r{}", r));
        }
        for &(target, delayed) in spawns {
            let name = format!("t{}", target);
            task = if delayed {
                task.schedules(&name, capacity_of(target))
            } else {
                task.spawns(&name, capacity_of(target))
            };
        }
        task.add().unwrap();
    }
    builder.build().unwrap()
}
