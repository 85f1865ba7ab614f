//! Channel builder: message channel topology and free queue sizing.

use crate::app::{App, Core, Priority, TaskName, TypeName};
use crate::config::AnalysisConfig;
use crate::error::Diagnostic;
use crate::invariant_ppt::{assert_invariant, CHANNEL_PARTITION, FREE_QUEUE_DECLARED};
use crate::location::SendTypes;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace, warn};

/// Receiver core.
pub type Receiver = Core;

/// Sender core.
pub type Sender = Core;

/// A channel between cores used to send messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Channel {
    /// Tasks dispatched through this channel.
    pub tasks: BTreeSet<TaskName>,
    /// Tasks that spawn through this channel.
    pub senders: BTreeSet<TaskName>,
    /// Distinct payload types multiplexed over the channel.
    pub message_types: BTreeSet<TypeName>,
    /// Sum of the free queue capacities of `tasks` from this sender core.
    pub capacity: usize,
}

/// All channels, keyed by receiver core, then dispatch priority, then sender core.
pub type Channels = BTreeMap<Receiver, BTreeMap<Priority, BTreeMap<Sender, Channel>>>;

/// All free queue capacities, keyed by task and then by sender core.
pub type FreeQueues = BTreeMap<TaskName, BTreeMap<Sender, u8>>;

/// Output of the channel builder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    /// Every channel, keyed as in [`Channels`].
    pub channels: Channels,
    /// Capacity of every reachable spawn relationship.
    pub free_queues: FreeQueues,
    /// Payload types that cross a core boundary.
    pub send_types: SendTypes,
}

impl Topology {
    /// Flattened view of the channels.
    pub fn iter(&self) -> impl Iterator<Item = (Receiver, Priority, Sender, &Channel)> {
        flatten(&self.channels)
    }
}

/// Flattened view of `channels` as `(receiver, priority, sender, channel)`,
/// in key order.
pub fn flatten(channels: &Channels) -> impl Iterator<Item = (Receiver, Priority, Sender, &Channel)> {
    channels.iter().flat_map(|(&receiver, by_priority)| {
        by_priority.iter().flat_map(move |(&priority, by_sender)| {
            by_sender
                .iter()
                .map(move |(&sender, channel)| (receiver, priority, sender, channel))
        })
    })
}

/// Group every spawn edge into the channel keyed by its destination core,
/// dispatch priority and sender core, and size the free queues from the
/// declared capacities.
pub fn build(app: &App, config: &AnalysisConfig) -> (Topology, Vec<Diagnostic>) {
    let mut topology = Topology::default();
    let mut diagnostics = Vec::new();
    let mut edges = 0usize;

    for (sender, spawn) in app.spawn_edges() {
        edges += 1;
        let receiver = app.task(&spawn.target);
        let channel = topology
            .channels
            .entry(spawn.core)
            .or_default()
            .entry(spawn.priority)
            .or_default()
            .entry(sender.core)
            .or_default();
        channel.tasks.insert(spawn.target.clone());
        channel.senders.insert(sender.name.clone());
        trace!(
            sender = %sender.name,
            task = %spawn.target,
            receiver = %spawn.core,
            priority = spawn.priority,
            "spawn edge grouped"
        );

        // Edges to undeclared tasks are unreachable; the consistency check reports them.
        let Some(receiver) = receiver else {
            continue;
        };
        channel.message_types.insert(receiver.message.clone());
        if spawn.core != sender.core {
            topology.send_types.insert(receiver.message.clone());
        }

        // A task's own priority is checked by the ceiling calculator
        if spawn.priority != receiver.priority && !config.priority_in_range(spawn.priority) {
            warn!(task = %spawn.target, priority = spawn.priority, "dispatch priority out of range");
            diagnostics.push(Diagnostic::PriorityOutOfRange {
                task: spawn.target.clone(),
                priority: spawn.priority,
                max: config.max_priority,
            });
        }
        if spawn.capacity == 0 {
            warn!(sender = %sender.name, task = %spawn.target, "zero capacity");
            diagnostics.push(Diagnostic::CapacityZero {
                task: spawn.target.clone(),
                sender: sender.name.clone(),
            });
            continue;
        }

        let queues = topology.free_queues.entry(spawn.target.clone()).or_default();
        match queues.get(&sender.core) {
            Some(&declared) if declared != spawn.capacity => {
                warn!(task = %spawn.target, core = %sender.core, "conflicting capacities");
                diagnostics.push(Diagnostic::ConflictingCapacity {
                    task: spawn.target.clone(),
                    core: sender.core,
                    first: declared,
                    second: spawn.capacity,
                });
            }
            Some(_) => {}
            None => {
                queues.insert(sender.core, spawn.capacity);
            }
        }
    }

    let free_queues = &topology.free_queues;
    for by_priority in topology.channels.values_mut() {
        for by_sender in by_priority.values_mut() {
            for (sender, channel) in by_sender.iter_mut() {
                channel.capacity = channel
                    .tasks
                    .iter()
                    .filter_map(|task| free_queues.get(task).and_then(|q| q.get(sender)))
                    .map(|&capacity| usize::from(capacity))
                    .sum();
            }
        }
    }

    assert_invariant(
        CHANNEL_PARTITION,
        app.spawn_edges().all(|(sender, spawn)| {
            topology
                .iter()
                .filter(|&(receiver, priority, from, channel)| {
                    receiver == spawn.core
                        && priority == spawn.priority
                        && from == sender.core
                        && channel.tasks.contains(&spawn.target)
                        && channel.senders.contains(&sender.name)
                })
                .count()
                == 1
        }),
        "Every spawn edge belongs to exactly one channel",
        Some("channel::build"),
    );
    assert_invariant(
        FREE_QUEUE_DECLARED,
        topology.free_queues.iter().all(|(task, by_sender)| {
            by_sender.iter().all(|(&core, &capacity)| {
                app.spawn_edges().any(|(sender, spawn)| {
                    &spawn.target == task && sender.core == core && spawn.capacity == capacity
                })
            })
        }),
        "Every free queue capacity is a declared capacity",
        Some("channel::build"),
    );
    debug!(
        edges,
        channels = topology.iter().count(),
        free_queues = topology.free_queues.values().map(BTreeMap::len).sum::<usize>(),
        "channels built"
    );

    (topology, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{Spawn, Task};

    fn app(tasks: Vec<Task>) -> App {
        let mut app = App::new([Core(0), Core(1)]);
        for task in tasks {
            app.add_task(task).unwrap();
        }
        app
    }

    fn task(name: &str, core: u8, priority: Priority, message: &str, spawns: Vec<Spawn>) -> Task {
        let mut task = Task::new(name, Core(core), priority);
        task.message = message.into();
        task.spawns = spawns;
        task
    }

    #[test]
    fn cross_core_spawn_builds_one_channel() {
        let app = app(vec![
            task("a", 0, 1, "()", vec![Spawn::immediate("b", Core(1), 3, 4)]),
            task("b", 1, 3, "u32", vec![]),
        ]);
        let (topology, diagnostics) = build(&app, &AnalysisConfig::default());
        assert!(diagnostics.is_empty());
        let channel = &topology.channels[&Core(1)][&3][&Core(0)];
        assert_eq!(channel.message_types, ["u32".to_string()].into_iter().collect());
        assert_eq!(channel.capacity, 4);
        assert_eq!(topology.free_queues["b"][&Core(0)], 4);
        assert!(topology.send_types.contains("u32"));
    }

    #[test]
    fn same_priority_targets_multiplex() {
        let app = app(vec![
            task(
                "a",
                0,
                1,
                "()",
                vec![
                    Spawn::immediate("b", Core(1), 2, 1),
                    Spawn::immediate("c", Core(1), 2, 3),
                ],
            ),
            task("b", 1, 2, "u8", vec![]),
            task("c", 1, 2, "i16", vec![]),
        ]);
        let (topology, _) = build(&app, &AnalysisConfig::default());
        assert_eq!(topology.iter().count(), 1);
        let channel = &topology.channels[&Core(1)][&2][&Core(0)];
        assert_eq!(channel.tasks.len(), 2);
        assert_eq!(channel.message_types.len(), 2);
        assert_eq!(channel.capacity, 4);
    }

    #[test]
    fn local_spawn_has_no_send_obligation() {
        let app = app(vec![
            task("a", 0, 1, "()", vec![Spawn::immediate("b", Core(0), 2, 2)]),
            task("b", 0, 2, "Cmd", vec![]),
        ]);
        let (topology, _) = build(&app, &AnalysisConfig::default());
        assert!(topology.channels[&Core(0)][&2].contains_key(&Core(0)));
        assert!(topology.send_types.is_empty());
    }

    #[test]
    fn zero_capacity_is_reported() {
        let app = app(vec![
            task("a", 0, 1, "()", vec![Spawn::immediate("b", Core(1), 3, 0)]),
            task("b", 1, 3, "()", vec![]),
        ]);
        let (topology, diagnostics) = build(&app, &AnalysisConfig::default());
        assert_eq!(
            diagnostics,
            vec![Diagnostic::CapacityZero {
                task: "b".into(),
                sender: "a".into()
            }]
        );
        assert!(!topology.free_queues.contains_key("b"));
    }

    #[test]
    fn unreachable_zero_capacity_is_left_to_consistency() {
        let app = app(vec![task("a", 0, 1, "()", vec![Spawn::immediate("ghost", Core(1), 3, 0)])]);
        let (topology, diagnostics) = build(&app, &AnalysisConfig::default());
        assert!(diagnostics.is_empty());
        // Still grouped, so the edge is not lost
        assert!(topology.channels[&Core(1)][&3][&Core(0)].tasks.contains("ghost"));
    }

    #[test]
    fn conflicting_capacities_from_one_core() {
        let app = app(vec![
            task("a", 0, 1, "()", vec![Spawn::immediate("c", Core(1), 2, 2)]),
            task("b", 0, 3, "()", vec![Spawn::immediate("c", Core(1), 2, 5)]),
            task("c", 1, 2, "()", vec![]),
        ]);
        let (topology, diagnostics) = build(&app, &AnalysisConfig::default());
        assert_eq!(
            diagnostics,
            vec![Diagnostic::ConflictingCapacity {
                task: "c".into(),
                core: Core(0),
                first: 2,
                second: 5
            }]
        );
        assert_eq!(topology.free_queues["c"][&Core(0)], 2);
    }

    #[test]
    fn senders_on_different_cores_get_separate_channels() {
        let app = app(vec![
            task("a", 0, 1, "()", vec![Spawn::immediate("c", Core(1), 2, 2)]),
            task("b", 1, 3, "()", vec![Spawn::immediate("c", Core(1), 2, 5)]),
            task("c", 1, 2, "()", vec![]),
        ]);
        let (topology, diagnostics) = build(&app, &AnalysisConfig::default());
        assert!(diagnostics.is_empty());
        assert_eq!(topology.channels[&Core(1)][&2].len(), 2);
        assert_eq!(topology.free_queues["c"][&Core(0)], 2);
        assert_eq!(topology.free_queues["c"][&Core(1)], 5);
    }

    #[test]
    fn dispatch_priority_reported_only_when_it_differs() {
        let config = AnalysisConfig::default().with_max_priority(7);
        let app = app(vec![
            task(
                "a",
                0,
                1,
                "()",
                vec![
                    Spawn::immediate("b", Core(1), 9, 1),
                    Spawn::immediate("c", Core(1), 12, 1),
                ],
            ),
            task("b", 1, 9, "()", vec![]),
            task("c", 1, 2, "()", vec![]),
        ]);
        let (_, diagnostics) = build(&app, &config);
        // `b` runs at 9 itself: left to the ceiling calculator
        assert_eq!(
            diagnostics,
            vec![Diagnostic::PriorityOutOfRange {
                task: "c".into(),
                priority: 12,
                max: 7
            }]
        );
    }
}
