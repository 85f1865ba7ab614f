//! Timer queue builder: which tasks each core's timer queue dispatches, and
//! how many slots it needs.

use crate::app::{App, Core, Priority, SpawnKind, TaskName};
use crate::ceiling::Ceiling;
use crate::channel::FreeQueues;
use crate::config::AnalysisConfig;
use crate::error::Diagnostic;
use crate::invariant_ppt::{assert_invariant, TIMER_QUEUE_BOUNDED};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace, warn};

/// One task participating in a timer queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimerEntry {
    /// Priority the task is dispatched at when its deadline expires.
    pub priority: Priority,
    /// Maximum number of outstanding scheduled instances.
    pub capacity: u8,
}

/// The timer queue of one core.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TimerQueue {
    /// Tasks that can be scheduled through this queue.
    pub tasks: BTreeMap<TaskName, TimerEntry>,
    /// Tasks that schedule through this queue.
    pub schedulers: BTreeSet<TaskName>,
    /// Total number of slots; the size of the fixed ordered structure.
    pub capacity: usize,
    /// Highest dispatch priority among `tasks`.
    pub priority: Priority,
    /// Highest priority among schedulers and dispatched tasks. Access to the
    /// queue is a critical section at this level.
    pub ceiling: Ceiling,
}

/// Timer queues, keyed by core.
pub type TimerQueues = BTreeMap<Core, TimerQueue>;

/// Declare the timer queue of every core that issues delayed spawns.
///
/// A task that schedules itself may have as many outstanding instances as
/// its free queue holds; a task scheduled by others gets the configured
/// fixed slot bound. A bound of zero leaves such a task unschedulable and
/// is reported as [`Diagnostic::CapacityZero`] for each affected edge.
pub fn build(
    app: &App,
    free_queues: &FreeQueues,
    config: &AnalysisConfig,
) -> (TimerQueues, Vec<Diagnostic>) {
    let mut timer_queues = TimerQueues::new();
    let mut diagnostics = Vec::new();

    for (sender, spawn) in app
        .spawn_edges()
        .filter(|(_, spawn)| spawn.kind == SpawnKind::Delayed)
    {
        let scheduled_by_self = sender.name == spawn.target;
        let capacity = if scheduled_by_self {
            free_queues
                .get(&spawn.target)
                .and_then(|q| q.get(&sender.core))
                .copied()
                .unwrap_or(spawn.capacity)
        } else {
            config.timer_slot_bound
        };
        if capacity == 0 {
            // A zero declared capacity is already reported by the channel builder
            if !scheduled_by_self {
                warn!(sender = %sender.name, task = %spawn.target, "no timer queue slot");
                diagnostics.push(Diagnostic::CapacityZero {
                    task: spawn.target.clone(),
                    sender: sender.name.clone(),
                });
            }
            continue;
        }
        trace!(core = %sender.core, task = %spawn.target, capacity, "scheduled");

        let queue = timer_queues.entry(sender.core).or_default();
        queue.schedulers.insert(sender.name.clone());
        queue.ceiling = queue.ceiling.max(sender.priority);
        let entry = queue.tasks.entry(spawn.target.clone()).or_insert(TimerEntry {
            priority: spawn.priority,
            capacity,
        });
        entry.capacity = entry.capacity.max(capacity);
        entry.priority = entry.priority.max(spawn.priority);
    }

    for queue in timer_queues.values_mut() {
        queue.capacity = queue.tasks.values().map(|e| usize::from(e.capacity)).sum();
        queue.priority = queue.tasks.values().map(|e| e.priority).max().unwrap_or(0);
        queue.ceiling = queue.ceiling.max(queue.priority);
    }

    assert_invariant(
        TIMER_QUEUE_BOUNDED,
        timer_queues.values().all(|q| {
            !q.tasks.is_empty()
                && q.tasks.values().all(|e| e.capacity > 0)
                && q.capacity == q.tasks.values().map(|e| usize::from(e.capacity)).sum::<usize>()
                && q.ceiling >= q.priority
        }),
        "Every timer queue is non-empty and sized to its entries",
        Some("timer_queue::build"),
    );
    debug!(timer_queues = timer_queues.len(), "timer queues built");

    (timer_queues, diagnostics)
}
