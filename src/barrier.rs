//! Barrier synthesizer: startup synchronization between cores.

use crate::app::{App, Core};
use crate::channel::Topology;
use crate::invariant_ppt::{assert_invariant, BARRIER_COALESCED};
use crate::location::Placement;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

/// Cross-core initialization barriers: each waiting core, and the cores whose
/// late resources it must see initialized before its dispatcher runs.
pub type InitializationBarriers = BTreeMap<Core, BTreeSet<Core>>;

/// Cross-core spawn barriers: each sending core, and the receiving cores whose
/// dispatchers must be ready before its first spawn.
pub type SpawnBarriers = BTreeMap<Core, BTreeSet<Core>>;

/// Output of the barrier synthesizer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Barriers {
    /// Waits on late resource initialization.
    pub initialization: InitializationBarriers,
    /// Waits on receiving dispatchers.
    pub spawn: SpawnBarriers,
}

/// Synthesize the initialization and spawn barriers.
///
/// Waits on the same pair of cores for different reasons collapse into one
/// entry; a core never waits on itself.
pub fn synthesize(app: &App, placement: &Placement, topology: &Topology) -> Barriers {
    let mut barriers = Barriers::default();

    for (&init, resources) in &placement.late_resources {
        for (task, _, _) in app
            .resource_accesses()
            .filter(|(_, name, _)| resources.contains(*name))
        {
            if task.core != init {
                trace!(waiting = %task.core, on = %init, task = %task.name, "initialization barrier");
                barriers
                    .initialization
                    .entry(task.core)
                    .or_default()
                    .insert(init);
            }
        }
    }

    for (receiver, _, sender, _) in topology.iter() {
        if sender != receiver {
            trace!(waiting = %sender, on = %receiver, "spawn barrier");
            barriers.spawn.entry(sender).or_default().insert(receiver);
        }
    }

    assert_invariant(
        BARRIER_COALESCED,
        barriers
            .initialization
            .iter()
            .chain(&barriers.spawn)
            .all(|(waiting, on)| !on.is_empty() && !on.contains(waiting)),
        "Barriers are coalesced per waiting core and never self-referential",
        Some("barrier::synthesize"),
    );
    debug!(
        initialization = barriers.initialization.len(),
        spawn = barriers.spawn.len(),
        "barriers synthesized"
    );

    barriers
}
