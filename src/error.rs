//! Diagnostics and errors raised by the analysis.

use crate::app::{Core, Priority, ResourceName, TaskName};
use serde::Serialize;
use thiserror::Error;

/// A problem with the application, found by one of the analysis stages.
///
/// Diagnostics are collected across every stage and reported together.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum Diagnostic {
    /// The resource is declared but no task accesses it.
    #[error("resource `{resource}` is never accessed")]
    UnusedResource {
        /// The unreachable resource.
        resource: ResourceName,
    },
    /// Two tasks on different cores access the resource at the same priority
    /// and the resource was not declared transferable.
    #[error(
        "resource `{resource}` is accessed at priority {priority} by `{first}` ({first_core}) \
         and `{second}` ({second_core}) but is not declared transferable"
    )]
    CrossCoreCeilingConflict {
        /// The contended resource.
        resource: ResourceName,
        /// The shared priority level.
        priority: Priority,
        /// First accessor.
        first: TaskName,
        /// Core of the first accessor.
        first_core: Core,
        /// Second accessor.
        second: TaskName,
        /// Core of the second accessor.
        second_core: Core,
    },
    /// A reachable spawn edge declares a capacity of zero.
    #[error("`{sender}` spawns `{task}` with capacity 0")]
    CapacityZero {
        /// The spawned task.
        task: TaskName,
        /// The spawning task.
        sender: TaskName,
    },
    /// Spawn edges from one core to one task disagree on the capacity.
    #[error("`{task}` is spawned from {core} with capacities {first} and {second}")]
    ConflictingCapacity {
        /// The spawned task.
        task: TaskName,
        /// The sending core.
        core: Core,
        /// Capacity of the first edge seen.
        first: u8,
        /// Capacity of the conflicting edge.
        second: u8,
    },
    /// A task or dispatch priority the target cannot program.
    #[error("`{task}` uses priority {priority}, outside 1..={max}")]
    PriorityOutOfRange {
        /// The task owning or receiving the priority.
        task: TaskName,
        /// The offending priority.
        priority: Priority,
        /// Highest supported priority.
        max: Priority,
    },
}

/// An internal inconsistency between analysis outputs.
///
/// Unlike [`Diagnostic`], this aborts the pass immediately.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum ConsistencyError {
    /// A channel names a task that does not exist.
    #[error("channel to {receiver} from {sender} references unknown task `{task}`")]
    UnknownTask {
        /// The missing task.
        task: TaskName,
        /// Receiving core of the channel.
        receiver: Core,
        /// Sending core of the channel.
        sender: Core,
    },
    /// A channel's key disagrees with the core or priority of one of its tasks.
    #[error(
        "task `{task}` runs on {actual_core} at priority {actual_priority} \
         but is routed to {core} at priority {priority}"
    )]
    MisroutedTask {
        /// The misrouted task.
        task: TaskName,
        /// Core in the channel key.
        core: Core,
        /// Priority in the channel key.
        priority: Priority,
        /// Core the task runs on.
        actual_core: Core,
        /// Priority the task runs at.
        actual_priority: Priority,
    },
    /// A ceiling has no matching shared ownership, or the ceilings differ.
    #[error("ceiling of `{resource}` does not match its ownership")]
    CeilingMismatch {
        /// The resource.
        resource: ResourceName,
    },
    /// An output references a core the application does not declare.
    #[error("{entity} references undeclared {core}")]
    UnknownCore {
        /// The undeclared core.
        core: Core,
        /// What referenced it.
        entity: String,
    },
    /// An accessor of an owned resource is not a declared task.
    #[error("`{resource}` is accessed by `{task}`, which is not a declared task")]
    UnknownAccessor {
        /// The resource.
        resource: ResourceName,
        /// The unresolved accessor.
        task: TaskName,
    },
    /// A shared resource's ceiling is below one of its accessors.
    #[error("ceiling {ceiling} of `{resource}` is below `{task}` at priority {priority}")]
    CeilingBelowAccessor {
        /// The resource.
        resource: ResourceName,
        /// Its ceiling.
        ceiling: Priority,
        /// The accessor above the ceiling.
        task: TaskName,
        /// The accessor's priority.
        priority: Priority,
    },
    /// A task accesses a resource that was never declared.
    #[error("task `{task}` accesses undeclared resource `{resource}`")]
    UnknownResource {
        /// The accessing task.
        task: TaskName,
        /// The undeclared resource.
        resource: ResourceName,
    },
}

/// Why an analysis pass produced no result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    /// Every diagnostic raised by the stages, in stage order.
    #[error("analysis found {} problem(s)", .0.len())]
    Diagnostics(Vec<Diagnostic>),
    /// The stage outputs are inconsistent.
    #[error(transparent)]
    Consistency(#[from] ConsistencyError),
}

impl AnalysisError {
    /// The batched diagnostics; empty for a consistency failure.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            AnalysisError::Diagnostics(diagnostics) => diagnostics,
            AnalysisError::Consistency(_) => &[],
        }
    }
}
