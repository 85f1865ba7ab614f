//! Ownership resolver: which resources are exclusively owned and which are shared.

use crate::app::{App, Priority, ResourceName, TaskName};
use crate::ceiling::{Ceiling, Ceilings};
use crate::error::Diagnostic;
use crate::invariant_ppt::{assert_invariant, OWNERSHIP_PARTITION};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace, warn};

/// How a resource is owned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Ownership {
    /// Only this task accesses the resource; no lock is needed.
    Exclusive(TaskName),
    /// Two or more tasks access the resource; accesses below the ceiling
    /// must raise the priority mask to it.
    Shared(Ceiling),
}

impl Ownership {
    /// The ceiling, for shared resources.
    pub fn ceiling(&self) -> Option<Ceiling> {
        match self {
            Ownership::Exclusive(_) => None,
            Ownership::Shared(ceiling) => Some(*ceiling),
        }
    }

    /// Whether a task running at `priority` must lock to access the resource.
    pub fn needs_lock(&self, priority: Priority) -> bool {
        match self {
            Ownership::Exclusive(_) => false,
            Ownership::Shared(ceiling) => priority < *ceiling,
        }
    }
}

/// Resource ownership, keyed by resource.
pub type Ownerships = BTreeMap<ResourceName, Ownership>;

/// Accessor sets of every used resource, split by sharing mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Resources with a single accessor, and that accessor.
    pub exclusive: BTreeMap<ResourceName, TaskName>,
    /// Resources with two or more accessors, awaiting a ceiling.
    pub shared: BTreeMap<ResourceName, BTreeSet<TaskName>>,
}

impl Resolution {
    /// Whether the resource has an ownership entry.
    pub fn is_used(&self, resource: &str) -> bool {
        self.exclusive.contains_key(resource) || self.shared.contains_key(resource)
    }

    /// Final ownerships once ceilings are known.
    pub fn ownerships(&self, ceilings: &Ceilings) -> Ownerships {
        let exclusive = self
            .exclusive
            .iter()
            .map(|(name, owner)| (name.clone(), Ownership::Exclusive(owner.clone())));
        let shared = self.shared.keys().filter_map(|name| {
            ceilings
                .get(name)
                .map(|&ceiling| (name.clone(), Ownership::Shared(ceiling)))
        });
        exclusive.chain(shared).collect()
    }
}

/// Classify every declared resource by the set of tasks that access it.
///
/// Resources no task touches yield an [`Diagnostic::UnusedResource`] and
/// no entry. Accesses to undeclared resources are left to the consistency
/// check.
pub fn resolve(app: &App) -> (Resolution, Vec<Diagnostic>) {
    let mut accessors: BTreeMap<&ResourceName, BTreeSet<TaskName>> = app
        .resources()
        .keys()
        .map(|name| (name, BTreeSet::new()))
        .collect();
    for (task, name, _access) in app.resource_accesses() {
        if let Some(tasks) = accessors.get_mut(name) {
            tasks.insert(task.name.clone());
        }
    }

    let mut resolution = Resolution::default();
    let mut diagnostics = Vec::new();
    for (name, tasks) in accessors {
        match tasks.len() {
            0 => {
                warn!(resource = %name, "resource is never accessed");
                diagnostics.push(Diagnostic::UnusedResource {
                    resource: name.clone(),
                });
            }
            1 => {
                if let Some(owner) = tasks.into_iter().next() {
                    trace!(resource = %name, %owner, "exclusive");
                    resolution.exclusive.insert(name.clone(), owner);
                }
            }
            n => {
                trace!(resource = %name, accessors = n, "shared");
                resolution.shared.insert(name.clone(), tasks);
            }
        }
    }

    assert_invariant(
        OWNERSHIP_PARTITION,
        resolution
            .exclusive
            .keys()
            .all(|name| !resolution.shared.contains_key(name))
            && resolution.shared.values().all(|tasks| tasks.len() >= 2)
            && resolution.exclusive.len() + resolution.shared.len() + diagnostics.len()
                == app.resources().len(),
        "Every declared resource is exclusive, shared or unused, exactly once",
        Some("ownership::resolve"),
    );
    debug!(
        exclusive = resolution.exclusive.len(),
        shared = resolution.shared.len(),
        unused = diagnostics.len(),
        "ownership resolved"
    );

    (resolution, diagnostics)
}
