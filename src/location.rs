//! Location assigner: which core stores each resource, and which value types
//! the consumer must prove transferable or concurrently accessible.

use crate::app::{Access, App, Core, Priority, ResourceName, TypeName};
use crate::invariant_ppt::{assert_invariant, CROSS_CORE_OBLIGATION, LOCATION_UNIQUE};
use crate::ownership::Resolution;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

/// Where a resource lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Location {
    /// Static storage local to `core`; every accessor runs there.
    Local {
        /// Storage core.
        core: Core,
        /// The value is produced by another core's init routine and moved here.
        cross_initialized: bool,
    },
    /// Stored on `core`, accessed from every core in `cores`; needs a
    /// cross-core locking primitive.
    CrossCore {
        /// Storage core.
        core: Core,
        /// Cores with at least one accessor.
        cores: BTreeSet<Core>,
    },
}

impl Location {
    /// Storage core.
    pub fn core(&self) -> Core {
        match self {
            Location::Local { core, .. } | Location::CrossCore { core, .. } => *core,
        }
    }

    pub fn is_cross_core(&self) -> bool {
        matches!(self, Location::CrossCore { .. })
    }

    pub fn is_cross_initialized(&self) -> bool {
        matches!(
            self,
            Location::Local {
                cross_initialized: true,
                ..
            }
        )
    }
}

/// Location of all used resources.
pub type Locations = BTreeMap<ResourceName, Location>;

/// Late resources, keyed by the core that initializes them.
pub type LateResources = BTreeMap<Core, BTreeSet<ResourceName>>;

/// Types the consumer must prove safe to move across cores.
pub type SendTypes = BTreeSet<TypeName>;

/// Types the consumer must prove safe to reference from several contexts at once.
pub type SyncTypes = BTreeSet<TypeName>;

/// Output of the location assigner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Placement {
    /// Location of every used resource.
    pub locations: Locations,
    /// Used late resources, by initializing core.
    pub late_resources: LateResources,
    /// Resource types written across cores or moved by cross-core init.
    pub send_types: SendTypes,
    /// Resource types read across cores or by preempting readers.
    pub sync_types: SyncTypes,
}

/// Place every used resource.
///
/// An exclusive resource lives with its owner. A shared resource whose
/// accessors all run on one core lives on that core. Otherwise it lives on
/// its late-initializing core, or on the lowest-indexed accessing core.
pub fn assign(app: &App, resolution: &Resolution) -> Placement {
    let mut placement = Placement::default();

    for (name, resource) in app.resources() {
        if !resolution.is_used(name) {
            continue;
        }
        let accesses: Vec<(Core, Priority, Access)> = app
            .resource_accesses()
            .filter(|(_, r, _)| *r == name)
            .map(|(task, _, access)| (task.core, task.priority, access))
            .collect();
        let cores: BTreeSet<Core> = accesses.iter().map(|&(core, _, _)| core).collect();
        let late = resource.late_core();

        let location = match (cores.len(), cores.first()) {
            (1, Some(&core)) => Location::Local {
                core,
                cross_initialized: late.map_or(false, |init| init != core),
            },
            (_, Some(&lowest)) => Location::CrossCore {
                core: late.unwrap_or(lowest),
                cores: cores.clone(),
            },
            // Used resources always have an accessor
            (_, None) => continue,
        };
        trace!(resource = %name, core = %location.core(), cross_core = location.is_cross_core(), "placed");

        let shared = resolution.shared.contains_key(name);
        let priorities: BTreeSet<Priority> = accesses.iter().map(|&(_, p, _)| p).collect();
        let reads = accesses.iter().any(|&(_, _, a)| a == Access::Read);
        let writes = accesses.iter().any(|&(_, _, a)| a == Access::Write);
        if location.is_cross_core() {
            if reads {
                placement.sync_types.insert(resource.ty.clone());
            }
            if writes {
                placement.send_types.insert(resource.ty.clone());
            }
        } else if shared && reads && priorities.len() > 1 {
            // Preemptible readers on one core still alias the value
            placement.sync_types.insert(resource.ty.clone());
        }
        if location.is_cross_initialized() {
            placement.send_types.insert(resource.ty.clone());
        }

        if let Some(init) = late {
            placement
                .late_resources
                .entry(init)
                .or_default()
                .insert(name.clone());
        }
        placement.locations.insert(name.clone(), location);
    }

    assert_invariant(
        LOCATION_UNIQUE,
        placement.locations.len() == resolution.exclusive.len() + resolution.shared.len()
            && resolution
                .exclusive
                .keys()
                .chain(resolution.shared.keys())
                .all(|name| placement.locations.contains_key(name)),
        "Every used resource has exactly one location",
        Some("location::assign"),
    );
    assert_invariant(
        CROSS_CORE_OBLIGATION,
        placement.locations.iter().all(|(name, location)| {
            !location.is_cross_core()
                || app.resource(name).map_or(false, |r| {
                    placement.sync_types.contains(&r.ty) || placement.send_types.contains(&r.ty)
                })
        }),
        "Every cross-core resource type carries a Send or Sync obligation",
        Some("location::assign"),
    );
    debug!(
        locations = placement.locations.len(),
        cross_core = placement.locations.values().filter(|l| l.is_cross_core()).count(),
        send_types = placement.send_types.len(),
        sync_types = placement.sync_types.len(),
        "resources placed"
    );

    placement
}
