//! Analysis module: run every stage over an application and seal the result.

use crate::app::{App, Core, Priority};
use crate::barrier::{self, InitializationBarriers, SpawnBarriers};
use crate::ceiling::{self, Ceilings};
use crate::channel::{self, Channel, Channels, FreeQueues, Receiver, Sender};
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, ConsistencyError};
use crate::invariant_ppt::{assert_invariant, ANALYSIS_CONSISTENT, DIAGNOSTICS_BATCHED};
use crate::location::{self, LateResources, Locations, SendTypes, SyncTypes};
use crate::ownership::{self, Ownership, Ownerships};
use crate::timer_queue::{self, TimerQueues};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, debug_span, warn};

/// The result of analyzing an application. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Analysis {
    /// Declared cores.
    pub cores: BTreeSet<Core>,
    /// Ownership of every used resource.
    pub ownerships: Ownerships,
    /// Ceiling of every shared resource.
    pub ceilings: Ceilings,
    /// Storage core of every used resource.
    pub locations: Locations,
    /// Late resources, by initializing core.
    pub late_resources: LateResources,
    /// Channels, by receiver core, dispatch priority and sender core.
    pub channels: Channels,
    /// Free queue capacities, by task and sender core.
    pub free_queues: FreeQueues,
    /// Timer queues, by core.
    pub timer_queues: TimerQueues,
    /// Cores that wait for other cores' late resources.
    pub initialization_barriers: InitializationBarriers,
    /// Cores that wait for other cores' dispatchers.
    pub spawn_barriers: SpawnBarriers,
    /// Types moved across cores, by resource or by message.
    pub send_types: SendTypes,
    /// Types referenced from several contexts at once.
    pub sync_types: SyncTypes,
}

impl Analysis {
    /// Analyze `app` with the default configuration.
    pub fn compile(app: &App) -> Result<Self, AnalysisError> {
        Self::compile_with(app, &AnalysisConfig::default())
    }

    /// Analyze `app`.
    ///
    /// Diagnostics from every stage are returned together; the consistency
    /// check only runs once the stages are clean, and stops at the first
    /// violation.
    pub fn compile_with(app: &App, config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        let span = debug_span!(
            "analysis",
            cores = app.cores().len(),
            tasks = app.tasks().len(),
            resources = app.resources().len()
        );
        let _enter = span.enter();

        let (resolution, mut diagnostics) = ownership::resolve(app);
        let (ceilings, found) = ceiling::compute(app, &resolution, config);
        diagnostics.extend(found);
        let placement = location::assign(app, &resolution);
        let (topology, found) = channel::build(app, config);
        diagnostics.extend(found);
        let (timer_queues, found) = timer_queue::build(app, &topology.free_queues, config);
        diagnostics.extend(found);

        if !diagnostics.is_empty() {
            warn!(count = diagnostics.len(), "analysis rejected");
            assert_invariant(
                DIAGNOSTICS_BATCHED,
                !diagnostics.is_empty(),
                "Diagnostics are reported as one batch",
                Some("Analysis::compile"),
            );
            return Err(AnalysisError::Diagnostics(diagnostics));
        }

        let barriers = barrier::synthesize(app, &placement, &topology);
        let ownerships = resolution.ownerships(&ceilings);

        let mut send_types = placement.send_types;
        send_types.extend(topology.send_types);

        let analysis = Self {
            cores: app.cores().clone(),
            ownerships,
            ceilings,
            locations: placement.locations,
            late_resources: placement.late_resources,
            channels: topology.channels,
            free_queues: topology.free_queues,
            timer_queues,
            initialization_barriers: barriers.initialization,
            spawn_barriers: barriers.spawn,
            send_types,
            sync_types: placement.sync_types,
        };
        analysis.check_consistency(app)?;

        assert_invariant(
            ANALYSIS_CONSISTENT,
            true,
            "Analysis passed every consistency check",
            Some("Analysis::compile"),
        );
        debug!(
            ownerships = analysis.ownerships.len(),
            channels = analysis.channels().count(),
            timer_queues = analysis.timer_queues.len(),
            "analysis complete"
        );
        Ok(analysis)
    }

    /// Flattened view of the channels as `(receiver, priority, sender, channel)`.
    pub fn channels(&self) -> impl Iterator<Item = (Receiver, Priority, Sender, &Channel)> {
        channel::flatten(&self.channels)
    }

    /// Ownership of a resource.
    pub fn ownership(&self, resource: &str) -> Option<&Ownership> {
        self.ownerships.get(resource)
    }

    /// Whether `core` must wait on `on` before running tasks that use late resources.
    pub fn waits_for_initialization(&self, core: Core, on: Core) -> bool {
        self.initialization_barriers
            .get(&core)
            .map_or(false, |cores| cores.contains(&on))
    }

    /// Whether `core` must wait on `on` before its first spawn.
    pub fn waits_for_dispatcher(&self, core: Core, on: Core) -> bool {
        self.spawn_barriers
            .get(&core)
            .map_or(false, |cores| cores.contains(&on))
    }

    fn check_consistency(&self, app: &App) -> Result<(), ConsistencyError> {
        for (task, name, _) in app.resource_accesses() {
            if app.resource(name).is_none() {
                return Err(ConsistencyError::UnknownResource {
                    task: task.name.clone(),
                    resource: name.clone(),
                });
            }
        }

        for (receiver, priority, sender, channel) in self.channels() {
            self.check_core(receiver, || format!("channel to {}", receiver))?;
            self.check_core(sender, || format!("channel from {}", sender))?;
            for name in &channel.tasks {
                let task = app.task(name).ok_or_else(|| ConsistencyError::UnknownTask {
                    task: name.clone(),
                    receiver,
                    sender,
                })?;
                if task.core != receiver || task.priority != priority {
                    return Err(ConsistencyError::MisroutedTask {
                        task: name.clone(),
                        core: receiver,
                        priority,
                        actual_core: task.core,
                        actual_priority: task.priority,
                    });
                }
            }
            for name in &channel.senders {
                let task = app.task(name).ok_or_else(|| ConsistencyError::UnknownTask {
                    task: name.clone(),
                    receiver,
                    sender,
                })?;
                if task.core != sender {
                    return Err(ConsistencyError::MisroutedTask {
                        task: name.clone(),
                        core: sender,
                        priority: task.priority,
                        actual_core: task.core,
                        actual_priority: task.priority,
                    });
                }
            }
        }

        for (resource, &ceiling) in &self.ceilings {
            if self.ownerships.get(resource) != Some(&Ownership::Shared(ceiling)) {
                return Err(ConsistencyError::CeilingMismatch {
                    resource: resource.clone(),
                });
            }
        }
        for (resource, ownership) in &self.ownerships {
            if ownership.ceiling() != self.ceilings.get(resource).copied() {
                return Err(ConsistencyError::CeilingMismatch {
                    resource: resource.clone(),
                });
            }
        }

        for (task, resource, _) in app.resource_accesses() {
            if app.task(&task.name) != Some(task) {
                return Err(ConsistencyError::UnknownAccessor {
                    resource: resource.clone(),
                    task: task.name.clone(),
                });
            }
            if let Some(&Ownership::Shared(ceiling)) = self.ownerships.get(resource) {
                if task.priority > ceiling {
                    return Err(ConsistencyError::CeilingBelowAccessor {
                        resource: resource.clone(),
                        ceiling,
                        task: task.name.clone(),
                        priority: task.priority,
                    });
                }
            }
        }
        for (resource, ownership) in &self.ownerships {
            if let Ownership::Exclusive(owner) = ownership {
                if app.task(owner).is_none() {
                    return Err(ConsistencyError::UnknownAccessor {
                        resource: resource.clone(),
                        task: owner.clone(),
                    });
                }
            }
        }

        for (resource, location) in &self.locations {
            self.check_core(location.core(), || format!("location of `{}`", resource))?;
        }
        for &core in self.timer_queues.keys() {
            self.check_core(core, || "timer queue".to_string())?;
        }
        for (&waiting, on) in self.initialization_barriers.iter().chain(&self.spawn_barriers) {
            self.check_core(waiting, || "barrier".to_string())?;
            for &core in on {
                self.check_core(core, || format!("barrier of {}", waiting))?;
            }
        }
        Ok(())
    }

    fn check_core(&self, core: Core, entity: impl FnOnce() -> String) -> Result<(), ConsistencyError> {
        if self.cores.contains(&core) {
            Ok(())
        } else {
            Err(ConsistencyError::UnknownCore {
                core,
                entity: entity(),
            })
        }
    }
}
