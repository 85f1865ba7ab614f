//! App module: the resolved application model the analysis runs on.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use crate::invariant_ppt::{assert_invariant, APP_LEGALITY, APP_REJECTS_INVALID};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// Task priority. Higher is more urgent; scoped to one core's dispatcher.
pub type Priority = u8;

/// Task name.
pub type TaskName = String;

/// Resource name.
pub type ResourceName = String;

/// Name of a resource value type or a message payload type.
pub type TypeName = String;

/// Index of one processing unit of the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Core(pub u8);

impl fmt::Display for Core {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "core {}", self.0)
    }
}

/// How a task accesses a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Access {
    /// Shared reference; several contexts may hold it at once.
    Read,
    /// Exclusive reference; mutation happens inside a critical section.
    Write,
}

/// When a resource receives its initial value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InitKind {
    /// Initialized at build time.
    Eager,
    /// Supplied at runtime by the init routine of `core`.
    Late {
        /// The core whose init routine produces the value.
        core: Core,
    },
}

/// A declared resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource name.
    pub name: ResourceName,
    /// Declared value type.
    pub ty: TypeName,
    /// Initialization kind.
    pub init: InitKind,
    /// The application declares the value may be handed between cores
    /// at equal priority.
    pub transferable: bool,
}

impl Resource {
    /// An eagerly initialized resource.
    pub fn eager(name: impl Into<ResourceName>, ty: impl Into<TypeName>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            init: InitKind::Eager,
            transferable: false,
        }
    }

    /// A late resource initialized by `core`.
    pub fn late(name: impl Into<ResourceName>, ty: impl Into<TypeName>, core: Core) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            init: InitKind::Late { core },
            transferable: false,
        }
    }

    /// Mark the resource as transferable across cores.
    pub fn transferable(mut self) -> Self {
        self.transferable = true;
        self
    }

    /// The initializing core, for late resources.
    pub fn late_core(&self) -> Option<Core> {
        match self.init {
            InitKind::Eager => None,
            InitKind::Late { core } => Some(core),
        }
    }
}

/// How a spawn is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SpawnKind {
    /// Dispatched as soon as the receiver's priority allows.
    Immediate,
    /// Dispatched after a delay, through the sender core's timer queue.
    Delayed,
}

/// A spawn edge out of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spawn {
    /// The spawned task.
    pub target: TaskName,
    /// Core the target runs on.
    pub core: Core,
    /// Priority the target is dispatched at.
    pub priority: Priority,
    /// Maximum number of in-flight, not yet dispatched instances.
    pub capacity: u8,
    /// Immediate or delayed dispatch.
    pub kind: SpawnKind,
}

impl Spawn {
    /// An immediate spawn edge.
    pub fn immediate(target: impl Into<TaskName>, core: Core, priority: Priority, capacity: u8) -> Self {
        Self {
            target: target.into(),
            core,
            priority,
            capacity,
            kind: SpawnKind::Immediate,
        }
    }

    /// A delayed spawn edge.
    pub fn delayed(target: impl Into<TaskName>, core: Core, priority: Priority, capacity: u8) -> Self {
        Self {
            kind: SpawnKind::Delayed,
            ..Self::immediate(target, core, priority, capacity)
        }
    }
}

/// A task bound to a core and a priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Task name.
    pub name: TaskName,
    /// Core the task runs on.
    pub core: Core,
    /// Dispatch priority.
    pub priority: Priority,
    /// Payload type carried when the task is spawned.
    pub message: TypeName,
    /// Accessed resources.
    pub resources: BTreeMap<ResourceName, Access>,
    /// Spawn edges out of this task.
    pub spawns: Vec<Spawn>,
}

impl Task {
    /// A task with no payload, no resources and no spawns.
    pub fn new(name: impl Into<TaskName>, core: Core, priority: Priority) -> Self {
        Self {
            name: name.into(),
            core,
            priority,
            message: "()".to_string(),
            resources: BTreeMap::new(),
            spawns: Vec::new(),
        }
    }
}

/// Errors that can occur when building the application model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    /// A task with this name already exists.
    #[error("task `{0}` is declared twice")]
    DuplicateTask(TaskName),
    /// A resource with this name already exists.
    #[error("resource `{0}` is declared twice")]
    DuplicateResource(ResourceName),
    /// The core is not part of the application.
    #[error("{0} is not a declared core")]
    UnknownCore(Core),
    /// A stored entry is filed under a name other than its own.
    #[error("entry `{key}` declares the name `{name}`")]
    KeyMismatch {
        /// Map key the entry was stored under.
        key: String,
        /// Name the entry declares.
        name: String,
    },
}

/// Serialized form of an [`App`], checked on the way in.
#[derive(Deserialize)]
struct AppRecord {
    cores: BTreeSet<Core>,
    #[serde(default)]
    resources: BTreeMap<ResourceName, Resource>,
    #[serde(default)]
    tasks: BTreeMap<TaskName, Task>,
}

impl TryFrom<AppRecord> for App {
    type Error = AppError;

    fn try_from(record: AppRecord) -> Result<Self, Self::Error> {
        let mut app = App::new(record.cores);
        for (key, resource) in record.resources {
            if key != resource.name {
                return Err(AppError::KeyMismatch {
                    key,
                    name: resource.name,
                });
            }
            app.add_resource(resource)?;
        }
        for (key, task) in record.tasks {
            if key != task.name {
                return Err(AppError::KeyMismatch { key, name: task.name });
            }
            app.add_task(task)?;
        }
        Ok(app)
    }
}

/// The resolved application: cores, resources and tasks.
///
/// Deserialization goes through [`App::add_resource`] and [`App::add_task`],
/// so a loaded application is as valid as a built one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "AppRecord")]
pub struct App {
    cores: BTreeSet<Core>,
    resources: BTreeMap<ResourceName, Resource>,
    tasks: BTreeMap<TaskName, Task>,
}

impl App {
    /// Create an application running on `cores`.
    pub fn new(cores: impl IntoIterator<Item = Core>) -> Self {
        Self {
            cores: cores.into_iter().collect(),
            resources: BTreeMap::new(),
            tasks: BTreeMap::new(),
        }
    }

    /// Declare a resource.
    pub fn add_resource(&mut self, resource: Resource) -> Result<(), AppError> {
        if self.resources.contains_key(&resource.name) {
            return Err(AppError::DuplicateResource(resource.name));
        }
        if let Some(core) = resource.late_core() {
            if !self.cores.contains(&core) {
                assert_invariant(
                    APP_REJECTS_INVALID,
                    !self.cores.contains(&core),
                    "Late-init core not declared, rejecting",
                    Some("add_resource"),
                );
                return Err(AppError::UnknownCore(core));
            }
        }
        self.resources.insert(resource.name.clone(), resource);
        Ok(())
    }

    /// Declare a task. Resource names and spawn targets are checked later,
    /// by the analysis.
    pub fn add_task(&mut self, task: Task) -> Result<(), AppError> {
        if self.tasks.contains_key(&task.name) {
            return Err(AppError::DuplicateTask(task.name));
        }
        if !self.cores.contains(&task.core) {
            assert_invariant(
                APP_REJECTS_INVALID,
                !self.cores.contains(&task.core),
                "Task core not declared, rejecting",
                Some("add_task"),
            );
            return Err(AppError::UnknownCore(task.core));
        }
        self.tasks.insert(task.name.clone(), task);

        assert_invariant(
            APP_LEGALITY,
            self.tasks.values().all(|t| self.cores.contains(&t.core)),
            "Task added, every task runs on a declared core",
            Some("add_task"),
        );
        Ok(())
    }

    /// Declared cores.
    pub fn cores(&self) -> &BTreeSet<Core> {
        &self.cores
    }

    /// Declared resources, by name.
    pub fn resources(&self) -> &BTreeMap<ResourceName, Resource> {
        &self.resources
    }

    /// Declared tasks, by name.
    pub fn tasks(&self) -> &BTreeMap<TaskName, Task> {
        &self.tasks
    }

    /// Look up a resource.
    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.get(name)
    }

    /// Look up a task.
    pub fn task(&self, name: &str) -> Option<&Task> {
        self.tasks.get(name)
    }

    pub(crate) fn task_mut(&mut self, name: &str) -> Option<&mut Task> {
        self.tasks.get_mut(name)
    }

    /// Every (task, resource, access) triple, in task then resource order.
    pub fn resource_accesses(&self) -> impl Iterator<Item = (&Task, &ResourceName, Access)> {
        self.tasks
            .values()
            .flat_map(|task| task.resources.iter().map(move |(name, &access)| (task, name, access)))
    }

    /// Every (sender, spawn edge) pair, in sender order.
    pub fn spawn_edges(&self) -> impl Iterator<Item = (&Task, &Spawn)> {
        self.tasks
            .values()
            .flat_map(|task| task.spawns.iter().map(move |spawn| (task, spawn)))
    }
}
