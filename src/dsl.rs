//! DSL module: name-based builder API for applications.

use crate::app::{Access, App, AppError, Core, Priority, Resource, Spawn, SpawnKind, Task, TaskName};

/// A spawn edge whose target may not be declared yet.
#[derive(Debug, Clone)]
struct PendingSpawn {
    sender: TaskName,
    target: TaskName,
    capacity: u8,
    kind: SpawnKind,
}

/// The application builder.
///
/// Spawn targets are given by name and resolved to their core and priority
/// when the application is built, so tasks can be declared in any order.
#[derive(Debug)]
pub struct AppBuilder {
    app: App,
    spawns: Vec<PendingSpawn>,
}

impl AppBuilder {
    /// Create a builder for an application running on `cores` cores,
    /// numbered from 0.
    pub fn new(cores: u8) -> Self {
        Self {
            app: App::new((0..cores).map(Core)),
            spawns: Vec::new(),
        }
    }

    /// Add an eagerly initialized resource.
    pub fn resource(&mut self, name: &str, ty: &str) -> Result<&mut Self, DslError> {
        self.app.add_resource(Resource::eager(name, ty))?;
        Ok(self)
    }

    /// Add a resource initialized at runtime by `core`.
    pub fn late_resource(&mut self, name: &str, ty: &str, core: u8) -> Result<&mut Self, DslError> {
        self.app.add_resource(Resource::late(name, ty, Core(core)))?;
        Ok(self)
    }

    /// Add a fully specified resource.
    pub fn resource_with(&mut self, resource: Resource) -> Result<&mut Self, DslError> {
        self.app.add_resource(resource)?;
        Ok(self)
    }

    /// Start declaring a task.
    pub fn task(&mut self, name: &str, core: u8, priority: Priority) -> TaskBuilder<'_> {
        TaskBuilder {
            builder: self,
            task: Task::new(name, Core(core), priority),
            spawns: Vec::new(),
        }
    }

    /// Build the application.
    pub fn build(self) -> Result<App, DslError> {
        let Self { mut app, spawns } = self;
        for pending in spawns {
            let target = app
                .task(&pending.target)
                .ok_or_else(|| DslError::MissingTask(pending.target.clone()))?;
            let spawn = Spawn {
                core: target.core,
                priority: target.priority,
                target: pending.target,
                capacity: pending.capacity,
                kind: pending.kind,
            };
            if let Some(sender) = app.task_mut(&pending.sender) {
                sender.spawns.push(spawn);
            }
        }
        Ok(app)
    }
}

/// Declares one task; finish with [`TaskBuilder::add`].
#[derive(Debug)]
pub struct TaskBuilder<'a> {
    builder: &'a mut AppBuilder,
    task: Task,
    spawns: Vec<PendingSpawn>,
}

impl<'a> TaskBuilder<'a> {
    /// Payload type carried when this task is spawned.
    pub fn message(mut self, ty: &str) -> Self {
        self.task.message = ty.to_string();
        self
    }

    /// Read a resource through a shared reference.
    pub fn reads(mut self, resource: &str) -> Self {
        self.task.resources.insert(resource.to_string(), Access::Read);
        self
    }

    /// Mutate a resource.
    pub fn writes(mut self, resource: &str) -> Self {
        self.task.resources.insert(resource.to_string(), Access::Write);
        self
    }

    /// Spawn `target` immediately, with up to `capacity` instances in flight.
    pub fn spawns(self, target: &str, capacity: u8) -> Self {
        self.edge(target, capacity, SpawnKind::Immediate)
    }

    /// Schedule `target` after a delay, with up to `capacity` instances in flight.
    pub fn schedules(self, target: &str, capacity: u8) -> Self {
        self.edge(target, capacity, SpawnKind::Delayed)
    }

    fn edge(mut self, target: &str, capacity: u8, kind: SpawnKind) -> Self {
        self.spawns.push(PendingSpawn {
            sender: self.task.name.clone(),
            target: target.to_string(),
            capacity,
            kind,
        });
        self
    }

    /// Add the task to the application.
    pub fn add(self) -> Result<&'a mut AppBuilder, DslError> {
        let TaskBuilder {
            builder,
            task,
            spawns,
        } = self;
        builder.app.add_task(task)?;
        builder.spawns.extend(spawns);
        Ok(builder)
    }
}

/// DSL-specific errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DslError {
    #[error(transparent)]
    App(#[from] AppError),
    #[error("spawn target `{0}` is not a declared task")]
    MissingTask(TaskName),
}
