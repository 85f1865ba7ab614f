//! Ceiling calculator: priority ceilings of shared resources (immediate
//! priority ceiling protocol).

use crate::app::{App, Priority, ResourceName, Task};
use crate::config::AnalysisConfig;
use crate::error::Diagnostic;
use crate::invariant_ppt::{assert_invariant, CEILING_TIGHT};
use crate::ownership::Resolution;
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

/// Priority ceiling.
pub type Ceiling = Priority;

/// Ceilings of shared resources, keyed by resource.
pub type Ceilings = BTreeMap<ResourceName, Ceiling>;

/// Compute the ceiling of every shared resource: the highest priority among
/// its accessors. Sharing across cores does not raise the value.
///
/// Also reports task priorities the target cannot program, and equal
/// priority accesses from different cores to resources not declared
/// transferable.
pub fn compute(
    app: &App,
    resolution: &Resolution,
    config: &AnalysisConfig,
) -> (Ceilings, Vec<Diagnostic>) {
    let mut diagnostics: Vec<Diagnostic> = app
        .tasks()
        .values()
        .filter(|task| !config.priority_in_range(task.priority))
        .map(|task| {
            warn!(task = %task.name, priority = task.priority, "priority out of range");
            Diagnostic::PriorityOutOfRange {
                task: task.name.clone(),
                priority: task.priority,
                max: config.max_priority,
            }
        })
        .collect();

    let mut ceilings = Ceilings::new();
    for (name, names) in &resolution.shared {
        let tasks: Vec<&Task> = names.iter().filter_map(|t| app.task(t)).collect();
        let Some(ceiling) = tasks.iter().map(|t| t.priority).max() else {
            continue;
        };
        trace!(resource = %name, ceiling, "ceiling");
        ceilings.insert(name.clone(), ceiling);

        let transferable = app.resource(name).map_or(false, |r| r.transferable);
        if !transferable {
            if let Some(conflict) = equal_priority_conflict(name, &tasks) {
                warn!(resource = %name, "equal-priority cross-core access");
                diagnostics.push(conflict);
            }
        }
    }

    assert_invariant(
        CEILING_TIGHT,
        ceilings.iter().all(|(name, &ceiling)| {
            let priorities: Vec<Priority> = resolution.shared[name]
                .iter()
                .filter_map(|t| app.task(t))
                .map(|t| t.priority)
                .collect();
            priorities.iter().all(|&p| p <= ceiling) && priorities.contains(&ceiling)
        }),
        "Every ceiling is the maximum accessor priority",
        Some("ceiling::compute"),
    );
    debug!(ceilings = ceilings.len(), "ceilings computed");

    (ceilings, diagnostics)
}

/// The first pair of accessors (by priority, core, name) that share a
/// priority level but run on different cores.
fn equal_priority_conflict(resource: &ResourceName, tasks: &[&Task]) -> Option<Diagnostic> {
    let mut sorted = tasks.to_vec();
    sorted.sort_by(|a, b| (a.priority, a.core, &a.name).cmp(&(b.priority, b.core, &b.name)));
    sorted.iter().enumerate().find_map(|(i, first)| {
        sorted[i + 1..]
            .iter()
            .take_while(|second| second.priority == first.priority)
            .find(|second| second.core != first.core)
            .map(|second| Diagnostic::CrossCoreCeilingConflict {
                resource: resource.clone(),
                priority: first.priority,
                first: first.name.clone(),
                first_core: first.core,
                second: second.name.clone(),
                second_core: second.core,
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{Access, Core, Resource};
    use crate::ownership;
    use proptest::prelude::*;

    fn shared_app(accessors: &[(Core, Priority)], transferable: bool) -> App {
        let mut app = App::new([Core(0), Core(1), Core(2)]);
        let resource = Resource::eager("r", "u32");
        app.add_resource(if transferable { resource.transferable() } else { resource })
            .unwrap();
        for (i, &(core, priority)) in accessors.iter().enumerate() {
            let mut task = Task::new(format!("t{}", i), core, priority);
            task.resources.insert("r".into(), Access::Write);
            app.add_task(task).unwrap();
        }
        app
    }

    fn run(app: &App) -> (Ceilings, Vec<Diagnostic>) {
        let (resolution, _) = ownership::resolve(app);
        compute(app, &resolution, &AnalysisConfig::default())
    }

    #[test]
    fn ceiling_is_max_priority() {
        let app = shared_app(&[(Core(0), 2), (Core(0), 5), (Core(0), 3)], false);
        let (ceilings, diagnostics) = run(&app);
        assert_eq!(ceilings.get("r"), Some(&5));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn cross_core_does_not_raise_ceiling() {
        let app = shared_app(&[(Core(0), 2), (Core(1), 5)], false);
        let (ceilings, diagnostics) = run(&app);
        assert_eq!(ceilings.get("r"), Some(&5));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn equal_priority_across_cores_conflicts() {
        let app = shared_app(&[(Core(0), 3), (Core(1), 3)], false);
        let (_, diagnostics) = run(&app);
        assert_eq!(
            diagnostics,
            vec![Diagnostic::CrossCoreCeilingConflict {
                resource: "r".into(),
                priority: 3,
                first: "t0".into(),
                first_core: Core(0),
                second: "t1".into(),
                second_core: Core(1),
            }]
        );
    }

    #[test]
    fn transferable_resource_does_not_conflict() {
        let app = shared_app(&[(Core(0), 3), (Core(1), 3)], true);
        let (ceilings, diagnostics) = run(&app);
        assert!(diagnostics.is_empty());
        assert_eq!(ceilings.get("r"), Some(&3));
    }

    #[test]
    fn equal_priority_same_core_is_fine() {
        let app = shared_app(&[(Core(1), 3), (Core(1), 3), (Core(0), 4)], false);
        let (_, diagnostics) = run(&app);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn out_of_range_priorities_are_reported() {
        let app = shared_app(&[(Core(0), 0), (Core(0), 9)], false);
        let (resolution, _) = ownership::resolve(&app);
        let config = AnalysisConfig::for_priority_bits(3);
        let (_, diagnostics) = compute(&app, &resolution, &config);
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics
            .iter()
            .all(|d| matches!(d, Diagnostic::PriorityOutOfRange { max: 7, .. })));
    }

    proptest! {
        #[test]
        fn ceiling_bounds_every_accessor(prios in proptest::collection::vec(1u8..16, 2..8)) {
            let accessors: Vec<_> = prios.iter().map(|&p| (Core(0), p)).collect();
            let app = shared_app(&accessors, false);
            let (ceilings, _) = run(&app);
            let ceiling = ceilings["r"];
            prop_assert!(prios.iter().all(|&p| p <= ceiling));
            prop_assert_eq!(Some(&ceiling), prios.iter().max());
        }
    }
}
