//! Analysis-wide configuration.

use crate::app::Priority;
use serde::{Deserialize, Serialize};

/// Highest logical priority accepted unless configured otherwise.
pub const DEFAULT_MAX_PRIORITY: Priority = Priority::MAX;

/// Timer queue slots reserved for a task scheduled by another task.
pub const DEFAULT_TIMER_SLOT_BOUND: u8 = 1;

/// Knobs for one analysis pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Highest logical priority the target's interrupt controller supports.
    /// Valid priorities are `1..=max_priority`.
    pub max_priority: Priority,
    /// Timer queue slots for a delayed task that does not schedule itself.
    pub timer_slot_bound: u8,
}

impl AnalysisConfig {
    /// Configuration for a controller with `bits` priority bits.
    pub fn for_priority_bits(bits: u32) -> Self {
        let levels = 1u32.checked_shl(bits).unwrap_or(u32::MAX);
        let max = levels.saturating_sub(1).min(u32::from(Priority::MAX)) as Priority;
        Self::default().with_max_priority(max)
    }

    pub fn with_max_priority(mut self, max_priority: Priority) -> Self {
        self.max_priority = max_priority;
        self
    }

    /// Slots for a task scheduled by others. A bound of 0 makes every such
    /// schedule a [`CapacityZero`](crate::Diagnostic::CapacityZero) diagnostic.
    pub fn with_timer_slot_bound(mut self, bound: u8) -> Self {
        self.timer_slot_bound = bound;
        self
    }

    /// Whether `priority` can be programmed on the target.
    pub fn priority_in_range(&self, priority: Priority) -> bool {
        (1..=self.max_priority).contains(&priority)
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_priority: DEFAULT_MAX_PRIORITY,
            timer_slot_bound: DEFAULT_TIMER_SLOT_BOUND,
        }
    }
}
