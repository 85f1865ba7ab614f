//! PPT Invariant System: post-condition enforcement with contract tracking.
//!
//! Every analysis stage asserts the properties its output must satisfy.
//! With the `ppt` feature on, each assertion that held is recorded so that
//! tests can prove the check actually ran (`contract_test`).

#[cfg(feature = "ppt")]
use lazy_static::lazy_static;
#[cfg(feature = "ppt")]
use std::collections::HashSet;
#[cfg(feature = "ppt")]
use std::sync::Mutex;

// Invariant constants for contract tracking
pub const APP_LEGALITY: u32 = 1;
pub const APP_REJECTS_INVALID: u32 = 2;
pub const OWNERSHIP_PARTITION: u32 = 3;
pub const CEILING_TIGHT: u32 = 4;
pub const LOCATION_UNIQUE: u32 = 5;
pub const CROSS_CORE_OBLIGATION: u32 = 6;
pub const CHANNEL_PARTITION: u32 = 7;
pub const FREE_QUEUE_DECLARED: u32 = 8;
pub const TIMER_QUEUE_BOUNDED: u32 = 9;
pub const BARRIER_COALESCED: u32 = 10;
pub const DIAGNOSTICS_BATCHED: u32 = 11;
pub const ANALYSIS_CONSISTENT: u32 = 12;

#[cfg(feature = "ppt")]
lazy_static! {
    static ref INVARIANT_LOG: Mutex<HashSet<u32>> = Mutex::new(HashSet::new());
}

#[cfg(feature = "ppt")]
fn invariant_log() -> std::sync::MutexGuard<'static, HashSet<u32>> {
    // A panicking assertion poisons the lock; the set itself is still valid.
    INVARIANT_LOG.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(feature = "ppt")]
/// Assert an invariant: logs it and panics on failure.
pub(crate) fn assert_invariant(id: u32, condition: bool, message: &str, context: Option<&str>) {
    if !condition {
        let full_message = if let Some(ctx) = context {
            format!("Invariant {} failed: {} (context: {})", id, message, ctx)
        } else {
            format!("Invariant {} failed: {}", id, message)
        };
        tracing::error!(invariant = id, "{}", full_message);
        panic!("{}", full_message);
    }
    invariant_log().insert(id);
}

#[cfg(not(feature = "ppt"))]
/// Assert an invariant: checks condition and panics on failure.
pub(crate) fn assert_invariant(_id: u32, condition: bool, message: &str, _context: Option<&str>) {
    if !condition {
        panic!("Invariant failed: {}", message);
    }
}

#[cfg(feature = "ppt")]
/// Contract test: checks that specified invariants were asserted.
pub fn contract_test(test_name: &str, required_invariants: &[u32]) {
    let log = invariant_log();
    let missing: Vec<u32> = required_invariants
        .iter()
        .copied()
        .filter(|inv| !log.contains(inv))
        .collect();
    drop(log); // Drop the lock before panicking
    if !missing.is_empty() {
        panic!(
            "Contract test '{}' failed: invariants not enforced: {:?}",
            test_name, missing
        );
    }
}

#[cfg(not(feature = "ppt"))]
/// Contract test: no-op when PPT feature is disabled.
pub fn contract_test(_test_name: &str, _required_invariants: &[u32]) {}

#[cfg(feature = "ppt")]
/// Clear invariant log (for between test runs).
pub fn clear_invariant_log() {
    invariant_log().clear();
}

#[cfg(not(feature = "ppt"))]
/// Clear invariant log: no-op when PPT feature is disabled.
pub fn clear_invariant_log() {}
