use std::sync::{Mutex, MutexGuard};

use tracing::warn;

/// Acquire `lock`, taking over the guard when a previous holder panicked.
pub(crate) fn lock_or_recover<'a, T>(
    lock: &'a Mutex<T>,
    component: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        warn!(
            op,
            component,
            result = "poisoned_recovered",
            "recovered cache state from a poisoned mutex"
        );
        poisoned.into_inner()
    })
}
