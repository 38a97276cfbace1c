use std::sync::{Mutex, MutexGuard};
use tracing::warn;

/// Lock an entry mutex, recovering the data if a panicking callback poisoned it
pub(crate) fn mutex_lock_or_recover<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        warn!("Recovering from poisoned mutex");
        poisoned.into_inner()
    })
}
