//! Global count of in-flight operations.
//!
//! A plain [`Signal`] rather than a reducer store: [`LoadingGuard`] has to
//! decrement from `Drop`, which cannot await.

use taskboard_core::observable::{ReadSignal, Signal};

/// Non-negative counter of operations in progress
#[derive(Clone, Debug, Default)]
pub struct LoadingCounter {
    count: Signal<u32>,
}

impl LoadingCounter {
    /// Creates a counter at zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks one more operation as started
    pub fn increment(&self) {
        self.count.modify(|count| *count = count.saturating_add(1));
    }

    /// Marks one operation as finished; never goes below zero
    pub fn decrement(&self) {
        let changed = self.count.modify_if(|count| {
            if *count == 0 {
                return false;
            }
            *count -= 1;
            true
        });
        if !changed {
            tracing::trace!("Loading counter already at zero");
        }
    }

    /// Forces the counter back to zero
    pub fn reset(&self) {
        self.count.modify_if(|count| std::mem::replace(count, 0) != 0);
    }

    /// Current number of operations in progress
    #[must_use]
    pub fn count(&self) -> u32 {
        self.count.get()
    }

    /// Returns true while at least one operation is in progress
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.count() > 0
    }

    /// Read-only observable view of the count
    #[must_use]
    pub fn observe(&self) -> ReadSignal<u32> {
        self.count.subscribe()
    }

    /// Increments now and decrements when the returned guard drops
    #[must_use = "the operation counts as finished as soon as the guard is dropped"]
    pub fn track(&self) -> LoadingGuard {
        self.increment();
        LoadingGuard {
            counter: self.clone(),
        }
    }
}

/// Keeps one operation counted while alive
#[derive(Debug)]
pub struct LoadingGuard {
    counter: LoadingCounter,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.counter.decrement();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decrement_is_floor_clamped() {
        let loading = LoadingCounter::new();
        loading.decrement();
        assert_eq!(loading.count(), 0);

        loading.increment();
        loading.increment();
        loading.decrement();
        assert_eq!(loading.count(), 1);
        assert!(loading.is_loading());
    }

    #[test]
    fn reset_returns_to_zero() {
        let loading = LoadingCounter::new();
        loading.increment();
        loading.increment();
        loading.reset();
        assert!(!loading.is_loading());
    }

    #[test]
    fn guard_decrements_on_drop() {
        let loading = LoadingCounter::new();
        {
            let _first = loading.track();
            let _second = loading.track();
            assert_eq!(loading.count(), 2);
        }
        assert_eq!(loading.count(), 0);
    }

    #[tokio::test]
    async fn observers_see_changes() {
        let loading = LoadingCounter::new();
        let mut view = loading.observe();
        let guard = loading.track();
        assert!(view.has_changed());
        assert_eq!(view.wait_for(|count| *count == 1).await, Ok(1));

        drop(guard);
        assert_eq!(view.wait_for(|count| *count == 0).await, Ok(0));
    }
}
