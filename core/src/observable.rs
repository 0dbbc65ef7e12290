//! Observable values for the state layer.
//!
//! Stores publish their state through a [`Signal`]. Consumers only ever see a
//! [`ReadSignal`] (current value plus change notification) or a [`Computed`]
//! derived value, so collections can never be mutated from the outside.
//!
//! [`Computed`] is a memoization cell: it recomputes lazily on read, and only
//! when the upstream signal changed since the last computation.
//!
//! ```
//! use taskboard_core::observable::Signal;
//!
//! let counter = Signal::new(2);
//! let double = counter.map(|n| n * 2);
//! assert_eq!(double.get(), 4);
//!
//! counter.set(5);
//! assert_eq!(double.get(), 10);
//! assert_eq!(double.recomputations(), 2);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::watch;

/// The writable side of a signal has been dropped
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("signal source has been dropped")]
pub struct SignalClosed;

/// A writable observable value
///
/// Cloning a `Signal` yields another handle to the same value.
pub struct Signal<T> {
    sender: Arc<watch::Sender<T>>,
}

impl<T> Signal<T> {
    /// Creates a signal holding `value`
    #[must_use]
    pub fn new(value: T) -> Self {
        let (sender, _) = watch::channel(value);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Returns a clone of the current value
    #[must_use]
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.sender.borrow().clone()
    }

    /// Reads the current value through a closure
    ///
    /// The closure must not write to the same signal.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.sender.borrow())
    }

    /// Replaces the value and notifies subscribers
    pub fn set(&self, value: T) {
        self.sender.send_replace(value);
    }

    /// Mutates the value in place and notifies subscribers
    ///
    /// Mutations are serialized: two `modify` calls never interleave.
    pub fn modify(&self, f: impl FnOnce(&mut T)) {
        self.sender.send_modify(f);
    }

    /// Mutates the value in place, notifying subscribers only when `f` returns true
    pub fn modify_if(&self, f: impl FnOnce(&mut T) -> bool) -> bool {
        self.sender.send_if_modified(f)
    }

    /// Returns a read-only view of this signal
    #[must_use]
    pub fn subscribe(&self) -> ReadSignal<T> {
        ReadSignal {
            receiver: self.sender.subscribe(),
        }
    }

    /// Derives a memoized value from this signal
    #[must_use]
    pub fn map<U, F>(&self, derive: F) -> Computed<T, U>
    where
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        Computed::new(self.subscribe(), derive)
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            sender: Arc::clone(&self.sender),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Signal").field(&*self.sender.borrow()).finish()
    }
}

impl<T: Default> Default for Signal<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// A read-only view of a [`Signal`]
pub struct ReadSignal<T> {
    receiver: watch::Receiver<T>,
}

impl<T> ReadSignal<T> {
    /// Returns a clone of the current value
    #[must_use]
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.receiver.borrow().clone()
    }

    /// Reads the current value through a closure
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.receiver.borrow())
    }

    /// Returns true if the value changed since this view last observed it
    #[must_use]
    pub fn has_changed(&self) -> bool {
        self.receiver.has_changed().unwrap_or(false)
    }

    /// Waits for the next change and marks it as seen
    ///
    /// # Errors
    ///
    /// Returns [`SignalClosed`] if the signal was dropped.
    pub async fn changed(&mut self) -> Result<(), SignalClosed> {
        self.receiver.changed().await.map_err(|_| SignalClosed)
    }

    /// Waits until the value satisfies `predicate`, returning that value
    ///
    /// Resolves immediately if the current value already matches.
    ///
    /// # Errors
    ///
    /// Returns [`SignalClosed`] if the signal was dropped before a match.
    pub async fn wait_for(&mut self, predicate: impl FnMut(&T) -> bool) -> Result<T, SignalClosed>
    where
        T: Clone,
    {
        self.receiver
            .wait_for(predicate)
            .await
            .map(|value| value.clone())
            .map_err(|_| SignalClosed)
    }

    /// Derives a memoized value from this view
    #[must_use]
    pub fn map<U, F>(self, derive: F) -> Computed<T, U>
    where
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        Computed::new(self, derive)
    }
}

impl<T> Clone for ReadSignal<T> {
    fn clone(&self) -> Self {
        Self {
            receiver: self.receiver.clone(),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ReadSignal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ReadSignal").field(&*self.receiver.borrow()).finish()
    }
}

type Derive<T, U> = Box<dyn Fn(&T) -> U + Send + Sync>;

/// A derived value cached until its upstream signal changes
pub struct Computed<T, U> {
    source: Mutex<watch::Receiver<T>>,
    derive: Derive<T, U>,
    cache: Mutex<Option<U>>,
    recomputations: AtomicU64,
}

impl<T, U> Computed<T, U> {
    /// Creates a computed value over `source`
    ///
    /// Nothing is computed until the first [`Computed::get`].
    #[must_use]
    pub fn new<F>(source: ReadSignal<T>, derive: F) -> Self
    where
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        Self {
            source: Mutex::new(source.receiver),
            derive: Box::new(derive),
            cache: Mutex::new(None),
            recomputations: AtomicU64::new(0),
        }
    }

    /// Returns the derived value, recomputing it only if the source changed
    pub fn get(&self) -> U
    where
        U: Clone,
    {
        let mut source = self.source.lock().unwrap_or_else(PoisonError::into_inner);
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);

        let stale = source.has_changed().unwrap_or(false);
        if !stale {
            if let Some(value) = cache.as_ref() {
                return value.clone();
            }
        }

        let value = (self.derive)(&source.borrow_and_update());
        self.recomputations.fetch_add(1, Ordering::Relaxed);
        *cache = Some(value.clone());
        value
    }

    /// Returns true if the next `get` will recompute
    #[must_use]
    pub fn is_stale(&self) -> bool {
        let source = self.source.lock().unwrap_or_else(PoisonError::into_inner);
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.is_none() || source.has_changed().unwrap_or(false)
    }

    /// Number of times the derive function has run
    #[must_use]
    pub fn recomputations(&self) -> u64 {
        self.recomputations.load(Ordering::Relaxed)
    }
}

impl<T, U: std::fmt::Debug> std::fmt::Debug for Computed<T, U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Computed")
            .field("cached", &*cache)
            .field("recomputations", &self.recomputations())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    #[test]
    fn signal_get_set_modify() {
        let signal = Signal::new(vec![1, 2]);
        assert_eq!(signal.get(), vec![1, 2]);

        signal.set(vec![3]);
        assert_eq!(signal.get(), vec![3]);

        signal.modify(|v| v.push(4));
        assert_eq!(signal.with(Vec::len), 2);
    }

    #[test]
    fn modify_if_reports_change() {
        let signal = Signal::new(0_u32);
        let view = signal.subscribe();

        assert!(!signal.modify_if(|_| false));
        assert!(!view.has_changed());

        assert!(signal.modify_if(|n| {
            *n += 1;
            true
        }));
        assert!(view.has_changed());
    }

    #[test]
    fn computed_is_lazy_and_memoized() {
        let signal = Signal::new(3_i64);
        let square = signal.map(|n| n * n);

        assert_eq!(square.recomputations(), 0);
        assert!(square.is_stale());

        assert_eq!(square.get(), 9);
        assert_eq!(square.get(), 9);
        assert_eq!(square.recomputations(), 1);
        assert!(!square.is_stale());

        signal.set(4);
        assert!(square.is_stale());
        assert_eq!(square.recomputations(), 1);
        assert_eq!(square.get(), 16);
        assert_eq!(square.recomputations(), 2);
    }

    #[test]
    fn computed_sees_several_changes_as_one() {
        let signal = Signal::new(0_i32);
        let is_even = signal.map(|n| n % 2 == 0);
        assert!(is_even.get());

        signal.set(1);
        signal.set(2);
        signal.set(3);
        assert!(!is_even.get());
        assert_eq!(is_even.recomputations(), 2);
    }

    #[tokio::test]
    async fn read_signal_wait_for() {
        let signal = Signal::new(false);
        let mut view = signal.subscribe();

        let writer = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            writer.set(true);
        });

        let value = view.wait_for(|ready| *ready).await;
        assert_eq!(value, Ok(true));
    }

    #[test]
    fn wait_for_stays_pending_until_match() {
        let signal = Signal::new(0_u32);
        let mut view = signal.subscribe();
        let mut waiting = tokio_test::task::spawn(async move { view.wait_for(|n| *n >= 2).await });

        tokio_test::assert_pending!(waiting.poll());

        signal.set(1);
        assert!(waiting.is_woken());
        tokio_test::assert_pending!(waiting.poll());

        signal.set(2);
        tokio_test::assert_ready_eq!(waiting.poll(), Ok(2));
    }

    #[tokio::test]
    async fn read_signal_reports_closed() {
        let signal = Signal::new(1);
        let mut view = signal.subscribe();
        drop(signal);

        assert_eq!(view.changed().await, Err(SignalClosed));
        assert_eq!(view.get(), 1);
    }

    proptest! {
        #[test]
        fn computed_matches_direct_derivation(values in proptest::collection::vec(-1000_i64..1000, 1..20)) {
            let signal = Signal::new(0_i64);
            let doubled = signal.map(|n| n * 2);
            for value in values {
                signal.set(value);
                prop_assert_eq!(doubled.get(), value * 2);
            }
        }
    }
}
