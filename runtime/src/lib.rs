//! # Taskboard Runtime
//!
//! Runtime implementation for the Taskboard state layer.
//!
//! This crate provides the [`Store`] that coordinates reducer execution and
//! effect handling for every domain store (tasks, session, notifications).
//!
//! ## Core Components
//!
//! - **Store**: owns the state signal, runs the reducer, executes effects
//! - **Effect Executor**: runs effect descriptions and feeds actions back to the reducer
//! - **Cancellation registry**: keyed in-flight effects that can be aborted with `Effect::Cancel`
//!
//! ## Example
//!
//! ```ignore
//! use taskboard_runtime::Store;
//!
//! let store = Store::new(TaskState::default(), TaskReducer, environment);
//!
//! // Send an action
//! store.send(TaskAction::ListTasks { request_id }).await?;
//!
//! // Read state
//! let count = store.state(|s| s.tasks.len());
//!
//! // Observe state
//! let stats = store.computed(TaskStats::from_state);
//! ```

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use taskboard_core::effect::{Effect, EffectId};
use taskboard_core::reducer::Reducer;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};

/// Store errors
pub mod error {
    use thiserror::Error;

    /// Failures of the store runtime itself, never of domain validation
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// `send` was called after `shutdown`
        #[error("store is shutting down")]
        ShutdownInProgress,

        /// Effects were still running when the shutdown budget ran out
        #[error("shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// No matching reply arrived in time
        #[error("timed out waiting for a reply action")]
        Timeout,

        /// The action broadcast closed while waiting for a reply
        #[error("action broadcast closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;

/// Completion tracker for the effects started by one [`Store::send()`]
///
/// Only effects returned for that action are counted. Actions they feed
/// back get handles of their own, which nobody holds.
///
/// ```ignore
/// let mut handle = store.send(NotificationAction::Clear).await?;
/// handle.wait_with_timeout(Duration::from_secs(1)).await?;
/// ```
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    fn new() -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };
        let tracking = EffectTracking {
            counter,
            notifier: Arc::new(tx),
        };

        (handle, tracking)
    }

    /// Handle with nothing to wait for
    #[must_use]
    pub fn completed() -> Self {
        let (handle, _tracking) = Self::new();
        handle
    }

    /// Number of effects from this action still running
    #[must_use]
    pub fn pending(&self) -> usize {
        self.effects.load(Ordering::SeqCst)
    }

    /// Resolves once every tracked effect finished or was cancelled
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                break;
            }
        }
    }

    /// [`EffectHandle::wait`] bounded by `timeout`
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if effects are still running afterwards.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.pending())
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: Arc<watch::Sender<()>>,
}

impl EffectTracking {
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    // wakes waiters when the last effect finishes
    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notifier.send_replace(());
        }
    }
}

/// Releases an effect's slot on completion, panic or abort
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Releases a store-wide pending-effect slot
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A cancellable effect currently running
struct InFlight {
    generation: u64,
    abort: AbortHandle,
}

type Cancellations = Arc<Mutex<HashMap<EffectId, InFlight>>>;

fn lock(cancellations: &Cancellations) -> MutexGuard<'_, HashMap<EffectId, InFlight>> {
    cancellations.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The store
pub mod store {
    use super::{
        lock, Arc, AtomicBool, AtomicCounterGuard, AtomicU64, AtomicUsize, BoxFuture,
        Cancellations, DecrementGuard, Duration, Effect, EffectHandle, EffectId, EffectTracking,
        InFlight, JoinHandle, Ordering, Reducer, StoreError,
    };
    use std::collections::HashMap;
    use std::sync::Mutex;
    use taskboard_core::observable::{Computed, ReadSignal, Signal};
    use tokio::sync::broadcast;

    /// Default capacity of the action broadcast channel
    pub const DEFAULT_BROADCAST_CAPACITY: usize = 64;

    const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(10);

    /// Runs one reducer over one piece of state
    ///
    /// State lives in a [`Signal`], so readers and derived views see every
    /// reduction. Effects run on spawned tasks and any action they yield is
    /// reduced and then broadcast to [`Store::subscribe_actions`] receivers.
    /// Cancellable effects are tracked by [`EffectId`].
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Signal<S>,
        reducer: R,
        environment: E,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
        /// Actions produced by effects, broadcast after the reducer applied them.
        ///
        /// Request/response callers subscribe here to learn the outcome of a command.
        action_broadcast: broadcast::Sender<A>,
        cancellations: Cancellations,
        generations: Arc<AtomicU64>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Store with the default broadcast capacity
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_broadcast_capacity(initial_state, reducer, environment, DEFAULT_BROADCAST_CAPACITY)
        }

        /// Store whose action broadcast keeps `capacity` actions
        ///
        /// Slower receivers see `Lagged` and lose the oldest actions.
        #[must_use]
        pub fn with_broadcast_capacity(
            initial_state: S,
            reducer: R,
            environment: E,
            capacity: usize,
        ) -> Self {
            let (action_broadcast, _) = broadcast::channel(capacity.max(1));

            Self {
                state: Signal::new(initial_state),
                reducer,
                environment,
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                action_broadcast,
                cancellations: Arc::new(Mutex::new(HashMap::new())),
                generations: Arc::new(AtomicU64::new(0)),
            }
        }

        /// Reduces `action` and starts the effects it returns
        ///
        /// Returns as soon as the effects are spawned. Reductions are
        /// serialized by the state signal's write lock, and observers are
        /// notified after each one.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] after [`Store::shutdown`].
        ///
        /// # Panics
        ///
        /// A panicking reducer panics the caller.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError>
        where
            R: Clone,
            E: Clone,
        {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                return Err(StoreError::ShutdownInProgress);
            }

            metrics::counter!("store.commands.total").increment(1);

            let (handle, tracking) = EffectHandle::new();
            let mut effects = taskboard_core::SmallVec::<[Effect<A>; 4]>::new();
            {
                let span = tracing::debug_span!("reducer_execution");
                let _enter = span.enter();
                self.state.modify(|state| {
                    effects = self.reducer.reduce(state, action, &self.environment);
                });
            }
            tracing::trace!("Reducer completed, returned {} effects", effects.len());

            for effect in effects {
                self.execute_effect(effect, &tracking);
            }

            Ok(handle)
        }

        /// Sends `action` and returns the first fed-back action matching `predicate`
        ///
        /// The subscription is taken before sending so an immediate reply is
        /// not lost. Concurrent callers tell their replies apart by request id.
        ///
        /// # Errors
        ///
        /// [`StoreError::Timeout`] when nothing matched within `timeout`,
        /// [`StoreError::ChannelClosed`] if the broadcast closed, and
        /// [`StoreError::ShutdownInProgress`] from `send`.
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            R: Clone,
            E: Clone,
            F: Fn(&A) -> bool,
        {
            let mut rx = self.action_broadcast.subscribe();

            self.send(action).await?;

            tokio::time::timeout(timeout, async {
                loop {
                    match rx.recv().await {
                        Ok(action) if predicate(&action) => return Ok(action),
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Reply waiter lagged behind the action broadcast");
                        },
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(StoreError::ChannelClosed);
                        },
                    }
                }
            })
            .await
            .map_err(|_| StoreError::Timeout)?
        }

        /// Receiver of every action fed back by effects (not of sent actions)
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Reads the current state through `f`
        pub fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            self.state.with(f)
        }

        /// Read-only observable view of the state
        #[must_use]
        pub fn observe(&self) -> ReadSignal<S> {
            self.state.subscribe()
        }

        /// Derived value over the state, recomputed only after the state changed
        #[must_use]
        pub fn computed<U, F>(&self, derive: F) -> Computed<S, U>
        where
            F: Fn(&S) -> U + Send + Sync + 'static,
        {
            self.state.map(derive)
        }

        /// Returns true once [`Store::shutdown`] has been called
        #[must_use]
        pub fn is_shutting_down(&self) -> bool {
            self.shutdown.load(Ordering::Acquire)
        }

        /// Number of effects currently running across all actions
        #[must_use]
        pub fn pending_effects(&self) -> usize {
            self.pending_effects.load(Ordering::Acquire)
        }

        /// Number of cancellable effects currently registered
        #[must_use]
        pub fn in_flight_cancellables(&self) -> usize {
            lock(&self.cancellations).len()
        }

        /// Stops accepting actions, aborts every cancellable effect and waits
        /// up to `timeout` for the rest
        ///
        /// Aborting cancellables is what tears down pending expiry timers.
        /// Repeated calls succeed once nothing is running.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] with the number of effects
        /// still running when `timeout` elapses.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            metrics::counter!("store.shutdown.initiated").increment(1);

            self.shutdown.store(true, Ordering::Release);

            let aborted: Vec<(EffectId, InFlight)> = lock(&self.cancellations).drain().collect();
            for (id, in_flight) in aborted {
                in_flight.abort.abort();
                tracing::debug!(effect_id = %id, "Cancelled effect on shutdown");
                metrics::counter!("store.effects.cancelled").increment(1);
            }

            let deadline = tokio::time::Instant::now() + timeout;
            let mut pending = self.pending_effects();
            while pending > 0 {
                if tokio::time::Instant::now() >= deadline {
                    tracing::error!(pending_effects = pending, "Shutdown timed out");
                    metrics::counter!("store.shutdown.timeout").increment(1);
                    return Err(StoreError::ShutdownTimeout(pending));
                }
                tokio::time::sleep(SHUTDOWN_POLL_INTERVAL).await;
                pending = self.pending_effects();
            }

            tracing::info!("Store shut down");
            metrics::counter!("store.shutdown.completed").increment(1);
            Ok(())
        }

        /// Start an effect returned by the reducer
        ///
        /// `None` and `Cancel` are handled synchronously. `Parallel` fans out
        /// into one task per child. Everything else runs in a spawned task
        /// guarded by [`DecrementGuard`], so counters are released even when
        /// the effect panics or is aborted.
        #[tracing::instrument(skip(self, effect, tracking), name = "execute_effect")]
        fn execute_effect(&self, effect: Effect<A>, tracking: &EffectTracking)
        where
            R: Clone,
            E: Clone,
        {
            match effect {
                Effect::None => {
                    tracing::trace!("Executing Effect::None (no-op)");
                    metrics::counter!("store.effects.executed", "type" => "none").increment(1);
                },
                Effect::Cancel(id) => {
                    metrics::counter!("store.effects.executed", "type" => "cancel").increment(1);
                    self.cancel(&id);
                },
                Effect::Parallel(effects) => {
                    tracing::trace!("Executing Effect::Parallel with {} effects", effects.len());
                    metrics::counter!("store.effects.executed", "type" => "parallel").increment(1);
                    for effect in effects {
                        self.execute_effect(effect, tracking);
                    }
                },
                Effect::Cancellable { id, effect } => {
                    drop(self.spawn_cancellable(id, *effect, tracking));
                },
                other => {
                    let label = match &other {
                        Effect::Future(_) => "future",
                        Effect::Delay { .. } => "delay",
                        _ => "sequential",
                    };
                    metrics::counter!("store.effects.executed", "type" => label).increment(1);

                    let (guard, pending_guard) = self.track(tracking);
                    let run = self.run(other, tracking.clone());
                    tokio::spawn(async move {
                        let _guard = guard;
                        let _pending_guard = pending_guard;
                        run.await;
                    });
                },
            }
        }

        /// Register a new running effect with both the per-action and the global counter
        fn track(&self, tracking: &EffectTracking) -> (DecrementGuard, AtomicCounterGuard) {
            tracking.increment();
            self.pending_effects.fetch_add(1, Ordering::SeqCst);
            (
                DecrementGuard(tracking.clone()),
                AtomicCounterGuard(Arc::clone(&self.pending_effects)),
            )
        }

        /// Spawn `effect` under `id`, aborting any older effect with the same id
        fn spawn_cancellable(&self, id: EffectId, effect: Effect<A>, tracking: &EffectTracking) -> JoinHandle<()>
        where
            R: Clone,
            E: Clone,
        {
            tracing::trace!(effect_id = %id, "Executing Effect::Cancellable");
            metrics::counter!("store.effects.executed", "type" => "cancellable").increment(1);

            let generation = self.generations.fetch_add(1, Ordering::Relaxed);
            let (guard, pending_guard) = self.track(tracking);
            let run = self.run(effect, tracking.clone());
            let store = self.clone();
            let key = id.clone();

            // The registry lock is held across spawn so the task cannot finish
            // and deregister before it has been registered.
            let mut registry = lock(&self.cancellations);
            let task = tokio::spawn(async move {
                let _guard = guard;
                let _pending_guard = pending_guard;
                run.await;
                store.finish_cancellable(&key, generation);
            });

            let previous = registry.insert(
                id,
                InFlight {
                    generation,
                    abort: task.abort_handle(),
                },
            );
            drop(registry);

            if let Some(previous) = previous {
                previous.abort.abort();
                tracing::debug!("Replaced in-flight effect with the same id");
                metrics::counter!("store.effects.cancelled").increment(1);
            }

            task
        }

        /// Abort the in-flight effect registered under `id`, if any
        fn cancel(&self, id: &EffectId) {
            let removed = lock(&self.cancellations).remove(id);
            if let Some(in_flight) = removed {
                in_flight.abort.abort();
                tracing::debug!(effect_id = %id, "Cancelled effect");
                metrics::counter!("store.effects.cancelled").increment(1);
            } else {
                tracing::trace!(effect_id = %id, "No in-flight effect to cancel");
            }
        }

        /// Deregister a finished cancellable effect unless a newer one took its id
        fn finish_cancellable(&self, id: &EffectId, generation: u64) {
            let mut registry = lock(&self.cancellations);
            if registry.get(id).is_some_and(|entry| entry.generation == generation) {
                registry.remove(id);
            }
        }

        /// Run an effect to completion inside the current task
        fn run(&self, effect: Effect<A>, tracking: EffectTracking) -> BoxFuture<'static, ()>
        where
            R: Clone,
            E: Clone,
        {
            let store = self.clone();
            Box::pin(async move {
                match effect {
                    Effect::None => {},
                    Effect::Future(fut) => {
                        if let Some(action) = fut.await {
                            tracing::trace!("Effect::Future produced an action, sending to store");
                            store.feed_back(action).await;
                        } else {
                            tracing::trace!("Effect::Future completed with no action");
                        }
                    },
                    Effect::Delay { duration, action } => {
                        tokio::time::sleep(duration).await;
                        tracing::trace!("Effect::Delay completed, sending action");
                        store.feed_back(*action).await;
                    },
                    Effect::Parallel(effects) => {
                        let runs = effects.into_iter().map(|effect| store.run(effect, tracking.clone()));
                        futures::future::join_all(runs).await;
                    },
                    Effect::Sequential(effects) => {
                        let effect_count = effects.len();
                        for (idx, effect) in effects.into_iter().enumerate() {
                            tracing::trace!("Executing sequential effect {} of {}", idx + 1, effect_count);
                            store.run(effect, tracking.clone()).await;
                        }
                    },
                    Effect::Cancellable { id, effect } => {
                        let task = store.spawn_cancellable(id, *effect, &tracking);
                        if let Err(error) = task.await {
                            tracing::debug!(%error, "Nested cancellable effect did not complete");
                        }
                    },
                    Effect::Cancel(id) => store.cancel(&id),
                }
            })
        }

        /// Apply an effect-produced action, then broadcast it to observers
        async fn feed_back(&self, action: A)
        where
            R: Clone,
            E: Clone,
        {
            if let Err(error) = self.send(action.clone()).await {
                tracing::debug!(%error, "Action produced by effect was not applied");
            }
            let _ = self.action_broadcast.send(action);
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone,
        E: Clone,
    {
        fn clone(&self) -> Self {
            Self {
                state: self.state.clone(),
                reducer: self.reducer.clone(),
                environment: self.environment.clone(),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
                action_broadcast: self.action_broadcast.clone(),
                cancellations: Arc::clone(&self.cancellations),
                generations: Arc::clone(&self.generations),
            }
        }
    }
}

// Re-export for convenience
pub use store::Store;

#[cfg(test)]
mod tests {
    use super::*;
    use taskboard_core::{smallvec, SmallVec};

    #[derive(Debug, Clone)]
    struct TestState {
        value: i32,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum TestAction {
        Increment,
        Decrement,
        NoOp,
        ProduceEffect,
        ProduceDelayedAction,
        ProduceParallelEffects,
        ProduceSequentialEffects,
        ProducePanickingEffect,
        ScheduleTimer { key: &'static str, millis: u64 },
        CancelTimer { key: &'static str },
        TimerFired,
    }

    #[derive(Debug, Clone)]
    struct TestEnv;

    #[derive(Debug, Clone)]
    struct TestReducer;

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = TestEnv;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                TestAction::Increment | TestAction::TimerFired => {
                    state.value += 1;
                    smallvec![Effect::None]
                },
                TestAction::Decrement => {
                    state.value -= 1;
                    smallvec![Effect::None]
                },
                TestAction::NoOp => smallvec![Effect::None],
                TestAction::ProduceEffect => {
                    smallvec![Effect::Future(Box::pin(async { Some(TestAction::Increment) }))]
                },
                TestAction::ProduceDelayedAction => smallvec![Effect::Delay {
                    duration: Duration::from_millis(10),
                    action: Box::new(TestAction::Increment),
                }],
                TestAction::ProduceParallelEffects => smallvec![Effect::Parallel(vec![
                    Effect::Future(Box::pin(async { Some(TestAction::Increment) })),
                    Effect::Future(Box::pin(async { Some(TestAction::Increment) })),
                    Effect::Future(Box::pin(async { Some(TestAction::Increment) })),
                ])],
                TestAction::ProduceSequentialEffects => smallvec![Effect::Sequential(vec![
                    Effect::Future(Box::pin(async { Some(TestAction::Increment) })),
                    Effect::Future(Box::pin(async { Some(TestAction::Increment) })),
                    Effect::Future(Box::pin(async { Some(TestAction::Decrement) })),
                ])],
                TestAction::ProducePanickingEffect => {
                    #[allow(clippy::panic)] // Intentional panic for testing error handling
                    {
                        smallvec![Effect::Future(Box::pin(async {
                            panic!("Intentional panic in effect for testing");
                        }))]
                    }
                },
                TestAction::ScheduleTimer { key, millis } => smallvec![Effect::Delay {
                    duration: Duration::from_millis(millis),
                    action: Box::new(TestAction::TimerFired),
                }
                .cancellable(EffectId::new(key))],
                TestAction::CancelTimer { key } => smallvec![Effect::Cancel(EffectId::new(key))],
            }
        }
    }

    fn store() -> Store<TestState, TestAction, TestEnv, TestReducer> {
        Store::new(TestState { value: 0 }, TestReducer, TestEnv)
    }

    #[tokio::test]
    async fn test_store_creation() {
        let store = store();
        assert_eq!(store.state(|s| s.value), 0);
    }

    #[tokio::test]
    async fn test_multiple_actions() {
        let store = store();

        let _ = store.send(TestAction::Increment).await;
        let _ = store.send(TestAction::Increment).await;
        let _ = store.send(TestAction::Decrement).await;
        let _ = store.send(TestAction::NoOp).await;

        assert_eq!(store.state(|s| s.value), 1);
    }

    #[tokio::test]
    async fn test_effect_future() -> Result<(), StoreError> {
        let store = store();

        let mut handle = store.send(TestAction::ProduceEffect).await?;
        handle.wait().await;

        assert_eq!(store.state(|s| s.value), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_effect_delay() -> Result<(), StoreError> {
        let store = store();

        let mut handle = store.send(TestAction::ProduceDelayedAction).await?;
        assert_eq!(store.state(|s| s.value), 0);
        assert_eq!(handle.pending(), 1);

        handle.wait().await;
        assert_eq!(store.state(|s| s.value), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_effect_parallel() -> Result<(), StoreError> {
        let store = store();

        let mut handle = store.send(TestAction::ProduceParallelEffects).await?;
        handle.wait_with_timeout(Duration::from_secs(1)).await?;

        assert_eq!(store.state(|s| s.value), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_effect_sequential() -> Result<(), StoreError> {
        let store = store();

        let mut handle = store.send(TestAction::ProduceSequentialEffects).await?;
        handle.wait_with_timeout(Duration::from_secs(1)).await?;

        // +1 +1 -1
        assert_eq!(store.state(|s| s.value), 1);
        Ok(())
    }

    #[tokio::test]
    #[allow(clippy::panic)]
    async fn test_concurrent_sends() {
        let store = store();

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    let _ = store.send(TestAction::Increment).await;
                })
            })
            .collect();

        for handle in handles {
            if let Err(e) = handle.await {
                panic!("concurrent send task panicked: {e}");
            }
        }

        assert_eq!(store.state(|s| s.value), 10);
    }

    #[tokio::test]
    async fn test_store_clone_shares_state() {
        let store1 = store();
        let store2 = store1.clone();

        let _ = store1.send(TestAction::Increment).await;
        assert_eq!(store2.state(|s| s.value), 1);
    }

    #[tokio::test]
    async fn test_effect_panic_isolation() -> Result<(), StoreError> {
        let store = store();

        let mut handle = store.send(TestAction::ProducePanickingEffect).await?;
        handle.wait().await;
        assert_eq!(store.pending_effects(), 0);

        let _ = store.send(TestAction::Increment).await;
        assert_eq!(store.state(|s| s.value), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_observe_sees_every_reduction() -> Result<(), StoreError> {
        let store = store();
        let mut view = store.observe();
        let doubled = store.computed(|s| s.value * 2);

        store.send(TestAction::Increment).await?;
        assert!(view.has_changed());
        assert_eq!(view.wait_for(|s| s.value == 1).await.map(|s| s.value), Ok(1));
        assert_eq!(doubled.get(), 2);
        assert_eq!(doubled.get(), 2);
        assert_eq!(doubled.recomputations(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_send_and_wait_for() -> Result<(), StoreError> {
        let store = store();

        let reply = store
            .send_and_wait_for(
                TestAction::ProduceEffect,
                |a| matches!(a, TestAction::Increment),
                Duration::from_secs(1),
            )
            .await?;

        assert_eq!(reply, TestAction::Increment);
        // Broadcast happens after the reducer applied the action
        assert_eq!(store.state(|s| s.value), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_and_wait_for_timeout() {
        let store = store();

        let result = store
            .send_and_wait_for(TestAction::NoOp, |_| true, Duration::from_millis(100))
            .await;

        assert_eq!(result, Err(StoreError::Timeout));
    }

    mod cancellation_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_cancel_prevents_delayed_action() -> Result<(), StoreError> {
            let store = store();
            let mut actions = store.subscribe_actions();

            let mut timer = store
                .send(TestAction::ScheduleTimer { key: "expiry-1", millis: 4_000 })
                .await?;
            assert_eq!(store.in_flight_cancellables(), 1);

            tokio::time::sleep(Duration::from_millis(1_000)).await;
            store.send(TestAction::CancelTimer { key: "expiry-1" }).await?;
            timer.wait().await;

            tokio::time::sleep(Duration::from_millis(5_000)).await;
            assert_eq!(store.state(|s| s.value), 0);
            assert_eq!(store.in_flight_cancellables(), 0);
            assert!(actions.try_recv().is_err());
            Ok(())
        }

        #[tokio::test(start_paused = true)]
        async fn test_uncancelled_timer_fires_and_deregisters() -> Result<(), StoreError> {
            let store = store();

            let mut timer = store
                .send(TestAction::ScheduleTimer { key: "expiry-2", millis: 4_000 })
                .await?;

            tokio::time::sleep(Duration::from_millis(3_999)).await;
            assert_eq!(store.state(|s| s.value), 0);

            timer.wait().await;
            assert_eq!(store.state(|s| s.value), 1);
            assert_eq!(store.in_flight_cancellables(), 0);
            Ok(())
        }

        #[tokio::test(start_paused = true)]
        async fn test_same_id_replaces_older_effect() -> Result<(), StoreError> {
            let store = store();

            store.send(TestAction::ScheduleTimer { key: "dup", millis: 100 }).await?;
            let mut second = store.send(TestAction::ScheduleTimer { key: "dup", millis: 200 }).await?;
            assert_eq!(store.in_flight_cancellables(), 1);

            second.wait().await;
            tokio::time::sleep(Duration::from_millis(500)).await;

            assert_eq!(store.state(|s| s.value), 1);
            assert_eq!(store.in_flight_cancellables(), 0);
            Ok(())
        }

        #[tokio::test]
        async fn test_cancel_unknown_id_is_noop() -> Result<(), StoreError> {
            let store = store();
            let handle = store.send(TestAction::CancelTimer { key: "nothing" }).await?;
            assert_eq!(handle.pending(), 0);
            Ok(())
        }
    }

    mod shutdown_tests {
        use super::*;

        #[tokio::test]
        async fn test_shutdown_with_no_pending_effects() {
            let store = store();
            assert!(store.shutdown(Duration::from_secs(5)).await.is_ok());
            assert!(store.is_shutting_down());
        }

        #[tokio::test]
        async fn test_shutdown_rejects_new_actions() -> Result<(), StoreError> {
            let store = store();
            store.shutdown(Duration::from_secs(1)).await?;

            let result = store.send(TestAction::Increment).await;
            assert!(matches!(result, Err(StoreError::ShutdownInProgress)));
            Ok(())
        }

        #[tokio::test(start_paused = true)]
        async fn test_shutdown_waits_for_effects() -> Result<(), StoreError> {
            let store = store();
            store.send(TestAction::ProduceDelayedAction).await?;

            store.shutdown(Duration::from_secs(5)).await?;
            assert_eq!(store.pending_effects(), 0);
            Ok(())
        }

        #[tokio::test(start_paused = true)]
        async fn test_shutdown_aborts_pending_timers() -> Result<(), StoreError> {
            let store = store();
            store
                .send(TestAction::ScheduleTimer { key: "long", millis: 60_000 })
                .await?;

            store.shutdown(Duration::from_secs(1)).await?;
            assert_eq!(store.in_flight_cancellables(), 0);
            assert_eq!(store.state(|s| s.value), 0);
            Ok(())
        }

        #[tokio::test(start_paused = true)]
        async fn test_shutdown_timeout() -> Result<(), StoreError> {
            #[derive(Clone)]
            struct LongRunningReducer;

            impl Reducer for LongRunningReducer {
                type State = TestState;
                type Action = TestAction;
                type Environment = TestEnv;

                fn reduce(
                    &self,
                    _state: &mut Self::State,
                    _action: Self::Action,
                    _env: &Self::Environment,
                ) -> SmallVec<[Effect<Self::Action>; 4]> {
                    smallvec![Effect::Future(Box::pin(async {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        None
                    }))]
                }
            }

            let store = Store::new(TestState { value: 0 }, LongRunningReducer, TestEnv);
            store.send(TestAction::NoOp).await?;

            let result = store.shutdown(Duration::from_millis(50)).await;
            assert_eq!(result, Err(StoreError::ShutdownTimeout(1)));
            Ok(())
        }

        #[tokio::test]
        async fn test_shutdown_idempotent() {
            let store = store();
            assert!(store.shutdown(Duration::from_secs(1)).await.is_ok());
            assert!(store.shutdown(Duration::from_secs(1)).await.is_ok());
        }
    }
}
