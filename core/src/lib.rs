//! # Taskboard Core
//!
//! Core traits and types for the Taskboard state layer.
//!
//! Every store in the application is built from the same small set of parts:
//!
//! - **State**: the collection a store owns exclusively
//! - **Action**: all inputs to a reducer (commands, delayed commits, reply events)
//! - **Reducer**: `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: a description of work for the runtime (delays, futures, cancellation)
//! - **Environment**: injected dependencies (clock, storage, notifier)
//! - **Signals**: read-only observable views and memoized derived values
//!
//! ## Example
//!
//! ```ignore
//! use taskboard_core::*;
//!
//! impl Reducer for LoadingReducer {
//!     type State = u32;
//!     type Action = LoadingAction;
//!     type Environment = ();
//!
//!     fn reduce(&self, count: &mut u32, action: LoadingAction, _: &()) -> SmallVec<[Effect<LoadingAction>; 4]> {
//!         match action {
//!             LoadingAction::Start => *count += 1,
//!             LoadingAction::Finish => *count = count.saturating_sub(1),
//!         }
//!         SmallVec::new()
//!     }
//! }
//! ```

pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{smallvec, SmallVec};

/// Declarative macros for building effects
pub mod effect_macros;

/// Observable values and memoized derived values
pub mod observable;

/// The reducer trait
///
/// A reducer owns every decision a store makes. It mutates the state it is
/// handed and returns the work the runtime should do next; it never sleeps,
/// spawns or touches storage itself.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// Business logic of one store
    ///
    /// `State` is the collection the store owns, `Action` every input it
    /// accepts (commands, delayed commits, replies) and `Environment` the
    /// injected clock, latency table and collaborators.
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for TaskReducer {
    ///     type State = TaskState;
    ///     type Action = TaskAction;
    ///     type Environment = TaskEnvironment;
    ///
    ///     fn reduce(&self, state: &mut TaskState, action: TaskAction, env: &TaskEnvironment)
    ///         -> SmallVec<[Effect<TaskAction>; 4]>
    ///     {
    ///         match action {
    ///             TaskAction::DeleteTask { request_id, id } => smallvec![delay! {
    ///                 duration: env.latency.delete,
    ///                 action: TaskAction::CommitDelete { request_id, id },
    ///             }],
    ///             _ => SmallVec::new(),
    ///         }
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// Collection owned by the store
        type State;

        /// Every input the store accepts
        type Action;

        /// Injected dependencies
        type Environment;

        /// Applies `action` to `state` and describes the follow-up work
        ///
        /// Must be deterministic for a given state, action and environment.
        /// Invalid input is answered through the returned effects, never by
        /// panicking.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect descriptions
///
/// An effect is data: the runtime decides when and how to run it, which is
/// what makes reducers testable without a runtime.
pub mod effect {
    use std::borrow::Cow;
    use std::fmt;
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    /// Identifier for a cancellable effect
    ///
    /// Starting a cancellable effect with an id that is already in flight
    /// cancels the older effect.
    #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct EffectId(Cow<'static, str>);

    impl EffectId {
        /// Creates an effect id from any string
        #[must_use]
        pub fn new(id: impl Into<Cow<'static, str>>) -> Self {
            Self(id.into())
        }

        /// Returns the id as a string slice
        #[must_use]
        pub fn as_str(&self) -> &str {
            &self.0
        }
    }

    impl fmt::Display for EffectId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    /// Work a reducer asks the runtime to perform
    ///
    /// Any action an effect yields is fed back into the same store.
    pub enum Effect<Action> {
        /// Nothing to do
        None,

        /// Start every effect at once
        Parallel(Vec<Effect<Action>>),

        /// Run each effect to completion before starting the next
        Sequential(Vec<Effect<Action>>),

        /// Dispatch `action` once `duration` has elapsed
        ///
        /// Used for simulated latency and for expiry timers.
        Delay {
            /// Time to wait
            duration: Duration,
            /// Action dispatched afterwards
            action: Box<Action>,
        },

        /// Async work that may yield one follow-up action
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),

        /// Run an effect that can later be stopped with [`Effect::Cancel`]
        Cancellable {
            /// Key used to cancel the effect
            id: EffectId,
            /// The effect to run
            effect: Box<Effect<Action>>,
        },

        /// Stop an in-flight cancellable effect (no-op when nothing matches)
        Cancel(EffectId),
    }

    impl<Action: fmt::Debug> fmt::Debug for Effect<Action> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Self::None => f.write_str("None"),
                Self::Parallel(effects) => f.debug_tuple("Parallel").field(effects).finish(),
                Self::Sequential(effects) => f.debug_tuple("Sequential").field(effects).finish(),
                Self::Delay { duration, action } => {
                    f.debug_struct("Delay").field("duration", duration).field("action", action).finish()
                },
                // futures are opaque
                Self::Future(_) => f.write_str("Future(..)"),
                Self::Cancellable { id, effect } => {
                    f.debug_struct("Cancellable").field("id", id).field("effect", effect).finish()
                },
                Self::Cancel(id) => f.debug_tuple("Cancel").field(id).finish(),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Runs `effects` concurrently
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Runs `effects` one after another
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Sequential(effects)
        }

        /// Registers this effect under `id` so it can be cancelled
        #[must_use]
        pub fn cancellable(self, id: EffectId) -> Effect<Action> {
            Effect::Cancellable {
                id,
                effect: Box::new(self),
            }
        }

        /// Returns true for [`Effect::None`]
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Effect::None)
        }
    }
}

/// Injected dependencies shared by every store
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Source of "now" for timestamps
    ///
    /// Stores never call `Utc::now()` directly so tests can pin time with a
    /// fixed or manual clock.
    pub trait Clock: Send + Sync {
        /// Current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
