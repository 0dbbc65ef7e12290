//! # Taskboard Testing
//!
//! Testing utilities and helpers for the Taskboard state layer.
//!
//! This crate provides:
//! - Deterministic clocks for the `Clock` environment trait
//! - A Given-When-Then harness for reducers ([`ReducerTest`])
//! - Effect assertions
//! - Helpers for observing store action broadcasts in async tests
//!
//! ## Example
//!
//! ```ignore
//! use taskboard_testing::{test_clock, ReducerTest, assertions};
//!
//! ReducerTest::new(NotificationReducer)
//!     .with_env(NotificationEnvironment::new(Arc::new(test_clock()), timeouts))
//!     .given_state(NotificationState::default())
//!     .when_action(NotificationAction::Push { id, notice: Notice::info("Saved") })
//!     .then_state(|state| assert_eq!(state.items.len(), 1))
//!     .then_effects(assertions::assert_has_cancellable_effect)
//!     .run();
//! ```

use chrono::{DateTime, Utc};
use taskboard_core::environment::Clock;


pub use reducer_test::{assertions, ReducerTest};

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use taskboard_testing::mocks::FixedClock;
    /// use taskboard_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to
    ///
    /// Useful when a test needs distinct but predictable timestamps, for
    /// example to check that newer tasks carry a later `updated_at`.
    #[derive(Debug)]
    pub struct ManualClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Create a manual clock starting at `time`
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Move the clock forward
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// The instant every test clock starts at (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_instant() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_instant())
    }
}

/// Test helpers and utilities
pub mod helpers {
    use std::time::Duration;
    use tokio::sync::broadcast;

    /// Install a test-friendly tracing subscriber
    ///
    /// Output goes through the test harness capture. The filter follows
    /// `RUST_LOG` and defaults to `debug`. Safe to call from every test.
    pub fn init_test_tracing() {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    }

    /// Wait for the next broadcast action matching `predicate`
    ///
    /// Returns `None` if nothing matched before `timeout` or the channel closed.
    /// Lagged receivers keep waiting.
    pub async fn next_matching<A, F>(
        rx: &mut broadcast::Receiver<A>,
        predicate: F,
        timeout: Duration,
    ) -> Option<A>
    where
        A: Clone,
        F: Fn(&A) -> bool,
    {
        tokio::time::timeout(timeout, async {
            loop {
                match rx.recv().await {
                    Ok(action) if predicate(&action) => return Some(action),
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {},
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .await
        .ok()
        .flatten()
    }

    /// Drain every action already waiting in the receiver
    pub fn drain<A: Clone>(rx: &mut broadcast::Receiver<A>) -> Vec<A> {
        let mut actions = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(action) => actions.push(action),
                Err(broadcast::error::TryRecvError::Lagged(_)) => {},
                Err(_) => return actions,
            }
        }
    }
}

// Re-export commonly used items
pub use mocks::{test_clock, FixedClock, ManualClock};

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now().to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(mocks::test_instant());
        let before = clock.now();
        clock.advance(chrono::Duration::seconds(90));
        assert_eq!(clock.now() - before, chrono::Duration::seconds(90));
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_matching_skips_and_times_out() {
        let (tx, mut rx) = tokio::sync::broadcast::channel(8);
        let _ = tx.send(1);
        let _ = tx.send(2);
        let _ = tx.send(3);

        let found = helpers::next_matching(&mut rx, |n| n % 2 == 0, Duration::from_secs(1)).await;
        assert_eq!(found, Some(2));

        let missing = helpers::next_matching(&mut rx, |n| *n > 10, Duration::from_secs(1)).await;
        assert_eq!(missing, None);
    }

    #[test]
    fn test_drain_collects_pending() {
        let (tx, mut rx) = tokio::sync::broadcast::channel(8);
        let _ = tx.send("a");
        let _ = tx.send("b");
        assert_eq!(helpers::drain(&mut rx), vec!["a", "b"]);
        assert!(helpers::drain(&mut rx).is_empty());
    }
}
