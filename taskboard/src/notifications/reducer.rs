//! Reducer logic for the notification store.
//!
//! Every pushed notification schedules one cancellable expiry timer keyed by
//! its id. Dismissing or clearing cancels the timer; an expiry that arrives
//! for a notification that is already gone changes nothing.

use super::types::{Notification, NotificationAction, NotificationId, NotificationState, Severity};
use crate::config::NotificationTimeouts;
use std::sync::Arc;
use taskboard_core::effect::{Effect, EffectId};
use taskboard_core::environment::Clock;
use taskboard_core::reducer::Reducer;
use taskboard_core::{cancellable, delay, smallvec, SmallVec};

/// Environment dependencies for the notification reducer
#[derive(Clone)]
pub struct NotificationEnvironment {
    /// Clock for `created_at` timestamps
    pub clock: Arc<dyn Clock>,
    /// Lifetime per severity
    pub timeouts: NotificationTimeouts,
}

impl NotificationEnvironment {
    /// Creates a new `NotificationEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, timeouts: NotificationTimeouts) -> Self {
        Self { clock, timeouts }
    }
}

/// Key of the expiry timer of one notification
#[must_use]
pub fn expiry_id(id: NotificationId) -> EffectId {
    EffectId::new(format!("notification-expiry-{id}"))
}

/// Reducer for the notification store
#[derive(Clone, Debug, Default)]
pub struct NotificationReducer;

impl NotificationReducer {
    /// Creates a new `NotificationReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn log(notification: &Notification) {
        let id = notification.id.get();
        let message = notification.message.as_str();
        match notification.severity {
            Severity::Error => tracing::error!(id, status = ?notification.status_code, url = ?notification.url, "{message}"),
            Severity::Warning => tracing::warn!(id, status = ?notification.status_code, url = ?notification.url, "{message}"),
            Severity::Info => tracing::info!(id, "{message}"),
        }
    }
}

impl Reducer for NotificationReducer {
    type State = NotificationState;
    type Action = NotificationAction;
    type Environment = NotificationEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            NotificationAction::Push { id, notice } => {
                if state.get(id).is_some() {
                    tracing::warn!(id = id.get(), "Ignoring notification with a duplicate id");
                    return SmallVec::new();
                }

                let notification = Notification::from_notice(id, notice, env.clock.now());
                Self::log(&notification);
                metrics::counter!("notifications.pushed", "severity" => notification.severity.as_str())
                    .increment(1);

                let ttl = env.timeouts.for_severity(notification.severity);
                state.items.insert(0, notification);

                smallvec![cancellable! {
                    id: expiry_id(id),
                    effect: delay! { duration: ttl, action: NotificationAction::Expire { id } }
                }]
            },

            NotificationAction::Dismiss { id } => {
                if state.remove(id) {
                    tracing::debug!(id = id.get(), "Notification dismissed");
                }
                smallvec![Effect::Cancel(expiry_id(id))]
            },

            NotificationAction::Expire { id } => {
                if state.remove(id) {
                    tracing::debug!(id = id.get(), "Notification expired");
                    metrics::counter!("notifications.expired").increment(1);
                }
                SmallVec::new()
            },

            NotificationAction::Clear => {
                let cancels: SmallVec<[Effect<Self::Action>; 4]> = state
                    .items
                    .drain(..)
                    .map(|notification| Effect::Cancel(expiry_id(notification.id)))
                    .collect();
                tracing::debug!(count = cancels.len(), "Notifications cleared");
                cancels
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::notifications::types::Notice;
    use std::time::Duration;
    use taskboard_testing::assertions::{assert_cancels, assert_has_cancellable_effect, assert_no_effects, find_delay};
    use taskboard_testing::{test_clock, ReducerTest};

    fn env() -> NotificationEnvironment {
        NotificationEnvironment::new(Arc::new(test_clock()), NotificationTimeouts::default())
    }

    fn push(id: u64, notice: Notice) -> NotificationAction {
        NotificationAction::Push {
            id: NotificationId::new(id),
            notice,
        }
    }

    #[test]
    fn push_prepends_and_schedules_expiry() {
        ReducerTest::new(NotificationReducer::new())
            .with_env(env())
            .given_state(NotificationState::default())
            .given_actions([push(1, Notice::info("first"))])
            .when_action(push(2, Notice::error("second")))
            .then_state(|state| {
                let ids: Vec<u64> = state.items.iter().map(|n| n.id.get()).collect();
                assert_eq!(ids, vec![2, 1]);
                assert_eq!(state.items[0].created_at, taskboard_testing::mocks::test_instant());
            })
            .then_effects(|effects| {
                assert_has_cancellable_effect(effects);
                let (duration, action) = find_delay(effects).expect("expiry delay");
                assert_eq!(duration, Duration::from_secs(8));
                assert_eq!(
                    action,
                    &NotificationAction::Expire {
                        id: NotificationId::new(2)
                    }
                );
            })
            .run();
    }

    #[test]
    fn expiry_depends_on_severity() {
        for (notice, secs) in [
            (Notice::error("e"), 8),
            (Notice::warning("w"), 6),
            (Notice::info("i"), 4),
        ] {
            ReducerTest::new(NotificationReducer::new())
                .with_env(env())
                .given_state(NotificationState::default())
                .when_action(push(1, notice))
                .then_effects(move |effects| {
                    let (duration, _) = find_delay(effects).expect("expiry delay");
                    assert_eq!(duration, Duration::from_secs(secs));
                })
                .run();
        }
    }

    #[test]
    fn dismiss_removes_and_cancels_timer() {
        ReducerTest::new(NotificationReducer::new())
            .with_env(env())
            .given_state(NotificationState::default())
            .given_actions([push(1, Notice::info("a")), push(2, Notice::info("b"))])
            .when_action(NotificationAction::Dismiss {
                id: NotificationId::new(1),
            })
            .then_state(|state| {
                assert_eq!(state.items.len(), 1);
                assert!(state.get(NotificationId::new(1)).is_none());
            })
            .then_effects(|effects| assert_cancels(effects, "notification-expiry-1"))
            .run();
    }

    #[test]
    fn expire_after_dismiss_is_a_no_op() {
        ReducerTest::new(NotificationReducer::new())
            .with_env(env())
            .given_state(NotificationState::default())
            .given_actions([
                push(1, Notice::warning("a")),
                NotificationAction::Dismiss {
                    id: NotificationId::new(1),
                },
            ])
            .when_action(NotificationAction::Expire {
                id: NotificationId::new(1),
            })
            .then_state(|state| assert!(state.items.is_empty()))
            .then_effects(assert_no_effects)
            .run();
    }

    #[test]
    fn clear_cancels_every_timer() {
        ReducerTest::new(NotificationReducer::new())
            .with_env(env())
            .given_state(NotificationState::default())
            .given_actions([push(1, Notice::info("a")), push(2, Notice::error("b"))])
            .when_action(NotificationAction::Clear)
            .then_state(|state| assert!(state.items.is_empty()))
            .then_effects(|effects| {
                assert_eq!(effects.len(), 2);
                assert_cancels(effects, "notification-expiry-1");
                assert_cancels(effects, "notification-expiry-2");
            })
            .run();
    }

    #[test]
    fn duplicate_id_is_ignored() {
        ReducerTest::new(NotificationReducer::new())
            .with_env(env())
            .given_state(NotificationState::default())
            .given_actions([push(1, Notice::info("a"))])
            .when_action(push(1, Notice::info("again")))
            .then_state(|state| {
                assert_eq!(state.items.len(), 1);
                assert_eq!(state.items[0].message, "a");
            })
            .then_effects(assert_no_effects)
            .run();
    }
}
