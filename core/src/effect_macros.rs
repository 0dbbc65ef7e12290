//! Shorthand constructors for `Effect` values inside reducers.

/// `Effect::Future` from an async block body
///
/// # Example
///
/// ```rust,ignore
/// use taskboard_core::async_effect;
///
/// async_effect! {
///     notifier.notify(Notice::info("Task created")).await;
///     None
/// }
/// ```
#[macro_export]
macro_rules! async_effect {
    ($($body:tt)*) => {
        $crate::effect::Effect::Future(
            ::std::boxed::Box::pin(async move { $($body)* })
        )
    };
}

/// `Effect::Delay` dispatching `action` after `duration`
///
/// # Example
///
/// ```rust,ignore
/// use taskboard_core::delay;
/// use std::time::Duration;
///
/// delay! {
///     duration: Duration::from_millis(300),
///     action: TaskAction::CommitList { request_id }
/// }
/// ```
#[macro_export]
macro_rules! delay {
    (
        duration: $duration:expr,
        action: $action:expr $(,)?
    ) => {
        $crate::effect::Effect::Delay {
            duration: $duration,
            action: ::std::boxed::Box::new($action),
        }
    };
}

/// `Effect::Cancellable` registering `effect` under `id`
///
/// # Example
///
/// ```rust,ignore
/// use taskboard_core::{cancellable, delay};
///
/// cancellable! {
///     id: EffectId::new(format!("expire-{id}")),
///     effect: delay! { duration: ttl, action: NotificationAction::Expire { id } }
/// }
/// ```
#[macro_export]
macro_rules! cancellable {
    (
        id: $id:expr,
        effect: $effect:expr $(,)?
    ) => {
        $crate::effect::Effect::Cancellable {
            id: $id,
            effect: ::std::boxed::Box::new($effect),
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::effect::{Effect, EffectId};
    use std::time::Duration;

    #[derive(Clone, Debug)]
    enum TestAction {
        AsyncResult { value: i32 },
        TimeoutExpired,
    }

    #[test]
    fn test_async_effect_macro() {
        let effect = async_effect! {
            Some(TestAction::AsyncResult { value: 42 })
        };

        assert!(matches!(effect, Effect::Future(_)));
    }

    #[test]
    fn test_delay_macro() {
        let effect = delay! {
            duration: Duration::from_secs(30),
            action: TestAction::TimeoutExpired
        };

        assert!(matches!(effect, Effect::Delay { .. }));
    }

    #[test]
    fn test_cancellable_macro() {
        let effect = cancellable! {
            id: EffectId::new("timeout"),
            effect: delay! {
                duration: Duration::from_secs(1),
                action: TestAction::TimeoutExpired
            }
        };

        assert!(matches!(effect, Effect::Cancellable { ref id, .. } if id.as_str() == "timeout"));
    }

    #[tokio::test]
    async fn test_async_effect_resolves() {
        let effect = async_effect! { Some(TestAction::AsyncResult { value: 7 }) };
        let Effect::Future(fut) = effect else {
            unreachable!("async_effect! builds a Future effect");
        };
        assert!(matches!(fut.await, Some(TestAction::AsyncResult { value: 7 })));
    }
}
