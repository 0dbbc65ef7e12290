//! Transient user-facing notifications.
//!
//! [`NotificationCenter`] owns the notification store. Other stores never see
//! it directly: their environments hold an `Arc<dyn Notifier>`, which the
//! center implements.

mod reducer;
mod types;

pub use reducer::{expiry_id, NotificationEnvironment, NotificationReducer};
pub use types::{Notice, Notification, NotificationAction, NotificationId, NotificationState, Severity};

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taskboard_core::observable::ReadSignal;
use taskboard_runtime::{Store, StoreError};
use tokio::sync::broadcast;

/// Sink for user-facing notices
///
/// Injected into the environments of the other stores so their effects can
/// report outcomes without depending on the notification store itself.
pub trait Notifier: Send + Sync {
    /// Shows `notice` to the user
    fn notify(&self, notice: Notice) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

type NotificationStore = Store<NotificationState, NotificationAction, NotificationEnvironment, NotificationReducer>;

/// Service facade over the notification store
#[derive(Clone)]
pub struct NotificationCenter {
    store: NotificationStore,
    next_id: Arc<AtomicU64>,
}

impl NotificationCenter {
    /// Creates an empty notification center
    #[must_use]
    pub fn new(env: NotificationEnvironment) -> Self {
        Self {
            store: Store::new(NotificationState::default(), NotificationReducer::new(), env),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Adds a notification and returns its id
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`NotificationCenter::shutdown`].
    pub async fn add(
        &self,
        message: impl Into<String>,
        severity: Severity,
        details: Option<serde_json::Value>,
    ) -> Result<NotificationId, StoreError> {
        let notice = Notice {
            details,
            ..Notice::new(message, severity)
        };
        self.push(notice).await
    }

    /// Adds a prepared notice and returns its id
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`NotificationCenter::shutdown`].
    pub async fn push(&self, notice: Notice) -> Result<NotificationId, StoreError> {
        let id = NotificationId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.store.send(NotificationAction::Push { id, notice }).await?;
        Ok(id)
    }

    /// Adds a notification derived from an HTTP status code
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`NotificationCenter::shutdown`].
    pub async fn add_http_error(
        &self,
        status: u16,
        message: impl Into<String>,
        url: Option<String>,
    ) -> Result<NotificationId, StoreError> {
        self.push(Notice::http(status, message, url)).await
    }

    /// Removes a notification and cancels its expiry; unknown ids are ignored
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`NotificationCenter::shutdown`].
    pub async fn remove(&self, id: NotificationId) -> Result<(), StoreError> {
        self.store.send(NotificationAction::Dismiss { id }).await?;
        Ok(())
    }

    /// Removes every notification
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`NotificationCenter::shutdown`].
    pub async fn clear(&self) -> Result<(), StoreError> {
        self.store.send(NotificationAction::Clear).await?;
        Ok(())
    }

    /// Snapshot of the visible notifications, newest first
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.store.state(|state| state.items.clone())
    }

    /// Number of visible notifications
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.state(|state| state.items.len())
    }

    /// Returns true when nothing is visible
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read-only observable view of the notification list
    #[must_use]
    pub fn observe(&self) -> ReadSignal<NotificationState> {
        self.store.observe()
    }

    /// Actions produced by effects (expiries)
    #[must_use]
    pub fn subscribe_actions(&self) -> broadcast::Receiver<NotificationAction> {
        self.store.subscribe_actions()
    }

    /// Number of expiry timers still running
    #[must_use]
    pub fn pending_expiries(&self) -> usize {
        self.store.in_flight_cancellables()
    }

    /// Stops accepting notifications and tears down every expiry timer
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if effects outlive `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
        self.store.shutdown(timeout).await
    }
}

impl Notifier for NotificationCenter {
    fn notify(&self, notice: Notice) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            if let Err(error) = self.push(notice).await {
                tracing::debug!(%error, "Notification dropped");
            }
        })
    }
}

impl std::fmt::Debug for NotificationCenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationCenter")
            .field("visible", &self.len())
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish()
    }
}
