//! Application container.
//!
//! Builds every store once and hands out the services. There are no globals:
//! two `App`s in one process are fully independent.

use crate::auth::{AuthEnvironment, AuthService};
use crate::config::Config;
use crate::error::Result;
use crate::loading::LoadingCounter;
use crate::notifications::{NotificationCenter, NotificationEnvironment, Notifier};
use crate::persistence::{FileStorage, KeyValueStorage, MemoryStorage, SnapshotWriter, SESSION_KEY, TASKS_KEY};
use crate::todos::{TaskEnvironment, TaskState, TodoService};
use std::sync::Arc;
use taskboard_core::environment::{Clock, SystemClock};

/// All stores of one application instance
#[derive(Clone)]
pub struct App {
    config: Config,
    storage: Arc<dyn KeyValueStorage>,
    notifications: NotificationCenter,
    loading: LoadingCounter,
    auth: AuthService,
    todos: TodoService,
}

impl App {
    /// Wires the stores over `storage`, restoring tasks and session from it
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Storage`] if the session key cannot be read, or
    /// [`crate::Error::Store`] if the session restore cannot be started.
    pub async fn start(config: Config, clock: Arc<dyn Clock>, storage: Arc<dyn KeyValueStorage>) -> Result<Self> {
        let notifications = NotificationCenter::new(NotificationEnvironment::new(
            Arc::clone(&clock),
            config.notification_timeouts,
        ));
        let notifier: Arc<dyn Notifier> = Arc::new(notifications.clone());
        let loading = LoadingCounter::new();

        let auth = AuthService::start(
            AuthEnvironment::new(
                Arc::clone(&clock),
                config.latency,
                Arc::clone(&notifier),
                Arc::new(SnapshotWriter::new(Arc::clone(&storage), SESSION_KEY)),
            ),
            storage.as_ref(),
            config.request_timeout,
        )
        .await?;

        let todos = TodoService::new(
            TaskState::restore(storage.as_ref()),
            TaskEnvironment::new(
                clock,
                config.latency,
                notifier,
                Arc::new(SnapshotWriter::new(Arc::clone(&storage), TASKS_KEY)),
            ),
            loading.clone(),
            config.request_timeout,
        );

        tracing::info!(
            tasks = todos.tasks().len(),
            persistent = config.data_dir.is_some(),
            "Application started"
        );

        Ok(Self {
            config,
            storage,
            notifications,
            loading,
            auth,
            todos,
        })
    }

    /// Starts with the system clock and the storage named by `config`
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Storage`] if the data directory cannot be
    /// created, plus everything [`App::start`] returns.
    pub async fn from_config(config: Config) -> Result<Self> {
        let storage: Arc<dyn KeyValueStorage> = match &config.data_dir {
            Some(dir) => Arc::new(FileStorage::open(dir)?),
            None => Arc::new(MemoryStorage::new()),
        };
        Self::start(config, Arc::new(SystemClock), storage).await
    }

    /// Configuration the app was started with
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Backing key-value storage
    #[must_use]
    pub fn storage(&self) -> &dyn KeyValueStorage {
        self.storage.as_ref()
    }

    /// Notification center
    #[must_use]
    pub const fn notifications(&self) -> &NotificationCenter {
        &self.notifications
    }

    /// Global loading counter
    #[must_use]
    pub const fn loading(&self) -> &LoadingCounter {
        &self.loading
    }

    /// Authentication service
    #[must_use]
    pub const fn auth(&self) -> &AuthService {
        &self.auth
    }

    /// Task service
    #[must_use]
    pub const fn todos(&self) -> &TodoService {
        &self.todos
    }

    /// Shuts every store down, notifications last
    ///
    /// Each store gets the configured shutdown timeout.
    ///
    /// # Errors
    ///
    /// Returns the first [`crate::Error::Store`] encountered; every store is
    /// still asked to shut down.
    pub async fn shutdown(&self) -> Result<()> {
        let timeout = self.config.shutdown_timeout;
        let todos = self.todos.shutdown(timeout).await;
        let auth = self.auth.shutdown(timeout).await;
        let notifications = self.notifications.shutdown(timeout).await;
        self.loading.reset();
        tracing::info!("Application stopped");
        todos.and(auth).and(notifications).map_err(Into::into)
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("config", &self.config)
            .field("auth", &self.auth)
            .field("todos", &self.todos)
            .field("notifications", &self.notifications)
            .finish_non_exhaustive()
    }
}
