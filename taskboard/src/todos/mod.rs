//! Task collection with derived aggregates.
//!
//! [`TodoService`] is the only way to change tasks. Reads go through the
//! store state or through memoized [`Computed`] views that recompute only
//! after a mutation.

mod reducer;
mod types;

pub use reducer::{TaskEnvironment, TaskReducer};
pub use types::{NewTask, Task, TaskAction, TaskId, TaskPatch, TaskPriority, TaskState, TaskStats, TaskStatus};

use crate::auth::UserId;
use crate::error::{Error, Result};
use crate::loading::LoadingCounter;
use crate::notifications::{Notice, Notifier};
use std::sync::Arc;
use std::time::Duration;
use taskboard_core::observable::{Computed, ReadSignal};
use taskboard_runtime::{Store, StoreError};
use uuid::Uuid;

type TaskStore = Store<TaskState, TaskAction, TaskEnvironment, TaskReducer>;

/// Memoized views over the task collection
struct Views {
    stats: Computed<TaskState, TaskStats>,
    pending: Computed<TaskState, Vec<Task>>,
    in_progress: Computed<TaskState, Vec<Task>>,
    completed: Computed<TaskState, Vec<Task>>,
}

/// Service facade over the todo store
#[derive(Clone)]
pub struct TodoService {
    store: TaskStore,
    notifier: Arc<dyn Notifier>,
    loading: LoadingCounter,
    request_timeout: Duration,
    views: Arc<Views>,
}

impl TodoService {
    /// Creates the service over an initial collection
    ///
    /// Use [`TaskState::restore`] to start from the persisted collection.
    #[must_use]
    pub fn new(initial: TaskState, env: TaskEnvironment, loading: LoadingCounter, request_timeout: Duration) -> Self {
        let notifier = Arc::clone(&env.notifier);
        let store = Store::new(initial, TaskReducer::new(), env);
        let views = Views {
            stats: store.computed(TaskState::stats),
            pending: store.computed(|state| state.by_status(TaskStatus::Todo)),
            in_progress: store.computed(|state| state.by_status(TaskStatus::InProgress)),
            completed: store.computed(|state| state.by_status(TaskStatus::Done)),
        };
        Self {
            store,
            notifier,
            loading,
            request_timeout,
            views: Arc::new(views),
        }
    }

    /// Sends a command and waits for its reply, counting it as loading
    ///
    /// A store failure is reported to the user before it is returned.
    async fn request(&self, build: impl FnOnce(Uuid) -> TaskAction, failure: &str) -> Result<TaskAction> {
        let _loading = self.loading.track();
        let request_id = Uuid::new_v4();
        let action = build(request_id);
        let command = action.name();
        tracing::debug!(%request_id, command, "Task request");

        match self
            .store
            .send_and_wait_for(action, |a| a.reply_to() == Some(request_id), self.request_timeout)
            .await
        {
            Ok(TaskAction::TaskRejected { reason, .. }) => Err(Error::Validation(reason)),
            Ok(reply) => Ok(reply),
            Err(error) => {
                tracing::error!(%error, command, "Task request failed");
                self.notifier.notify(Notice::error(format!("{failure}: {error}"))).await;
                Err(Error::Store(error))
            },
        }
    }

    /// All tasks, after the list latency
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the store does not answer.
    pub async fn list(&self) -> Result<Vec<Task>> {
        match self
            .request(|request_id| TaskAction::ListTasks { request_id }, "Failed to load tasks")
            .await?
        {
            TaskAction::TasksListed { tasks, .. } => Ok(tasks),
            other => Err(Error::UnexpectedReply(other.name())),
        }
    }

    /// One task, after the fetch latency
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the store does not answer.
    pub async fn get(&self, id: TaskId) -> Result<Option<Task>> {
        match self
            .request(|request_id| TaskAction::FetchTask { request_id, id }, "Failed to load task")
            .await?
        {
            TaskAction::TaskFetched { task, .. } => Ok(task),
            other => Err(Error::UnexpectedReply(other.name())),
        }
    }

    /// Creates a task with status `todo`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a blank title, or [`Error::Store`]
    /// if the store does not answer.
    #[tracing::instrument(skip(self, draft), fields(title = %draft.title))]
    pub async fn create(&self, draft: NewTask, created_by: UserId) -> Result<Task> {
        match self
            .request(
                |request_id| TaskAction::CreateTask {
                    request_id,
                    draft,
                    created_by,
                },
                "Failed to create task",
            )
            .await?
        {
            TaskAction::TaskCreated { task, .. } => Ok(task),
            other => Err(Error::UnexpectedReply(other.name())),
        }
    }

    /// Applies `patch`; `Ok(None)` if the task does not exist
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a blank title, or [`Error::Store`]
    /// if the store does not answer.
    #[tracing::instrument(skip(self, patch))]
    pub async fn update(&self, id: TaskId, patch: TaskPatch) -> Result<Option<Task>> {
        match self
            .request(
                |request_id| TaskAction::UpdateTask { request_id, id, patch },
                "Failed to update task",
            )
            .await?
        {
            TaskAction::TaskUpdated { task, .. } => Ok(task),
            other => Err(Error::UnexpectedReply(other.name())),
        }
    }

    /// Deletes a task; returns whether it existed
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the store does not answer.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: TaskId) -> Result<bool> {
        match self
            .request(|request_id| TaskAction::DeleteTask { request_id, id }, "Failed to delete task")
            .await?
        {
            TaskAction::TaskDeleted { existed, .. } => Ok(existed),
            other => Err(Error::UnexpectedReply(other.name())),
        }
    }

    /// Changes only the status; any status may follow any other
    ///
    /// # Errors
    ///
    /// Same as [`TodoService::update`].
    pub async fn move_task(&self, id: TaskId, status: TaskStatus) -> Result<Option<Task>> {
        self.update(id, TaskPatch::status(status)).await
    }

    /// Tasks with the given status
    #[must_use]
    pub fn by_status(&self, status: TaskStatus) -> Vec<Task> {
        self.store.state(|state| state.by_status(status))
    }

    /// Tasks with the given priority
    #[must_use]
    pub fn by_priority(&self, priority: TaskPriority) -> Vec<Task> {
        self.store.state(|state| state.by_priority(priority))
    }

    /// Tasks not started yet (memoized)
    #[must_use]
    pub fn pending(&self) -> Vec<Task> {
        self.views.pending.get()
    }

    /// Tasks being worked on (memoized)
    #[must_use]
    pub fn in_progress(&self) -> Vec<Task> {
        self.views.in_progress.get()
    }

    /// Finished tasks (memoized)
    #[must_use]
    pub fn completed(&self) -> Vec<Task> {
        self.views.completed.get()
    }

    /// Aggregates over the collection (memoized)
    #[must_use]
    pub fn stats(&self) -> TaskStats {
        self.views.stats.get()
    }

    /// The memoized aggregates cell itself
    #[must_use]
    pub fn stats_view(&self) -> &Computed<TaskState, TaskStats> {
        &self.views.stats
    }

    /// Snapshot of every task, without latency
    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        self.store.state(|state| state.tasks.clone())
    }

    /// Read-only observable view of the collection
    #[must_use]
    pub fn observe(&self) -> ReadSignal<TaskState> {
        self.store.observe()
    }

    /// Stops the store, waiting for in-flight requests
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if effects outlive `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
        self.store.shutdown(timeout).await
    }
}

impl std::fmt::Debug for TodoService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TodoService")
            .field("tasks", &self.store.state(|state| state.tasks.len()))
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}
