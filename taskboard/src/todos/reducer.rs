//! Reducer logic for the todo store.
//!
//! Commands are validated immediately, then delayed by the configured
//! latency. The delayed commit mutates state and returns one sequential
//! effect: persist the snapshot, notify the user, reply to the caller.

use super::types::{Task, TaskAction, TaskId, TaskState};
use crate::config::Latency;
use crate::notifications::{Notice, Notifier};
use crate::persistence::SnapshotWriter;
use std::sync::Arc;
use std::time::Duration;
use taskboard_core::effect::Effect;
use taskboard_core::environment::Clock;
use taskboard_core::reducer::Reducer;
use taskboard_core::{async_effect, delay, smallvec, SmallVec};
use uuid::Uuid;

/// Environment dependencies for the todo reducer
#[derive(Clone)]
pub struct TaskEnvironment {
    /// Clock for task timestamps
    pub clock: Arc<dyn Clock>,
    /// Simulated latency per operation
    pub latency: Latency,
    /// Where outcome notices go
    pub notifier: Arc<dyn Notifier>,
    /// Ordered writer for the tasks key
    pub snapshots: Arc<SnapshotWriter>,
}

impl TaskEnvironment {
    /// Creates a new `TaskEnvironment`
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        latency: Latency,
        notifier: Arc<dyn Notifier>,
        snapshots: Arc<SnapshotWriter>,
    ) -> Self {
        Self {
            clock,
            latency,
            notifier,
            snapshots,
        }
    }
}

type Effects = SmallVec<[Effect<TaskAction>; 4]>;

/// Reducer for the todo store
#[derive(Clone, Debug, Default)]
pub struct TaskReducer;

impl TaskReducer {
    /// Creates a new `TaskReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn validate_title(title: &str) -> Result<(), String> {
        if title.trim().is_empty() {
            return Err("Task title cannot be empty".to_string());
        }
        Ok(())
    }

    fn after(duration: Duration, action: TaskAction) -> Effects {
        smallvec![delay! {
            duration: duration,
            action: action
        }]
    }

    fn reply(action: TaskAction) -> Effect<TaskAction> {
        async_effect! { Some(action) }
    }

    fn notify(env: &TaskEnvironment, notice: Notice) -> Effect<TaskAction> {
        let notifier = Arc::clone(&env.notifier);
        async_effect! {
            notifier.notify(notice).await;
            None
        }
    }

    fn persist(env: &TaskEnvironment, revision: u64, tasks: Vec<Task>) -> Effect<TaskAction> {
        let snapshots = Arc::clone(&env.snapshots);
        async_effect! {
            if let Err(error) = snapshots.write(revision, &tasks) {
                tracing::error!(%error, revision, "Failed to persist tasks");
            }
            None
        }
    }

    /// Refuses a command: warning notice, then the rejection reply
    fn reject(env: &TaskEnvironment, request_id: Uuid, reason: String) -> Effects {
        tracing::debug!(%request_id, %reason, "Task command rejected");
        smallvec![Effect::chain(vec![
            Self::notify(env, Notice::warning(reason.clone())),
            Self::reply(TaskAction::TaskRejected { request_id, reason }),
        ])]
    }

    /// Mutation outcome: persist, notify, reply, in that order
    fn committed(env: &TaskEnvironment, state: &mut TaskState, notice: Notice, reply: TaskAction) -> Effects {
        let revision = state.bump_revision();
        smallvec![Effect::chain(vec![
            Self::persist(env, revision, state.tasks.clone()),
            Self::notify(env, notice),
            Self::reply(reply),
        ])]
    }

    fn not_found(env: &TaskEnvironment, id: TaskId, reply: TaskAction) -> Effects {
        smallvec![Effect::chain(vec![
            Self::notify(env, Notice::warning(format!("Task {id} not found"))),
            Self::reply(reply),
        ])]
    }
}

impl Reducer for TaskReducer {
    type State = TaskState;
    type Action = TaskAction;
    type Environment = TaskEnvironment;

    #[allow(clippy::too_many_lines)] // one arm per action
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ========== Commands ==========
            TaskAction::ListTasks { request_id } => {
                Self::after(env.latency.list, TaskAction::CommitList { request_id })
            },

            TaskAction::FetchTask { request_id, id } => {
                Self::after(env.latency.get, TaskAction::CommitFetch { request_id, id })
            },

            TaskAction::CreateTask {
                request_id,
                draft,
                created_by,
            } => {
                if let Err(reason) = Self::validate_title(&draft.title) {
                    return Self::reject(env, request_id, reason);
                }
                Self::after(
                    env.latency.create,
                    TaskAction::CommitCreate {
                        request_id,
                        draft,
                        created_by,
                    },
                )
            },

            TaskAction::UpdateTask { request_id, id, patch } => {
                if let Some(Err(reason)) = patch.title.as_deref().map(Self::validate_title) {
                    return Self::reject(env, request_id, reason);
                }
                Self::after(env.latency.update, TaskAction::CommitUpdate { request_id, id, patch })
            },

            TaskAction::DeleteTask { request_id, id } => {
                Self::after(env.latency.delete, TaskAction::CommitDelete { request_id, id })
            },

            // ========== Commits ==========
            TaskAction::CommitList { request_id } => smallvec![Self::reply(TaskAction::TasksListed {
                request_id,
                tasks: state.tasks.clone(),
            })],

            TaskAction::CommitFetch { request_id, id } => smallvec![Self::reply(TaskAction::TaskFetched {
                request_id,
                task: state.get(id).cloned(),
            })],

            TaskAction::CommitCreate {
                request_id,
                draft,
                created_by,
            } => {
                let Some(id) = state.allocate_id() else {
                    return Self::reject(env, request_id, "No task ids left".to_string());
                };
                let task = draft.into_task(id, created_by, env.clock.now());
                tracing::info!(task_id = %id, title = %task.title, "Task created");
                let notice = Notice::info(format!("Task \"{}\" created", task.title));
                state.tasks.push(task.clone());
                Self::committed(env, state, notice, TaskAction::TaskCreated { request_id, task })
            },

            TaskAction::CommitUpdate { request_id, id, patch } => {
                let Some(task) = state.tasks.iter_mut().find(|t| t.id == id) else {
                    return Self::not_found(env, id, TaskAction::TaskUpdated { request_id, task: None });
                };
                patch.apply(task, env.clock.now());
                let task = task.clone();
                tracing::info!(task_id = %id, status = %task.status, "Task updated");
                let notice = Notice::info(format!("Task \"{}\" updated", task.title));
                Self::committed(
                    env,
                    state,
                    notice,
                    TaskAction::TaskUpdated {
                        request_id,
                        task: Some(task),
                    },
                )
            },

            TaskAction::CommitDelete { request_id, id } => {
                let Some(index) = state.tasks.iter().position(|t| t.id == id) else {
                    return Self::not_found(
                        env,
                        id,
                        TaskAction::TaskDeleted {
                            request_id,
                            id,
                            existed: false,
                        },
                    );
                };
                let task = state.tasks.remove(index);
                tracing::info!(task_id = %id, "Task deleted");
                let notice = Notice::info(format!("Task \"{}\" deleted", task.title));
                Self::committed(
                    env,
                    state,
                    notice,
                    TaskAction::TaskDeleted {
                        request_id,
                        id,
                        existed: true,
                    },
                )
            },

            // ========== Events ==========
            // Replies are broadcast to callers; they do not change state.
            TaskAction::TasksListed { .. }
            | TaskAction::TaskFetched { .. }
            | TaskAction::TaskCreated { .. }
            | TaskAction::TaskUpdated { .. }
            | TaskAction::TaskDeleted { .. }
            | TaskAction::TaskRejected { .. } => SmallVec::new(),
        }
    }
}
