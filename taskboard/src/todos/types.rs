//! Domain types for the todo store.

use crate::auth::UserId;
use crate::persistence::{load_json, KeyValueStorage, TASKS_KEY};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use taskboard_macros::{Action, State};
use uuid::Uuid;

/// Unique identifier for a task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    /// Wraps a raw id
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Workflow status of a task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    /// Not started
    Todo,
    /// Being worked on
    InProgress,
    /// Finished
    Done,
}

impl TaskStatus {
    /// Wire name (`todo`, `in-progress`, `done`)
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in-progress",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Priority of a task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    /// Low priority
    Low,
    /// Medium priority
    Medium,
    /// High priority
    High,
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

/// A task record
///
/// Serialized in camelCase with RFC 3339 timestamps, which is also the
/// persisted format.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Identifier
    pub id: TaskId,
    /// Short title, never blank
    pub title: String,
    /// Longer description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Workflow status
    pub status: TaskStatus,
    /// Priority
    pub priority: TaskPriority,
    /// Assignee
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<UserId>,
    /// Creator
    pub created_by: UserId,
    /// When the task was created
    pub created_at: DateTime<Utc>,
    /// When the task last changed
    pub updated_at: DateTime<Utc>,
}

/// Data for a new task
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    /// Title, must not be blank
    pub title: String,
    /// Optional description
    pub description: Option<String>,
    /// Priority
    pub priority: TaskPriority,
    /// Optional assignee
    pub assigned_to: Option<UserId>,
}

impl NewTask {
    /// A task with only a title and a priority
    #[must_use]
    pub fn new(title: impl Into<String>, priority: TaskPriority) -> Self {
        Self {
            title: title.into(),
            description: None,
            priority,
            assigned_to: None,
        }
    }

    /// Sets the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the assignee
    #[must_use]
    pub const fn assigned_to(mut self, user: UserId) -> Self {
        self.assigned_to = Some(user);
        self
    }

    /// Builds the record; status starts as `todo` and both timestamps are `now`
    #[must_use]
    pub fn into_task(self, id: TaskId, created_by: UserId, now: DateTime<Utc>) -> Task {
        Task {
            id,
            title: self.title,
            description: self.description,
            status: TaskStatus::Todo,
            priority: self.priority,
            assigned_to: self.assigned_to,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update of a task; `None` fields keep their current value
///
/// `description` and `assigned_to` are doubly optional: `Some(None)` clears them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    /// New title
    pub title: Option<String>,
    /// New or cleared description
    pub description: Option<Option<String>>,
    /// New status
    pub status: Option<TaskStatus>,
    /// New priority
    pub priority: Option<TaskPriority>,
    /// New or cleared assignee
    pub assigned_to: Option<Option<UserId>>,
}

impl TaskPatch {
    /// A patch that only changes the status
    #[must_use]
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Merges the supplied fields into `task` and refreshes `updated_at`
    pub fn apply(self, task: &mut Task, now: DateTime<Utc>) {
        if let Some(title) = self.title {
            task.title = title;
        }
        if let Some(description) = self.description {
            task.description = description;
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(assigned_to) = self.assigned_to {
            task.assigned_to = assigned_to;
        }
        task.updated_at = now.max(task.created_at);
    }
}

/// Aggregates over the task collection
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    /// Number of tasks
    pub total: usize,
    /// Tasks with status `done`
    pub completed: usize,
    /// Tasks with status `in-progress`
    pub in_progress: usize,
    /// Tasks with status `todo`
    pub pending: usize,
    /// Tasks with priority `high`
    pub high_priority: usize,
    /// `completed / total` as a percentage in `[0, 100]`; zero when empty
    pub completion_rate: f64,
}

impl TaskStats {
    /// Computes the aggregates
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // task counts are far below 2^52
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let count = |status: TaskStatus| tasks.iter().filter(|t| t.status == status).count();
        let total = tasks.len();
        let completed = count(TaskStatus::Done);
        Self {
            total,
            completed,
            in_progress: count(TaskStatus::InProgress),
            pending: count(TaskStatus::Todo),
            high_priority: tasks.iter().filter(|t| t.priority == TaskPriority::High).count(),
            completion_rate: if total == 0 {
                0.0
            } else {
                completed as f64 / total as f64 * 100.0
            },
        }
    }
}

/// State of the todo store
#[derive(State, Clone, Debug, PartialEq)]
pub struct TaskState {
    /// Tasks in insertion order
    pub tasks: Vec<Task>,
    /// Id given to the next created task
    pub next_id: u64,
    /// Incremented on every mutation; orders persisted snapshots
    #[revision]
    pub revision: u64,
}

impl Default for TaskState {
    fn default() -> Self {
        Self {
            tasks: Vec::new(),
            next_id: 1,
            revision: 0,
        }
    }
}

impl TaskState {
    /// State holding `tasks`, with ids continuing after the highest one
    ///
    /// Returns `None` when the highest id leaves no id to allocate.
    #[must_use]
    pub fn with_tasks(tasks: Vec<Task>) -> Option<Self> {
        let next_id = tasks.iter().map(|t| t.id.get()).max().unwrap_or(0).checked_add(1)?;
        Some(Self {
            tasks,
            next_id,
            revision: 0,
        })
    }

    /// The built-in collection used when nothing valid is persisted
    #[must_use]
    pub fn seeded() -> Self {
        Self::with_tasks(seed_tasks()).unwrap_or_default()
    }

    /// Restores the persisted collection, falling back to the seeds
    #[must_use]
    pub fn restore(storage: &dyn KeyValueStorage) -> Self {
        match load_json::<Vec<Task>>(storage, TASKS_KEY) {
            Ok(Some(tasks)) => {
                let count = tasks.len();
                if let Some(state) = Self::with_tasks(tasks) {
                    tracing::debug!(count, "Restored persisted tasks");
                    state
                } else {
                    tracing::debug!(count, "Persisted task ids exhausted, using seed data");
                    Self::seeded()
                }
            },
            Ok(None) => {
                tracing::debug!("No persisted tasks, using seed data");
                Self::seeded()
            },
            Err(error) => {
                tracing::debug!(%error, "Persisted tasks unreadable, using seed data");
                Self::seeded()
            },
        }
    }

    /// Looks a task up by id
    #[must_use]
    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Tasks with the given status, in collection order
    #[must_use]
    pub fn by_status(&self, status: TaskStatus) -> Vec<Task> {
        self.tasks.iter().filter(|t| t.status == status).cloned().collect()
    }

    /// Tasks with the given priority, in collection order
    #[must_use]
    pub fn by_priority(&self, priority: TaskPriority) -> Vec<Task> {
        self.tasks.iter().filter(|t| t.priority == priority).cloned().collect()
    }

    /// Aggregates over the current collection
    #[must_use]
    pub fn stats(&self) -> TaskStats {
        TaskStats::from_tasks(&self.tasks)
    }

    /// Takes the next task id, or `None` once ids are exhausted
    pub fn allocate_id(&mut self) -> Option<TaskId> {
        let id = self.next_id;
        self.next_id = id.checked_add(1)?;
        Some(TaskId::new(id))
    }
}

fn day(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .unwrap_or_default()
}

fn seed_tasks() -> Vec<Task> {
    let admin = UserId::new(1);
    vec![
        Task {
            id: TaskId::new(1),
            title: "Learn Angular".into(),
            description: Some("Study the fundamentals of Angular 20+".into()),
            status: TaskStatus::Todo,
            priority: TaskPriority::High,
            assigned_to: None,
            created_by: admin,
            created_at: day(2024, 1, 15),
            updated_at: day(2024, 1, 15),
        },
        Task {
            id: TaskId::new(2),
            title: "Create a project".into(),
            description: Some("Build a task list application".into()),
            status: TaskStatus::InProgress,
            priority: TaskPriority::Medium,
            assigned_to: None,
            created_by: admin,
            created_at: day(2024, 1, 14),
            updated_at: day(2024, 1, 16),
        },
        Task {
            id: TaskId::new(3),
            title: "Set up the environment".into(),
            description: Some("Install Node.js and the Angular CLI, configure the editor".into()),
            status: TaskStatus::Done,
            priority: TaskPriority::High,
            assigned_to: None,
            created_by: admin,
            created_at: day(2024, 1, 13),
            updated_at: day(2024, 1, 14),
        },
    ]
}

/// Actions of the todo store
///
/// Every command carries a `request_id`; the reply event echoes it so the
/// service can match replies to concurrent requests.
#[derive(Action, Clone, Debug, PartialEq)]
pub enum TaskAction {
    // Commands
    /// Command: list every task
    #[command]
    ListTasks {
        /// Correlation id
        request_id: Uuid,
    },

    /// Command: fetch one task
    #[command]
    FetchTask {
        /// Correlation id
        request_id: Uuid,
        /// Task to fetch
        id: TaskId,
    },

    /// Command: create a task
    #[command]
    CreateTask {
        /// Correlation id
        request_id: Uuid,
        /// Task data
        draft: NewTask,
        /// Creator
        created_by: UserId,
    },

    /// Command: update a task
    #[command]
    UpdateTask {
        /// Correlation id
        request_id: Uuid,
        /// Task to update
        id: TaskId,
        /// Fields to change
        patch: TaskPatch,
    },

    /// Command: delete a task
    #[command]
    DeleteTask {
        /// Correlation id
        request_id: Uuid,
        /// Task to delete
        id: TaskId,
    },

    // Delayed commits
    /// The simulated latency of a list elapsed
    CommitList {
        /// Correlation id
        request_id: Uuid,
    },

    /// The simulated latency of a fetch elapsed
    CommitFetch {
        /// Correlation id
        request_id: Uuid,
        /// Task to fetch
        id: TaskId,
    },

    /// The simulated latency of a create elapsed
    CommitCreate {
        /// Correlation id
        request_id: Uuid,
        /// Task data
        draft: NewTask,
        /// Creator
        created_by: UserId,
    },

    /// The simulated latency of an update elapsed
    CommitUpdate {
        /// Correlation id
        request_id: Uuid,
        /// Task to update
        id: TaskId,
        /// Fields to change
        patch: TaskPatch,
    },

    /// The simulated latency of a delete elapsed
    CommitDelete {
        /// Correlation id
        request_id: Uuid,
        /// Task to delete
        id: TaskId,
    },

    // Events
    /// Reply to [`TaskAction::ListTasks`]
    #[event]
    TasksListed {
        /// Correlation id
        request_id: Uuid,
        /// Snapshot of the collection
        tasks: Vec<Task>,
    },

    /// Reply to [`TaskAction::FetchTask`]
    #[event]
    TaskFetched {
        /// Correlation id
        request_id: Uuid,
        /// The task, if it exists
        task: Option<Task>,
    },

    /// Reply to [`TaskAction::CreateTask`]
    #[event]
    TaskCreated {
        /// Correlation id
        request_id: Uuid,
        /// The new task
        task: Task,
    },

    /// Reply to [`TaskAction::UpdateTask`]
    #[event]
    TaskUpdated {
        /// Correlation id
        request_id: Uuid,
        /// The updated task, `None` if it did not exist
        task: Option<Task>,
    },

    /// Reply to [`TaskAction::DeleteTask`]
    #[event]
    TaskDeleted {
        /// Correlation id
        request_id: Uuid,
        /// Deleted task id
        id: TaskId,
        /// Whether a task was removed
        existed: bool,
    },

    /// A command was refused before any state changed
    #[event]
    TaskRejected {
        /// Correlation id
        request_id: Uuid,
        /// Why
        reason: String,
    },
}

impl TaskAction {
    /// Correlation id of a reply event; `None` for commands and commits
    #[must_use]
    pub const fn reply_to(&self) -> Option<Uuid> {
        match self {
            Self::TasksListed { request_id, .. }
            | Self::TaskFetched { request_id, .. }
            | Self::TaskCreated { request_id, .. }
            | Self::TaskUpdated { request_id, .. }
            | Self::TaskDeleted { request_id, .. }
            | Self::TaskRejected { request_id, .. } => Some(*request_id),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStorage;
    use proptest::prelude::*;

    fn task(id: u64, status: TaskStatus, priority: TaskPriority) -> Task {
        NewTask::new(format!("task {id}"), priority)
            .into_task(TaskId::new(id), UserId::new(1), day(2025, 1, 1))
            .with_status(status)
    }

    impl Task {
        fn with_status(mut self, status: TaskStatus) -> Self {
            self.status = status;
            self
        }
    }

    #[test]
    fn status_uses_kebab_case() -> Result<(), serde_json::Error> {
        assert_eq!(serde_json::to_string(&TaskStatus::InProgress)?, r#""in-progress""#);
        assert_eq!(serde_json::from_str::<TaskStatus>(r#""done""#)?, TaskStatus::Done);
        assert!(serde_json::from_str::<TaskStatus>(r#""blocked""#).is_err());
        Ok(())
    }

    #[test]
    fn patch_keeps_absent_fields() {
        let mut task = NewTask::new("Write docs", TaskPriority::Low)
            .with_description("all of them")
            .into_task(TaskId::new(9), UserId::new(2), day(2025, 1, 1));

        TaskPatch {
            priority: Some(TaskPriority::High),
            description: Some(None),
            ..TaskPatch::default()
        }
        .apply(&mut task, day(2025, 1, 3));

        assert_eq!(task.title, "Write docs");
        assert_eq!(task.priority, TaskPriority::High);
        assert_eq!(task.description, None);
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.updated_at, day(2025, 1, 3));
        assert_eq!(task.created_at, day(2025, 1, 1));
    }

    #[test]
    fn stats_on_seed_data() {
        let stats = TaskState::seeded().stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.in_progress, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.high_priority, 2);
        assert!((stats.completion_rate - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_collection_has_zero_rate() {
        assert_eq!(TaskStats::from_tasks(&[]), TaskStats::default());
    }

    #[test]
    fn restore_rehydrates_dates() -> Result<(), serde_json::Error> {
        let tasks = vec![task(7, TaskStatus::Done, TaskPriority::Low)];
        let storage = MemoryStorage::with_entry(TASKS_KEY, serde_json::to_string(&tasks)?);

        let state = TaskState::restore(&storage);
        assert_eq!(state.tasks, tasks);
        assert_eq!(state.next_id, 8);
        Ok(())
    }

    #[test]
    fn persisted_format_is_camel_case_rfc3339() -> Result<(), serde_json::Error> {
        let json = serde_json::to_value(task(1, TaskStatus::InProgress, TaskPriority::High))?;
        assert_eq!(json["status"], "in-progress");
        assert_eq!(json["createdBy"], 1);
        assert_eq!(json["createdAt"], "2025-01-01T00:00:00Z");
        Ok(())
    }

    #[test]
    fn corrupt_or_missing_storage_falls_back_to_seeds() {
        let corrupt = MemoryStorage::with_entry(TASKS_KEY, "{\"oops\"");
        assert_eq!(TaskState::restore(&corrupt), TaskState::seeded());

        let wrong_enum = MemoryStorage::with_entry(
            TASKS_KEY,
            r#"[{"id":1,"title":"x","status":"blocked","priority":"low","createdBy":1,
                "createdAt":"2024-01-01T00:00:00Z","updatedAt":"2024-01-01T00:00:00Z"}]"#,
        );
        assert_eq!(TaskState::restore(&wrong_enum), TaskState::seeded());

        assert_eq!(TaskState::restore(&MemoryStorage::new()), TaskState::seeded());
    }

    #[test]
    fn exhausted_ids_fall_back_to_seeds() {
        let tasks = vec![task(1, TaskStatus::Todo, TaskPriority::Low), task(u64::MAX, TaskStatus::Done, TaskPriority::High)];
        assert_eq!(TaskState::with_tasks(tasks.clone()), None);

        let storage = MemoryStorage::with_entry(TASKS_KEY, serde_json::to_string(&tasks).unwrap());
        assert_eq!(TaskState::restore(&storage), TaskState::seeded());
    }

    #[test]
    fn allocation_stops_at_the_last_id() {
        let mut state = TaskState::with_tasks(vec![task(u64::MAX - 2, TaskStatus::Todo, TaskPriority::Low)]).unwrap();
        assert_eq!(state.allocate_id(), Some(TaskId::new(u64::MAX - 1)));
        assert_eq!(state.allocate_id(), None);
        assert_eq!(state.allocate_id(), None);
        assert_eq!(state.next_id, u64::MAX);
    }

    #[test]
    fn seeds_respect_timestamp_order() {
        for task in TaskState::seeded().tasks {
            assert!(task.updated_at >= task.created_at, "task {}", task.id);
        }
    }

    fn arb_status() -> impl Strategy<Value = TaskStatus> {
        prop_oneof![
            Just(TaskStatus::Todo),
            Just(TaskStatus::InProgress),
            Just(TaskStatus::Done)
        ]
    }

    fn arb_priority() -> impl Strategy<Value = TaskPriority> {
        prop_oneof![
            Just(TaskPriority::Low),
            Just(TaskPriority::Medium),
            Just(TaskPriority::High)
        ]
    }

    proptest! {
        #[test]
        fn stats_partition_the_collection(
            specs in prop::collection::vec((arb_status(), arb_priority()), 0..64)
        ) {
            let tasks: Vec<Task> = specs
                .iter()
                .enumerate()
                .map(|(i, (status, priority))| task(i as u64 + 1, *status, *priority))
                .collect();
            let stats = TaskStats::from_tasks(&tasks);

            prop_assert_eq!(stats.total, tasks.len());
            prop_assert_eq!(stats.completed + stats.in_progress + stats.pending, stats.total);
            prop_assert!(stats.high_priority <= stats.total);
            prop_assert!((0.0..=100.0).contains(&stats.completion_rate));
            if stats.total == 0 {
                prop_assert_eq!(stats.completion_rate, 0.0);
            }
        }
    }
}
