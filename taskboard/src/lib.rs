//! # Taskboard
//!
//! Reactive state layer of a task-tracking application.
//!
//! Four stores, each owning exactly one collection:
//!
//! - [`notifications`]: transient messages that expire on their own
//! - [`loading`]: count of requests in flight
//! - [`auth`]: mock account table and the current session
//! - [`todos`]: tasks plus memoized aggregates
//!
//! Stores are built on `taskboard-runtime`: services send commands, reducers
//! schedule the simulated latency and describe persistence, notices and
//! replies as effects. [`App`] wires them together.
//!
//! ## Example
//!
//! ```ignore
//! let app = App::from_config(Config::from_env()?).await?;
//! app.auth().login("admin@example.com", "admin123").await?;
//!
//! let task = app
//!     .todos()
//!     .create(NewTask::new("Review PR", TaskPriority::High), UserId::new(1))
//!     .await?;
//! app.todos().move_task(task.id, TaskStatus::Done).await?;
//! println!("{:.0}% done", app.todos().stats().completion_rate);
//! ```

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod loading;
pub mod notifications;
pub mod persistence;
pub mod todos;

pub use app::App;
pub use auth::{Access, AuthOutcome, AuthService, RegistrationForm, Role, User, UserId};
pub use config::{Config, Latency};
pub use error::{Error, Result};
pub use loading::{LoadingCounter, LoadingGuard};
pub use notifications::{Notice, Notification, NotificationCenter, NotificationId, Notifier, Severity};
pub use persistence::{FileStorage, KeyValueStorage, MemoryStorage};
pub use todos::{NewTask, Task, TaskId, TaskPatch, TaskPriority, TaskStats, TaskStatus, TodoService};
