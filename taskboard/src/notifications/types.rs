//! Domain types for notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskboard_macros::Action;

/// Identifier of a notification, unique per process
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(u64);

impl NotificationId {
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

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How serious a notification is
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Something failed
    Error,
    /// Something was refused or looks wrong
    Warning,
    /// Confirmation of a successful action
    Info,
}

impl Severity {
    /// Maps an HTTP status code: 5xx is an error, 4xx a warning, anything else info
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            500.. => Self::Error,
            400..=499 => Self::Warning,
            _ => Self::Info,
        }
    }

    /// Lowercase name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// A notification that has not been added yet
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    /// Text shown to the user
    pub message: String,
    /// Severity
    pub severity: Severity,
    /// HTTP status code the notice was derived from
    pub status_code: Option<u16>,
    /// Source URL
    pub url: Option<String>,
    /// Arbitrary extra payload
    pub details: Option<serde_json::Value>,
}

impl Notice {
    /// Creates a notice with the given severity
    #[must_use]
    pub fn new(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            severity,
            status_code: None,
            url: None,
            details: None,
        }
    }

    /// Error notice
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(message, Severity::Error)
    }

    /// Warning notice
    #[must_use]
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(message, Severity::Warning)
    }

    /// Info notice
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(message, Severity::Info)
    }

    /// Notice derived from an HTTP status code
    #[must_use]
    pub fn http(status: u16, message: impl Into<String>, url: Option<String>) -> Self {
        Self {
            status_code: Some(status),
            url,
            ..Self::new(message, Severity::from_status(status))
        }
    }

    /// Attaches a detail payload
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// A notification currently visible to the user
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Identifier
    pub id: NotificationId,
    /// Text shown to the user
    pub message: String,
    /// Severity
    pub severity: Severity,
    /// When it was added
    pub created_at: DateTime<Utc>,
    /// HTTP status code, for notifications raised from a response
    pub status_code: Option<u16>,
    /// Source URL, for notifications raised from a response
    pub url: Option<String>,
    /// Arbitrary extra payload
    pub details: Option<serde_json::Value>,
}

impl Notification {
    /// Builds a notification from a notice
    #[must_use]
    pub fn from_notice(id: NotificationId, notice: Notice, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            message: notice.message,
            severity: notice.severity,
            created_at,
            status_code: notice.status_code,
            url: notice.url,
            details: notice.details,
        }
    }
}

/// Visible notifications, newest first
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NotificationState {
    /// Notifications, most recent at index 0
    pub items: Vec<Notification>,
}

impl NotificationState {
    /// Looks a notification up by id
    #[must_use]
    pub fn get(&self, id: NotificationId) -> Option<&Notification> {
        self.items.iter().find(|n| n.id == id)
    }

    /// Removes a notification; returns whether it was present
    pub fn remove(&mut self, id: NotificationId) -> bool {
        let before = self.items.len();
        self.items.retain(|n| n.id != id);
        self.items.len() < before
    }
}

/// Actions of the notification store
#[derive(Action, Clone, Debug, PartialEq)]
pub enum NotificationAction {
    /// Command: show a notification and schedule its expiry
    #[command]
    Push {
        /// Identifier assigned by the caller
        id: NotificationId,
        /// What to show
        notice: Notice,
    },

    /// Command: remove a notification before it expires
    #[command]
    Dismiss {
        /// Notification to remove
        id: NotificationId,
    },

    /// Command: remove every notification
    #[command]
    Clear,

    /// The expiry timer of a notification fired
    Expire {
        /// Notification to remove
        id: NotificationId,
    },
}
