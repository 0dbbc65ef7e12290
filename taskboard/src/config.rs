//! Configuration management for the taskboard application.
//!
//! Loads configuration from environment variables with sensible defaults.
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `TASKBOARD_DATA_DIR` | unset (in-memory) | Directory for the JSON key-value files |
//! | `TASKBOARD_LOG` | `taskboard=info` | Tracing filter when `RUST_LOG` is unset |
//! | `TASKBOARD_LATENCY` | `simulated` | `simulated` or `none` |
//! | `TASKBOARD_REQUEST_TIMEOUT_MS` | `10000` | How long a service waits for its store's reply |
//! | `TASKBOARD_SHUTDOWN_TIMEOUT_MS` | `5000` | Graceful shutdown budget per store |

use crate::notifications::Severity;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while reading configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable held a value that could not be used
    #[error("invalid value {value:?} for {var}: {reason}")]
    InvalidValue {
        /// Variable name
        var: &'static str,
        /// Raw value
        value: String,
        /// What was expected
        reason: &'static str,
    },
}

/// Simulated latency of every store operation
///
/// The stores complete each operation through a delayed commit so callers
/// observe realistic asynchronous behaviour. Tests use [`Latency::none`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Latency {
    /// Listing all tasks
    pub list: Duration,
    /// Fetching one task
    pub get: Duration,
    /// Creating a task
    pub create: Duration,
    /// Updating a task
    pub update: Duration,
    /// Deleting a task
    pub delete: Duration,
    /// Logging in
    pub login: Duration,
    /// Registering an account
    pub register: Duration,
    /// Logging out
    pub logout: Duration,
    /// Listing users (admin)
    pub list_users: Duration,
    /// Deleting a user (admin)
    pub delete_user: Duration,
    /// Restoring the persisted session at startup
    pub restore: Duration,
}

impl Latency {
    /// The delays the application simulates by default
    #[must_use]
    pub const fn simulated() -> Self {
        Self {
            list: Duration::from_millis(300),
            get: Duration::from_millis(200),
            create: Duration::from_millis(400),
            update: Duration::from_millis(300),
            delete: Duration::from_millis(250),
            login: Duration::from_millis(500),
            register: Duration::from_millis(600),
            logout: Duration::from_millis(200),
            list_users: Duration::from_millis(400),
            delete_user: Duration::from_millis(300),
            restore: Duration::from_millis(100),
        }
    }

    /// Zero delay everywhere
    #[must_use]
    pub const fn none() -> Self {
        Self {
            list: Duration::ZERO,
            get: Duration::ZERO,
            create: Duration::ZERO,
            update: Duration::ZERO,
            delete: Duration::ZERO,
            login: Duration::ZERO,
            register: Duration::ZERO,
            logout: Duration::ZERO,
            list_users: Duration::ZERO,
            delete_user: Duration::ZERO,
            restore: Duration::ZERO,
        }
    }
}

impl Default for Latency {
    fn default() -> Self {
        Self::simulated()
    }
}

impl FromStr for Latency {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulated" => Ok(Self::simulated()),
            "none" | "off" | "0" => Ok(Self::none()),
            _ => Err("expected `simulated` or `none`"),
        }
    }
}

/// How long a notification stays visible before it expires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationTimeouts {
    /// Error notifications
    pub error: Duration,
    /// Warning notifications
    pub warning: Duration,
    /// Info notifications
    pub info: Duration,
    /// Fallback for severities without a dedicated timeout
    pub fallback: Duration,
}

impl NotificationTimeouts {
    /// Timeout for a given severity
    #[must_use]
    pub const fn for_severity(&self, severity: Severity) -> Duration {
        match severity {
            Severity::Error => self.error,
            Severity::Warning => self.warning,
            Severity::Info => self.info,
        }
    }
}

impl Default for NotificationTimeouts {
    fn default() -> Self {
        Self {
            error: Duration::from_secs(8),
            warning: Duration::from_secs(6),
            info: Duration::from_secs(4),
            fallback: Duration::from_secs(5),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Where persisted state lives; `None` keeps everything in memory
    pub data_dir: Option<PathBuf>,
    /// Tracing filter used when `RUST_LOG` is not set
    pub log_filter: String,
    /// Simulated latency per operation
    pub latency: Latency,
    /// Notification lifetimes per severity
    pub notification_timeouts: NotificationTimeouts,
    /// How long a service waits for its store to reply
    pub request_timeout: Duration,
    /// Graceful shutdown budget per store
    pub shutdown_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            log_filter: "taskboard=info".to_string(),
            latency: Latency::simulated(),
            notification_timeouts: NotificationTimeouts::default(),
            request_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a variable is set to something unusable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a variable is set to something unusable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let latency = match lookup("TASKBOARD_LATENCY") {
            Some(value) => value.parse().map_err(|reason| ConfigError::InvalidValue {
                var: "TASKBOARD_LATENCY",
                value,
                reason,
            })?,
            None => defaults.latency,
        };

        Ok(Self {
            data_dir: lookup("TASKBOARD_DATA_DIR")
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from),
            log_filter: lookup("TASKBOARD_LOG").unwrap_or(defaults.log_filter),
            latency,
            notification_timeouts: defaults.notification_timeouts,
            request_timeout: millis(&lookup, "TASKBOARD_REQUEST_TIMEOUT_MS")?
                .unwrap_or(defaults.request_timeout),
            shutdown_timeout: millis(&lookup, "TASKBOARD_SHUTDOWN_TIMEOUT_MS")?
                .unwrap_or(defaults.shutdown_timeout),
        })
    }

    /// Configuration for tests: no latency, in-memory storage, short timeouts
    #[must_use]
    pub fn for_tests() -> Self {
        Self {
            latency: Latency::none(),
            request_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(1),
            log_filter: "taskboard=debug".to_string(),
            ..Self::default()
        }
    }
}

fn millis(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Option<Duration>, ConfigError> {
    lookup(var)
        .map(|value| {
            value
                .trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| ConfigError::InvalidValue {
                    var,
                    value,
                    reason: "expected a whole number of milliseconds",
                })
        })
        .transpose()
}
