//! Domain types for the auth store.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use taskboard_macros::{Action, State};
use uuid::Uuid;

/// Unique identifier for a user
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(u64);

impl UserId {
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

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role of a user
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// May list and delete users
    Admin,
    /// Regular account
    User,
}

/// Placeholder shown instead of a password
pub const MASKED_PASSWORD: &str = "***";

/// A user account
///
/// Passwords are plaintext; this is a mock account table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Identifier
    pub id: UserId,
    /// Display name
    pub name: String,
    /// Login, unique in the table
    pub email: String,
    /// Plaintext password
    pub password: String,
    /// Role
    pub role: Role,
    /// When the account was created
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Copy of this user with the password replaced by [`MASKED_PASSWORD`]
    #[must_use]
    pub fn masked(&self) -> Self {
        Self {
            password: MASKED_PASSWORD.to_string(),
            ..self.clone()
        }
    }

    /// Returns true for administrators
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// The persisted form of the current user; never contains the password
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSession {
    /// Identifier
    pub id: UserId,
    /// Display name
    pub name: String,
    /// Login
    pub email: String,
    /// Role at the time of login
    pub role: Role,
    /// When the account was created
    pub created_at: DateTime<Utc>,
}

impl From<&User> for StoredSession {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            created_at: user.created_at,
        }
    }
}

/// What was found under the session key at startup
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionRestore {
    /// Nothing persisted
    Missing,
    /// A well-formed session
    Found(StoredSession),
    /// The persisted value could not be decoded
    Corrupt(String),
}

/// Input of a registration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationForm {
    /// Display name
    pub name: String,
    /// Login, must not be taken
    pub email: String,
    /// Password
    pub password: String,
    /// Must equal `password`
    pub confirm_password: String,
}

impl RegistrationForm {
    /// A form whose confirmation matches the password
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
        let password = password.into();
        Self {
            name: name.into(),
            email: email.into(),
            confirm_password: password.clone(),
            password,
        }
    }
}

/// Result of a login or a registration
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The user is now signed in
    Success(User),
    /// Refused, with a message for the user
    Failure(String),
}

impl AuthOutcome {
    /// Returns true for [`AuthOutcome::Success`]
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The signed-in user, on success
    #[must_use]
    pub const fn user(&self) -> Option<&User> {
        match self {
            Self::Success(user) => Some(user),
            Self::Failure(_) => None,
        }
    }
}

/// Result of [`crate::auth::AuthService::login`]
pub type LoginOutcome = AuthOutcome;

/// Result of [`crate::auth::AuthService::register`]
pub type RegistrationOutcome = AuthOutcome;

/// State of the auth store
#[derive(State, Clone, Debug, PartialEq)]
pub struct AuthState {
    /// Account table
    pub users: Vec<User>,
    /// Signed-in user, at most one
    pub current: Option<User>,
    /// Set once the startup session restore has completed
    pub initialized: bool,
    /// Id given to the next registered user
    pub next_user_id: u64,
    /// Incremented on every session change; orders persisted sessions
    #[revision]
    pub revision: u64,
}

impl Default for AuthState {
    fn default() -> Self {
        let users = seed_users();
        let next_user_id = users.iter().map(|u| u.id.get()).max().unwrap_or(0) + 1;
        Self {
            users,
            current: None,
            initialized: false,
            next_user_id,
            revision: 0,
        }
    }
}

impl AuthState {
    /// Looks a user up by email
    #[must_use]
    pub fn find_by_email(&self, email: &str) -> Option<&User> {
        self.users.iter().find(|u| u.email == email)
    }

    /// Returns true if a user is signed in
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.current.is_some()
    }

    /// Returns true if the signed-in user is an administrator
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.current.as_ref().is_some_and(User::is_admin)
    }

    /// Takes the next user id
    pub fn allocate_id(&mut self) -> UserId {
        let id = UserId::new(self.next_user_id);
        self.next_user_id += 1;
        id
    }
}

fn day(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .unwrap_or_default()
}

fn seed_users() -> Vec<User> {
    vec![
        User {
            id: UserId::new(1),
            name: "Admin".into(),
            email: "admin@example.com".into(),
            password: "admin123".into(),
            role: Role::Admin,
            created_at: day(2024, 1, 1),
        },
        User {
            id: UserId::new(2),
            name: "User".into(),
            email: "user@example.com".into(),
            password: "user123".into(),
            role: Role::User,
            created_at: day(2024, 1, 2),
        },
    ]
}

/// Actions of the auth store
///
/// Every command carries a `request_id` that its reply echoes.
#[derive(Action, Clone, Debug, PartialEq)]
pub enum AuthAction {
    // Commands
    /// Command: apply what was read from the session key at startup
    #[command]
    RestoreSession {
        /// Correlation id
        request_id: Uuid,
        /// What was read
        restore: SessionRestore,
    },

    /// Command: sign in
    #[command]
    Login {
        /// Correlation id
        request_id: Uuid,
        /// Login
        email: String,
        /// Password
        password: String,
    },

    /// Command: create an account and sign in
    #[command]
    Register {
        /// Correlation id
        request_id: Uuid,
        /// Registration data
        form: RegistrationForm,
    },

    /// Command: sign out
    #[command]
    Logout {
        /// Correlation id
        request_id: Uuid,
    },

    /// Command: list every account (admin)
    #[command]
    ListUsers {
        /// Correlation id
        request_id: Uuid,
    },

    /// Command: delete an account (admin)
    #[command]
    DeleteUser {
        /// Correlation id
        request_id: Uuid,
        /// Account to delete
        id: UserId,
    },

    // Delayed commits
    /// The restore latency elapsed
    CommitRestore {
        /// Correlation id
        request_id: Uuid,
        /// What was read
        restore: SessionRestore,
    },

    /// The login latency elapsed
    CommitLogin {
        /// Correlation id
        request_id: Uuid,
        /// Login
        email: String,
        /// Password
        password: String,
    },

    /// The registration latency elapsed
    CommitRegister {
        /// Correlation id
        request_id: Uuid,
        /// Registration data
        form: RegistrationForm,
    },

    /// The logout latency elapsed
    CommitLogout {
        /// Correlation id
        request_id: Uuid,
    },

    /// The user listing latency elapsed
    CommitListUsers {
        /// Correlation id
        request_id: Uuid,
    },

    /// The user deletion latency elapsed
    CommitDeleteUser {
        /// Correlation id
        request_id: Uuid,
        /// Account to delete
        id: UserId,
    },

    // Events
    /// Reply to [`AuthAction::RestoreSession`]
    #[event]
    SessionRestored {
        /// Correlation id
        request_id: Uuid,
        /// The restored user, if the session was valid
        user: Option<User>,
    },

    /// Reply to a successful [`AuthAction::Login`]
    #[event]
    LoggedIn {
        /// Correlation id
        request_id: Uuid,
        /// Signed-in user
        user: User,
    },

    /// Reply to a successful [`AuthAction::Register`]
    #[event]
    Registered {
        /// Correlation id
        request_id: Uuid,
        /// New user, now signed in
        user: User,
    },

    /// Reply to [`AuthAction::Logout`]
    #[event]
    LoggedOut {
        /// Correlation id
        request_id: Uuid,
    },

    /// Reply to [`AuthAction::ListUsers`]; passwords are masked
    #[event]
    UsersListed {
        /// Correlation id
        request_id: Uuid,
        /// Every account
        users: Vec<User>,
    },

    /// Reply to [`AuthAction::DeleteUser`]
    #[event]
    UserDeleted {
        /// Correlation id
        request_id: Uuid,
        /// Deleted account
        id: UserId,
        /// Whether an account was removed
        existed: bool,
    },

    /// The request was refused because of its input
    #[event]
    Rejected {
        /// Correlation id
        request_id: Uuid,
        /// Message for the user
        reason: String,
    },

    /// The signed-in user may not perform the request
    #[event]
    Denied {
        /// Correlation id
        request_id: Uuid,
        /// Message for the user
        reason: String,
    },
}

impl AuthAction {
    /// Correlation id of a reply event; `None` for commands and commits
    #[must_use]
    pub const fn reply_to(&self) -> Option<Uuid> {
        match self {
            Self::SessionRestored { request_id, .. }
            | Self::LoggedIn { request_id, .. }
            | Self::Registered { request_id, .. }
            | Self::LoggedOut { request_id }
            | Self::UsersListed { request_id, .. }
            | Self::UserDeleted { request_id, .. }
            | Self::Rejected { request_id, .. }
            | Self::Denied { request_id, .. } => Some(*request_id),
            _ => None,
        }
    }
}
