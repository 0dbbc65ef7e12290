//! Authentication: mock account table and the current session.
//!
//! [`AuthService::start`] reads the persisted session and hands it to the
//! store, which validates it against the account table after the restore
//! latency. Until then [`AuthService::wait_for_initialization`] blocks.

mod reducer;
mod types;

pub use reducer::{AuthEnvironment, AuthReducer, ACCESS_DENIED, INVALID_CREDENTIALS};
pub use types::{
    AuthAction, AuthOutcome, AuthState, LoginOutcome, RegistrationForm, RegistrationOutcome, Role, SessionRestore,
    StoredSession, User, UserId, MASKED_PASSWORD,
};

use crate::error::{Error, Result};
use crate::notifications::{Notice, Notifier};
use crate::persistence::{load_json, KeyValueStorage, SESSION_KEY};
use std::sync::Arc;
use std::time::Duration;
use taskboard_core::observable::ReadSignal;
use taskboard_runtime::{Store, StoreError};
use uuid::Uuid;

type AuthStore = Store<AuthState, AuthAction, AuthEnvironment, AuthReducer>;

/// Access level required by [`AuthService::authorize`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    /// Any signed-in user
    Authenticated,
    /// Administrators only
    Admin,
}

/// Service facade over the auth store
#[derive(Clone)]
pub struct AuthService {
    store: AuthStore,
    notifier: Arc<dyn Notifier>,
    request_timeout: Duration,
}

impl AuthService {
    /// Creates the service and starts restoring the persisted session
    ///
    /// A session that cannot be decoded is treated as corrupt, not as an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the session key cannot be read at all.
    pub async fn start(env: AuthEnvironment, storage: &dyn KeyValueStorage, request_timeout: Duration) -> Result<Self> {
        let restore = match load_json::<StoredSession>(storage, SESSION_KEY) {
            Ok(Some(session)) => SessionRestore::Found(session),
            Ok(None) => SessionRestore::Missing,
            Err(crate::persistence::StorageError::Serialization(error)) => SessionRestore::Corrupt(error.to_string()),
            Err(error) => return Err(error.into()),
        };

        let service = Self {
            notifier: Arc::clone(&env.notifier),
            store: Store::new(AuthState::default(), AuthReducer::new(), env),
            request_timeout,
        };
        service
            .store
            .send(AuthAction::RestoreSession {
                request_id: Uuid::new_v4(),
                restore,
            })
            .await?;
        Ok(service)
    }

    async fn request(&self, build: impl FnOnce(Uuid) -> AuthAction, failure: &str) -> Result<AuthAction> {
        let request_id = Uuid::new_v4();
        let action = build(request_id);
        let command = action.name();
        match self
            .store
            .send_and_wait_for(action, |a| a.reply_to() == Some(request_id), self.request_timeout)
            .await
        {
            Ok(reply) => Ok(reply),
            Err(error) => {
                tracing::error!(%error, command, "Auth request failed");
                self.notifier.notify(Notice::error(format!("{failure}: {error}"))).await;
                Err(Error::Store(error))
            },
        }
    }

    /// Signs in with email and password
    ///
    /// Wrong credentials are a [`AuthOutcome::Failure`], not an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the store does not answer.
    #[tracing::instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome> {
        let reply = self
            .request(
                |request_id| AuthAction::Login {
                    request_id,
                    email: email.to_string(),
                    password: password.to_string(),
                },
                "Login failed",
            )
            .await?;
        match reply {
            AuthAction::LoggedIn { user, .. } => Ok(AuthOutcome::Success(user)),
            AuthAction::Rejected { reason, .. } => Ok(AuthOutcome::Failure(reason)),
            other => Err(Error::UnexpectedReply(other.name())),
        }
    }

    /// Creates a regular account and signs it in
    ///
    /// A taken email or a mismatched confirmation is a [`AuthOutcome::Failure`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the store does not answer.
    #[tracing::instrument(skip(self, form), fields(email = %form.email))]
    pub async fn register(&self, form: RegistrationForm) -> Result<RegistrationOutcome> {
        let reply = self
            .request(|request_id| AuthAction::Register { request_id, form }, "Registration failed")
            .await?;
        match reply {
            AuthAction::Registered { user, .. } => Ok(AuthOutcome::Success(user)),
            AuthAction::Rejected { reason, .. } => Ok(AuthOutcome::Failure(reason)),
            other => Err(Error::UnexpectedReply(other.name())),
        }
    }

    /// Signs out and forgets the persisted session
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the store does not answer.
    pub async fn logout(&self) -> Result<()> {
        match self
            .request(|request_id| AuthAction::Logout { request_id }, "Logout failed")
            .await?
        {
            AuthAction::LoggedOut { .. } => Ok(()),
            other => Err(Error::UnexpectedReply(other.name())),
        }
    }

    /// Returns true if a user is signed in
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.store.state(AuthState::is_authenticated)
    }

    /// Returns true if the signed-in user is an administrator
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.store.state(AuthState::is_admin)
    }

    /// The signed-in user
    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        self.store.state(|state| state.current.clone())
    }

    /// Mock bearer token of the signed-in user
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.store
            .state(|state| state.current.as_ref().map(|user| format!("mock-token-{}", user.id)))
    }

    /// Resolves once the startup session restore has completed
    pub async fn wait_for_initialization(&self) {
        if self.store.observe().wait_for(|state| state.initialized).await.is_err() {
            tracing::warn!("Auth state dropped before initialization");
        }
    }

    /// Checks that the current session grants `access`
    ///
    /// Waits for the session restore first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthenticated`] without a session and
    /// [`Error::Forbidden`] when admin access is required but missing.
    pub async fn authorize(&self, access: Access) -> Result<()> {
        self.wait_for_initialization().await;
        let (authenticated, admin) = self.store.state(|state| (state.is_authenticated(), state.is_admin()));
        match access {
            _ if !authenticated => Err(Error::Unauthenticated),
            Access::Admin if !admin => Err(Error::Forbidden(ACCESS_DENIED.to_string())),
            Access::Authenticated | Access::Admin => Ok(()),
        }
    }

    /// Every account, passwords masked (admin only)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Forbidden`] unless an administrator is signed in,
    /// or [`Error::Store`] if the store does not answer.
    pub async fn all_users(&self) -> Result<Vec<User>> {
        match self
            .request(|request_id| AuthAction::ListUsers { request_id }, "Could not load users")
            .await?
        {
            AuthAction::UsersListed { users, .. } => Ok(users),
            AuthAction::Denied { reason, .. } => Err(Error::Forbidden(reason)),
            other => Err(Error::UnexpectedReply(other.name())),
        }
    }

    /// Deletes an account; returns whether it existed (admin only)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Forbidden`] unless an administrator is signed in,
    /// [`Error::Validation`] when deleting one's own account, or
    /// [`Error::Store`] if the store does not answer.
    pub async fn delete_user(&self, id: UserId) -> Result<bool> {
        match self
            .request(|request_id| AuthAction::DeleteUser { request_id, id }, "Could not delete user")
            .await?
        {
            AuthAction::UserDeleted { existed, .. } => Ok(existed),
            AuthAction::Denied { reason, .. } => Err(Error::Forbidden(reason)),
            AuthAction::Rejected { reason, .. } => Err(Error::Validation(reason)),
            other => Err(Error::UnexpectedReply(other.name())),
        }
    }

    /// Read-only observable view of the auth state
    #[must_use]
    pub fn observe(&self) -> ReadSignal<AuthState> {
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

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("current_user", &self.current_user().map(|u| u.id))
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::Latency;
    use crate::notifications::{NotificationCenter, NotificationEnvironment, Severity};
    use crate::persistence::{MemoryStorage, SnapshotWriter};
    use taskboard_testing::test_clock;

    struct Fixture {
        auth: AuthService,
        notifications: NotificationCenter,
        storage: Arc<MemoryStorage>,
    }

    async fn fixture(storage: MemoryStorage) -> Fixture {
        let clock = Arc::new(test_clock());
        let notifications = NotificationCenter::new(NotificationEnvironment::new(clock.clone(), Default::default()));
        let storage = Arc::new(storage);
        let env = AuthEnvironment::new(
            clock,
            Latency::none(),
            Arc::new(notifications.clone()),
            Arc::new(SnapshotWriter::new(storage.clone(), SESSION_KEY)),
        );
        let auth = AuthService::start(env, storage.as_ref(), Duration::from_secs(5)).await.unwrap();
        auth.wait_for_initialization().await;
        Fixture {
            auth,
            notifications,
            storage,
        }
    }

    #[tokio::test]
    async fn login_persists_session_without_password() {
        let Fixture {
            auth,
            notifications,
            storage,
        } = fixture(MemoryStorage::new()).await;

        let outcome = auth.login("admin@example.com", "admin123").await.unwrap();
        assert!(outcome.is_success());
        assert!(auth.is_admin());
        assert_eq!(auth.token().as_deref(), Some("mock-token-1"));

        let raw = storage.get(SESSION_KEY).unwrap().unwrap();
        assert!(!raw.contains("admin123"));
        assert_eq!(notifications.notifications()[0].severity, Severity::Info);
    }

    #[tokio::test]
    async fn failed_login_reports_an_error() {
        let Fixture { auth, notifications, .. } = fixture(MemoryStorage::new()).await;

        let outcome = auth.login("admin@example.com", "wrong").await.unwrap();
        assert_eq!(outcome, AuthOutcome::Failure(INVALID_CREDENTIALS.to_string()));
        assert!(!auth.is_authenticated());
        assert_eq!(auth.token(), None);
        assert_eq!(notifications.notifications()[0].severity, Severity::Error);
    }

    #[tokio::test]
    async fn mismatched_confirmation_is_a_warning() {
        let Fixture { auth, notifications, .. } = fixture(MemoryStorage::new()).await;

        let mut form = RegistrationForm::new("B", "b@example.com", "one");
        form.confirm_password = "two".into();
        let outcome = auth.register(form).await.unwrap();
        assert_eq!(outcome, AuthOutcome::Failure("Passwords do not match".into()));
        assert_eq!(notifications.notifications()[0].severity, Severity::Warning);
    }

    #[tokio::test]
    async fn persisted_session_is_restored() {
        let admin = AuthState::default().users[0].clone();
        let stored = serde_json::to_string(&StoredSession::from(&admin)).unwrap();
        let Fixture { auth, .. } = fixture(MemoryStorage::with_entry(SESSION_KEY, stored)).await;

        assert_eq!(auth.current_user(), Some(admin));
        auth.authorize(Access::Admin).await.unwrap();
    }

    #[tokio::test]
    async fn corrupt_session_is_cleared_with_a_notice() {
        let Fixture {
            auth,
            notifications,
            storage,
        } = fixture(MemoryStorage::with_entry(SESSION_KEY, "{broken")).await;

        assert!(!auth.is_authenticated());
        let notice = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if let Some(n) = notifications.notifications().first().cloned() {
                    return n;
                }
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(notice.severity, Severity::Info);
        assert_eq!(storage.get(SESSION_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn authorize_distinguishes_roles() {
        let Fixture { auth, .. } = fixture(MemoryStorage::new()).await;
        assert!(matches!(auth.authorize(Access::Authenticated).await, Err(Error::Unauthenticated)));

        auth.login("user@example.com", "user123").await.unwrap();
        auth.authorize(Access::Authenticated).await.unwrap();
        assert!(matches!(auth.authorize(Access::Admin).await, Err(Error::Forbidden(_))));
    }

    #[tokio::test]
    async fn admin_operations_map_replies_to_errors() {
        let Fixture { auth, .. } = fixture(MemoryStorage::new()).await;
        auth.login("admin@example.com", "admin123").await.unwrap();

        assert!(matches!(auth.delete_user(UserId::new(1)).await, Err(Error::Validation(_))));
        assert!(auth.delete_user(UserId::new(2)).await.unwrap());
        assert!(!auth.delete_user(UserId::new(2)).await.unwrap());
        assert_eq!(auth.all_users().await.unwrap().len(), 1);
    }
}
