//! Reducer logic for the auth store.
//!
//! Same shape as the todo reducer: commands wait out the simulated latency,
//! commits decide against the account table and describe the follow-up
//! (session write, notice, reply). Role checks happen at commit time so they
//! see the session as it is when the request completes.

use super::types::{AuthAction, AuthState, Role, SessionRestore, StoredSession, User};
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

/// Message shown when credentials do not match
pub const INVALID_CREDENTIALS: &str = "Invalid email or password";

/// Message shown when a non-admin calls an admin operation
pub const ACCESS_DENIED: &str = "Access denied: administrator role required";

/// Environment dependencies for the auth reducer
#[derive(Clone)]
pub struct AuthEnvironment {
    /// Clock for account creation timestamps
    pub clock: Arc<dyn Clock>,
    /// Simulated latency per operation
    pub latency: Latency,
    /// Where outcome notices go
    pub notifier: Arc<dyn Notifier>,
    /// Ordered writer for the session key
    pub session: Arc<SnapshotWriter>,
}

impl AuthEnvironment {
    /// Creates a new `AuthEnvironment`
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        latency: Latency,
        notifier: Arc<dyn Notifier>,
        session: Arc<SnapshotWriter>,
    ) -> Self {
        Self {
            clock,
            latency,
            notifier,
            session,
        }
    }
}

type Effects = SmallVec<[Effect<AuthAction>; 4]>;

/// Reducer for the auth store
#[derive(Clone, Debug, Default)]
pub struct AuthReducer;

impl AuthReducer {
    /// Creates a new `AuthReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn after(duration: Duration, action: AuthAction) -> Effects {
        smallvec![delay! {
            duration: duration,
            action: action
        }]
    }

    fn reply(action: AuthAction) -> Effect<AuthAction> {
        async_effect! { Some(action) }
    }

    fn notify(env: &AuthEnvironment, notice: Notice) -> Effect<AuthAction> {
        let notifier = Arc::clone(&env.notifier);
        async_effect! {
            notifier.notify(notice).await;
            None
        }
    }

    fn save_session(env: &AuthEnvironment, revision: u64, user: &User) -> Effect<AuthAction> {
        let session = Arc::clone(&env.session);
        let stored = StoredSession::from(user);
        async_effect! {
            if let Err(error) = session.write(revision, &stored) {
                tracing::error!(%error, revision, "Failed to persist session");
            }
            None
        }
    }

    fn clear_session(env: &AuthEnvironment, revision: u64) -> Effect<AuthAction> {
        let session = Arc::clone(&env.session);
        async_effect! {
            if let Err(error) = session.clear(revision) {
                tracing::error!(%error, revision, "Failed to clear session");
            }
            None
        }
    }

    fn refuse(env: &AuthEnvironment, notice: Notice, reply: AuthAction) -> Effects {
        smallvec![Effect::chain(vec![Self::notify(env, notice), Self::reply(reply)])]
    }

    fn reject(env: &AuthEnvironment, request_id: Uuid, reason: &str) -> Effects {
        Self::refuse(
            env,
            Notice::warning(reason),
            AuthAction::Rejected {
                request_id,
                reason: reason.to_string(),
            },
        )
    }

    fn deny(env: &AuthEnvironment, request_id: Uuid) -> Effects {
        tracing::warn!(%request_id, "Admin operation refused");
        Self::refuse(
            env,
            Notice::error(ACCESS_DENIED),
            AuthAction::Denied {
                request_id,
                reason: ACCESS_DENIED.to_string(),
            },
        )
    }

    /// Settles the startup session
    ///
    /// `initialized` flips only when the trailing `SessionRestored` reply is
    /// reduced, so any stale key is already removed by then.
    fn restore(state: &mut AuthState, request_id: Uuid, restore: SessionRestore, env: &AuthEnvironment) -> Effects {
        match restore {
            SessionRestore::Missing => {
                tracing::debug!("No persisted session");
                smallvec![Self::reply(AuthAction::SessionRestored { request_id, user: None })]
            },
            SessionRestore::Found(session) => {
                let live = state
                    .users
                    .iter()
                    .find(|u| u.id == session.id && u.email == session.email)
                    .cloned();
                if let Some(user) = live {
                    tracing::info!(user_id = %user.id, "Session restored");
                    state.current = Some(user.clone());
                    smallvec![Self::reply(AuthAction::SessionRestored {
                        request_id,
                        user: Some(user),
                    })]
                } else {
                    tracing::debug!(user_id = %session.id, "Discarding stale session");
                    let revision = state.bump_revision();
                    smallvec![Effect::chain(vec![
                        Self::clear_session(env, revision),
                        Self::reply(AuthAction::SessionRestored { request_id, user: None }),
                    ])]
                }
            },
            SessionRestore::Corrupt(reason) => {
                tracing::debug!(%reason, "Discarding corrupt session");
                let revision = state.bump_revision();
                smallvec![Effect::chain(vec![
                    Self::clear_session(env, revision),
                    Self::notify(env, Notice::info("Your saved session could not be restored, please sign in again")),
                    Self::reply(AuthAction::SessionRestored { request_id, user: None }),
                ])]
            },
        }
    }
}

impl Reducer for AuthReducer {
    type State = AuthState;
    type Action = AuthAction;
    type Environment = AuthEnvironment;

    #[allow(clippy::too_many_lines)] // one arm per action
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ========== Commands ==========
            AuthAction::RestoreSession { request_id, restore } => {
                Self::after(env.latency.restore, AuthAction::CommitRestore { request_id, restore })
            },
            AuthAction::Login {
                request_id,
                email,
                password,
            } => Self::after(
                env.latency.login,
                AuthAction::CommitLogin {
                    request_id,
                    email,
                    password,
                },
            ),
            AuthAction::Register { request_id, form } => {
                Self::after(env.latency.register, AuthAction::CommitRegister { request_id, form })
            },
            AuthAction::Logout { request_id } => {
                Self::after(env.latency.logout, AuthAction::CommitLogout { request_id })
            },
            AuthAction::ListUsers { request_id } => {
                Self::after(env.latency.list_users, AuthAction::CommitListUsers { request_id })
            },
            AuthAction::DeleteUser { request_id, id } => {
                Self::after(env.latency.delete_user, AuthAction::CommitDeleteUser { request_id, id })
            },

            // ========== Commits ==========
            AuthAction::CommitRestore { request_id, restore } => Self::restore(state, request_id, restore, env),

            AuthAction::CommitLogin {
                request_id,
                email,
                password,
            } => {
                let Some(user) = state
                    .users
                    .iter()
                    .find(|u| u.email == email && u.password == password)
                    .cloned()
                else {
                    tracing::info!(%email, "Login failed");
                    return Self::refuse(
                        env,
                        Notice::error(INVALID_CREDENTIALS),
                        AuthAction::Rejected {
                            request_id,
                            reason: INVALID_CREDENTIALS.to_string(),
                        },
                    );
                };

                tracing::info!(user_id = %user.id, "User logged in");
                state.current = Some(user.clone());
                let revision = state.bump_revision();
                smallvec![Effect::chain(vec![
                    Self::save_session(env, revision, &user),
                    Self::notify(env, Notice::info(format!("Welcome back, {}", user.name))),
                    Self::reply(AuthAction::LoggedIn { request_id, user }),
                ])]
            },

            AuthAction::CommitRegister { request_id, form } => {
                if state.find_by_email(&form.email).is_some() {
                    return Self::reject(env, request_id, "This email is already in use");
                }
                if form.password != form.confirm_password {
                    return Self::reject(env, request_id, "Passwords do not match");
                }

                let user = User {
                    id: state.allocate_id(),
                    name: form.name,
                    email: form.email,
                    password: form.password,
                    role: Role::User,
                    created_at: env.clock.now(),
                };
                tracing::info!(user_id = %user.id, "User registered");
                state.users.push(user.clone());
                state.current = Some(user.clone());
                let revision = state.bump_revision();
                smallvec![Effect::chain(vec![
                    Self::save_session(env, revision, &user),
                    Self::notify(env, Notice::info(format!("Account created for {}", user.email))),
                    Self::reply(AuthAction::Registered { request_id, user }),
                ])]
            },

            AuthAction::CommitLogout { request_id } => {
                if let Some(user) = state.current.take() {
                    tracing::info!(user_id = %user.id, "User logged out");
                }
                let revision = state.bump_revision();
                smallvec![Effect::chain(vec![
                    Self::clear_session(env, revision),
                    Self::notify(env, Notice::info("You have been logged out")),
                    Self::reply(AuthAction::LoggedOut { request_id }),
                ])]
            },

            AuthAction::CommitListUsers { request_id } => {
                if !state.is_admin() {
                    return Self::deny(env, request_id);
                }
                smallvec![Self::reply(AuthAction::UsersListed {
                    request_id,
                    users: state.users.iter().map(User::masked).collect(),
                })]
            },

            AuthAction::CommitDeleteUser { request_id, id } => {
                if !state.is_admin() {
                    return Self::deny(env, request_id);
                }
                if state.current.as_ref().is_some_and(|current| current.id == id) {
                    return Self::reject(env, request_id, "You cannot delete your own account");
                }

                let Some(index) = state.users.iter().position(|u| u.id == id) else {
                    return Self::refuse(
                        env,
                        Notice::warning(format!("User {id} not found")),
                        AuthAction::UserDeleted {
                            request_id,
                            id,
                            existed: false,
                        },
                    );
                };
                let user = state.users.remove(index);
                tracing::info!(user_id = %id, "User deleted");
                smallvec![Effect::chain(vec![
                    Self::notify(env, Notice::info(format!("User {} deleted", user.email))),
                    Self::reply(AuthAction::UserDeleted {
                        request_id,
                        id,
                        existed: true,
                    }),
                ])]
            },

            // ========== Events ==========
            AuthAction::SessionRestored { .. } => {
                state.initialized = true;
                SmallVec::new()
            },

            AuthAction::LoggedIn { .. }
            | AuthAction::Registered { .. }
            | AuthAction::LoggedOut { .. }
            | AuthAction::UsersListed { .. }
            | AuthAction::UserDeleted { .. }
            | AuthAction::Rejected { .. }
            | AuthAction::Denied { .. } => SmallVec::new(),
        }
    }
}
