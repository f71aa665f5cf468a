//! Domain service for admin authentication and user management.
//!
//! Handles rate-limited login, credential bootstrap behind the master key,
//! and the admin operations on users and attempt counters.

use serde::Serialize;
use thiserror::Error;

use crate::db::{AttemptCounter, AttemptScope, Remaining, User};
use crate::services::session::AdminSession;

/// Errors specific to authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Too many failed login attempts")]
    RateLimited { reset_at: i64 },

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl AuthError {
    /// Whether the error is the caller's doing and can be shown to them as-is.
    #[must_use]
    pub const fn is_user_facing(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Storage(format!("{err:#}"))
    }
}

/// Result of a `set_credentials` submission.
#[derive(Debug, Clone, Serialize)]
pub struct SetupOutcome {
    pub username: String,
    pub owner: bool,
}

/// Remaining login budget for the caller's IP and, optionally, a username.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptsStatus {
    pub max_attempts: u32,
    pub ip: Remaining,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Remaining>,
}

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Verifies credentials against the attempt budgets and the credential store.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::RateLimited`] when either the IP or the user budget
    /// is spent (the credential store is not consulted), and
    /// [`AuthError::InvalidCredentials`] when the password does not match.
    async fn login(&self, username: &str, password: &str, ip: &str)
    -> Result<AdminSession, AuthError>;

    /// Creates credentials through the setup page. The first user is created
    /// without the master key and becomes owner; afterwards the master key is
    /// required.
    async fn setup_credentials(
        &self,
        master_key: Option<&str>,
        username: &str,
        password: &str,
    ) -> Result<SetupOutcome, AuthError>;

    /// Whether the credential store is still empty.
    async fn needs_initial_setup(&self) -> bool;

    /// Creates a regular user on behalf of a logged-in admin.
    async fn create_user(&self, username: &str, password: &str) -> Result<User, AuthError>;

    /// Deletes a user.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Forbidden`] for the owner account.
    async fn delete_user(&self, username: &str) -> Result<(), AuthError>;

    async fn reset_password(&self, username: &str, new_password: &str) -> Result<(), AuthError>;

    async fn reset_attempts(&self, key: &str, scope: AttemptScope) -> Result<(), AuthError>;

    async fn attempts_left(
        &self,
        ip: &str,
        username: Option<&str>,
    ) -> Result<AttemptsStatus, AuthError>;

    async fn list_users(&self) -> Vec<User>;

    async fn counters(&self, scope: AttemptScope) -> Vec<(String, AttemptCounter)>;

    /// Drops expired attempt counters. Returns how many were removed.
    async fn sweep_attempts(&self) -> Result<usize, AuthError>;
}
