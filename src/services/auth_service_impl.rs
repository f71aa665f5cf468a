//! File-backed implementation of the `AuthService` trait.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::db::{AttemptCounter, AttemptScope, Store, User};
use crate::services::auth_service::{AttemptsStatus, AuthError, AuthService, SetupOutcome};
use crate::services::session::AdminSession;

pub struct FileAuthService {
    store: Store,
    master_key: Option<String>,
    session_ttl_seconds: i64,
}

impl FileAuthService {
    #[must_use]
    pub const fn new(store: Store, master_key: Option<String>, session_ttl_seconds: i64) -> Self {
        Self {
            store,
            master_key,
            session_ttl_seconds,
        }
    }

    /// [`AuthService::login`] evaluated at a given unix time.
    pub async fn login_as_of(
        &self,
        username: &str,
        password: &str,
        ip: &str,
        now: i64,
    ) -> Result<AdminSession, AuthError> {
        let username = crate::db::repositories::user::normalize_username(username);
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::Validation(
                "Username and password are required".to_string(),
            ));
        }

        let limiter = &self.store.attempts;
        let ip_budget = limiter.remaining_as_of(ip, AttemptScope::Ip, now).await?;
        let user_budget = limiter
            .remaining_as_of(&username, AttemptScope::User, now)
            .await?;

        let exhausted: Vec<i64> = [ip_budget, user_budget]
            .iter()
            .filter(|b| b.is_exhausted())
            .map(|b| b.reset_at)
            .collect();
        if let Some(reset_at) = exhausted.into_iter().max() {
            warn!(user = %username, ip = %ip, reset_at, "Login rejected: attempt budget exhausted");
            metrics::counter!("login_attempts_total", "outcome" => "rate_limited").increment(1);
            return Err(AuthError::RateLimited { reset_at });
        }

        if !self.store.users.verify_password(&username, password).await? {
            limiter.increment_as_of(ip, AttemptScope::Ip, now).await?;
            let left = limiter
                .increment_as_of(&username, AttemptScope::User, now)
                .await?;
            warn!(user = %username, ip = %ip, attempts_left = left.count_left, "Login failed");
            metrics::counter!("login_attempts_total", "outcome" => "invalid").increment(1);
            return Err(AuthError::InvalidCredentials);
        }

        limiter.reset_as_of(ip, AttemptScope::Ip, now).await?;
        limiter
            .reset_as_of(&username, AttemptScope::User, now)
            .await?;

        info!(user = %username, ip = %ip, "Admin logged in");
        metrics::counter!("login_attempts_total", "outcome" => "success").increment(1);

        Ok(AdminSession::new(username, now, self.session_ttl_seconds))
    }

    fn check_master_key(&self, provided: Option<&str>) -> Result<(), AuthError> {
        match (self.master_key.as_deref(), provided) {
            (None, _) => Err(AuthError::Forbidden(
                "Credentials are already set up and no master key is configured".to_string(),
            )),
            (Some(expected), Some(given)) if constant_time_eq(expected, given) => Ok(()),
            (Some(_), _) => Err(AuthError::Forbidden("Invalid master key".to_string())),
        }
    }

    async fn create_regular_user(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let username = validate_new_credentials(username, password)?;

        if self.store.users.is_user_present(&username).await {
            return Err(AuthError::Conflict(format!(
                "User '{username}' already exists"
            )));
        }

        if !self.store.users.create_user(&username, password, false).await? {
            return Err(AuthError::Conflict(format!(
                "User '{username}' already exists"
            )));
        }

        self.store
            .users
            .get_user(&username)
            .await
            .ok_or_else(|| AuthError::Storage(format!("User '{username}' vanished after create")))
    }
}

#[async_trait]
impl AuthService for FileAuthService {
    async fn login(
        &self,
        username: &str,
        password: &str,
        ip: &str,
    ) -> Result<AdminSession, AuthError> {
        self.login_as_of(username, password, ip, chrono::Utc::now().timestamp())
            .await
    }

    async fn setup_credentials(
        &self,
        master_key: Option<&str>,
        username: &str,
        password: &str,
    ) -> Result<SetupOutcome, AuthError> {
        let username = validate_new_credentials(username, password)?;

        if self.store.users.is_empty().await
            && self.store.users.bootstrap_owner(&username, password).await?
        {
            info!(user = %username, "Initial setup: owner account created");
            return Ok(SetupOutcome {
                username,
                owner: true,
            });
        }

        if let Err(e) = self.check_master_key(master_key) {
            warn!(user = %username, "Credential setup rejected: {e}");
            return Err(e);
        }

        let user = self.create_regular_user(&username, password).await?;
        info!(user = %user.username, "Credentials added with master key");

        Ok(SetupOutcome {
            username: user.username,
            owner: user.owner,
        })
    }

    async fn needs_initial_setup(&self) -> bool {
        self.store.users.is_empty().await
    }

    async fn create_user(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let user = self.create_regular_user(username, password).await?;
        info!(user = %user.username, "User created");
        Ok(user)
    }

    async fn delete_user(&self, username: &str) -> Result<(), AuthError> {
        let Some(user) = self.store.users.get_user(username).await else {
            return Err(AuthError::NotFound(format!("User '{}' not found", username.trim())));
        };

        if user.owner {
            return Err(AuthError::Forbidden(
                "The owner account cannot be deleted".to_string(),
            ));
        }

        if !self.store.users.delete_user(&user.username).await? {
            return Err(AuthError::NotFound(format!(
                "User '{}' not found",
                user.username
            )));
        }

        info!(user = %user.username, "User deleted");
        Ok(())
    }

    async fn reset_password(&self, username: &str, new_password: &str) -> Result<(), AuthError> {
        if new_password.is_empty() {
            return Err(AuthError::Validation("Password is required".to_string()));
        }

        if !self.store.users.reset_password(username, new_password).await? {
            return Err(AuthError::NotFound(format!("User '{}' not found", username.trim())));
        }

        info!(user = %username.trim(), "Password reset");
        Ok(())
    }

    async fn reset_attempts(&self, key: &str, scope: AttemptScope) -> Result<(), AuthError> {
        if key.trim().is_empty() {
            return Err(AuthError::Validation("A key to reset is required".to_string()));
        }

        self.store.attempts.reset(key, scope).await?;
        info!(key = %key.trim(), scope = %scope, "Attempt counter reset");
        Ok(())
    }

    async fn attempts_left(
        &self,
        ip: &str,
        username: Option<&str>,
    ) -> Result<AttemptsStatus, AuthError> {
        let ip_left = self.store.attempts.remaining(ip, AttemptScope::Ip).await?;

        let user_left = match username.map(str::trim).filter(|u| !u.is_empty()) {
            Some(name) => Some(self.store.attempts.remaining(name, AttemptScope::User).await?),
            None => None,
        };

        Ok(AttemptsStatus {
            max_attempts: self.store.attempts.max_attempts(),
            ip: ip_left,
            user: user_left,
        })
    }

    async fn list_users(&self) -> Vec<User> {
        self.store.users.list_users().await
    }

    async fn counters(&self, scope: AttemptScope) -> Vec<(String, AttemptCounter)> {
        self.store.attempts.counters(scope).await
    }

    async fn sweep_attempts(&self) -> Result<usize, AuthError> {
        Ok(self.store.attempts.sweep().await?)
    }
}

fn validate_new_credentials(username: &str, password: &str) -> Result<String, AuthError> {
    let username = crate::db::repositories::user::normalize_username(username);

    if username.is_empty() {
        return Err(AuthError::Validation("Username is required".to_string()));
    }
    if username.len() > 64 || username.chars().any(char::is_control) {
        return Err(AuthError::Validation("Username is not valid".to_string()));
    }
    if password.is_empty() {
        return Err(AuthError::Validation("Password is required".to_string()));
    }

    Ok(username)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a
            .bytes()
            .zip(b.bytes())
            .fold(0u8, |acc, (x, y)| acc | (x ^ y))
            == 0
}
