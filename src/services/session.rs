//! Admin session issued on login and carried in the cookie session.

use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tower_sessions::session::Error as SessionError;

const ADMIN_SESSION_KEY: &str = "admin";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminSession {
    pub username: String,
    pub expires_at: i64,
}

impl AdminSession {
    #[must_use]
    pub const fn new(username: String, now: i64, ttl_seconds: i64) -> Self {
        Self {
            username,
            expires_at: now.saturating_add(ttl_seconds),
        }
    }

    #[must_use]
    pub const fn is_valid_at(&self, now: i64) -> bool {
        self.expires_at > now
    }
}

/// True iff there is a session and it has not expired.
#[must_use]
pub fn is_valid(session: Option<&AdminSession>) -> bool {
    session.is_some_and(|s| s.is_valid_at(chrono::Utc::now().timestamp()))
}

/// Binds `admin` to the cookie session. The session id is rotated first so a
/// pre-login id cannot be reused.
pub async fn start(session: &Session, admin: &AdminSession) -> Result<(), SessionError> {
    session.cycle_id().await?;
    session.insert(ADMIN_SESSION_KEY, admin).await
}

pub async fn current(session: &Session) -> Result<Option<AdminSession>, SessionError> {
    session.get::<AdminSession>(ADMIN_SESSION_KEY).await
}

pub async fn logout(session: &Session) -> Result<(), SessionError> {
    session.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_boundary() {
        let admin = AdminSession::new("alice".to_string(), 1_000, 60);
        assert_eq!(admin.expires_at, 1_060);
        assert!(admin.is_valid_at(1_059));
        assert!(!admin.is_valid_at(1_060));
    }

    #[test]
    fn test_is_valid() {
        assert!(!is_valid(None));

        let now = chrono::Utc::now().timestamp();
        let live = AdminSession::new("alice".to_string(), now, 3_600);
        let stale = AdminSession::new("alice".to_string(), now - 7_200, 3_600);
        assert!(is_valid(Some(&live)));
        assert!(!is_valid(Some(&stale)));
    }
}
