use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use crate::config::AuthThrottleConfig;
use crate::db::JsonDocument;
use crate::db::repositories::user::normalize_username;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptScope {
    User,
    Ip,
}

impl AttemptScope {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Ip => "ip",
        }
    }
}

impl fmt::Display for AttemptScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttemptScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "ip" => Ok(Self::Ip),
            other => Err(format!("unknown attempt scope '{other}' (expected user or ip)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptCounter {
    pub count: u32,
    pub reset_at: i64,
}

/// On-disk shape of the attempts file.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptsFile {
    #[serde(default)]
    pub by_user: BTreeMap<String, AttemptCounter>,
    #[serde(default)]
    pub by_ip: BTreeMap<String, AttemptCounter>,
}

impl AttemptsFile {
    const fn scope(&self, scope: AttemptScope) -> &BTreeMap<String, AttemptCounter> {
        match scope {
            AttemptScope::User => &self.by_user,
            AttemptScope::Ip => &self.by_ip,
        }
    }

    const fn scope_mut(&mut self, scope: AttemptScope) -> &mut BTreeMap<String, AttemptCounter> {
        match scope {
            AttemptScope::User => &mut self.by_user,
            AttemptScope::Ip => &mut self.by_ip,
        }
    }
}

/// Attempts left in the current window for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Remaining {
    pub count_left: u32,
    pub reset_at: i64,
}

impl Remaining {
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.count_left == 0
    }
}

/// File-backed failed-login counters, one family per [`AttemptScope`].
///
/// Counters are created lazily and reset wholesale once their window has
/// elapsed; a count is never decremented. Every operation has an `*_as_of`
/// form that takes the current unix time explicitly.
#[derive(Clone)]
pub struct AttemptLimiter {
    doc: Arc<JsonDocument<AttemptsFile>>,
    max_attempts: u32,
    window_seconds: i64,
}

impl AttemptLimiter {
    pub async fn open(path: impl Into<PathBuf>, throttle: &AuthThrottleConfig) -> Result<Self> {
        let doc = JsonDocument::open(path).await?;
        Ok(Self {
            doc: Arc::new(doc),
            max_attempts: throttle.max_attempts,
            window_seconds: i64::try_from(throttle.window_seconds).unwrap_or(i64::MAX),
        })
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn remaining(&self, key: &str, scope: AttemptScope) -> Result<Remaining> {
        self.remaining_as_of(key, scope, now()).await
    }

    pub async fn remaining_as_of(
        &self,
        key: &str,
        scope: AttemptScope,
        now: i64,
    ) -> Result<Remaining> {
        let key = normalize_key(key, scope);
        let counter = self
            .doc
            .update(|f| *self.current_entry(f, scope, key, now))
            .await?;
        Ok(self.to_remaining(counter))
    }

    pub async fn increment(&self, key: &str, scope: AttemptScope) -> Result<Remaining> {
        self.increment_as_of(key, scope, now()).await
    }

    pub async fn increment_as_of(
        &self,
        key: &str,
        scope: AttemptScope,
        now: i64,
    ) -> Result<Remaining> {
        let key = normalize_key(key, scope);
        let counter = self
            .doc
            .update(|f| {
                let entry = self.current_entry(f, scope, key, now);
                entry.count = entry.count.saturating_add(1);
                *entry
            })
            .await?;
        Ok(self.to_remaining(counter))
    }

    pub async fn reset(&self, key: &str, scope: AttemptScope) -> Result<()> {
        self.reset_as_of(key, scope, now()).await
    }

    pub async fn reset_as_of(&self, key: &str, scope: AttemptScope, now: i64) -> Result<()> {
        let key = normalize_key(key, scope);
        let fresh = self.fresh(now);
        self.doc
            .update(|f| {
                f.scope_mut(scope).insert(key, fresh);
            })
            .await
    }

    /// Drops every counter whose window has elapsed, in both scopes.
    ///
    /// Lazy resets on access already keep the counts correct; this only stops
    /// the file from accumulating stale keys. Returns the number removed.
    pub async fn sweep(&self) -> Result<usize> {
        self.sweep_as_of(now()).await
    }

    pub async fn sweep_as_of(&self, now: i64) -> Result<usize> {
        // Cheap read-only check first; this runs on every request.
        let stale = self
            .doc
            .read(|f| {
                f.by_user
                    .values()
                    .chain(f.by_ip.values())
                    .any(|c| c.reset_at <= now)
            })
            .await;
        if !stale {
            return Ok(0);
        }

        let removed = self
            .doc
            .update(|f| {
                let before = f.by_user.len() + f.by_ip.len();
                f.by_user.retain(|_, c| c.reset_at > now);
                f.by_ip.retain(|_, c| c.reset_at > now);
                before - (f.by_user.len() + f.by_ip.len())
            })
            .await?;

        if removed > 0 {
            debug!(removed, "Swept expired attempt counters");
        }
        Ok(removed)
    }

    pub async fn counters(&self, scope: AttemptScope) -> Vec<(String, AttemptCounter)> {
        self.doc
            .read(|f| {
                f.scope(scope)
                    .iter()
                    .map(|(k, c)| (k.clone(), *c))
                    .collect()
            })
            .await
    }

    const fn fresh(&self, now: i64) -> AttemptCounter {
        AttemptCounter {
            count: 0,
            reset_at: now.saturating_add(self.window_seconds),
        }
    }

    fn current_entry<'a>(
        &self,
        file: &'a mut AttemptsFile,
        scope: AttemptScope,
        key: String,
        now: i64,
    ) -> &'a mut AttemptCounter {
        let fresh = self.fresh(now);
        let entry = file.scope_mut(scope).entry(key).or_insert(fresh);
        if entry.reset_at <= now {
            *entry = fresh;
        }
        entry
    }

    const fn to_remaining(&self, counter: AttemptCounter) -> Remaining {
        Remaining {
            count_left: self.max_attempts.saturating_sub(counter.count),
            reset_at: counter.reset_at,
        }
    }
}

fn normalize_key(key: &str, scope: AttemptScope) -> String {
    match scope {
        AttemptScope::User => normalize_username(key),
        AttemptScope::Ip => key.trim().to_string(),
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
