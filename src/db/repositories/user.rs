use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task;

use crate::config::SecurityConfig;
use crate::db::JsonDocument;

/// On-disk shape of the credential file.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialsFile {
    #[serde(default)]
    pub users: BTreeMap<String, UserRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub pw_hash: String,
    pub created_at: i64,
    #[serde(default)]
    pub owner: bool,
}

/// User data returned from the store (without the password hash)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub username: String,
    pub created_at: i64,
    pub owner: bool,
}

impl User {
    fn from_record(username: &str, record: &UserRecord) -> Self {
        Self {
            username: username.to_string(),
            created_at: record.created_at,
            owner: record.owner,
        }
    }
}

/// Usernames are case-insensitive; this is the key form used everywhere.
#[must_use]
pub fn normalize_username(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Clone)]
pub struct CredentialStore {
    doc: Arc<JsonDocument<CredentialsFile>>,
    security: Arc<SecurityConfig>,
}

impl CredentialStore {
    pub async fn open(path: impl Into<PathBuf>, security: SecurityConfig) -> Result<Self> {
        let doc = JsonDocument::open(path).await?;
        Ok(Self {
            doc: Arc::new(doc),
            security: Arc::new(security),
        })
    }

    pub async fn is_empty(&self) -> bool {
        self.doc.read(|f| f.users.is_empty()).await
    }

    pub async fn is_user_present(&self, name: &str) -> bool {
        let key = normalize_username(name);
        self.doc.read(|f| f.users.contains_key(&key)).await
    }

    pub async fn get_user(&self, name: &str) -> Option<User> {
        let key = normalize_username(name);
        self.doc
            .read(|f| f.users.get(&key).map(|r| User::from_record(&key, r)))
            .await
    }

    pub async fn list_users(&self) -> Vec<User> {
        self.doc
            .read(|f| {
                f.users
                    .iter()
                    .map(|(name, r)| User::from_record(name, r))
                    .collect()
            })
            .await
    }

    /// Stores a new user with a salted hash. Returns `false` without touching
    /// the file when the name is already taken; callers check
    /// [`Self::is_user_present`] first to report that case.
    pub async fn create_user(&self, name: &str, password: &str, owner: bool) -> Result<bool> {
        let key = normalize_username(name);
        let pw_hash = self.hash(password).await?;
        let created_at = chrono::Utc::now().timestamp();

        self.doc
            .update(|f| {
                if f.users.contains_key(&key) {
                    return false;
                }
                f.users.insert(
                    key,
                    UserRecord {
                        pw_hash,
                        created_at,
                        owner,
                    },
                );
                true
            })
            .await
    }

    /// Creates the first user as owner. The emptiness check happens under the
    /// document lock, so two racing setups cannot both become owner.
    pub async fn bootstrap_owner(&self, name: &str, password: &str) -> Result<bool> {
        let key = normalize_username(name);
        let pw_hash = self.hash(password).await?;
        let created_at = chrono::Utc::now().timestamp();

        self.doc
            .update(|f| {
                if !f.users.is_empty() {
                    return false;
                }
                f.users.insert(
                    key,
                    UserRecord {
                        pw_hash,
                        created_at,
                        owner: true,
                    },
                );
                true
            })
            .await
    }

    /// Removes a user. The owner and unknown names are left alone and report `false`.
    pub async fn delete_user(&self, name: &str) -> Result<bool> {
        let key = normalize_username(name);

        self.doc
            .update(|f| match f.users.get(&key) {
                Some(record) if !record.owner => {
                    f.users.remove(&key);
                    true
                }
                _ => false,
            })
            .await
    }

    pub async fn reset_password(&self, name: &str, new_password: &str) -> Result<bool> {
        if !self.is_user_present(name).await {
            return Ok(false);
        }

        let key = normalize_username(name);
        let pw_hash = self.hash(new_password).await?;

        self.doc
            .update(|f| {
                f.users.get_mut(&key).is_some_and(|record| {
                    record.pw_hash = pw_hash;
                    true
                })
            })
            .await
    }

    /// Verify password for a user. Unknown users simply fail verification.
    /// Argon2 is CPU-intensive, so it runs on the blocking pool.
    pub async fn verify_password(&self, name: &str, password: &str) -> Result<bool> {
        let key = normalize_username(name);
        let Some(password_hash) = self
            .doc
            .read(|f| f.users.get(&key).map(|r| r.pw_hash.clone()))
            .await
        else {
            return Ok(false);
        };

        let password = password.to_string();

        task::spawn_blocking(move || {
            let parsed_hash = PasswordHash::new(&password_hash)
                .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

            Ok::<bool, anyhow::Error>(
                Argon2::default()
                    .verify_password(password.as_bytes(), &parsed_hash)
                    .is_ok(),
            )
        })
        .await
        .context("Password verification task panicked")?
    }

    async fn hash(&self, password: &str) -> Result<String> {
        let password = password.to_string();
        let security = self.security.clone();
        task::spawn_blocking(move || hash_password(&password, &security))
            .await
            .context("Password hashing task panicked")?
    }
}

/// Hash a password using Argon2id with the configured cost params.
fn hash_password(password: &str, config: &SecurityConfig) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let params = Params::new(
        config.argon2_memory_cost_kib,
        config.argon2_time_cost,
        config.argon2_parallelism,
        None,
    )
    .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_security() -> SecurityConfig {
        SecurityConfig {
            argon2_memory_cost_kib: 1024,
            argon2_time_cost: 1,
            ..SecurityConfig::default()
        }
    }

    async fn open_store() -> (CredentialStore, PathBuf) {
        let path = std::env::temp_dir()
            .join(format!("advancements-users-{}", uuid::Uuid::new_v4()))
            .join("credentials.json");
        let store = CredentialStore::open(&path, fast_security()).await.unwrap();
        (store, path)
    }

    #[tokio::test]
    async fn test_create_is_case_insensitive_and_hashes() {
        let (store, path) = open_store().await;

        assert!(store.create_user("Alice", "pw1", false).await.unwrap());
        assert!(store.is_user_present("ALICE").await);
        assert!(store.verify_password("alice", "pw1").await.unwrap());
        assert!(!store.verify_password("alice", "pw2").await.unwrap());

        let raw = std::fs::read_to_string(&path).unwrap();
        let file: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let hash = file["users"]["alice"]["pw_hash"].as_str().unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(!raw.contains("pw1"));
        assert_eq!(file["users"]["alice"]["owner"], false);
    }

    #[tokio::test]
    async fn test_duplicate_create_is_noop() {
        let (store, _) = open_store().await;

        assert!(store.create_user("bob", "first", false).await.unwrap());
        assert!(!store.create_user("BOB", "second", false).await.unwrap());
        assert!(store.verify_password("bob", "first").await.unwrap());
    }

    #[tokio::test]
    async fn test_bootstrap_only_on_empty_store() {
        let (store, _) = open_store().await;

        assert!(store.bootstrap_owner("alice", "pw1").await.unwrap());
        assert!(!store.bootstrap_owner("bob", "pw2").await.unwrap());

        let alice = store.get_user("alice").await.unwrap();
        assert!(alice.owner);
        assert!(!store.is_user_present("bob").await);
    }

    #[tokio::test]
    async fn test_owner_cannot_be_deleted() {
        let (store, path) = open_store().await;
        store.bootstrap_owner("alice", "pw1").await.unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        assert!(!store.delete_user("alice").await.unwrap());

        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
        assert!(store.is_user_present("alice").await);
    }

    #[tokio::test]
    async fn test_delete_regular_and_missing_user() {
        let (store, _) = open_store().await;
        store.create_user("bob", "pw", false).await.unwrap();

        assert!(store.delete_user("Bob").await.unwrap());
        assert!(!store.is_user_present("bob").await);
        assert!(!store.delete_user("bob").await.unwrap());
    }

    #[tokio::test]
    async fn test_reset_password() {
        let (store, _) = open_store().await;
        store.create_user("bob", "old", false).await.unwrap();

        assert!(store.reset_password("bob", "new").await.unwrap());
        assert!(store.verify_password("bob", "new").await.unwrap());
        assert!(!store.verify_password("bob", "old").await.unwrap());

        assert!(!store.reset_password("nobody", "x").await.unwrap());
    }

    #[tokio::test]
    async fn test_store_survives_reopen() {
        let (store, path) = open_store().await;
        store.bootstrap_owner("alice", "pw1").await.unwrap();
        drop(store);

        let reopened = CredentialStore::open(&path, fast_security()).await.unwrap();
        let users = reopened.list_users().await;
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].username, "alice");
        assert!(users[0].owner);
        assert!(reopened.verify_password("alice", "pw1").await.unwrap());
    }
}
