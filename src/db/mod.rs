use anyhow::Result;
use tracing::info;

use crate::config::Config;

pub mod document;
pub mod repositories;

pub use document::JsonDocument;
pub use repositories::attempts::{AttemptCounter, AttemptLimiter, AttemptScope, Remaining};
pub use repositories::user::{CredentialStore, User};

/// Handles to the two flat-file documents backing the login core.
#[derive(Clone)]
pub struct Store {
    pub users: CredentialStore,

    pub attempts: AttemptLimiter,
}

impl Store {
    pub async fn open(config: &Config) -> Result<Self> {
        let users =
            CredentialStore::open(&config.storage.credentials_path, config.security.clone())
                .await?;
        let attempts =
            AttemptLimiter::open(&config.storage.attempts_path, &config.security.auth_throttle)
                .await?;

        info!(
            credentials = %config.storage.credentials_path.display(),
            attempts = %config.storage.attempts_path.display(),
            "Credential and attempt stores opened"
        );

        Ok(Self { users, attempts })
    }
}
