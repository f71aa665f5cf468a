//! One-shot messages carried across a redirect in the session.

use axum::response::Redirect;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use super::ApiError;
use crate::services::{AuthError, GalleryError};

const FLASH_KEY: &str = "_flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Info,
    Error,
}

impl FlashLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
}

pub async fn push(
    session: &Session,
    level: FlashLevel,
    message: impl Into<String>,
) -> Result<(), ApiError> {
    let mut pending: Vec<Flash> = session.get(FLASH_KEY).await?.unwrap_or_default();
    pending.push(Flash {
        level,
        message: message.into(),
    });
    session.insert(FLASH_KEY, pending).await?;
    Ok(())
}

/// Returns and clears the pending messages.
pub async fn take(session: &Session) -> Result<Vec<Flash>, ApiError> {
    Ok(session
        .remove::<Vec<Flash>>(FLASH_KEY)
        .await?
        .unwrap_or_default())
}

pub async fn redirect(
    session: &Session,
    level: FlashLevel,
    message: impl Into<String>,
    to: &str,
) -> Result<Redirect, ApiError> {
    push(session, level, message).await?;
    Ok(Redirect::to(to))
}

/// Turns a domain error into a flash + redirect. Storage failures are not the
/// visitor's doing and fail the request instead.
pub async fn recover_auth(
    session: &Session,
    err: AuthError,
    to: &str,
) -> Result<Redirect, ApiError> {
    if !err.is_user_facing() {
        return Err(err.into());
    }

    let message = match &err {
        AuthError::RateLimited { reset_at } => {
            match chrono::DateTime::from_timestamp(*reset_at, 0) {
                Some(at) => format!("{err}. Try again after {}.", at.format("%Y-%m-%d %H:%M UTC")),
                None => format!("{err}."),
            }
        }
        other => other.to_string(),
    };

    redirect(session, FlashLevel::Error, message, to).await
}

pub async fn recover_gallery(
    session: &Session,
    err: GalleryError,
    to: &str,
) -> Result<Redirect, ApiError> {
    match err {
        GalleryError::Io(_) => Err(err.into()),
        other => redirect(session, FlashLevel::Error, other.to_string(), to).await,
    }
}
