use axum::{
    Extension, Form,
    extract::State,
    response::{Html, Redirect},
};
use std::sync::Arc;
use tower_sessions::Session;

use super::flash::{self, FlashLevel};
use super::pages::{self, DashboardView};
use super::{
    ApiError, AppState, NewCredentialsForm, ResetAttemptsForm, ResetPasswordForm, UsernameForm,
};
use crate::db::AttemptScope;
use crate::services::AuthError;
use crate::services::session::AdminSession;

const DASHBOARD: &str = "/locked_area";

/// GET /locked_area
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AdminSession>,
    session: Session,
) -> Result<Html<String>, ApiError> {
    let flashes = flash::take(&session).await?;
    let users = state.auth.list_users().await;
    let user_counters = state.auth.counters(AttemptScope::User).await;
    let ip_counters = state.auth.counters(AttemptScope::Ip).await;
    let galleries = state.gallery.galleries().await?;

    Ok(pages::dashboard(
        &flashes,
        &DashboardView {
            username: &admin.username,
            users: &users,
            user_counters: &user_counters,
            ip_counters: &ip_counters,
            galleries: &galleries,
        },
    ))
}

/// POST /admin_create_user
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    session: Session,
    Form(form): Form<NewCredentialsForm>,
) -> Result<Redirect, ApiError> {
    match state.auth.create_user(&form.new_login, &form.new_pass).await {
        Ok(user) => {
            flash::redirect(
                &session,
                FlashLevel::Info,
                format!("User '{}' created", user.username),
                DASHBOARD,
            )
            .await
        }
        Err(e) => flash::recover_auth(&session, e, DASHBOARD).await,
    }
}

/// POST /admin_delete_user
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AdminSession>,
    session: Session,
    Form(form): Form<UsernameForm>,
) -> Result<Redirect, ApiError> {
    let target = crate::db::repositories::user::normalize_username(&form.username);

    let result = if target == admin.username {
        Err(AuthError::Forbidden(
            "You cannot delete the account you are logged in with".to_string(),
        ))
    } else {
        state.auth.delete_user(&target).await
    };

    match result {
        Ok(()) => {
            flash::redirect(
                &session,
                FlashLevel::Info,
                format!("User '{target}' deleted"),
                DASHBOARD,
            )
            .await
        }
        Err(e) => flash::recover_auth(&session, e, DASHBOARD).await,
    }
}

/// POST /admin_reset_password
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    session: Session,
    Form(form): Form<ResetPasswordForm>,
) -> Result<Redirect, ApiError> {
    match state
        .auth
        .reset_password(&form.username, &form.new_pass)
        .await
    {
        Ok(()) => {
            flash::redirect(
                &session,
                FlashLevel::Info,
                format!("Password reset for '{}'", form.username.trim()),
                DASHBOARD,
            )
            .await
        }
        Err(e) => flash::recover_auth(&session, e, DASHBOARD).await,
    }
}

/// POST /admin_reset_attempts
/// Without a scope the key is reset in both the user and the IP family.
pub async fn reset_attempts(
    State(state): State<Arc<AppState>>,
    session: Session,
    Form(form): Form<ResetAttemptsForm>,
) -> Result<Redirect, ApiError> {
    let scopes = match form.scope.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => vec![AttemptScope::User, AttemptScope::Ip],
        Some(raw) => match raw.parse::<AttemptScope>() {
            Ok(scope) => vec![scope],
            Err(msg) => {
                return flash::recover_auth(&session, AuthError::Validation(msg), DASHBOARD).await;
            }
        },
    };

    for scope in scopes {
        if let Err(e) = state.auth.reset_attempts(&form.key, scope).await {
            return flash::recover_auth(&session, e, DASHBOARD).await;
        }
    }

    flash::redirect(
        &session,
        FlashLevel::Info,
        format!("Attempts reset for '{}'", form.key.trim()),
        DASHBOARD,
    )
    .await
}
