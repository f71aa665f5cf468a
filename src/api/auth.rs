use axum::{
    Form, Json,
    extract::{Query, Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use tower_sessions::Session;

use super::flash::{self, FlashLevel};
use super::{ApiError, ApiResponse, AppState, AttemptsLeftDto, AttemptsQuery, ClientIp, LoginForm};
use crate::services::session::{self, AdminSession};

// ============================================================================
// Middleware
// ============================================================================

/// Route guard for the admin pages. A live session is passed on to the
/// handler as an `AdminSession` extension; anything else is sent back to the
/// index with a message.
pub async fn require_admin(
    session: Session,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let now = chrono::Utc::now().timestamp();

    match session::current(&session).await? {
        Some(admin) if admin.is_valid_at(now) => {
            tracing::Span::current().record("user_id", admin.username.as_str());
            request.extensions_mut().insert(admin);
            Ok(next.run(request).await)
        }
        Some(admin) => {
            tracing::info!(user = %admin.username, "Admin session expired");
            session::logout(&session).await?;
            let redirect = flash::redirect(
                &session,
                FlashLevel::Error,
                "Your session has expired, please log in again",
                "/",
            )
            .await?;
            Ok(redirect.into_response())
        }
        None => {
            let redirect =
                flash::redirect(&session, FlashLevel::Error, "Please log in first", "/").await?;
            Ok(redirect.into_response())
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /locked_login
pub async fn locked_login(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Redirect, ApiError> {
    match state.auth.login(&form.username, &form.password, &ip).await {
        Ok(admin) => {
            session::start(&session, &admin).await?;
            flash::redirect(
                &session,
                FlashLevel::Info,
                format!("Welcome, {}", admin.username),
                "/locked_area",
            )
            .await
        }
        Err(e) => flash::recover_auth(&session, e, "/").await,
    }
}

/// POST /admin_logout
pub async fn logout(
    session: Session,
    axum::Extension(admin): axum::Extension<AdminSession>,
) -> Result<Redirect, ApiError> {
    session::logout(&session).await?;
    tracing::info!(user = %admin.username, "Admin logged out");
    Ok(Redirect::to("/"))
}

/// GET /attempts_left
/// Remaining login budget for the caller's IP and optionally a username.
pub async fn attempts_left(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    Query(query): Query<AttemptsQuery>,
) -> Result<Json<ApiResponse<AttemptsLeftDto>>, ApiError> {
    let status = state
        .auth
        .attempts_left(&ip, query.username.as_deref())
        .await?;

    Ok(Json(ApiResponse::success(status.into())))
}
