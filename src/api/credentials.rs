use axum::{
    Form,
    extract::State,
    response::{Html, Redirect},
};
use std::sync::Arc;
use tower_sessions::Session;

use super::flash::{self, FlashLevel};
use super::{ApiError, AppState, NewCredentialsForm, pages};

/// GET /set_credentials
pub async fn setup_form(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Html<String>, ApiError> {
    let flashes = flash::take(&session).await?;
    let initial_setup = state.auth.needs_initial_setup().await;
    Ok(pages::set_credentials(&flashes, initial_setup))
}

/// POST /set_credentials
/// Open while no user exists; afterwards the master key is required.
pub async fn submit(
    State(state): State<Arc<AppState>>,
    session: Session,
    Form(form): Form<NewCredentialsForm>,
) -> Result<Redirect, ApiError> {
    let master_key = form.master_key.as_deref().filter(|k| !k.is_empty());

    match state
        .auth
        .setup_credentials(master_key, &form.new_login, &form.new_pass)
        .await
    {
        Ok(outcome) => {
            let message = if outcome.owner {
                format!("Owner account '{}' created, you can now log in", outcome.username)
            } else {
                format!("Credentials saved for '{}'", outcome.username)
            };
            flash::redirect(&session, FlashLevel::Info, message, "/").await
        }
        Err(e) => flash::recover_auth(&session, e, "/set_credentials").await,
    }
}
