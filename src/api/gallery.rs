use axum::{
    Form,
    extract::{Multipart, Path, State},
    response::{Html, Redirect},
};
use std::sync::Arc;
use tower_sessions::Session;

use super::flash::{self, FlashLevel};
use super::{ApiError, AppState, TextNoteForm, pages};
use crate::services::session;

const DASHBOARD: &str = "/locked_area";

/// GET /
pub async fn index(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Html<String>, ApiError> {
    let flashes = flash::take(&session).await?;
    let galleries = state.gallery.galleries().await?;
    let logged_in = session::is_valid(session::current(&session).await?.as_ref());

    Ok(pages::index(&flashes, &galleries, logged_in))
}

/// GET /advancements
pub async fn advancements(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Html<String>, ApiError> {
    let flashes = flash::take(&session).await?;
    let listing = state.gallery.list(None).await?;
    Ok(pages::gallery(&flashes, None, &listing))
}

/// GET /advancements/{folder}
pub async fn gallery_folder(
    State(state): State<Arc<AppState>>,
    Path(folder): Path<String>,
    session: Session,
) -> Result<Html<String>, ApiError> {
    let flashes = flash::take(&session).await?;
    let listing = state.gallery.list(Some(&folder)).await?;
    Ok(pages::gallery(&flashes, Some(&folder), &listing))
}

/// POST /upload_image
/// Multipart form with an `image` file and an optional `gallery` name.
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    session: Session,
    mut multipart: Multipart,
) -> Result<Redirect, ApiError> {
    let mut gallery: Option<String> = None;
    let mut upload = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Rejected multipart upload: {e}");
                return flash::redirect(
                    &session,
                    FlashLevel::Error,
                    format!("Upload failed: {}", e.body_text()),
                    DASHBOARD,
                )
                .await;
            }
        };

        let name = field.name().map(str::to_string);
        let result = match name.as_deref() {
            Some("gallery") => field.text().await.map(|t| gallery = Some(t)),
            Some("image") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                field.bytes().await.map(|b| upload = Some((filename, b)))
            }
            _ => Ok(()),
        };

        if let Err(e) = result {
            tracing::warn!("Failed to read upload field: {e}");
            return flash::redirect(
                &session,
                FlashLevel::Error,
                format!("Upload failed: {}", e.body_text()),
                DASHBOARD,
            )
            .await;
        }
    }

    let Some((filename, bytes)) = upload else {
        return flash::redirect(&session, FlashLevel::Error, "No image selected", DASHBOARD)
            .await;
    };

    let gallery = gallery.filter(|g| !g.trim().is_empty());
    match state
        .gallery
        .save_image(gallery.as_deref(), &filename, &bytes)
        .await
    {
        Ok(stored) => {
            metrics::counter!("uploads_total", "kind" => "image").increment(1);
            flash::redirect(
                &session,
                FlashLevel::Info,
                format!("Uploaded {stored}"),
                &gallery_url(gallery.as_deref()),
            )
            .await
        }
        Err(e) => flash::recover_gallery(&session, e, DASHBOARD).await,
    }
}

/// POST /upload_text
pub async fn upload_text(
    State(state): State<Arc<AppState>>,
    session: Session,
    Form(form): Form<TextNoteForm>,
) -> Result<Redirect, ApiError> {
    let gallery = form.gallery.filter(|g| !g.trim().is_empty());

    match state
        .gallery
        .append_text(gallery.as_deref(), &form.text)
        .await
    {
        Ok(()) => {
            metrics::counter!("uploads_total", "kind" => "text").increment(1);
            flash::redirect(
                &session,
                FlashLevel::Info,
                "Note added",
                &gallery_url(gallery.as_deref()),
            )
            .await
        }
        Err(e) => flash::recover_gallery(&session, e, DASHBOARD).await,
    }
}

fn gallery_url(gallery: Option<&str>) -> String {
    gallery.map_or_else(
        || "/advancements".to_string(),
        |g| format!("/advancements/{}", urlencoding::encode(g.trim())),
    )
}
