use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tower_sessions::cookie::{Key, SameSite};
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};
use tracing::warn;

use crate::config::Config;
use crate::db::Store;
use crate::services::{AuthService, FileAuthService, GalleryService};

mod admin;
pub mod auth;
mod client_ip;
mod credentials;
mod error;
pub mod flash;
mod gallery;
mod observability;
mod pages;
mod types;

pub use client_ip::ClientIp;
pub use error::ApiError;
pub use observability::{logging_middleware, security_headers_middleware};
pub use types::*;

use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    pub auth: Arc<dyn AuthService>,

    pub gallery: Arc<GalleryService>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

pub async fn create_app_state(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let store = Store::open(&config).await?;

    let auth = Arc::new(FileAuthService::new(
        store,
        config.security.master_key.clone(),
        config.session_ttl_seconds(),
    )) as Arc<dyn AuthService + Send + Sync + 'static>;

    let gallery = Arc::new(GalleryService::new(&config.storage.upload_path));
    gallery
        .ensure_root()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create upload directory: {e}"))?;

    if config.security.master_key.is_none() {
        warn!("No master key configured: credentials can only be added by the first setup");
    }

    Ok(Arc::new(AppState {
        config: Arc::new(config),
        auth,
        gallery,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    }))
}

pub fn router(state: Arc<AppState>) -> Router {
    let config = state.config.clone();

    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(config.server.secure_cookies)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::hours(i64::from(
            config.server.session_ttl_hours,
        ))))
        .with_signed(session_key(config.server.secret_key.as_deref()));

    let admin_routes = Router::new()
        .route("/locked_area", get(admin::dashboard))
        .route("/upload_image", post(gallery::upload_image))
        .route("/upload_text", post(gallery::upload_text))
        .route("/admin_create_user", post(admin::create_user))
        .route("/admin_delete_user", post(admin::delete_user))
        .route("/admin_reset_password", post(admin::reset_password))
        .route("/admin_reset_attempts", post(admin::reset_attempts))
        .route("/admin_logout", post(auth::logout))
        .route("/metrics", get(observability::get_metrics))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin,
        ));

    Router::new()
        .merge(admin_routes)
        .route("/", get(gallery::index))
        .route("/advancements", get(gallery::advancements))
        .route("/advancements/{folder}", get(gallery::gallery_folder))
        .route("/locked_login", post(auth::locked_login))
        .route(
            "/set_credentials",
            get(credentials::setup_form).post(credentials::submit),
        )
        .route("/attempts_left", get(auth::attempts_left))
        .nest_service("/uploads", ServeDir::new(&config.storage.upload_path))
        .layer(DefaultBodyLimit::max(config.server.max_upload_bytes))
        .layer(session_layer)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            observability::sweep_attempts,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(observability::security_headers_middleware))
        .layer(middleware::from_fn(observability::logging_middleware))
        .with_state(state)
}

/// Cookie signing key. A configured secret shorter than 64 bytes cannot be
/// used as-is, so a random key is generated instead and sessions will not
/// survive a restart.
fn session_key(secret: Option<&str>) -> Key {
    match secret {
        Some(secret) if secret.len() >= 64 => Key::from(secret.as_bytes()),
        Some(_) => {
            warn!("SECRET_KEY is shorter than 64 bytes, using a random session key");
            random_key()
        }
        None => random_key(),
    }
}

fn random_key() -> Key {
    use rand::Rng;

    let mut bytes = [0u8; 64];
    rand::rng().fill(&mut bytes[..]);
    Key::from(&bytes)
}
