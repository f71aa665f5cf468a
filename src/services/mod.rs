pub mod auth_service;
pub mod auth_service_impl;
pub mod gallery;
pub mod session;

pub use auth_service::{AttemptsStatus, AuthError, AuthService, SetupOutcome};
pub use auth_service_impl::FileAuthService;
pub use gallery::{GalleryError, GalleryListing, GalleryService};
pub use session::AdminSession;
