pub mod attempts;
pub mod user;
