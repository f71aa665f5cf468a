use serde::{Deserialize, Serialize};

use crate::db::Remaining;
use crate::services::AttemptsStatus;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BudgetDto {
    pub remaining: u32,
    pub reset_at: i64,
}

impl From<Remaining> for BudgetDto {
    fn from(r: Remaining) -> Self {
        Self {
            remaining: r.count_left,
            reset_at: r.reset_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AttemptsLeftDto {
    pub max_attempts: u32,
    pub ip: BudgetDto,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<BudgetDto>,
}

impl From<AttemptsStatus> for AttemptsLeftDto {
    fn from(status: AttemptsStatus) -> Self {
        Self {
            max_attempts: status.max_attempts,
            ip: status.ip.into(),
            user: status.user.map(Into::into),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AttemptsQuery {
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct NewCredentialsForm {
    #[serde(default)]
    pub master_key: Option<String>,
    #[serde(default)]
    pub new_login: String,
    #[serde(default)]
    pub new_pass: String,
}

#[derive(Debug, Deserialize)]
pub struct UsernameForm {
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub new_pass: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetAttemptsForm {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TextNoteForm {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub gallery: Option<String>,
}
