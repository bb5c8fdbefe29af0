use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[validate(length(min = 1, message = "Name is required"))]
    pub nome: String,
    #[serde(default)]
    pub telefone: Option<String>,
    #[serde(default)]
    pub instagram: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Query string of the confirmation link sent by email.
#[derive(Debug, Deserialize)]
pub struct ConfirmQuery {
    pub token: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub success: bool,
    pub token: String,
    pub user_id: String,
    pub expires_in: i64,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum RegisterResponse {
    Session(SessionResponse),
    #[serde(rename_all = "camelCase")]
    PendingConfirmation {
        success: bool,
        require_email_confirmation: bool,
        message: String,
    },
}
