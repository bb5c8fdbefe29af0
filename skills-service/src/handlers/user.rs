use axum::{extract::State, Json};
use serde_json::{json, Value};
use service_core::error::AppError;

use crate::middleware::AuthUser;
use crate::AppState;

/// Profile of the signed-in user.
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<Value>, AppError> {
    let profile = state
        .profiles
        .get_profile(&claims.sub)
        .await?
        .ok_or_else(|| AppError::not_found("User profile not found"))?;

    Ok(Json(json!({
        "success": true,
        "user": profile,
        "email": claims.email,
    })))
}
