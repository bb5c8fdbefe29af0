use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value};
use service_core::error::AppError;

use crate::dtos::{ConfirmQuery, LoginRequest, RegisterRequest, RegisterResponse, SessionResponse};
use crate::middleware::bearer_claims;
use crate::models::UserProfile;
use crate::utils::validation::ValidatedJson;
use crate::AppState;

const EMAIL_CONFIRMATION_TYPE: &str = "email_confirmation";

fn session_response(state: &AppState, user_id: String, email: &str) -> Result<SessionResponse, AppError> {
    let token = state.jwt.issue(&user_id, email)?;
    Ok(SessionResponse {
        success: true,
        token,
        user_id,
        expires_in: state.jwt.expiry_seconds(),
    })
}

/// Create the account, then its profile row.
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RegisterRequest>,
) -> Result<Json<RegisterResponse>, AppError> {
    let outcome = state
        .identity
        .sign_up(&payload.email, &payload.password)
        .await?;

    let profile = UserProfile {
        name: Some(payload.nome),
        phone: payload.telefone,
        instagram: payload.instagram,
        ..UserProfile::new(outcome.user_id.clone())
    };
    state.profiles.create_profile(&profile).await.map_err(|e| {
        tracing::error!(user_id = %outcome.user_id, error = %e, "Failed to create profile");
        e
    })?;

    if outcome.email_confirmed {
        let session = session_response(&state, outcome.user_id, &payload.email)?;
        return Ok(Json(RegisterResponse::Session(session)));
    }

    Ok(Json(RegisterResponse::PendingConfirmation {
        success: true,
        require_email_confirmation: true,
        message: "Please confirm your email to continue.".to_string(),
    }))
}

pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<LoginRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    let user = state
        .identity
        .sign_in(&payload.email, &payload.password)
        .await?;

    tracing::info!(user_id = %user.user_id, "User signed in");
    Ok(Json(session_response(&state, user.user_id, &user.email)?))
}

/// Target of the link in the confirmation email.
pub async fn confirm_email(
    State(state): State<AppState>,
    Query(query): Query<ConfirmQuery>,
) -> Result<Json<Value>, AppError> {
    let token = query
        .token
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("Missing confirmation token"))?;

    if query.kind.as_deref() != Some(EMAIL_CONFIRMATION_TYPE) {
        return Err(AppError::bad_request("Unsupported confirmation type"));
    }

    state.identity.confirm_email(&token).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Email confirmed"
    })))
}

/// Never rejects; reports whether the bearer token is valid.
pub async fn check_auth(State(state): State<AppState>, headers: HeaderMap) -> Json<Value> {
    let authenticated = bearer_claims(&headers, &state.jwt).is_some();
    Json(json!({ "authenticated": authenticated }))
}
