use axum::{
    extract::{FromRequest, Multipart, Path, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    Json,
};
use chrono::Utc;
use service_core::error::AppError;

use crate::dtos::{ChatRequest, ChatResponse};
use crate::middleware::AuthUser;
use crate::models::{AccessStatus, ContentKind, ImageFormat, InlineImage, Skill};
use crate::services::TurnRequest;
use crate::utils::validation::json_rejection;
use crate::AppState;

const IMAGE_FIELD: &str = "image";
const THREAD_ID_FIELD: &str = "thread_id";

/// `POST /{skill}/chat`: one turn with the skill's assistant, as JSON
/// `{message, type, thread_id?}` or multipart with an `image` file.
pub async fn chat(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    AuthUser(claims): AuthUser,
    request: Request,
) -> Result<Json<ChatResponse>, AppError> {
    let skill = Skill::from_slug(&slug)
        .ok_or_else(|| AppError::not_found(format!("Unknown skill: {}", slug)))?;
    let orchestrator = state
        .skills
        .get(skill)
        .ok_or_else(|| AppError::not_found(format!("Unknown skill: {}", slug)))?;

    let profile = state
        .profiles
        .get_profile(&claims.sub)
        .await?
        .ok_or_else(|| AppError::not_found("User profile not found"))?;

    let access = profile.access_status(Utc::now(), state.access_offset);
    match &access {
        AccessStatus::Expired(expired_at) => {
            tracing::info!(user_id = %claims.sub, %expired_at, "Access expired");
        }
        AccessStatus::Unreadable(raw) => {
            tracing::warn!(user_id = %claims.sub, value = %raw, "Unreadable access_expiration");
        }
        AccessStatus::Unrestricted | AccessStatus::ActiveUntil(_) => {}
    }
    if !access.allows_access() {
        return Err(AppError::forbidden("Access expired"));
    }

    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let turn = if content_type.starts_with("application/json") {
        let Json(body) = Json::<ChatRequest>::from_request(request, &state)
            .await
            .map_err(json_rejection)?;
        json_turn(claims.sub, body)?
    } else if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
        multipart_turn(claims.sub, multipart, state.config.uploads.max_image_bytes).await?
    } else {
        return Err(AppError::bad_request("Unsupported content type"));
    };

    let reply = orchestrator.handle_turn(turn).await?;

    Ok(Json(ChatResponse {
        success: true,
        response: reply.reply,
        thread_id: reply.thread_id,
    }))
}

fn json_turn(user_id: String, body: ChatRequest) -> Result<TurnRequest, AppError> {
    let message = body
        .message
        .ok_or_else(|| AppError::bad_request("No message provided"))?;

    Ok(TurnRequest {
        user_id,
        thread_id: body.thread_id,
        content: message,
        kind: body
            .kind
            .unwrap_or_else(|| ContentKind::Text.as_str().to_string()),
    })
}

/// Read the uploaded image into an inline data URI turn.
async fn multipart_turn(
    user_id: String,
    mut multipart: Multipart,
    max_image_bytes: usize,
) -> Result<TurnRequest, AppError> {
    let mut image = None;
    let mut thread_id = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(IMAGE_FIELD) => {
                let format = field
                    .file_name()
                    .and_then(ImageFormat::from_file_name)
                    .ok_or_else(|| {
                        AppError::bad_request("Invalid file type. Only png, jpg, jpeg allowed.")
                    })?;
                let bytes = field.bytes().await.map_err(multipart_error)?;
                let inline = InlineImage::new(format, bytes.to_vec(), max_image_bytes)
                    .map_err(|e| AppError::bad_request(e.to_string()))?;
                image = Some(inline);
            }
            Some(THREAD_ID_FIELD) => {
                thread_id = Some(field.text().await.map_err(multipart_error)?);
            }
            _ => {}
        }
    }

    let image = image.ok_or_else(|| AppError::bad_request("No image file provided"))?;

    Ok(TurnRequest {
        user_id,
        thread_id,
        content: image.to_data_uri(),
        kind: ContentKind::ImageInline.as_str().to_string(),
    })
}

pub(crate) fn multipart_error(err: axum::extract::multipart::MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError::PayloadTooLarge("Request body is too large".to_string());
    }
    AppError::bad_request(err.body_text())
}
