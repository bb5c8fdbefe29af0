use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::Json;
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::PhotoUploadResponse;
use crate::handlers::chat::multipart_error;
use crate::middleware::AuthUser;
use crate::models::{ImageFormat, InlineImage, ProfileUpdate};
use crate::services::storage::is_valid_key;
use crate::AppState;

const PHOTO_FIELD: &str = "photo";

/// `POST /profile/upload-photo`: store a png/jpg/jpeg `photo` and point the
/// profile at it. The previous photo is removed once the profile is updated.
pub async fn upload_photo(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PhotoUploadResponse>, AppError> {
    let multipart = multipart.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    let photo = read_photo(multipart, state.config.uploads.max_image_bytes).await?;

    let profile = state
        .profiles
        .get_profile(&claims.sub)
        .await?
        .ok_or_else(|| AppError::not_found("User profile not found"))?;
    let old_photo_url = profile.profile_photo_url.filter(|url| !url.is_empty());

    let key = format!("{}.{}", Uuid::new_v4().simple(), photo.format.extension());
    let prefix = &state.config.uploads.photo_url_prefix;
    let photo_url = format!("{}/{}", prefix, key);
    state.photos.upload(&key, photo.bytes).await?;

    let update = ProfileUpdate {
        profile_photo_url: Some(photo_url.clone()),
    };
    if let Err(e) = state.profiles.update_profile(&claims.sub, &update).await {
        tracing::error!(user_id = %claims.sub, error = %e, "Failed to update profile photo");
        if let Err(cleanup) = state.photos.delete(&key).await {
            tracing::warn!(key = %key, error = %cleanup, "Failed to remove orphaned photo");
        }
        return Err(AppError::Upstream {
            message: "Failed to update profile photo".to_string(),
            detail: Some(e.to_string()),
        });
    }

    if let Some(old_key) = old_photo_url
        .as_deref()
        .and_then(|url| url.strip_prefix(prefix.as_str()))
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|old_key| is_valid_key(old_key))
    {
        if let Err(e) = state.photos.delete(old_key).await {
            tracing::warn!(key = %old_key, error = %e, "Failed to remove previous photo");
        }
    }

    tracing::info!(user_id = %claims.sub, photo_url = %photo_url, "Profile photo updated");

    Ok(Json(PhotoUploadResponse {
        success: true,
        photo_url,
        is_first_upload: old_photo_url.is_none(),
        old_photo_url,
    }))
}

async fn read_photo(mut multipart: Multipart, max_bytes: usize) -> Result<InlineImage, AppError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(PHOTO_FIELD) {
            continue;
        }
        let format = field
            .file_name()
            .and_then(ImageFormat::from_file_name)
            .ok_or_else(|| AppError::bad_request("Invalid file type. Only png, jpg, jpeg allowed."))?;
        let bytes = field.bytes().await.map_err(multipart_error)?;
        return InlineImage::new(format, bytes.to_vec(), max_bytes)
            .map_err(|e| AppError::bad_request(e.to_string()));
    }
    Err(AppError::bad_request("No photo file provided"))
}
