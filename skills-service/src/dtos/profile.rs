use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct PhotoUploadResponse {
    pub success: bool,
    pub photo_url: String,
    /// True when the profile had no photo before this upload.
    pub is_first_upload: bool,
    pub old_photo_url: Option<String>,
}
