//! User turn content and its validation.
//!
//! Everything here runs before any network call, so a malformed turn never
//! reaches the vendor.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const DATA_URI_IMAGE_PREFIX: &str = "data:image/";

/// Why a turn's content was rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContentError {
    #[error("Unsupported message type: {0}")]
    UnknownKind(String),

    #[error("No message provided")]
    EmptyText,

    #[error("Image URL must start with http:// or https://")]
    InvalidUrl,

    #[error("Invalid image data. Expected base64 data URI.")]
    NotDataUri,

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid base64 image data")]
    InvalidBase64,

    #[error("Image is {size} bytes, the limit is {limit} bytes")]
    ImageTooLarge { size: usize, limit: usize },
}

/// Declared kind of a user turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Text,
    ImageUrl,
    ImageInline,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::ImageUrl => "image_url",
            ContentKind::ImageInline => "image_inline",
        }
    }

    pub fn is_image(&self) -> bool {
        !matches!(self, ContentKind::Text)
    }
}

impl FromStr for ContentKind {
    type Err = ContentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ContentKind::Text),
            "image_url" | "image-url" => Ok(ContentKind::ImageUrl),
            "image_inline" | "image-inline" | "image" => Ok(ContentKind::ImageInline),
            other => Err(ContentError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Image encodings the assistants accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    /// Match a MIME subtype such as the `png` in `image/png`.
    pub fn from_subtype(subtype: &str) -> Option<Self> {
        match subtype.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Some(ImageFormat::Jpeg),
            "png" => Some(ImageFormat::Png),
            _ => None,
        }
    }

    /// Match the extension of an uploaded file name.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let (_, extension) = file_name.rsplit_once('.')?;
        Self::from_subtype(extension)
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
        }
    }
}

/// Decoded image carried inline with the turn.
#[derive(Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub format: ImageFormat,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for InlineImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InlineImage")
            .field("format", &self.format)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl InlineImage {
    pub fn new(format: ImageFormat, bytes: Vec<u8>, max_bytes: usize) -> Result<Self, ContentError> {
        if bytes.len() > max_bytes {
            return Err(ContentError::ImageTooLarge {
                size: bytes.len(),
                limit: max_bytes,
            });
        }
        Ok(Self { format, bytes })
    }

    /// Parse `data:image/<subtype>[;base64],<payload>`.
    pub fn from_data_uri(raw: &str, max_bytes: usize) -> Result<Self, ContentError> {
        let rest = raw
            .strip_prefix(DATA_URI_IMAGE_PREFIX)
            .ok_or(ContentError::NotDataUri)?;
        let (header, payload) = rest.split_once(',').ok_or(ContentError::NotDataUri)?;

        let subtype = header.split(';').next().unwrap_or_default();
        let format = ImageFormat::from_subtype(subtype)
            .ok_or_else(|| ContentError::UnsupportedFormat(subtype.to_string()))?;

        let compact: String = payload
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        if compact.is_empty() {
            return Err(ContentError::InvalidBase64);
        }
        let bytes = STANDARD
            .decode(compact.as_bytes())
            .map_err(|_| ContentError::InvalidBase64)?;

        Self::new(format, bytes, max_bytes)
    }

    pub fn to_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.format.mime_type(),
            STANDARD.encode(&self.bytes)
        )
    }
}

/// A validated user turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    Text(String),
    ImageUrl(String),
    InlineImage(InlineImage),
}

impl MessageContent {
    pub fn parse(kind: ContentKind, raw: &str, max_image_bytes: usize) -> Result<Self, ContentError> {
        match kind {
            ContentKind::Text => {
                if raw.trim().is_empty() {
                    return Err(ContentError::EmptyText);
                }
                Ok(MessageContent::Text(raw.to_string()))
            }
            ContentKind::ImageUrl => {
                let url = raw.trim();
                if !has_http_scheme(url) {
                    return Err(ContentError::InvalidUrl);
                }
                Ok(MessageContent::ImageUrl(url.to_string()))
            }
            ContentKind::ImageInline => {
                InlineImage::from_data_uri(raw.trim(), max_image_bytes).map(MessageContent::InlineImage)
            }
        }
    }

    pub fn kind(&self) -> ContentKind {
        match self {
            MessageContent::Text(_) => ContentKind::Text,
            MessageContent::ImageUrl(_) => ContentKind::ImageUrl,
            MessageContent::InlineImage(_) => ContentKind::ImageInline,
        }
    }

    /// Representation written to the conversation journal.
    pub fn journal_form(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::ImageUrl(url) => url.clone(),
            MessageContent::InlineImage(image) => image.to_data_uri(),
        }
    }
}

fn has_http_scheme(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    ["http://", "https://"]
        .iter()
        .any(|scheme| lower.starts_with(scheme) && lower.len() > scheme.len())
}
