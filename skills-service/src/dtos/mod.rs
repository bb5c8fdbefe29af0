pub mod auth;
pub mod chat;
pub mod profile;

pub use auth::{ConfirmQuery, LoginRequest, RegisterRequest, RegisterResponse, SessionResponse};
pub use chat::{ChatRequest, ChatResponse};
pub use profile::PhotoUploadResponse;
