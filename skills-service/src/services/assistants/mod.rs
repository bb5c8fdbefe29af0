//! Hosted assistant client abstraction.
//!
//! A turn against an assistant is a thread of messages processed by a
//! run. The trait here exposes the individual vendor calls; polling and
//! reply extraction are built on top of it so any backend (the real
//! vendor, a scripted double) shares them.

pub mod mock;
pub mod openai;
pub mod polling;
pub mod reply;

pub use mock::{InstantDelay, ScriptedAssistant, ScriptedCall};
pub use openai::{OpenAiAssistantClient, OpenAiAssistantConfig};
pub use polling::{await_completion, Delay, PollPolicy, TokioDelay};
pub use reply::{
    fetch_latest_reply, latest_reply_text, MessageRole, ReplyPart, TextValue, ThreadMessage,
};

use crate::models::{ContentError, MessageContent, RunStatus};
use async_trait::async_trait;
use service_core::error::AppError;
use thiserror::Error;

/// Error type for assistant operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssistantError {
    /// Bad input, detected before any network call.
    #[error("{0}")]
    Validation(String),

    /// Missing credentials or agent identity. Not retryable.
    #[error("Assistant not configured: {0}")]
    Configuration(String),

    #[error("Assistant API returned status {status}: {message}")]
    Upstream { status: u16, message: String },

    /// Connection failure or transport timeout.
    #[error("Assistant API unreachable: {0}")]
    Transient(String),

    #[error("Run ended with status {0}")]
    RunFailed(RunStatus),

    #[error("Run did not finish after {attempts} polls")]
    Timeout { attempts: u32 },

    #[error("Assistant returned no text")]
    EmptyReply,
}

impl AssistantError {
    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AssistantError::Validation(_) => "validation",
            AssistantError::Configuration(_) => "configuration",
            AssistantError::Upstream { .. } => "upstream",
            AssistantError::Transient(_) => "transient",
            AssistantError::RunFailed(_) => "run_failed",
            AssistantError::Timeout { .. } => "timeout",
            AssistantError::EmptyReply => "empty_reply",
        }
    }

    /// Whether resubmitting the whole turn may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AssistantError::Transient(_) | AssistantError::Timeout { .. }
        )
    }
}

impl From<ContentError> for AssistantError {
    fn from(err: ContentError) -> Self {
        AssistantError::Validation(err.to_string())
    }
}

impl From<AssistantError> for AppError {
    fn from(err: AssistantError) -> Self {
        let summary = match &err {
            AssistantError::Validation(message) => return AppError::bad_request(message.clone()),
            AssistantError::Configuration(_) => {
                "The assistant is not configured correctly. Please contact support.".to_string()
            }
            AssistantError::Upstream { status, .. } => {
                format!("AI service returned status {}", status)
            }
            AssistantError::Transient(_) => "Could not reach the AI service.".to_string(),
            AssistantError::RunFailed(status) => {
                format!("The assistant could not complete the request (status: {}).", status)
            }
            AssistantError::Timeout { .. } => {
                "The assistant took too long to respond.".to_string()
            }
            AssistantError::EmptyReply => "The assistant returned an empty response.".to_string(),
        };
        let message = if err.is_retryable() {
            format!("{} Please try again.", summary)
        } else {
            summary
        };

        AppError::Upstream {
            message,
            detail: Some(err.to_string()),
        }
    }
}

/// Vendor calls that make up one turn.
#[async_trait]
pub trait AssistantClient: Send + Sync {
    /// Open a new remote conversation context and return its vendor id.
    async fn create_thread(&self) -> Result<String, AssistantError>;

    /// Append one user turn. Inline images are uploaded first and attached
    /// by file reference.
    async fn add_message(
        &self,
        thread_id: &str,
        content: &MessageContent,
    ) -> Result<(), AssistantError>;

    /// Start a run against the configured agent identity. The identity is
    /// checked first so a run that can never finish is not started.
    async fn start_run(&self, thread_id: &str) -> Result<String, AssistantError>;

    /// Single status check.
    async fn poll_run(&self, thread_id: &str, run_id: &str) -> Result<RunStatus, AssistantError>;

    /// Messages on the thread, newest first.
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, AssistantError>;

    /// Credentials and agent identity are present.
    fn is_configured(&self) -> bool;
}
