//! Thread message listing and assistant reply extraction.

use super::{AssistantClient, AssistantError};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    #[serde(other)]
    Other,
}

/// One message as returned by the thread message listing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    pub role: MessageRole,
    #[serde(default)]
    pub created_at: i64,
    /// Run that wrote the message; absent for messages added directly.
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub content: Vec<ReplyPart>,
}

/// Content part of a message. Only text parts contribute to the reply.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplyPart {
    Text { text: TextValue },
    #[serde(other)]
    Other,
}

/// Text either arrives as a bare string or nested under `value`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TextValue {
    Plain(String),
    Structured { value: String },
}

impl TextValue {
    pub fn as_str(&self) -> &str {
        match self {
            TextValue::Plain(text) => text,
            TextValue::Structured { value } => value,
        }
    }
}

impl ThreadMessage {
    /// Text parts concatenated in part order.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ReplyPart::Text { text } => Some(text.as_str()),
                ReplyPart::Other => None,
            })
            .collect()
    }

    /// False only for messages written by a different run.
    pub fn belongs_to_run(&self, run_id: &str) -> bool {
        self.run_id.as_deref().map_or(true, |own| own == run_id)
    }
}

/// Text of the most recent assistant message written by `run_id`. Ties on
/// `created_at` go to the message listed first.
pub fn latest_reply_text(
    messages: &[ThreadMessage],
    run_id: &str,
) -> Result<String, AssistantError> {
    let latest = messages
        .iter()
        .filter(|message| message.role == MessageRole::Assistant && message.belongs_to_run(run_id))
        .reduce(|best, candidate| {
            if candidate.created_at > best.created_at {
                candidate
            } else {
                best
            }
        })
        .ok_or(AssistantError::EmptyReply)?;

    let text = latest.text();
    if text.trim().is_empty() {
        return Err(AssistantError::EmptyReply);
    }
    Ok(text)
}

pub async fn fetch_latest_reply<C>(
    client: &C,
    thread_id: &str,
    run_id: &str,
) -> Result<String, AssistantError>
where
    C: AssistantClient + ?Sized,
{
    let messages = client.list_messages(thread_id).await?;
    tracing::debug!(thread_id, run_id, count = messages.len(), "Listed thread messages");
    latest_reply_text(&messages, run_id)
}
