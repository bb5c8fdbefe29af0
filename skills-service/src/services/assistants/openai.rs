//! OpenAI Assistants (v2) implementation of [`AssistantClient`].

use super::{AssistantClient, AssistantError, ThreadMessage};
use crate::models::{InlineImage, MessageContent, RunStatus};
use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ASSISTANTS_BETA_HEADER: &str = "OpenAI-Beta";
const ASSISTANTS_BETA_VERSION: &str = "assistants=v2";

/// Messages fetched when looking for the reply; the newest come first.
const REPLY_PAGE_SIZE: u32 = 20;

/// Longest vendor error text kept in an error value.
const MAX_ERROR_DETAIL: usize = 300;

/// Connection settings for one agent identity.
#[derive(Debug, Clone)]
pub struct OpenAiAssistantConfig {
    pub api_key: Secret<String>,
    pub base_url: String,
    pub assistant_id: String,
    pub request_timeout: Duration,
}

pub struct OpenAiAssistantClient {
    config: OpenAiAssistantConfig,
    client: Client,
}

impl OpenAiAssistantClient {
    pub fn new(config: OpenAiAssistantConfig) -> Result<Self, AssistantError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AssistantError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn assistant_id(&self) -> &str {
        &self.config.assistant_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(self.config.api_key.expose_secret())
            .header(ASSISTANTS_BETA_HEADER, ASSISTANTS_BETA_VERSION)
    }

    fn ensure_credentials(&self) -> Result<(), AssistantError> {
        if self.config.api_key.expose_secret().trim().is_empty() {
            return Err(AssistantError::Configuration(
                "API key is not set".to_string(),
            ));
        }
        Ok(())
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, AssistantError> {
        self.ensure_credentials()?;
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| AssistantError::Transient(e.to_string()))?;
        check_status(response).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, AssistantError> {
        let response = self.send(builder).await?;
        let status = response.status().as_u16();
        response.json::<T>().await.map_err(|e| {
            // Only a body that arrived whole but does not parse is the
            // vendor's fault. A reset or timeout mid-body is transport.
            if e.is_decode() {
                AssistantError::Upstream {
                    status,
                    message: format!("Failed to parse response: {}", e),
                }
            } else {
                AssistantError::Transient(e.to_string())
            }
        })
    }

    /// Upload an inline image for vision use and return its file id.
    pub async fn upload_image(&self, image: &InlineImage) -> Result<String, AssistantError> {
        let part = multipart::Part::bytes(image.bytes.clone())
            .file_name(format!("upload.{}", image.format.extension()))
            .mime_str(image.format.mime_type())
            .map_err(|e| AssistantError::Validation(e.to_string()))?;
        let form = multipart::Form::new()
            .text("purpose", "vision")
            .part("file", part);

        tracing::debug!(bytes = image.bytes.len(), "Uploading image to assistant files");

        let file: ObjectId = self
            .send_json(self.client.post(self.url("files")).multipart(form))
            .await?;
        Ok(file.id)
    }

    /// Existence check for the configured agent identity.
    pub async fn verify_assistant(&self) -> Result<(), AssistantError> {
        if self.config.assistant_id.trim().is_empty() {
            return Err(AssistantError::Configuration(
                "assistant id is not set".to_string(),
            ));
        }

        let path = format!("assistants/{}", self.config.assistant_id);
        match self.send(self.client.get(self.url(&path))).await {
            Ok(_) => Ok(()),
            Err(AssistantError::Upstream { status: 404, .. }) => {
                Err(AssistantError::Configuration(format!(
                    "assistant {} does not exist",
                    self.config.assistant_id
                )))
            }
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl AssistantClient for OpenAiAssistantClient {
    async fn create_thread(&self) -> Result<String, AssistantError> {
        let thread: ObjectId = self
            .send_json(
                self.client
                    .post(self.url("threads"))
                    .json(&serde_json::json!({})),
            )
            .await?;
        tracing::debug!(vendor_thread_id = %thread.id, "Created assistant thread");
        Ok(thread.id)
    }

    async fn add_message(
        &self,
        thread_id: &str,
        content: &MessageContent,
    ) -> Result<(), AssistantError> {
        let body = match content {
            MessageContent::Text(text) => NewMessage::text(text.clone()),
            MessageContent::ImageUrl(url) => NewMessage::part(ContentPart::ImageUrl {
                image_url: ImageUrlRef { url: url.clone() },
            }),
            MessageContent::InlineImage(image) => {
                let file_id = self.upload_image(image).await?;
                NewMessage::part(ContentPart::ImageFile {
                    image_file: ImageFileRef { file_id },
                })
            }
        };

        let path = format!("threads/{}/messages", thread_id);
        let message: ObjectId = self
            .send_json(self.client.post(self.url(&path)).json(&body))
            .await?;
        tracing::debug!(
            vendor_thread_id = thread_id,
            message_id = %message.id,
            kind = %content.kind(),
            "Added message to thread"
        );
        Ok(())
    }

    async fn start_run(&self, thread_id: &str) -> Result<String, AssistantError> {
        self.verify_assistant().await?;

        let path = format!("threads/{}/runs", thread_id);
        let run: ObjectId = self
            .send_json(self.client.post(self.url(&path)).json(&NewRun {
                assistant_id: &self.config.assistant_id,
            }))
            .await?;
        tracing::info!(vendor_thread_id = thread_id, run_id = %run.id, "Started run");
        Ok(run.id)
    }

    async fn poll_run(&self, thread_id: &str, run_id: &str) -> Result<RunStatus, AssistantError> {
        let path = format!("threads/{}/runs/{}", thread_id, run_id);
        let run: RunObject = self.send_json(self.client.get(self.url(&path))).await?;
        Ok(run.status)
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, AssistantError> {
        let path = format!("threads/{}/messages", thread_id);
        let limit = REPLY_PAGE_SIZE.to_string();
        let list: MessageList = self
            .send_json(
                self.client
                    .get(self.url(&path))
                    .query(&[("order", "desc"), ("limit", limit.as_str())]),
            )
            .await?;
        Ok(list.data)
    }

    fn is_configured(&self) -> bool {
        !self.config.api_key.expose_secret().trim().is_empty()
            && !self.config.assistant_id.trim().is_empty()
    }
}

/// Map a non-2xx response to an error. Rejected credentials are a
/// configuration problem; the response body is not kept for them.
async fn check_status(response: Response) -> Result<Response, AssistantError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        return Err(AssistantError::Configuration(format!(
            "credentials rejected with status {}",
            status.as_u16()
        )));
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.chars().take(MAX_ERROR_DETAIL).collect());

    Err(AssistantError::Upstream {
        status: status.as_u16(),
        message,
    })
}

// Wire types

#[derive(Debug, Deserialize)]
struct ObjectId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RunObject {
    status: RunStatus,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    data: Vec<ThreadMessage>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Serialize)]
struct NewRun<'a> {
    assistant_id: &'a str,
}

#[derive(Debug, Serialize)]
struct NewMessage {
    role: &'static str,
    content: NewMessageContent,
}

impl NewMessage {
    fn text(text: String) -> Self {
        Self {
            role: "user",
            content: NewMessageContent::Text(text),
        }
    }

    fn part(part: ContentPart) -> Self {
        Self {
            role: "user",
            content: NewMessageContent::Parts(vec![part]),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum NewMessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    ImageUrl { image_url: ImageUrlRef },
    ImageFile { image_file: ImageFileRef },
}

#[derive(Debug, Serialize)]
struct ImageUrlRef {
    url: String,
}

#[derive(Debug, Serialize)]
struct ImageFileRef {
    file_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client(api_key: &str, assistant_id: &str) -> OpenAiAssistantClient {
        OpenAiAssistantClient::new(OpenAiAssistantConfig {
            api_key: Secret::new(api_key.to_string()),
            base_url: "http://127.0.0.1:9/v1/".to_string(),
            assistant_id: assistant_id.to_string(),
            request_timeout: Duration::from_secs(1),
        })
        .unwrap()
    }

    #[test]
    fn message_bodies_match_the_wire_format() {
        let text = serde_json::to_value(NewMessage::text("hi".to_string())).unwrap();
        assert_eq!(text, json!({"role": "user", "content": "hi"}));

        let image = serde_json::to_value(NewMessage::part(ContentPart::ImageFile {
            image_file: ImageFileRef {
                file_id: "file_1".to_string(),
            },
        }))
        .unwrap();
        assert_eq!(
            image,
            json!({
                "role": "user",
                "content": [{"type": "image_file", "image_file": {"file_id": "file_1"}}]
            })
        );
    }

    #[test]
    fn urls_join_without_double_slash() {
        assert_eq!(
            client("k", "asst").url("threads"),
            "http://127.0.0.1:9/v1/threads"
        );
    }

    #[test]
    fn configured_needs_key_and_identity() {
        assert!(client("k", "asst").is_configured());
        assert!(!client("", "asst").is_configured());
        assert!(!client("k", " ").is_configured());
    }

    #[tokio::test]
    async fn missing_identity_fails_before_any_request() {
        let err = client("k", "").start_run("thread_1").await.unwrap_err();
        assert!(matches!(err, AssistantError::Configuration(_)));
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let err = client("", "asst").create_thread().await.unwrap_err();
        assert!(matches!(err, AssistantError::Configuration(_)));
    }
}
