//! Supabase gateway: GoTrue for accounts, PostgREST for profiles and the
//! message journal.

use super::identity::{IdentityProvider, ProfileStore, SignUpOutcome, SignedInUser};
use super::journal::{JournalEntry, MessageJournal};
use super::StoreError;
use crate::config::SupabaseConfig;
use crate::models::{ProfileUpdate, UserProfile};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, Secret};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const PREFER_MINIMAL: (&str, &str) = ("Prefer", "return=minimal");

pub struct SupabaseClient {
    base_url: String,
    api_key: Secret<String>,
    messages_table: String,
    profiles_table: String,
    client: Client,
}

impl SupabaseClient {
    pub fn new(config: &SupabaseConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(format!("HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            messages_table: config.messages_table.clone(),
            profiles_table: config.profiles_table.clone(),
            client,
        })
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, StoreError> {
        let key = self.api_key.expose_secret();
        let response = builder
            .header("apikey", key)
            .bearer_auth(key)
            .send()
            .await?;
        check_status(response).await
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, StoreError> {
        Ok(self.send(builder).await?.json::<T>().await?)
    }

    /// PostgREST call made on the service's own behalf. A 4xx here means
    /// our key or schema is wrong, not the caller's input.
    async fn send_table(&self, builder: RequestBuilder) -> Result<Response, StoreError> {
        self.send(builder).await.map_err(StoreError::refused)
    }

    fn id_filter(user_id: &str) -> String {
        format!("eq.{}", user_id)
    }
}

/// 5xx is an outage; any other non-2xx carries the backend's message.
async fn check_status(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(ErrorBody::into_message)
        .unwrap_or_else(|| format!("status {}", status.as_u16()));

    if status.is_server_error() {
        Err(StoreError::Unavailable(message))
    } else {
        Err(StoreError::Rejected(message))
    }
}

#[async_trait]
impl IdentityProvider for SupabaseClient {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, StoreError> {
        let response: SignUpResponse = self
            .send_json(
                self.client
                    .post(self.auth_url("signup"))
                    .json(&Credentials { email, password }),
            )
            .await?;

        let outcome = response.into_outcome()?;
        tracing::info!(
            user_id = %outcome.user_id,
            email_confirmed = outcome.email_confirmed,
            "Account created"
        );
        Ok(outcome)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<SignedInUser, StoreError> {
        let request = self
            .client
            .post(self.auth_url("token"))
            .query(&[("grant_type", "password")])
            .json(&Credentials { email, password });

        let session: SessionResponse = match self.send_json(request).await {
            Ok(session) => session,
            Err(StoreError::Rejected(message)) => {
                tracing::info!(reason = %message, "Password sign in rejected");
                return Err(StoreError::InvalidCredentials);
            }
            Err(err) => return Err(err),
        };

        Ok(SignedInUser {
            user_id: session.user.id,
            email: session.user.email.unwrap_or_else(|| email.to_string()),
        })
    }

    async fn confirm_email(&self, token_hash: &str) -> Result<(), StoreError> {
        self.send(self.client.post(self.auth_url("verify")).json(&VerifyRequest {
            kind: "email",
            token_hash,
        }))
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for SupabaseClient {
    async fn create_profile(&self, profile: &UserProfile) -> Result<(), StoreError> {
        self.send_table(
            self.client
                .post(self.table_url(&self.profiles_table))
                .header(PREFER_MINIMAL.0, PREFER_MINIMAL.1)
                .json(profile),
        )
        .await?;
        Ok(())
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        let id_filter = Self::id_filter(user_id);
        let rows: Vec<UserProfile> = self
            .send_table(
                self.client
                    .get(self.table_url(&self.profiles_table))
                    .query(&[("id", id_filter.as_str()), ("select", "*")]),
            )
            .await?
            .json()
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> Result<(), StoreError> {
        let id_filter = Self::id_filter(user_id);
        self.send_table(
            self.client
                .patch(self.table_url(&self.profiles_table))
                .query(&[("id", id_filter.as_str())])
                .header(PREFER_MINIMAL.0, PREFER_MINIMAL.1)
                .json(update),
        )
        .await?;
        tracing::debug!(user_id, "Profile updated");
        Ok(())
    }
}

#[async_trait]
impl MessageJournal for SupabaseClient {
    async fn append(&self, entry: &JournalEntry) -> Result<(), StoreError> {
        self.send_table(
            self.client
                .post(self.table_url(&self.messages_table))
                .header(PREFER_MINIMAL.0, PREFER_MINIMAL.1)
                .json(entry),
        )
        .await?;
        Ok(())
    }
}

// Wire types

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    token_hash: &'a str,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_confirmed_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    user: AuthUser,
}

/// Sign up answers with a session when email confirmation is off and with
/// the bare user otherwise.
#[derive(Debug, Deserialize)]
struct SignUpResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    user: Option<AuthUser>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    email_confirmed_at: Option<String>,
}

impl SignUpResponse {
    fn into_outcome(self) -> Result<SignUpOutcome, StoreError> {
        let has_session = self.access_token.is_some();
        let (user_id, confirmed_at) = match self.user {
            Some(user) => (user.id, user.email_confirmed_at),
            None => (
                self.id.ok_or_else(|| {
                    StoreError::InvalidResponse("sign up response has no user id".to_string())
                })?,
                self.email_confirmed_at,
            ),
        };

        Ok(SignUpOutcome {
            user_id,
            email_confirmed: has_session || confirmed_at.is_some(),
        })
    }
}

/// GoTrue and PostgREST spell their error text differently.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    msg: Option<String>,
    message: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        self.msg
            .or(self.error_description)
            .or(self.message)
            .or(self.error)
    }
}
