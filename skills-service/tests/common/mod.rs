//! Test helpers for skills-service integration tests.
//!
//! Builds the real router over in-memory account, profile and journal
//! stores and scripted assistants, so no network is needed.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::FixedOffset;
use http_body_util::BodyExt;
use secrecy::Secret;
use serde_json::Value;
use skills_service::{
    config::{
        AccessConfig, JwtConfig, OpenAiConfig, SkillAssistants, SkillsConfig, SupabaseConfig,
        ThreadConfig, UploadConfig,
    },
    models::{ProfileUpdate, Skill, UserProfile},
    services::{
        assistants::{InstantDelay, PollPolicy, ScriptedAssistant},
        identity::{SignUpOutcome, SignedInUser},
        journal::MemoryJournal,
        ConversationOrchestrator, IdentityProvider, JwtService, PhotoStorage, ProfileStore,
        SkillRegistry, StoreError,
    },
    startup::build_router,
    AppState,
};
use std::collections::HashMap;
use service_core::error::AppError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

pub const MAX_IMAGE_BYTES: usize = 1024;
pub const MAX_REQUEST_BYTES: usize = 64 * 1024;
pub const CONFIRM_TOKEN: &str = "confirm-token-hash";
pub const PHOTO_URL_PREFIX: &str = "/static/img/profile_photos";

pub fn test_config(openai_base_url: &str) -> SkillsConfig {
    SkillsConfig {
        common: service_core::config::Config::default(),
        environment: "test".to_string(),
        openai: OpenAiConfig {
            api_key: Secret::new("sk-test".to_string()),
            base_url: openai_base_url.to_string(),
            request_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(1),
            poll_max_attempts: 60,
        },
        skills: SkillAssistants {
            analista_assistant_id: "asst_analista".to_string(),
            conteudo_assistant_id: "asst_conteudo".to_string(),
        },
        supabase: SupabaseConfig {
            url: "http://127.0.0.1:9".to_string(),
            api_key: Secret::new("sb-test".to_string()),
            messages_table: "messages".to_string(),
            profiles_table: "profiles".to_string(),
            request_timeout: Duration::from_secs(5),
        },
        jwt: JwtConfig {
            secret: Secret::new("test-jwt-secret".to_string()),
            expiry_hours: 24,
        },
        uploads: UploadConfig {
            max_image_bytes: MAX_IMAGE_BYTES,
            max_request_bytes: MAX_REQUEST_BYTES,
            photo_dir: std::env::temp_dir()
                .join("skills-service-test-photos")
                .display()
                .to_string(),
            photo_url_prefix: PHOTO_URL_PREFIX.to_string(),
        },
        threads: ThreadConfig {
            max_threads: 1_000,
            idle_ttl: Duration::from_secs(3600),
        },
        access: AccessConfig {
            utc_offset_hours: -3,
        },
        allowed_origins: vec!["http://localhost:5000".to_string()],
        otlp_endpoint: None,
    }
}

struct Account {
    user_id: String,
    password: String,
    confirmed: bool,
}

/// In-memory stand-in for the hosted auth service.
#[derive(Default)]
pub struct FakeIdentity {
    accounts: Mutex<HashMap<String, Account>>,
    /// New accounts start confirmed when set.
    pub auto_confirm: bool,
}

impl FakeIdentity {
    pub fn auto_confirming() -> Self {
        Self {
            auto_confirm: true,
            ..Self::default()
        }
    }

    pub fn add_account(&self, email: &str, password: &str, user_id: &str) {
        self.accounts.lock().unwrap().insert(
            email.to_string(),
            Account {
                user_id: user_id.to_string(),
                password: password.to_string(),
                confirmed: true,
            },
        );
    }

    pub fn is_confirmed(&self, email: &str) -> bool {
        self.accounts
            .lock()
            .unwrap()
            .get(email)
            .is_some_and(|account| account.confirmed)
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, StoreError> {
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.contains_key(email) {
            return Err(StoreError::Rejected("User already registered".to_string()));
        }
        let user_id = format!("user-{}", accounts.len() + 1);
        accounts.insert(
            email.to_string(),
            Account {
                user_id: user_id.clone(),
                password: password.to_string(),
                confirmed: self.auto_confirm,
            },
        );
        Ok(SignUpOutcome {
            user_id,
            email_confirmed: self.auto_confirm,
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<SignedInUser, StoreError> {
        let accounts = self.accounts.lock().unwrap();
        match accounts.get(email) {
            Some(account) if account.password == password && account.confirmed => {
                Ok(SignedInUser {
                    user_id: account.user_id.clone(),
                    email: email.to_string(),
                })
            }
            _ => Err(StoreError::InvalidCredentials),
        }
    }

    async fn confirm_email(&self, token_hash: &str) -> Result<(), StoreError> {
        if token_hash != CONFIRM_TOKEN {
            return Err(StoreError::Rejected("Token has expired or is invalid".to_string()));
        }
        for account in self.accounts.lock().unwrap().values_mut() {
            account.confirmed = true;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeProfiles {
    profiles: Mutex<HashMap<String, UserProfile>>,
    /// When set, every update fails as if the backend refused it.
    pub fail_updates: AtomicBool,
}

impl FakeProfiles {
    pub fn insert(&self, profile: UserProfile) {
        self.profiles
            .lock()
            .unwrap()
            .insert(profile.id.clone(), profile);
    }

    pub fn get(&self, user_id: &str) -> Option<UserProfile> {
        self.profiles.lock().unwrap().get(user_id).cloned()
    }
}

#[async_trait]
impl ProfileStore for FakeProfiles {
    async fn create_profile(&self, profile: &UserProfile) -> Result<(), StoreError> {
        self.insert(profile.clone());
        Ok(())
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.get(user_id))
    }

    async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> Result<(), StoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Refused("permission denied for table profiles".to_string()));
        }
        let mut profiles = self.profiles.lock().unwrap();
        let profile = profiles
            .get_mut(user_id)
            .ok_or_else(|| StoreError::Refused(format!("no profile {}", user_id)))?;
        if let Some(url) = &update.profile_photo_url {
            profile.profile_photo_url = Some(url.clone());
        }
        Ok(())
    }
}

/// Photo storage held in memory, keyed like the on-disk store.
#[derive(Default)]
pub struct FakePhotos {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl FakePhotos {
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.files.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(key).cloned()
    }

    pub fn insert(&self, key: &str, data: Vec<u8>) {
        self.files.lock().unwrap().insert(key.to_string(), data);
    }
}

#[async_trait]
impl PhotoStorage for FakePhotos {
    async fn upload(&self, key: &str, data: Vec<u8>) -> Result<(), AppError> {
        self.insert(key, data);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.files.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Router plus handles on every fake behind it.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub identity: Arc<FakeIdentity>,
    pub profiles: Arc<FakeProfiles>,
    pub photos: Arc<FakePhotos>,
    pub journal: Arc<MemoryJournal>,
    pub analista: Arc<ScriptedAssistant>,
    pub conteudo: Arc<ScriptedAssistant>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_assistants(ScriptedAssistant::new(), ScriptedAssistant::new())
    }

    pub fn with_assistants(analista: ScriptedAssistant, conteudo: ScriptedAssistant) -> Self {
        Self::build(analista, conteudo, FakeIdentity::default())
    }

    pub fn build(
        analista: ScriptedAssistant,
        conteudo: ScriptedAssistant,
        identity: FakeIdentity,
    ) -> Self {
        let config = test_config("http://127.0.0.1:9/v1");
        let identity = Arc::new(identity);
        let profiles = Arc::new(FakeProfiles::default());
        let photos = Arc::new(FakePhotos::default());
        let journal = Arc::new(MemoryJournal::new());
        let analista = Arc::new(analista);
        let conteudo = Arc::new(conteudo);

        let policy = PollPolicy {
            interval: config.openai.poll_interval,
            max_attempts: config.openai.poll_max_attempts,
        };
        let mut skills = SkillRegistry::new();
        for (skill, client) in [
            (Skill::CapivaraAnalista, analista.clone()),
            (Skill::CapivaraConteudo, conteudo.clone()),
        ] {
            skills.insert(
                ConversationOrchestrator::new(
                    skill,
                    client,
                    journal.clone(),
                    policy,
                    MAX_IMAGE_BYTES,
                )
                .with_delay(Arc::new(InstantDelay::default())),
            );
        }

        let jwt = JwtService::new(&config.jwt).unwrap();
        let state = AppState {
            config: Arc::new(config),
            jwt,
            identity: identity.clone(),
            profiles: profiles.clone(),
            skills: Arc::new(skills),
            photos: photos.clone(),
            access_offset: FixedOffset::west_opt(3 * 3600).unwrap(),
        };

        Self {
            router: build_router(state.clone()),
            state,
            identity,
            profiles,
            photos,
            journal,
            analista,
            conteudo,
        }
    }

    /// Bearer token for `user_id`, with a profile row created for it.
    pub fn signed_in_user(&self, user_id: &str) -> String {
        self.profiles.insert(UserProfile::new(user_id));
        self.token_for(user_id)
    }

    pub fn token_for(&self, user_id: &str) -> String {
        self.state
            .jwt
            .issue(user_id, &format!("{}@example.com", user_id))
            .unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, body)
    }
}

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

pub const MULTIPART_BOUNDARY: &str = "skills-test-boundary";

/// Multipart body with one file field and optional text fields.
pub fn multipart_request(
    uri: &str,
    token: &str,
    field: &str,
    file_name: &str,
    bytes: &[u8],
    text_fields: &[(&str, &str)],
) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in text_fields {
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n",
                b = MULTIPART_BOUNDARY
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
            b = MULTIPART_BOUNDARY
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", MULTIPART_BOUNDARY),
        )
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from(body))
        .unwrap()
}
