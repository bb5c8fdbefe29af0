use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default vendor endpoint for the assistants API.
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Largest single image accepted, before base64 encoding (5MB).
const DEFAULT_MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Largest request body accepted (16MB).
const DEFAULT_MAX_REQUEST_BYTES: usize = 16 * 1024 * 1024;

const DEFAULT_PHOTO_DIR: &str = "static/img/profile_photos";
const DEFAULT_PHOTO_URL_PREFIX: &str = "/static/img/profile_photos";

#[derive(Debug, Clone)]
pub struct SkillsConfig {
    pub common: core_config::Config,
    pub environment: String,
    pub openai: OpenAiConfig,
    pub skills: SkillAssistants,
    pub supabase: SupabaseConfig,
    pub jwt: JwtConfig,
    pub uploads: UploadConfig,
    pub threads: ThreadConfig,
    pub access: AccessConfig,
    /// Browser origins allowed by CORS.
    pub allowed_origins: Vec<String>,
    pub otlp_endpoint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: Secret<String>,
    pub base_url: String,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub poll_max_attempts: u32,
}

/// Agent identity bound to each skill.
#[derive(Debug, Clone)]
pub struct SkillAssistants {
    pub analista_assistant_id: String,
    pub conteudo_assistant_id: String,
}

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub api_key: Secret<String>,
    pub messages_table: String,
    pub profiles_table: String,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: Secret<String>,
    pub expiry_hours: i64,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub max_image_bytes: usize,
    pub max_request_bytes: usize,
    /// Directory profile photos are written to.
    pub photo_dir: String,
    /// Public URL path the photo directory is served under.
    pub photo_url_prefix: String,
}

/// Bounds on the in-memory local-to-vendor thread map, per skill.
#[derive(Debug, Clone)]
pub struct ThreadConfig {
    pub max_threads: usize,
    pub idle_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct AccessConfig {
    /// Offset applied to `access_expiration` values stored without a zone.
    pub utc_offset_hours: i32,
}

impl SkillsConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let is_prod = environment == "prod";

        Ok(SkillsConfig {
            common: common_config,
            environment,
            openai: OpenAiConfig {
                api_key: Secret::new(get_env("OPENAI_API_KEY", Some(""), is_prod)?),
                base_url: get_env("OPENAI_BASE_URL", Some(DEFAULT_OPENAI_BASE_URL), is_prod)?,
                request_timeout: Duration::from_secs(get_env_parsed(
                    "OPENAI_REQUEST_TIMEOUT_SECS",
                    30,
                    is_prod,
                )?),
                poll_interval: Duration::from_secs(get_env_parsed(
                    "OPENAI_POLL_INTERVAL_SECS",
                    5,
                    is_prod,
                )?),
                poll_max_attempts: get_env_parsed("OPENAI_POLL_MAX_ATTEMPTS", 60, is_prod)?,
            },
            skills: SkillAssistants {
                analista_assistant_id: get_env(
                    "OPENAI_CAPIVARA_ANALISTA_ASSISTANT_ID",
                    Some(""),
                    is_prod,
                )?,
                conteudo_assistant_id: get_env(
                    "OPENAI_CAPIVARA_CONTEUDO_ASSISTANT_ID",
                    Some(""),
                    is_prod,
                )?,
            },
            supabase: SupabaseConfig {
                url: get_env("SUPABASE_URL", Some("http://localhost:54321"), is_prod)?,
                api_key: Secret::new(get_env("SUPABASE_KEY", Some(""), is_prod)?),
                messages_table: get_env("SUPABASE_MESSAGES_TABLE", Some("messages"), is_prod)?,
                profiles_table: get_env("SUPABASE_PROFILES_TABLE", Some("profiles"), is_prod)?,
                request_timeout: Duration::from_secs(get_env_parsed(
                    "SUPABASE_REQUEST_TIMEOUT_SECS",
                    30,
                    is_prod,
                )?),
            },
            jwt: JwtConfig {
                secret: Secret::new(get_env(
                    "JWT_SECRET_KEY",
                    Some("jwt-secret-please-change"),
                    is_prod,
                )?),
                expiry_hours: get_env_parsed("JWT_EXPIRY_HOURS", 24, is_prod)?,
            },
            uploads: UploadConfig {
                max_image_bytes: get_env_parsed("MAX_IMAGE_BYTES", DEFAULT_MAX_IMAGE_BYTES, is_prod)?,
                max_request_bytes: get_env_parsed(
                    "MAX_REQUEST_BYTES",
                    DEFAULT_MAX_REQUEST_BYTES,
                    is_prod,
                )?,
                photo_dir: get_env("PROFILE_PHOTO_DIR", Some(DEFAULT_PHOTO_DIR), is_prod)?,
                photo_url_prefix: get_env(
                    "PROFILE_PHOTO_URL_PREFIX",
                    Some(DEFAULT_PHOTO_URL_PREFIX),
                    is_prod,
                )?
                .trim_end_matches('/')
                .to_string(),
            },
            threads: ThreadConfig {
                max_threads: get_env_parsed("THREAD_REGISTRY_CAPACITY", 10_000, is_prod)?,
                idle_ttl: Duration::from_secs(get_env_parsed(
                    "THREAD_IDLE_TTL_SECS",
                    24 * 3600,
                    is_prod,
                )?),
            },
            access: AccessConfig {
                utc_offset_hours: get_env_parsed("ACCESS_UTC_OFFSET_HOURS", -3, is_prod)?,
            },
            allowed_origins: get_env("ALLOWED_ORIGINS", Some("http://localhost:5000"), is_prod)?
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect(),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|v| !v.is_empty()),
        })
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn get_env_parsed<T>(key: &str, default: T, is_prod: bool) -> Result<T, AppError>
where
    T: FromStr + ToString,
    T::Err: std::fmt::Display,
{
    let raw = get_env(key, Some(&default.to_string()), is_prod)?;
    raw.trim().parse().map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!("{} has an invalid value {:?}: {}", key, raw, e))
    })
}
