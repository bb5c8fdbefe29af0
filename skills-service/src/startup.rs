//! Application startup and lifecycle management.

use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use chrono::FixedOffset;
use service_core::error::AppError;
use service_core::middleware::{
    make_request_span, request_id_middleware, security_headers_middleware,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::config::SkillsConfig;
use crate::handlers::{
    auth::{check_auth, confirm_email, login, register},
    chat::chat,
    health::{health_check, readiness_check},
    metrics::metrics,
    profile::upload_photo,
    skills::list_skills,
    user::get_user,
};
use crate::middleware::{auth_middleware, metrics_middleware};
use crate::services::{JwtService, LocalPhotoStorage, SkillRegistry, SupabaseClient};
use crate::AppState;

/// Wire the vendor-backed services from configuration.
pub fn build_state(config: SkillsConfig) -> Result<AppState, AppError> {
    let access_offset = FixedOffset::east_opt(config.access.utc_offset_hours * 3600).ok_or_else(
        || {
            AppError::ConfigError(anyhow::anyhow!(
                "ACCESS_UTC_OFFSET_HOURS out of range: {}",
                config.access.utc_offset_hours
            ))
        },
    )?;

    let jwt = JwtService::new(&config.jwt).map_err(AppError::ConfigError)?;

    let supabase = Arc::new(
        SupabaseClient::new(&config.supabase)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?,
    );

    let skills = SkillRegistry::from_config(&config, supabase.clone())
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?;

    tracing::info!(
        base_url = %config.openai.base_url,
        skills_ready = skills.all_configured(),
        "Initialized assistant clients"
    );

    let photos = Arc::new(LocalPhotoStorage::new(&config.uploads.photo_dir));

    Ok(AppState {
        config: Arc::new(config),
        jwt,
        identity: supabase.clone(),
        profiles: supabase,
        skills: Arc::new(skills),
        photos,
        access_offset,
    })
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}. Skipping.", origin, e);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/user", get(get_user))
        .route("/:skill/chat", post(chat))
        .route("/profile/upload-photo", post(upload_photo))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics))
        .route("/skills", get(list_skills))
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/auth/confirm", get(confirm_email))
        .route("/api/check-auth", get(check_auth))
        .merge(protected)
        .nest_service(
            &state.config.uploads.photo_url_prefix,
            ServeDir::new(&state.config.uploads.photo_dir),
        )
        .layer(DefaultBodyLimit::max(state.config.uploads.max_request_bytes))
        // Add metrics middleware
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span::<Body>))
        // Add tracing middleware for request_id
        .layer(from_fn(request_id_middleware))
        .layer(cors_layer(&state.config.allowed_origins))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: SkillsConfig) -> Result<Self, AppError> {
        let address = config.common.bind_address();
        let state = build_state(config)?;
        Self::with_state(state, &address).await
    }

    /// Bind `address` (port 0 picks a free port) and serve `state`.
    pub async fn with_state(state: AppState, address: &str) -> Result<Self, AppError> {
        let listener = TcpListener::bind(address).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", address, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("skills-service listening on port {}", port);

        Ok(Self {
            port,
            listener,
            router: build_router(state),
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
