pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
pub mod utils;

use chrono::FixedOffset;
use std::sync::Arc;

use crate::config::SkillsConfig;
use crate::services::{IdentityProvider, JwtService, PhotoStorage, ProfileStore, SkillRegistry};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<SkillsConfig>,
    pub jwt: JwtService,
    pub identity: Arc<dyn IdentityProvider>,
    pub profiles: Arc<dyn ProfileStore>,
    pub skills: Arc<SkillRegistry>,
    pub photos: Arc<dyn PhotoStorage>,
    /// Zone for `access_expiration` values stored without one.
    pub access_offset: FixedOffset,
}
