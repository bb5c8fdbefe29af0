//! HTTP handlers for the skills service.

pub mod auth;
pub mod chat;
pub mod health;
pub mod metrics;
pub mod profile;
pub mod skills;
pub mod user;
