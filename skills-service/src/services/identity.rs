//! Account and profile seams backed by the hosted auth service.

use super::StoreError;
use crate::models::{ProfileUpdate, UserProfile};
use async_trait::async_trait;

/// Result of creating an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignUpOutcome {
    pub user_id: String,
    /// False while the confirmation email is still pending.
    pub email_confirmed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedInUser {
    pub user_id: String,
    pub email: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, StoreError>;

    /// Password sign in. Wrong credentials are `StoreError::InvalidCredentials`.
    async fn sign_in(&self, email: &str, password: &str) -> Result<SignedInUser, StoreError>;

    /// Redeem the token hash from a confirmation email.
    async fn confirm_email(&self, token_hash: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn create_profile(&self, profile: &UserProfile) -> Result<(), StoreError>;

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError>;

    /// Write only the fields set in `update`.
    async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> Result<(), StoreError>;
}
