use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::JwtConfig;

/// Issues and validates the HS256 session tokens handed out at login.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry_hours: i64,
}

/// Claims carried by a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user ID)
    pub sub: String,
    pub email: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    pub jti: String,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Result<Self, anyhow::Error> {
        let secret = config.secret.expose_secret();
        if secret.is_empty() {
            anyhow::bail!("JWT secret must not be empty");
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiry_hours: config.expiry_hours,
        })
    }

    pub fn issue(&self, user_id: &str, email: &str) -> Result<String, anyhow::Error> {
        let now = Utc::now();
        let exp = now + Duration::hours(self.expiry_hours);

        let claims = SessionClaims {
            sub: user_id.to_string(),
            email: email.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode session token: {}", e))
    }

    pub fn validate(&self, token: &str) -> Result<SessionClaims, anyhow::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        let token_data = decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| anyhow::anyhow!("Invalid session token: {}", e))?;

        Ok(token_data.claims)
    }

    pub fn expiry_seconds(&self) -> i64 {
        self.expiry_hours * 3600
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;

    fn service(secret: &str, expiry_hours: i64) -> JwtService {
        JwtService::new(&JwtConfig {
            secret: Secret::new(secret.to_string()),
            expiry_hours,
        })
        .unwrap()
    }

    #[test]
    fn issued_tokens_validate() -> Result<(), anyhow::Error> {
        let jwt = service("test-secret", 24);
        let token = jwt.issue("user-1", "ana@example.com")?;

        let claims = jwt.validate(&token)?;
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.email, "ana@example.com");
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
        Ok(())
    }

    #[test]
    fn tokens_from_another_secret_are_rejected() -> Result<(), anyhow::Error> {
        let token = service("secret-a", 24).issue("user-1", "a@example.com")?;
        assert!(service("secret-b", 24).validate(&token).is_err());
        Ok(())
    }

    #[test]
    fn expired_tokens_are_rejected() -> Result<(), anyhow::Error> {
        // Past the default 60s leeway.
        let jwt = service("test-secret", -1);
        let token = jwt.issue("user-1", "a@example.com")?;
        assert!(jwt.validate(&token).is_err());
        Ok(())
    }

    #[test]
    fn empty_secret_is_refused() {
        assert!(JwtService::new(&JwtConfig {
            secret: Secret::new(String::new()),
            expiry_hours: 24,
        })
        .is_err());
    }
}
