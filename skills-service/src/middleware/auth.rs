use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use service_core::error::AppError;

use crate::services::{JwtService, SessionClaims};
use crate::AppState;

/// Claims of a valid bearer token, if the request carries one.
pub fn bearer_claims(headers: &HeaderMap, jwt: &JwtService) -> Option<SessionClaims> {
    let Authorization(bearer) = headers.typed_get::<Authorization<Bearer>>()?;
    match jwt.validate(bearer.token()) {
        Ok(claims) => Some(claims),
        Err(e) => {
            tracing::debug!(error = %e, "Rejected bearer token");
            None
        }
    }
}

/// Middleware to require authentication
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = bearer_claims(req.headers(), &state.jwt)
        .ok_or_else(|| AppError::unauthorized("Authentication required"))?;

    // Store claims in request extensions so handlers can access them
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// Claims of the authenticated caller. Only valid behind `auth_middleware`.
pub struct AuthUser(pub SessionClaims);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts
            .extensions
            .get::<SessionClaims>()
            .ok_or_else(|| AppError::unauthorized("Authentication required"))?;

        Ok(AuthUser(claims.clone()))
    }
}
