pub mod auth;
pub mod metrics;

pub use auth::{auth_middleware, bearer_claims, AuthUser};
pub use metrics::metrics_middleware;
