use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::{msg, AppError};

/// Subject of a validated session token, stored in the request extensions by
/// [`extract_user`](super::gate::extract_user). Lives for one request only.
#[derive(Debug, Clone)]
pub struct Subject(pub String);

/// Handler-side access to the authenticated subject.
pub struct AuthUser(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Subject>()
            .map(|s| AuthUser(s.0.clone()))
            .ok_or_else(|| AppError::Internal {
                message: msg::ASSERT_USER_ID,
                source: anyhow::anyhow!("route is not guarded by extract_user"),
            })
    }
}
