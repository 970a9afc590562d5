//! Request screening applied before handlers run.
//!
//! * [`extract_user`] guards user-facing routes with the `token` cookie.
//! * [`screen_request`] guards broker-facing routes: user agent, optional
//!   caller allow-list, then payload decryption.
//!
//! A rejection answers with the JSON envelope and never reaches the handler.

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::header::USER_AGENT,
    middleware::Next,
    response::Response,
};
use tower_cookies::Cookies;
use tracing::{debug, info, warn};

use super::extractors::Subject;
use super::jwt::TokenError;
use crate::error::{msg, AppError};
use crate::state::AppState;

pub const TOKEN_COOKIE: &str = "token";

/// Upper bound on a broker payload read into memory.
const MAX_BROKER_BODY: usize = 64 * 1024;

pub async fn extract_user(
    State(st): State<AppState>,
    cookies: Cookies,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = cookies
        .get(TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            debug!("request without token cookie");
            AppError::Unauthorized(msg::UNAUTHORIZED)
        })?;

    let claims = st.tokens.validate_token(&token).map_err(|e| match e {
        TokenError::Expired => AppError::Unauthorized(msg::TOKEN_EXPIRED),
        TokenError::NotYetValid => AppError::Unauthorized(msg::UNAUTHORIZED),
        other => {
            warn!(error = %other, "token rejected");
            AppError::Unauthorized(msg::TOKEN_MISMATCH)
        }
    })?;

    let user_id = claims.user_id.ok_or_else(|| AppError::Internal {
        message: msg::ASSERT_USER_ID,
        source: anyhow::anyhow!("validated token carries no user_id"),
    })?;

    req.extensions_mut().insert(Subject(user_id));
    Ok(next.run(req).await)
}

pub async fn screen_request(
    State(st): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let mq = &st.config.msg_queue;

    let agent = req
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if agent != mq.user_agent {
        info!(agent, "rejected broker call: user agent");
        return Err(AppError::Unauthorized(msg::UNAUTHORIZED_AGENT));
    }

    if mq.url_check {
        let remote = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        if !remote.is_some_and(|addr| is_allowed(&mq.allowed_urls, addr)) {
            info!(remote = ?remote, "rejected broker call: address not allowed");
            return Err(AppError::Unauthorized(msg::UNAUTHORIZED_URL));
        }
    }

    let (parts, body) = req.into_parts();
    let raw = axum::body::to_bytes(body, MAX_BROKER_BODY).await.map_err(|e| {
        warn!(error = %e, "unable to read broker payload");
        AppError::BadRequest(msg::EXTRACT_MSG)
    })?;
    let plain = st.decryptor.decrypt(raw).map_err(|e| {
        warn!(error = %e, "unable to decrypt broker payload");
        AppError::BadRequest(msg::EXTRACT_MSG)
    })?;

    Ok(next.run(Request::from_parts(parts, Body::from(plain))).await)
}

/// Allow-list entries match either `ip:port` or the bare ip.
fn is_allowed(allowed: &[String], addr: SocketAddr) -> bool {
    let full = addr.to_string();
    let ip = addr.ip().to_string();
    allowed.iter().any(|a| *a == full || *a == ip)
}
