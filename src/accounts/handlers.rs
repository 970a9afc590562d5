use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use tower_cookies::{
    cookie::{time::Duration as CookieDuration, time::OffsetDateTime as CookieTime, SameSite},
    Cookie, Cookies,
};
use tracing::{instrument, warn};

use super::{
    dto::{ActivateRequest, LoginRequest, SignupRequest},
    services::{self, LoginOutcome},
};
use crate::{
    auth::{extractors::AuthUser, gate::TOKEN_COOKIE},
    config::AppConfig,
    error::{msg, ApiResponse, AppError, Result},
    state::AppState,
};

fn body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload.map(|Json(v)| v).map_err(|e| {
        warn!(error = %e, "unreadable request body");
        AppError::BadRequest(msg::UNMARSHAL)
    })
}

/// HttpOnly, SameSite=Lax cookie whose lifetime matches the token validity.
fn session_cookie(config: &AppConfig, token: String) -> Cookie<'static> {
    let ttl = CookieDuration::seconds(config.jwt.ttl().as_secs() as i64);
    Cookie::build((TOKEN_COOKIE, token))
        .path(config.cookie.path.clone())
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(ttl)
        .expires(CookieTime::now_utc() + ttl)
        .build()
}

pub async fn health(State(st): State<AppState>) -> Result<ApiResponse> {
    if services::health_check(&st).await {
        Ok(ApiResponse::new(StatusCode::OK, msg::SUCCESS, json!("ok")))
    } else {
        Err(AppError::Unavailable)
    }
}

#[instrument(skip(st, payload))]
pub async fn register(
    State(st): State<AppState>,
    payload: std::result::Result<Json<SignupRequest>, JsonRejection>,
) -> Result<ApiResponse> {
    let account = body(payload)?.validate()?;
    services::signup(&st, account).await?;
    Ok(ApiResponse::new(
        StatusCode::CREATED,
        msg::SUCCESS,
        json!(msg::ACTIVATION_IN_PROGRESS),
    ))
}

#[instrument(skip(st, cookies, payload))]
pub async fn login(
    State(st): State<AppState>,
    cookies: Cookies,
    payload: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<ApiResponse> {
    let credentials = body(payload)?.validate()?;
    match services::login(&st, credentials).await? {
        LoginOutcome::ActivationPending => Ok(ApiResponse::new(
            StatusCode::ACCEPTED,
            msg::LOGGING_IN,
            json!(msg::ACTIVATION_IN_PROGRESS),
        )),
        LoginOutcome::LoggedIn { token } => {
            cookies.add(session_cookie(&st.config, token));
            Ok(ApiResponse::new(StatusCode::OK, msg::SUCCESS, Value::Null))
        }
    }
}

#[instrument(skip(st, payload))]
pub async fn activate(
    State(st): State<AppState>,
    payload: std::result::Result<Json<ActivateRequest>, JsonRejection>,
) -> Result<ApiResponse> {
    let req = body(payload)?;
    services::activate(&st, &req.user_id).await?;
    Ok(ApiResponse::new(StatusCode::OK, msg::SUCCESS, Value::Null))
}

#[instrument(skip(st))]
pub async fn user_details(
    State(st): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<ApiResponse> {
    let details = services::user_details(&st, &user_id).await?;
    Ok(ApiResponse::ok(details))
}
