//! HTTP-facing error type and the JSON envelope shared by every response.
//!
//! Every body, success or failure, is `{"status": u16, "message": str, "data": any}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Client-visible messages.
pub mod msg {
    pub const SUCCESS: &str = "SUCCESS";
    pub const UNAUTHORIZED: &str = "UnAuthorized";
    pub const TOKEN_EXPIRED: &str = "Token is expired";
    pub const TOKEN_MISMATCH: &str = "Compared literals are not same";
    pub const ASSERT_USER_ID: &str = "unable to assert userid";
    pub const UNAUTHORIZED_AGENT: &str = "UnAuthorized user agent";
    pub const UNAUTHORIZED_URL: &str = "UnAuthorized url";
    pub const EXTRACT_MSG: &str = "unable to extract msg";
    pub const CREATING_ACCOUNT: &str = "Problem creating account";
    pub const EMAIL_EXISTS: &str = "Email is already in use";
    pub const HASH_PASSWORD: &str = "Unable to generate hashed password";
    pub const FETCHING_USER: &str = "Problem fetching your account";
    pub const ACCOUNT_NOT_FOUND: &str = "User account was not found";
    pub const INVALID_CREDENTIALS: &str = "Invalid user credentials";
    pub const ACTIVATION_IN_PROGRESS: &str = "Account activation in progress";
    pub const GENERATE_JWT: &str = "Unable to generate jwt token";
    pub const LOGGING_IN: &str = "Problem logging into your account";
    pub const ACTIVATING: &str = "cant activate the account";
    pub const UNMARSHAL: &str = "Unable to unmarshal request body";
    pub const VALIDATE: &str = "Validation of fields failed";
    pub const INVALID_EMAIL: &str = "Invalid email address";
    pub const PARSE_REG_DATE: &str = "Unable to parse registration date";
    pub const PASS_LENGTH: &str = "password must be at least 8 characters long";
    pub const PASS_LOWER: &str = "password must contain 1 lower case character";
    pub const PASS_UPPER: &str = "password must contain 1 upper case character";
    pub const PASS_NUMERIC: &str = "password must contain 1 numeric character";
    pub const PASS_SPECIAL: &str = "password must contain 1 special character";
    pub const STORE_UNHEALTHY: &str = "user store is unreachable";
}

/// Response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    #[serde(skip)]
    pub code: StatusCode,
    pub status: u16,
    pub message: String,
    pub data: serde_json::Value,
}

impl ApiResponse {
    pub fn new(code: StatusCode, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            code,
            status: code.as_u16(),
            message: message.into(),
            data,
        }
    }

    pub fn ok<T: Serialize>(data: T) -> Self {
        Self::new(
            StatusCode::OK,
            msg::SUCCESS,
            serde_json::to_value(data).unwrap_or(serde_json::Value::Null),
        )
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        (self.code, Json(self)).into_response()
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or invalid client input.
    #[error("{0}")]
    BadRequest(&'static str),

    #[error("{}", msg::EMAIL_EXISTS)]
    EmailExists,

    /// Authentication or caller-screening failure.
    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("{}", msg::STORE_UNHEALTHY)]
    Unavailable,

    /// Dependency failure; `source` is logged, never returned.
    #[error("{message}")]
    Internal {
        message: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl AppError {
    pub fn internal(message: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| Self::Internal { message, source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::EmailExists => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Self::Internal { message, source } = &self {
            tracing::error!(error = %source, message, "request failed");
        }
        ApiResponse::new(self.status(), self.to_string(), serde_json::Value::Null).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
