use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use time::{macros::format_description, OffsetDateTime, PrimitiveDateTime};

use crate::error::{msg, AppError};

/// Request body for `POST /register`.
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub registration_date: String,
}

/// Request body for `POST /login`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Request body for `PUT /activate`, delivered by the broker.
#[derive(Debug, Deserialize)]
pub struct ActivateRequest {
    #[serde(default)]
    pub user_id: String,
}

/// Masked profile returned by `GET /user`.
#[derive(Debug, Serialize)]
pub struct UserDetails {
    pub name: String,
    pub email: String,
    pub company: String,
    #[serde(rename = "lastLogin", with = "time::serde::rfc3339")]
    pub last_login: OffsetDateTime,
}

/// Signup input that passed validation.
#[derive(Debug)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub password: String,
    pub registered_on: OffsetDateTime,
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Checks strength rules in order and reports the first one broken.
pub(crate) fn check_password(password: &str) -> Result<(), &'static str> {
    if password.chars().count() < 8 {
        return Err(msg::PASS_LENGTH);
    }
    if !password.chars().any(char::is_lowercase) {
        return Err(msg::PASS_LOWER);
    }
    if !password.chars().any(char::is_uppercase) {
        return Err(msg::PASS_UPPER);
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(msg::PASS_NUMERIC);
    }
    if !password.chars().any(|c| !c.is_alphanumeric() && !c.is_whitespace()) {
        return Err(msg::PASS_SPECIAL);
    }
    Ok(())
}

/// Parses `DD-MM-YYYY HH:MM:SS` as UTC.
pub(crate) fn parse_registration_date(raw: &str) -> Option<OffsetDateTime> {
    let format = format_description!("[day]-[month]-[year] [hour]:[minute]:[second]");
    PrimitiveDateTime::parse(raw.trim(), format)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

impl SignupRequest {
    pub fn validate(self) -> Result<NewAccount, AppError> {
        let name = self.name.trim().to_string();
        let email = self.email.trim().to_string();
        if name.is_empty()
            || email.is_empty()
            || self.password.is_empty()
            || self.registration_date.trim().is_empty()
        {
            return Err(AppError::BadRequest(msg::VALIDATE));
        }
        if !is_valid_email(&email) {
            return Err(AppError::BadRequest(msg::INVALID_EMAIL));
        }
        check_password(&self.password).map_err(AppError::BadRequest)?;
        let registered_on = parse_registration_date(&self.registration_date)
            .ok_or(AppError::BadRequest(msg::PARSE_REG_DATE))?;

        Ok(NewAccount {
            name,
            email,
            password: self.password,
            registered_on,
        })
    }
}

impl LoginRequest {
    pub fn validate(self) -> Result<Self, AppError> {
        let email = self.email.trim().to_string();
        if email.is_empty() || self.password.is_empty() {
            return Err(AppError::BadRequest(msg::VALIDATE));
        }
        Ok(Self {
            email,
            password: self.password,
        })
    }
}
