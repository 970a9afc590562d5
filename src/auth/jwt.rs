use std::time::Duration;

use jsonwebtoken::{
    decode, decode_header, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header,
    Validation,
};
use thiserror::Error;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;

use super::claims::Claims;

const HMAC_FAMILY: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token is expired")]
    Expired,
    #[error("token is not valid yet")]
    NotYetValid,
    #[error("unsupported signing algorithm {0:?}")]
    UnsupportedAlgorithm(Algorithm),
    #[error("invalid token: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),
    #[error("unable to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

/// Issues and validates HMAC-signed session tokens with one process-wide secret.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn generate_token(
        &self,
        subject: &str,
        algorithm: Algorithm,
        validity: Duration,
    ) -> Result<String, TokenError> {
        self.sign_at(subject, algorithm, OffsetDateTime::now_utc(), validity)
    }

    fn sign_at(
        &self,
        subject: &str,
        algorithm: Algorithm,
        issued_at: OffsetDateTime,
        validity: Duration,
    ) -> Result<String, TokenError> {
        if !HMAC_FAMILY.contains(&algorithm) {
            return Err(TokenError::UnsupportedAlgorithm(algorithm));
        }
        let exp = issued_at + TimeDuration::seconds(validity.as_secs() as i64);
        let claims = Claims {
            user_id: Some(subject.to_string()),
            iat: issued_at.unix_timestamp(),
            exp: exp.unix_timestamp(),
        };
        let token = encode(&Header::new(algorithm), &claims, &self.encoding)
            .map_err(TokenError::Signing)?;
        debug!(user_id = %subject, alg = ?algorithm, "jwt signed");
        Ok(token)
    }

    /// Verifies signature and expiry. Only HS256/384/512 headers are accepted.
    pub fn validate_token(&self, token: &str) -> Result<Claims, TokenError> {
        let header = decode_header(token).map_err(TokenError::Invalid)?;
        if !HMAC_FAMILY.contains(&header.alg) {
            return Err(TokenError::UnsupportedAlgorithm(header.alg));
        }

        let mut validation = Validation::new(header.alg);
        validation.algorithms = HMAC_FAMILY.to_vec();
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp"]);

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            if matches!(e.kind(), ErrorKind::ExpiredSignature) {
                TokenError::Expired
            } else if matches!(e.kind(), ErrorKind::ImmatureSignature) {
                TokenError::NotYetValid
            } else {
                TokenError::Invalid(e)
            }
        })?;
        debug!(user_id = ?data.claims.user_id, "jwt verified");
        Ok(data.claims)
    }
}
