//! Bearer token verification.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use thiserror::Error;

use crate::claims::{JwtClaims, TokenValidationError, validate_claims};

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("malformed or unsigned token: {0}")]
    Decode(String),

    #[error(transparent)]
    Claims(#[from] TokenValidationError),
}

/// Verifies a raw bearer token and returns its claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, JwtError>;
}

/// HMAC-SHA256 shared-secret validator.
///
/// Our claims carry RFC 3339 timestamps instead of the registered numeric
/// `exp`/`iat`, so the library's time checks are off and [`validate_claims`]
/// runs on the decoded claims instead.
pub struct Hs256JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_nbf = false;

        Self {
            key: DecodingKey::from_secret(secret.as_ref()),
            validation,
        }
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, JwtError> {
        let data = decode::<JwtClaims>(token, &self.key, &self.validation)
            .map_err(|e| JwtError::Decode(e.to_string()))?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}
