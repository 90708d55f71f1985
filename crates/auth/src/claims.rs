use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use gestiona_core::TenantId;

use crate::{PrincipalId, Role};

/// Claims carried by a bearer token issued for one tenant (empresa).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject / principal identifier.
    pub sub: PrincipalId,

    /// Tenant context for the token.
    pub tenant_id: TenantId,

    /// RBAC roles granted within the tenant context.
    pub roles: Vec<Role>,

    /// Issued-at timestamp.
    pub issued_at: DateTime<Utc>,

    /// Expiration timestamp.
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,
}

/// Validate the claim time window. Signatures are checked by [`crate::JwtValidator`].
pub fn validate_claims(claims: &JwtClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.issued_at {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}



#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn claims(issued_at: DateTime<Utc>, ttl: Duration) -> JwtClaims {
        JwtClaims {
            sub: PrincipalId::new(),
            tenant_id: TenantId::new(),
            roles: vec![Role::new("admin")],
            issued_at,
            expires_at: issued_at + ttl,
        }
    }

    #[test]
    fn accepts_token_inside_window() {
        let now = Utc::now();
        assert_eq!(validate_claims(&claims(now, Duration::minutes(5)), now), Ok(()));
    }

    #[test]
    fn rejects_expired_and_future_tokens() {
        let now = Utc::now();
        let c = claims(now - Duration::minutes(10), Duration::minutes(5));
        assert_eq!(validate_claims(&c, now), Err(TokenValidationError::Expired));

        let c = claims(now + Duration::minutes(1), Duration::minutes(5));
        assert_eq!(validate_claims(&c, now), Err(TokenValidationError::NotYetValid));
    }

    #[test]
    fn rejects_inverted_window() {
        let now = Utc::now();
        let c = claims(now, Duration::minutes(-1));
        assert_eq!(validate_claims(&c, now), Err(TokenValidationError::InvalidTimeWindow));
    }
}
