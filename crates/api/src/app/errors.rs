use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use gestiona_auth::AuthzError;
use gestiona_core::DomainError;
use gestiona_documents::RenderError;
use gestiona_infra::command_dispatcher::DispatchError;
use gestiona_infra::tenancy::TenancyError;
use gestiona_treasury::SepaError;

/// Every failure a handler can report, already classified for HTTP.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    InvalidId(String),

    #[error("{0}")]
    Invariant(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Unauthenticated(&'static str),

    #[error("{0}")]
    Internal(String),

    #[error("{0}")]
    Upstream(String),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{what} not found"))
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            ApiError::InvalidId(_) => (StatusCode::BAD_REQUEST, "invalid_id"),
            ApiError::Invariant(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            ApiError::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            ApiError::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(code, error = %self, "request failed");
        }
        json_error(status, code, self.to_string())
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "success": false,
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => ApiError::Validation(msg),
            DomainError::InvariantViolation(msg) => ApiError::Invariant(msg),
            DomainError::InvalidId(msg) => ApiError::InvalidId(msg),
            DomainError::NotFound => ApiError::NotFound("not found".to_string()),
            DomainError::Conflict(msg) => ApiError::Conflict(msg),
            DomainError::Unauthorized => ApiError::Forbidden("unauthorized".to_string()),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Concurrency(msg) => ApiError::Conflict(msg),
            DispatchError::Validation(msg) => ApiError::Validation(msg),
            DispatchError::InvariantViolation(msg) => ApiError::Invariant(msg),
            DispatchError::Unauthorized => ApiError::Forbidden("unauthorized".to_string()),
            DispatchError::NotFound => ApiError::NotFound("not found".to_string()),
            DispatchError::TenantIsolation(msg) => ApiError::Forbidden(msg),
            DispatchError::Deserialize(msg) => ApiError::Internal(msg),
            DispatchError::Store(e) => ApiError::Internal(e.to_string()),
            DispatchError::Publish(msg) => ApiError::Upstream(msg),
        }
    }
}

impl From<TenancyError> for ApiError {
    fn from(err: TenancyError) -> Self {
        match err {
            TenancyError::NotFound(_) => ApiError::NotFound(err.to_string()),
            TenancyError::Inactive(_) => ApiError::Forbidden(err.to_string()),
            TenancyError::Misconfigured { .. } => ApiError::Internal(err.to_string()),
            TenancyError::Store(_) => ApiError::Upstream(err.to_string()),
        }
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        ApiError::Forbidden(err.to_string())
    }
}

impl From<RenderError> for ApiError {
    fn from(err: RenderError) -> Self {
        ApiError::Internal(format!("pdf rendering failed: {err}"))
    }
}

impl From<SepaError> for ApiError {
    fn from(err: SepaError) -> Self {
        match err {
            SepaError::Xml(_) => ApiError::Internal(err.to_string()),
            _ => ApiError::Invariant(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_http_statuses() {
        let cases = [
            (DomainError::validation("x"), StatusCode::BAD_REQUEST),
            (DomainError::invariant("x"), StatusCode::UNPROCESSABLE_ENTITY),
            (DomainError::not_found(), StatusCode::NOT_FOUND),
            (DomainError::conflict("x"), StatusCode::CONFLICT),
            (DomainError::Unauthorized, StatusCode::FORBIDDEN),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn stale_streams_are_conflicts() {
        let err = ApiError::from(DispatchError::Concurrency("expected 2, found 3".into()));
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn missing_sepa_creditor_data_is_unprocessable() {
        let err = ApiError::from(SepaError::MissingCreditorData("the company IBAN"));
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
