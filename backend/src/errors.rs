use crate::issuance::{IssuanceError, ProofGenerationError};
use crate::registry::RegistryError;
use crate::stats::StatsError;
use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unprocessable: {0}")]
    Unprocessable(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("internal error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message; internal details stay in the logs.
    pub fn message(&self) -> String {
        match self {
            ApiError::BadRequest(m)
            | ApiError::Forbidden(m)
            | ApiError::NotFound(m)
            | ApiError::Conflict(m)
            | ApiError::Unprocessable(m)
            | ApiError::Unavailable(m)
            | ApiError::Timeout(m) => m.clone(),
            ApiError::Internal => "internal error".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(ErrorBody { error: self.message() })).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::Unauthorized { .. } => ApiError::Forbidden(e.to_string()),
            RegistryError::InvalidCredentialData(_)
            | RegistryError::InvalidAddress(_)
            | RegistryError::ArrayLengthMismatch { .. } => ApiError::BadRequest(e.to_string()),
            RegistryError::NotFound(_) => ApiError::NotFound(e.to_string()),
            RegistryError::AlreadyRevoked(_) => ApiError::Conflict(e.to_string()),
            RegistryError::ContractPaused => ApiError::Unavailable(e.to_string()),
            RegistryError::Store(inner) => {
                tracing::error!(error = %inner, "registry store failure");
                ApiError::Internal
            }
        }
    }
}

impl From<IssuanceError> for ApiError {
    fn from(e: IssuanceError) -> Self {
        match e {
            IssuanceError::InvalidRequest(_) => ApiError::BadRequest(e.to_string()),
            IssuanceError::Stats(StatsError::UnknownUser(_)) => ApiError::NotFound(e.to_string()),
            IssuanceError::Aggregation(_) | IssuanceError::SkillLevelNotMet(_) => {
                ApiError::Unprocessable(e.to_string())
            }
            IssuanceError::Proof(ProofGenerationError::Timeout(_)) => ApiError::Timeout(e.to_string()),
            IssuanceError::Registry(inner) => inner.into(),
            IssuanceError::Stats(_) | IssuanceError::Proof(_) => {
                tracing::error!(error = %e, "issuance failure");
                ApiError::Internal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::AggregationError;
    use crate::registry::tests::hash;
    use std::time::Duration;

    #[test]
    fn registry_errors_map_to_statuses() {
        assert_eq!(ApiError::from(RegistryError::NotFound(hash(1))).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::from(RegistryError::AlreadyRevoked(hash(1))).status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::from(RegistryError::ContractPaused).status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            ApiError::from(RegistryError::ArrayLengthMismatch { left: 1, right: 2 }).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn issuance_errors_map_to_statuses() {
        let insufficient = IssuanceError::Aggregation(AggregationError::InsufficientRepositories { required: 2, actual: 1 });
        let api = ApiError::from(insufficient);
        assert_eq!(api.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(api.message().contains("need at least 2"));

        let timeout = IssuanceError::Proof(ProofGenerationError::Timeout(Duration::from_secs(1)));
        assert_eq!(ApiError::from(timeout).status(), StatusCode::GATEWAY_TIMEOUT);

        let keys = IssuanceError::Proof(ProofGenerationError::Keys("disk full".into()));
        assert_eq!(ApiError::from(keys).message(), "internal error");
    }
}
