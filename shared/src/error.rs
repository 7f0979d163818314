use crate::http;
use crate::identity::IdentityError;
use crate::storage::StorageError;
use crate::store::StoreError;
use lambda_http::{http::StatusCode, Body, Error, Response};
use thiserror::Error;

/// Errors surfaced by portal operations. Each maps to exactly one HTTP status.
#[derive(Debug, Error)]
pub enum PortalError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("object storage failure: {0}")]
    UpstreamStorage(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Authentication(String),
}

impl PortalError {
    pub fn validation(msg: impl Into<String>) -> Self {
        PortalError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        PortalError::NotFound(msg.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PortalError::Validation(_) => "ValidationError",
            PortalError::NotFound(_) => "NotFoundError",
            PortalError::Persistence(_) => "PersistenceError",
            PortalError::UpstreamStorage(_) => "UpstreamStorageError",
            PortalError::Unauthorized(_) => "Unauthorized",
            PortalError::Forbidden(_) => "Forbidden",
            PortalError::Conflict(_) => "Conflict",
            PortalError::Authentication(_) => "AuthenticationFailed",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            PortalError::Validation(_) => StatusCode::BAD_REQUEST,
            PortalError::NotFound(_) => StatusCode::NOT_FOUND,
            PortalError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PortalError::UpstreamStorage(_) => StatusCode::BAD_GATEWAY,
            PortalError::Unauthorized(_) | PortalError::Authentication(_) => {
                StatusCode::UNAUTHORIZED
            }
            PortalError::Forbidden(_) => StatusCode::FORBIDDEN,
            PortalError::Conflict(_) => StatusCode::CONFLICT,
        }
    }

    /// Render as a JSON error response. Backend details stay in the logs.
    pub fn into_response(self) -> Result<Response<Body>, Error> {
        let message = match &self {
            PortalError::Persistence(detail) => {
                tracing::error!("Persistence error: {}", detail);
                "Failed to access the project store".to_string()
            }
            PortalError::UpstreamStorage(detail) => {
                tracing::error!("Object storage error: {}", detail);
                "Failed to store the uploaded file".to_string()
            }
            other => other.to_string(),
        };
        http::error_response(self.status_code(), self.kind(), &message)
    }
}

impl From<StoreError> for PortalError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => PortalError::NotFound(what),
            StoreError::AlreadyExists(what) => PortalError::Conflict(what),
            StoreError::Backend(detail) | StoreError::Corrupt(detail) => {
                PortalError::Persistence(detail)
            }
        }
    }
}

impl From<StorageError> for PortalError {
    fn from(err: StorageError) -> Self {
        PortalError::UpstreamStorage(err.to_string())
    }
}

impl From<IdentityError> for PortalError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::InvalidCredentials(msg) => PortalError::Authentication(msg),
            IdentityError::AlreadyExists(msg) => PortalError::Conflict(msg),
            IdentityError::InvalidInput(msg) => PortalError::Validation(msg),
            IdentityError::NotFound(msg) => PortalError::NotFound(msg),
            IdentityError::Provider(detail) => {
                tracing::error!("Identity provider error: {}", detail);
                PortalError::Authentication("Request could not be completed".to_string())
            }
        }
    }
}
