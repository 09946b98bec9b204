use crate::core::{InterestError, ProfileUpdateError, RegistrationError};
use crate::models::ErrorResponse;
use crate::services::{AuthError, StoreError};
use actix_web::{error, http::StatusCode, HttpRequest, HttpResponse};
use thiserror::Error;
use validator::{ValidationError, ValidationErrors, ValidationErrorsKind};

/// Errors returned by HTTP handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// The caller must create a profile first
    #[error("{0}")]
    ProfileRequired(String),

    #[error("{0}")]
    PermissionDenied(String),

    #[error("{0}")]
    AuthenticationRequired(String),

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn forbidden() -> Self {
        ApiError::PermissionDenied("You do not have permission to perform this action.".to_string())
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_failed",
            ApiError::NotFound(_) => "not_found",
            ApiError::ProfileRequired(_) => "profile_required",
            ApiError::PermissionDenied(_) => "permission_denied",
            ApiError::AuthenticationRequired(_) => "authentication_required",
            ApiError::InvalidJson(_) => "invalid_json",
            ApiError::InvalidQuery(_) => "invalid_query",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl error::ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::InvalidJson(_) | ApiError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ProfileRequired(_) => StatusCode::CONFLICT,
            ApiError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ApiError::AuthenticationRequired(_) => StatusCode::UNAUTHORIZED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        HttpResponse::build(status).json(ErrorResponse {
            error: self.code().to_string(),
            message: self.to_string(),
            status_code: status.as_u16(),
        })
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => {
                tracing::debug!("Store lookup failed: {}", what);
                ApiError::not_found("Not found.")
            }
            StoreError::Conflict(message) => ApiError::Validation(message),
            StoreError::EmailTaken => ApiError::validation("Email already exists"),
            other => {
                tracing::error!("Store error: {}", other);
                ApiError::Internal("Internal server error".to_string())
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        tracing::error!("Auth error: {}", err);
        ApiError::Internal("Internal server error".to_string())
    }
}

impl From<InterestError> for ApiError {
    fn from(err: InterestError) -> Self {
        match err {
            InterestError::MissingTarget | InterestError::SelfInterest => ApiError::Validation(err.to_string()),
            InterestError::TargetNotFound => ApiError::NotFound(err.to_string()),
            InterestError::ProfileRequired => ApiError::ProfileRequired(err.to_string()),
            InterestError::Store(e) => e.into(),
        }
    }
}

impl From<ProfileUpdateError> for ApiError {
    fn from(err: ProfileUpdateError) -> Self {
        match err {
            ProfileUpdateError::Store(e) => e.into(),
            other => ApiError::Validation(other.to_string()),
        }
    }
}

impl From<RegistrationError> for ApiError {
    fn from(err: RegistrationError) -> Self {
        // Store details stay in the logs
        ApiError::Validation(err.to_string())
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::Validation(describe(&errors))
    }
}

impl From<ValidationError> for ApiError {
    fn from(error: ValidationError) -> Self {
        ApiError::Validation(message_of(&error))
    }
}

fn message_of(error: &ValidationError) -> String {
    match &error.message {
        Some(message) => message.to_string(),
        None => format!("invalid value ({})", error.code),
    }
}

fn collect(errors: &ValidationErrors, out: &mut Vec<String>) {
    for (field, kind) in errors.errors() {
        match kind {
            ValidationErrorsKind::Field(list) => {
                for error in list {
                    let field = field.to_string();
                    if field == "__all__" {
                        out.push(message_of(error));
                    } else {
                        out.push(format!("{}: {}", field, message_of(error)));
                    }
                }
            }
            // Nested bodies are flattened on the wire, so keep their field names bare
            ValidationErrorsKind::Struct(inner) => collect(inner, out),
            ValidationErrorsKind::List(items) => {
                for inner in items.values() {
                    collect(inner, out);
                }
            }
        }
    }
}

/// One line per failed field, sorted for stable output
pub fn describe(errors: &ValidationErrors) -> String {
    let mut lines = Vec::new();
    collect(errors, &mut lines);
    lines.sort();
    lines.join("; ")
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(err: error::JsonPayloadError, req: &HttpRequest) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    ApiError::InvalidJson(err.to_string()).into()
}

/// Handle query payload errors
pub fn handle_query_payload_error(err: error::QueryPayloadError, req: &HttpRequest) -> actix_web::Error {
    tracing::info!("Query payload error on {}: {}", req.path(), err);
    ApiError::InvalidQuery(err.to_string()).into()
}
