//! Error types for the web API and its client

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use inplace_common::{AttributeKey, ValidationError, ValidationErrorKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONSTRAINT_VIOLATION: &str = "urn:openproject-org:api:v3:errors:PropertyConstraintViolation";
pub const NOT_FOUND: &str = "urn:openproject-org:api:v3:errors:NotFound";
pub const INVALID_REQUEST_BODY: &str = "urn:openproject-org:api:v3:errors:InvalidRequestBody";
pub const INTERNAL_ERROR: &str = "urn:openproject-org:api:v3:errors:InternalServerError";

#[derive(Error, Debug)]
pub enum WebError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected response {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid representation: {0}")]
    Representation(String),

    #[error(transparent)]
    Common(#[from] inplace_common::Error),
}

pub type WebResult<T> = Result<T, WebError>;

/// Error body returned by every failing `/api/v3` request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(rename = "_type")]
    pub kind: String,
    #[serde(rename = "errorIdentifier")]
    pub error_identifier: String,
    pub message: String,
    #[serde(rename = "_embedded", default, skip_serializing_if = "Option::is_none")]
    pub embedded: Option<ApiErrorEmbedded>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorEmbedded {
    pub details: ApiErrorDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorDetails {
    #[serde(default)]
    pub attribute: Option<String>,
    #[serde(default)]
    pub kind: Option<ValidationErrorKind>,
}

impl ApiErrorBody {
    /// Recover the validation error a 422 response carries
    pub fn into_validation_error(self) -> ValidationError {
        let details = self.embedded.map(|e| e.details);
        let attribute = details
            .as_ref()
            .and_then(|d| d.attribute.as_deref())
            .and_then(|a| a.parse::<AttributeKey>().ok());
        let kind = details
            .and_then(|d| d.kind)
            .unwrap_or(ValidationErrorKind::Rejected);
        ValidationError::new(kind, attribute, self.message)
    }
}

/// An error response of the HTTP API
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ApiErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, identifier: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ApiErrorBody {
                kind: "Error".to_string(),
                error_identifier: identifier.to_string(),
                message: message.into(),
                embedded: None,
            },
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, INVALID_REQUEST_BODY, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR, message)
    }

    pub fn validation(err: ValidationError) -> Self {
        let mut api = Self::new(StatusCode::UNPROCESSABLE_ENTITY, CONSTRAINT_VIOLATION, err.message);
        api.body.embedded = Some(ApiErrorEmbedded {
            details: ApiErrorDetails {
                attribute: err.attribute.map(|a| a.to_string()),
                kind: Some(err.kind),
            },
        });
        api
    }
}

impl From<inplace_common::Error> for ApiError {
    fn from(e: inplace_common::Error) -> Self {
        match e {
            inplace_common::Error::NotFound { kind, id } => {
                ApiError::not_found(format!("{} {} not found", kind, id))
            }
            inplace_common::Error::InvalidAttribute(_)
            | inplace_common::Error::InvalidFixture(_)
            | inplace_common::Error::InvalidLocale(_) => ApiError::bad_request(e.to_string()),
            other => ApiError::internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
