/// Unified error types for CertVerify
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One violated input field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Main error type for the service
#[derive(Error, Debug)]
pub enum CertError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema violations, reported per field
    #[error("Invalid input: {}", describe_issues(.0))]
    InvalidInput(Vec<FieldIssue>),

    /// Duplicate certificate ID or account email
    #[error("Conflict: {0}")]
    Conflict(String),

    /// No such record or token
    #[error("Not found: {0}")]
    NotFound(String),

    /// Issuer precondition failed
    #[error("Issuer not approved")]
    NotApproved,

    /// Certificate is already in its terminal state
    #[error("Certificate {0} already revoked")]
    AlreadyRevoked(String),

    /// QR payload could not be parsed or lacks required fields
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// QR payload type has no verification path
    #[error("Unsupported payload type: {0}")]
    UnsupportedType(String),

    /// Approval state machine refused a transition
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Authorization errors
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JWT errors
    #[error("JWT error: {0}")]
    Jwt(String),
}

fn describe_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("{}: {}", i.field, i.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// JSON error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issues: Option<Vec<FieldIssue>>,
}

impl CertError {
    /// HTTP status and machine-readable code for this error
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            CertError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "InvalidInput"),
            CertError::MalformedPayload(_) => (StatusCode::BAD_REQUEST, "MalformedPayload"),
            CertError::UnsupportedType(_) => (StatusCode::BAD_REQUEST, "UnsupportedType"),
            CertError::AlreadyRevoked(_) => (StatusCode::BAD_REQUEST, "AlreadyRevoked"),
            CertError::Conflict(_) => (StatusCode::CONFLICT, "Conflict"),
            CertError::InvalidTransition(_) => (StatusCode::CONFLICT, "InvalidTransition"),
            CertError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound"),
            CertError::NotApproved => (StatusCode::FORBIDDEN, "NotApproved"),
            CertError::Authentication(_) => (StatusCode::UNAUTHORIZED, "AuthenticationRequired"),
            CertError::Authorization(_) => (StatusCode::FORBIDDEN, "Forbidden"),
            CertError::RateLimitExceeded { .. } => {
                (StatusCode::TOO_MANY_REQUESTS, "RateLimitExceeded")
            }
            CertError::Jwt(_) => (StatusCode::UNAUTHORIZED, "InvalidToken"),
            CertError::Database(_) | CertError::Internal(_) | CertError::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "InternalServerError")
            }
        }
    }
}

/// Convert CertError to HTTP response
impl IntoResponse for CertError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();

        let message = match &self {
            CertError::Database(e) => {
                tracing::error!("Database error: {}", e);
                "Internal server error".to_string() // Don't leak details
            }
            CertError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                "Internal server error".to_string()
            }
            CertError::Io(e) => {
                tracing::error!("IO error: {}", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let issues = match self {
            CertError::InvalidInput(issues) => Some(issues),
            _ => None,
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            issues,
        });

        (status, body).into_response()
    }
}

/// `snake_case` field name as exposed in the camelCase JSON API
fn json_field_name(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Flatten validator output into per-field issues, sorted by field
pub fn field_issues(errors: &validator::ValidationErrors) -> Vec<FieldIssue> {
    let mut issues: Vec<FieldIssue> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            let field = json_field_name(field.as_ref());
            errs.iter().map(move |e| {
                let message = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string());
                FieldIssue::new(field.clone(), message)
            })
        })
        .collect();
    issues.sort_by(|a, b| a.field.cmp(&b.field));
    issues
}

impl From<validator::ValidationErrors> for CertError {
    fn from(errors: validator::ValidationErrors) -> Self {
        CertError::InvalidInput(field_issues(&errors))
    }
}

/// Result type alias for service operations
pub type CertResult<T> = Result<T, CertError>;
