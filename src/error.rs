//!
//! # Custom Error Handling
//!
//! This module defines the custom error type `AppError` used throughout the server.
//! It centralizes error management, providing a consistent way to represent failures,
//! from database issues to validation and ownership checks.
//!
//! `AppError` implements `actix_web::error::ResponseError` so handlers can return it
//! directly. Every error body shares one shape: `{"success": false, "message": ...}`,
//! with an `errors` map for validation failures and an `error` detail for service
//! failures raised while debug mode is on.
//!
//! `From` implementations cover `sqlx::Error`, `validator::ValidationErrors` and
//! `bcrypt::BcryptError`, allowing easy use of the `?` operator.

use actix_web::{
    error::{JsonPayloadError, PathError, ResponseError},
    http::StatusCode,
    HttpRequest, HttpResponse,
};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use validator::{ValidationError, ValidationErrors};

/// Field name to the list of human readable messages for that field.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Status used when the anti-forgery token of a session request does not match.
pub const CSRF_MISMATCH_STATUS: u16 = 419;

/// Represents all possible errors that can occur while serving a request.
#[derive(Debug)]
pub enum AppError {
    /// Authentication failed or is required but missing (HTTP 401).
    Unauthorized(String),
    /// The caller is authenticated but does not own the resource (HTTP 403).
    Forbidden(String),
    /// Malformed request, e.g. a JSON body that cannot be parsed (HTTP 400).
    BadRequest(String),
    /// The requested resource does not exist (HTTP 404).
    NotFound(String),
    /// A session-authenticated mutation arrived without a matching `X-XSRF-TOKEN` (HTTP 419).
    CsrfTokenMismatch,
    /// Input failed validation; carries field-level messages (HTTP 422).
    ValidationError(FieldErrors),
    /// Unexpected server-side fault. The message is logged, never sent (HTTP 500).
    InternalServerError(String),
    /// Error originating from the database layer (HTTP 500). Logged, never sent.
    DatabaseError(String),
    /// A handled 500 with a public message; `detail` is only populated in debug mode.
    ServiceFailure {
        message: String,
        detail: Option<String>,
    },
}

impl AppError {
    /// Builds a validation error for a single field.
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.into()]);
        AppError::ValidationError(errors)
    }

    /// Builds a `ServiceFailure`, exposing the underlying error only when `debug` is set.
    pub fn service_failure(
        message: impl Into<String>,
        cause: &dyn fmt::Display,
        debug: bool,
    ) -> Self {
        AppError::ServiceFailure {
            message: message.into(),
            detail: debug.then(|| cause.to_string()),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            AppError::CsrfTokenMismatch => write!(f, "CSRF token mismatch"),
            AppError::ValidationError(errors) => {
                let fields: Vec<&str> = errors.keys().map(String::as_str).collect();
                write!(f, "Validation Error: {}", fields.join(", "))
            }
            AppError::InternalServerError(msg) => write!(f, "Internal Server Error: {}", msg),
            AppError::DatabaseError(msg) => write!(f, "Database Error: {}", msg),
            AppError::ServiceFailure { message, .. } => write!(f, "Service Failure: {}", message),
        }
    }
}

fn failure_body(message: &str) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert("success".into(), Value::Bool(false));
    body.insert("message".into(), Value::String(message.to_string()));
    body
}

/// Converts `AppError` variants into JSON `HttpResponse` objects.
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::CsrfTokenMismatch => {
                StatusCode::from_u16(CSRF_MISMATCH_STATUS).unwrap_or(StatusCode::FORBIDDEN)
            }
            AppError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::InternalServerError(_)
            | AppError::DatabaseError(_)
            | AppError::ServiceFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::BadRequest(msg)
            | AppError::NotFound(msg) => failure_body(msg),
            AppError::CsrfTokenMismatch => failure_body("CSRF token mismatch."),
            AppError::ValidationError(errors) => {
                let mut body = failure_body("The given data was invalid.");
                body.insert("errors".into(), json!(errors));
                body
            }
            // Internal details stay in the log.
            AppError::InternalServerError(msg) | AppError::DatabaseError(msg) => {
                log::error!("{}", msg);
                failure_body("Internal server error.")
            }
            AppError::ServiceFailure { message, detail } => {
                let mut body = failure_body(message);
                body.insert(
                    "error".into(),
                    Value::String(
                        detail
                            .clone()
                            .unwrap_or_else(|| "Internal server error.".to_string()),
                    ),
                );
                body
            }
        };
        HttpResponse::build(self.status_code()).json(Value::Object(body))
    }
}

/// Maps `sqlx::Error::RowNotFound` to `NotFound`; everything else becomes `DatabaseError`.
impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> AppError {
        match error {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".into()),
            _ => AppError::DatabaseError(error.to_string()),
        }
    }
}

/// Flattens `validator` output into the field-error map sent to clients.
impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> AppError {
        AppError::ValidationError(field_errors(&errors))
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(error: bcrypt::BcryptError) -> AppError {
        AppError::InternalServerError(format!("Password hashing failed: {}", error))
    }
}

/// Collects `ValidationErrors` into `FieldErrors`, filling in default messages.
pub fn field_errors(errors: &ValidationErrors) -> FieldErrors {
    errors
        .field_errors()
        .into_iter()
        .map(|(field, errors)| {
            let messages = errors.iter().map(|e| describe(field, e)).collect();
            (field.to_string(), messages)
        })
        .collect()
}

fn describe(field: &str, error: &ValidationError) -> String {
    if let Some(message) = &error.message {
        return message.to_string();
    }
    let label = field.replace('_', " ");
    match error.code.as_ref() {
        "required" => format!("The {} field is required.", label),
        "email" => format!("The {} field must be a valid email address.", label),
        "must_match" => format!("The {} field confirmation does not match.", label),
        "length" => match (error.params.get("min"), error.params.get("max")) {
            (Some(min), None) => format!("The {} field must be at least {} characters.", label, min),
            (None, Some(max)) => format!(
                "The {} field must not be greater than {} characters.",
                label, max
            ),
            _ => format!("The {} field has an invalid length.", label),
        },
        _ => format!("The {} field is invalid.", label),
    }
}

/// Error handler for `web::JsonConfig`: malformed bodies answer 400 in our JSON shape.
pub fn json_error_handler(error: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    AppError::BadRequest(format!("Invalid JSON payload: {}", error)).into()
}

/// Error handler for `web::PathConfig`: unparsable ids answer 404 like unknown ones.
pub fn path_error_handler(error: PathError, _req: &HttpRequest) -> actix_web::Error {
    AppError::NotFound(format!("Resource not found: {}", error)).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use validator::Validate;

    #[derive(Validate)]
    struct Sample {
        #[validate(length(min = 1, max = 3))]
        due_label: String,
        #[validate(email)]
        email: String,
    }

    async fn body_json(error: AppError) -> Value {
        let bytes = to_bytes(error.error_response().into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_error_responses() {
        assert_eq!(AppError::Unauthorized("Invalid token".into()).error_response().status(), 401);
        assert_eq!(AppError::Forbidden("Not yours".into()).error_response().status(), 403);
        assert_eq!(AppError::BadRequest("Invalid input".into()).error_response().status(), 400);
        assert_eq!(AppError::NotFound("Resource not found".into()).error_response().status(), 404);
        assert_eq!(AppError::CsrfTokenMismatch.error_response().status().as_u16(), 419);
        assert_eq!(AppError::invalid_field("title", "bad").error_response().status(), 422);
        assert_eq!(AppError::InternalServerError("Server error".into()).error_response().status(), 500);
    }

    #[actix_rt::test]
    async fn test_internal_details_are_not_sent() {
        let body = body_json(AppError::DatabaseError("relation \"tasks\" does not exist".into())).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Internal server error.");

        let hidden = AppError::service_failure("Token issuance failed.", &"disk full", false);
        let body = body_json(hidden).await;
        assert_eq!(body["message"], "Token issuance failed.");
        assert_eq!(body["error"], "Internal server error.");

        let shown = AppError::service_failure("Token issuance failed.", &"disk full", true);
        assert_eq!(body_json(shown).await["error"], "disk full");
    }

    #[actix_rt::test]
    async fn test_validation_errors_are_field_keyed() {
        let sample = Sample {
            due_label: "toolong".into(),
            email: "nope".into(),
        };
        let error: AppError = sample.validate().unwrap_err().into();
        let body = body_json(error).await;
        assert_eq!(
            body["errors"]["due_label"][0],
            "The due label field has an invalid length."
        );
        assert_eq!(
            body["errors"]["email"][0],
            "The email field must be a valid email address."
        );
    }
}
