use serde::Deserialize;

use crate::error::FieldErrors;

/// Failures surfaced by the client gateway.
///
/// `Clone` so that one refresh outcome can be handed to every queued caller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    #[error("validation failed: {message}")]
    Validation { message: String, errors: FieldErrors },
    #[error("authentication required: {0}")]
    Authentication(String),
    #[error("not allowed: {0}")]
    Authorization(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("could not reach the server: {0}")]
    Connectivity(String),
    #[error("request could not be built: {0}")]
    RequestSetup(String),
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },
    #[error("unexpected status {status}: {message}")]
    Http { status: u16, message: String },
    #[error("could not decode the response: {0}")]
    Decode(String),
    #[error("token storage failed: {0}")]
    Storage(String),
    #[error("the token refresh was abandoned before it finished")]
    RefreshAborted,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: FieldErrors,
}

impl ClientError {
    /// Maps a non-success status and its body to an error kind.
    pub fn from_status(status: u16, body: &[u8]) -> Self {
        let parsed: ErrorBody = serde_json::from_slice(body).unwrap_or_default();
        let message = parsed
            .message
            .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string());

        match status {
            401 => ClientError::Authentication(message),
            403 => ClientError::Authorization(message),
            404 => ClientError::NotFound(message),
            422 => ClientError::Validation {
                message,
                errors: parsed.errors,
            },
            500..=599 => ClientError::Server { status, message },
            _ => ClientError::Http { status, message },
        }
    }

    /// Maps a transport failure: nothing sent, nothing received, or an unreadable body.
    pub fn from_transport(error: reqwest::Error) -> Self {
        if error.is_builder() {
            ClientError::RequestSetup(error.to_string())
        } else if error.is_decode() {
            ClientError::Decode(error.to_string())
        } else {
            ClientError::Connectivity(error.to_string())
        }
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, ClientError::Authentication(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let body = br#"{"success":false,"message":"The given data was invalid.","errors":{"title":["The title field is required."]}}"#;
        match ClientError::from_status(422, body) {
            ClientError::Validation { message, errors } => {
                assert_eq!(message, "The given data was invalid.");
                assert_eq!(errors["title"][0], "The title field is required.");
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(ClientError::from_status(401, br#"{"message":"Unauthenticated."}"#).is_authentication());
        assert!(matches!(
            ClientError::from_status(403, b"{}"),
            ClientError::Authorization(_)
        ));
        assert!(matches!(
            ClientError::from_status(404, b""),
            ClientError::NotFound(_)
        ));
        assert!(matches!(
            ClientError::from_status(503, b"maintenance"),
            ClientError::Server { status: 503, .. }
        ));
        assert!(matches!(
            ClientError::from_status(419, b"{}"),
            ClientError::Http { status: 419, .. }
        ));
    }

    #[test]
    fn test_plain_text_body_becomes_message() {
        match ClientError::from_status(500, b"  upstream exploded \n") {
            ClientError::Server { message, .. } => assert_eq!(message, "upstream exploded"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
