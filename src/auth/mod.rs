pub mod extractors;
pub mod middleware;
pub mod password;
pub mod policy;
pub mod session;
pub mod strategy;
pub mod token;

use serde::Deserialize;
use std::collections::BTreeMap;
use validator::Validate;

pub use extractors::{AuthenticatedUser, Identity};
pub use middleware::AuthMiddleware;
pub use password::{hash_password, verify_password};
pub use policy::ensure_owner;
pub use token::{IssuedToken, TokenIssuer};

/// Payload of a login attempt, as JSON or as a form.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(required, email)]
    pub email: Option<String>,
    #[validate(required, length(min = 1))]
    pub password: Option<String>,
    /// Keeps the browser session cookie for longer. Ignored for token logins.
    #[serde(default)]
    pub remember: Option<bool>,
}

/// Payload of a registration request.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(required, length(max = 255))]
    pub name: Option<String>,
    #[validate(required, email, length(max = 255))]
    pub email: Option<String>,
    #[validate(required, length(min = 8), must_match = "password_confirmation")]
    pub password: Option<String>,
    pub password_confirmation: Option<String>,
}

/// Trimmed, lower-cased e-mail address; lookups and uniqueness use this form.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl LoginRequest {
    /// Input echoed back to a browser form after a failed attempt. Never the password.
    pub fn old_input(&self) -> BTreeMap<String, String> {
        let mut old = BTreeMap::new();
        if let Some(email) = &self.email {
            old.insert("email".to_string(), email.clone());
        }
        old
    }
}

impl RegisterRequest {
    pub fn old_input(&self) -> BTreeMap<String, String> {
        let mut old = BTreeMap::new();
        if let Some(name) = &self.name {
            old.insert("name".to_string(), name.clone());
        }
        if let Some(email) = &self.email {
            old.insert("email".to_string(), email.clone());
        }
        old
    }
}
