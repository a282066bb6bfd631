use actix_web::dev::Payload;
use actix_web::{Error as ActixError, FromRequest, HttpMessage, HttpRequest};
use std::future::{ready, Ready};

use crate::error::AppError;
use crate::models::{PersonalAccessToken, Session, User};

/// How the current request proved who it is.
#[derive(Debug, Clone)]
pub enum Identity {
    /// `Authorization: Bearer` with a live personal access token.
    Token(PersonalAccessToken),
    /// The `taskboard_session` cookie of an authenticated session.
    Session(Session),
}

/// The caller resolved by `AuthMiddleware`.
///
/// Handlers on protected routes take this as an argument. If the middleware did not
/// run or found nobody, extraction fails with 401.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
    pub identity: Identity,
}

impl AuthenticatedUser {
    pub fn id(&self) -> i32 {
        self.user.id
    }

    /// The bearer token behind this request, if it was token-authenticated.
    pub fn token(&self) -> Option<&PersonalAccessToken> {
        match &self.identity {
            Identity::Token(token) => Some(token),
            Identity::Session(_) => None,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        match &self.identity {
            Identity::Session(session) => Some(session),
            Identity::Token(_) => None,
        }
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = ActixError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        match req.extensions().get::<AuthenticatedUser>().cloned() {
            Some(user) => ready(Ok(user)),
            None => ready(Err(AppError::Unauthorized("Unauthenticated.".to_string()).into())),
        }
    }
}
