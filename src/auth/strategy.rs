//! Login and logout in two flavours.
//!
//! API callers (`Accept: application/json`, or anything under `/api/`) get bearer
//! tokens in JSON bodies. Browsers get a regenerated cookie session and redirects.
//! `negotiate` picks the strategy once per request.

use actix_web::cookie::Cookie;
use actix_web::http::header;
use actix_web::{HttpRequest, HttpResponse};
use async_trait::async_trait;
use reqwest::Url;
use serde_json::json;
use std::collections::BTreeMap;

use crate::auth::extractors::AuthenticatedUser;
use crate::auth::session::{set_flash, SessionManager};
use crate::error::{AppError, FieldErrors};
use crate::models::{SessionFlash, User, UserProfile};
use crate::security::mask_secret;
use crate::state::AppState;

pub const FAILED_CREDENTIALS: &str = "These credentials do not match our records.";
pub const HOME_PATH: &str = "/dashboard";
pub const LOGIN_PATH: &str = "/login";

/// True when the caller expects JSON rather than redirects.
pub fn wants_json(req: &HttpRequest) -> bool {
    let accepts_json = req
        .headers()
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .map(|accept| accept.contains("/json") || accept.contains("+json"))
        .unwrap_or(false);
    accepts_json || req.path().starts_with("/api/")
}

/// What just authenticated the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    Login,
    Registration,
}

/// Why a login or registration attempt was turned away.
#[derive(Debug)]
pub enum Rejection {
    Invalid(FieldErrors),
    BadCredentials,
}

impl Rejection {
    fn errors(self) -> FieldErrors {
        match self {
            Rejection::Invalid(errors) => errors,
            Rejection::BadCredentials => {
                let mut errors = FieldErrors::new();
                errors.insert("email".into(), vec![FAILED_CREDENTIALS.into()]);
                errors
            }
        }
    }
}

#[async_trait(?Send)]
pub trait SessionStrategy {
    fn name(&self) -> &'static str;

    async fn authenticated(
        &self,
        state: &AppState,
        req: &HttpRequest,
        user: User,
        event: AuthEvent,
        remember: bool,
    ) -> Result<HttpResponse, AppError>;

    /// `old` is the non-secret input to hand back to the form.
    async fn rejected(
        &self,
        state: &AppState,
        req: &HttpRequest,
        rejection: Rejection,
        old: BTreeMap<String, String>,
    ) -> Result<HttpResponse, AppError>;

    async fn logged_out(
        &self,
        state: &AppState,
        req: &HttpRequest,
        caller: AuthenticatedUser,
    ) -> Result<HttpResponse, AppError>;
}

pub fn negotiate(req: &HttpRequest) -> Box<dyn SessionStrategy> {
    if wants_json(req) {
        Box::new(BearerTokenStrategy)
    } else {
        Box::new(CookieSessionStrategy)
    }
}

/// Token responses for API clients.
pub struct BearerTokenStrategy;

#[async_trait(?Send)]
impl SessionStrategy for BearerTokenStrategy {
    fn name(&self) -> &'static str {
        "bearer-token"
    }

    async fn authenticated(
        &self,
        state: &AppState,
        _req: &HttpRequest,
        user: User,
        event: AuthEvent,
        _remember: bool,
    ) -> Result<HttpResponse, AppError> {
        let issued = match event {
            AuthEvent::Login => {
                // Only the newest login keeps a usable token.
                let issued = match state.tokens.revoke_all(&user).await {
                    Ok(_) => state.tokens.issue(&user).await,
                    Err(e) => Err(e),
                };
                issued.map_err(|e| {
                    log::error!("Token issuance failed for user {}: {}", user.id, e);
                    AppError::service_failure("Login failed. Please try again.", &e, state.debug)
                })?
            }
            AuthEvent::Registration => state.tokens.issue(&user).await.map_err(|e| {
                log::error!("Token issuance failed for new user {}: {}", user.id, e);
                AppError::service_failure("Registration failed. Please try again.", &e, state.debug)
            })?,
        };

        log::info!(
            "User {} authenticated ({:?}) with token {}",
            user.id,
            event,
            mask_secret(&issued.plain_text)
        );

        let (mut response, message) = match event {
            AuthEvent::Login => (HttpResponse::Ok(), "Login successful"),
            AuthEvent::Registration => (HttpResponse::Created(), "Registration successful"),
        };
        Ok(response.json(json!({
            "success": true,
            "message": message,
            "token": issued.plain_text,
            "token_type": "Bearer",
            "user": UserProfile::from(&user),
        })))
    }

    async fn rejected(
        &self,
        _state: &AppState,
        _req: &HttpRequest,
        rejection: Rejection,
        _old: BTreeMap<String, String>,
    ) -> Result<HttpResponse, AppError> {
        match rejection {
            Rejection::Invalid(errors) => Err(AppError::ValidationError(errors)),
            Rejection::BadCredentials => Ok(HttpResponse::Unauthorized().json(json!({
                "success": false,
                "message": FAILED_CREDENTIALS,
                "errors": Rejection::BadCredentials.errors(),
            }))),
        }
    }

    async fn logged_out(
        &self,
        state: &AppState,
        _req: &HttpRequest,
        caller: AuthenticatedUser,
    ) -> Result<HttpResponse, AppError> {
        state.tokens.revoke_all(&caller.user).await?;
        if let Some(session) = caller.session() {
            state.sessions.invalidate(session).await?;
        }
        Ok(HttpResponse::Ok().json(json!({ "message": "Logged out successfully" })))
    }
}

/// Cookie sessions and redirects for browsers.
pub struct CookieSessionStrategy;

#[async_trait(?Send)]
impl SessionStrategy for CookieSessionStrategy {
    fn name(&self) -> &'static str {
        "cookie-session"
    }

    async fn authenticated(
        &self,
        state: &AppState,
        req: &HttpRequest,
        user: User,
        event: AuthEvent,
        remember: bool,
    ) -> Result<HttpResponse, AppError> {
        let current = state.sessions.load_or_start(req).await?;
        let mut session = state.sessions.regenerate(&current, Some(user.id)).await?;
        let destination = session
            .intended_url
            .take()
            .unwrap_or_else(|| HOME_PATH.to_string());
        state.sessions.save(&mut session).await?;

        log::info!("User {} started a browser session ({:?})", user.id, event);
        Ok(redirect(
            &destination,
            state.sessions.cookies(&session, remember),
        ))
    }

    async fn rejected(
        &self,
        state: &AppState,
        req: &HttpRequest,
        rejection: Rejection,
        old: BTreeMap<String, String>,
    ) -> Result<HttpResponse, AppError> {
        let mut session = state.sessions.load_or_start(req).await?;
        set_flash(
            &mut session,
            SessionFlash {
                errors: rejection.errors(),
                old,
            },
        );
        state.sessions.save(&mut session).await?;

        Ok(redirect(
            &back_location(req),
            state.sessions.cookies(&session, false),
        ))
    }

    async fn logged_out(
        &self,
        state: &AppState,
        req: &HttpRequest,
        caller: AuthenticatedUser,
    ) -> Result<HttpResponse, AppError> {
        let guest = match caller.session() {
            Some(session) => state.sessions.invalidate(session).await?,
            None => match SessionManager::session_id(req) {
                Some(id) => match state.sessions.load(&id).await? {
                    Some(session) => state.sessions.invalidate(&session).await?,
                    None => state.sessions.start_guest().await?,
                },
                None => state.sessions.start_guest().await?,
            },
        };
        log::info!("User {} logged out of the browser session", caller.id());
        Ok(redirect("/", state.sessions.cookies(&guest, false)))
    }
}

/// 302 to `location`, attaching `cookies`.
pub fn redirect(location: &str, cookies: Vec<Cookie<'static>>) -> HttpResponse {
    let mut response = HttpResponse::Found();
    response.insert_header((header::LOCATION, location.to_string()));
    for cookie in cookies {
        response.cookie(cookie);
    }
    response.finish()
}

fn back_location(req: &HttpRequest) -> String {
    req.headers()
        .get(header::REFERER)
        .and_then(|value| value.to_str().ok())
        .and_then(|referer| same_site_path(req, referer))
        .unwrap_or_else(|| LOGIN_PATH.to_string())
}

/// Path and query of `referer` when it leads back to this host. Anything off-site is `None`.
fn same_site_path(req: &HttpRequest, referer: &str) -> Option<String> {
    if referer.starts_with('/') {
        // "//host" and "/\host" are protocol-relative to browsers.
        let off_site = referer.starts_with("//") || referer.starts_with("/\\");
        return (!off_site).then(|| referer.to_string());
    }

    let url = Url::parse(referer).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let authority = match url.port() {
        Some(port) => format!("{}:{}", url.host_str()?, port),
        None => url.host_str()?.to_string(),
    };
    if !authority.eq_ignore_ascii_case(req.connection_info().host()) {
        return None;
    }

    let mut path = url.path().to_string();
    if let Some(query) = url.query() {
        path.push('?');
        path.push_str(query);
    }
    Some(path)
}
