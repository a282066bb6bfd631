//! Browser sessions and the anti-forgery token that rides along with them.
//!
//! The session id travels in the HttpOnly `taskboard_session` cookie. The CSRF token
//! is mirrored into the script-readable `XSRF-TOKEN` cookie and has to come back in
//! the `X-XSRF-TOKEN` header on mutating requests authenticated by the session.

use actix_web::cookie::{time, Cookie, SameSite};
use actix_web::HttpRequest;
use chrono::{Duration, Utc};
use rand::Rng;
use sqlx::types::Json;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Session, SessionFlash};
use crate::security::{constant_time_eq, random_string};
use crate::store::SessionRepository;

pub const SESSION_COOKIE: &str = "taskboard_session";
pub const XSRF_COOKIE: &str = "XSRF-TOKEN";
pub const XSRF_HEADER: &str = "X-XSRF-TOKEN";

const CSRF_TOKEN_LEN: usize = 40;
const REMEMBER_DAYS: i64 = 30;

/// Chance, as `(chances, out_of)`, that starting a guest session also prunes expired ones.
pub const DEFAULT_SWEEP_ODDS: (u32, u32) = (2, 100);

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionRepository>,
    lifetime: Duration,
    secure_cookies: bool,
    sweep_odds: (u32, u32),
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionRepository>, lifetime: Duration, secure_cookies: bool) -> Self {
        Self {
            store,
            lifetime,
            secure_cookies,
            sweep_odds: DEFAULT_SWEEP_ODDS,
        }
    }

    pub fn with_sweep_odds(mut self, chances: u32, out_of: u32) -> Self {
        self.sweep_odds = (chances, out_of);
        self
    }

    /// Session id carried by the request's cookie, if any.
    pub fn session_id(req: &HttpRequest) -> Option<String> {
        req.cookie(SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|id| !id.is_empty())
    }

    /// Loads a live session. Expired sessions are deleted and reported as absent.
    pub async fn load(&self, id: &str) -> Result<Option<Session>, AppError> {
        match self.store.find_session(id).await? {
            Some(session) if session.is_expired(self.lifetime, Utc::now()) => {
                log::debug!("Session expired, removing it");
                self.store.delete_session(id).await?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Saves a new guest session. Every so often this also sweeps out expired sessions,
    /// since abandoned ones are never loaded again.
    pub async fn start_guest(&self) -> Result<Session, AppError> {
        let session = new_session(None, None);
        self.store.save_session(&session).await?;
        self.sweep().await;
        Ok(session)
    }

    async fn sweep(&self) {
        let (chances, out_of) = self.sweep_odds;
        if out_of == 0 || rand::thread_rng().gen_range(0..out_of) >= chances {
            return;
        }

        match self.store.prune_expired(Utc::now() - self.lifetime).await {
            Ok(0) => {}
            Ok(pruned) => log::debug!("Pruned {} expired session(s)", pruned),
            Err(e) => log::warn!("Session pruning failed: {}", e),
        }
    }

    /// The request's current session, or a fresh guest session when it has none.
    pub async fn load_or_start(&self, req: &HttpRequest) -> Result<Session, AppError> {
        if let Some(id) = Self::session_id(req) {
            if let Some(session) = self.load(&id).await? {
                return Ok(session);
            }
        }
        self.start_guest().await
    }

    /// Replaces `old` with a session under a new id and a new CSRF token.
    /// The intended URL carries over.
    pub async fn regenerate(&self, old: &Session, user_id: Option<i32>) -> Result<Session, AppError> {
        self.store.delete_session(&old.id).await?;
        let session = new_session(user_id, old.intended_url.clone());
        self.store.save_session(&session).await?;
        Ok(session)
    }

    /// Persists `session`, refreshing its idle timer.
    pub async fn save(&self, session: &mut Session) -> Result<(), AppError> {
        session.last_activity = Utc::now();
        self.store.save_session(session).await
    }

    /// Destroys `session` and hands back a new guest session with a new CSRF token.
    pub async fn invalidate(&self, session: &Session) -> Result<Session, AppError> {
        self.store.delete_session(&session.id).await?;
        self.start_guest().await
    }

    /// Session and `XSRF-TOKEN` cookies for `session`.
    pub fn cookies(&self, session: &Session, remember: bool) -> Vec<Cookie<'static>> {
        let mut session_cookie = Cookie::build(SESSION_COOKIE, session.id.clone())
            .path("/")
            .http_only(true)
            .secure(self.secure_cookies)
            .same_site(SameSite::Lax)
            .finish();
        if remember {
            session_cookie.set_max_age(time::Duration::days(REMEMBER_DAYS));
        }

        let xsrf_cookie = Cookie::build(XSRF_COOKIE, session.csrf_token.clone())
            .path("/")
            .http_only(false)
            .secure(self.secure_cookies)
            .same_site(SameSite::Lax)
            .finish();

        vec![session_cookie, xsrf_cookie]
    }
}

/// Removes and returns the flashed data so it is shown exactly once.
pub fn take_flash(session: &mut Session) -> SessionFlash {
    session.flash.take().map(|Json(flash)| flash).unwrap_or_default()
}

pub fn set_flash(session: &mut Session, flash: SessionFlash) {
    session.flash = Some(Json(flash));
}

/// Checks the `X-XSRF-TOKEN` header against the session's token.
pub fn verify_csrf(session: &Session, req: &HttpRequest) -> Result<(), AppError> {
    let header = req
        .headers()
        .get(XSRF_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if !header.is_empty() && constant_time_eq(header, &session.csrf_token) {
        Ok(())
    } else {
        Err(AppError::CsrfTokenMismatch)
    }
}

fn new_session(user_id: Option<i32>, intended_url: Option<String>) -> Session {
    Session {
        id: Uuid::new_v4().simple().to_string(),
        user_id,
        csrf_token: random_string(CSRF_TOKEN_LEN),
        flash: None,
        intended_url,
        last_activity: Utc::now(),
    }
}
