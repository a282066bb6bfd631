use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::Method,
    web, Error, HttpMessage, HttpRequest, HttpResponse, ResponseError,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;

use crate::auth::extractors::{AuthenticatedUser, Identity};
use crate::auth::session::{verify_csrf, SessionManager};
use crate::auth::strategy::{redirect, wants_json, LOGIN_PATH};
use crate::error::AppError;
use crate::security::mask_secret;
use crate::state::AppState;

/// Endpoints reachable without authentication.
const PUBLIC_PATHS: &[&str] = &["/login", "/register", "/api/login", "/api/register"];

/// Authenticated endpoints that skip the anti-forgery check.
const CSRF_EXEMPT_PATHS: &[&str] = &["/logout", "/api/logout", "/api/refresh-token"];

/// Resolves the caller from a bearer token or, failing that, the session cookie.
///
/// On success the `AuthenticatedUser` is stored in the request extensions. Session
/// callers sending a mutating request must also echo the CSRF token. Anonymous
/// callers get 401 (API style) or a redirect to the login page that remembers where
/// they were going (browser style).
pub struct AuthMiddleware;

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);

        Box::pin(async move {
            if PUBLIC_PATHS.contains(&req.path()) {
                let res = service.call(req).await?;
                return Ok(res.map_into_left_body());
            }

            let state = match req.app_data::<web::Data<AppState>>().cloned() {
                Some(state) => state,
                None => {
                    let error = AppError::InternalServerError("AppState is not registered".into());
                    return Ok(req.into_response(error.error_response()).map_into_right_body());
                }
            };

            match admit(&state, req.request()).await {
                Ok(caller) => {
                    req.extensions_mut().insert(caller);
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                Err(response) => Ok(req.into_response(response).map_into_right_body()),
            }
        })
    }
}

/// The resolved caller, or the response that turns the request away.
async fn admit(state: &AppState, req: &HttpRequest) -> Result<AuthenticatedUser, HttpResponse> {
    let caller = match resolve_caller(state, req).await {
        Ok(Some(caller)) => caller,
        Ok(None) => {
            return Err(reject(state, req)
                .await
                .unwrap_or_else(|e| e.error_response()))
        }
        Err(e) => return Err(e.error_response()),
    };

    if let Identity::Session(session) = &caller.identity {
        if requires_csrf(req.method(), req.path()) {
            verify_csrf(session, req).map_err(|e| {
                log::warn!("CSRF token mismatch for user {} on {}", caller.id(), req.path());
                e.error_response()
            })?;
        }
    }
    Ok(caller)
}

fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn requires_csrf(method: &Method, path: &str) -> bool {
    let mutating = matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    );
    mutating && !CSRF_EXEMPT_PATHS.contains(&path)
}

async fn resolve_caller(
    state: &AppState,
    req: &HttpRequest,
) -> Result<Option<AuthenticatedUser>, AppError> {
    if let Some(token) = bearer_token(req) {
        match state.tokens.validate(token).await {
            Ok((user, token)) => {
                return Ok(Some(AuthenticatedUser {
                    user,
                    identity: Identity::Token(token),
                }))
            }
            Err(AppError::Unauthorized(_)) => {
                log::debug!("Rejected bearer token {}", mask_secret(token));
            }
            Err(e) => return Err(e),
        }
    }

    let session_id = match SessionManager::session_id(req) {
        Some(id) => id,
        None => return Ok(None),
    };
    let mut session = match state.sessions.load(&session_id).await? {
        Some(session) => session,
        None => return Ok(None),
    };
    let user = match session.user_id {
        Some(user_id) => state.users.find_user(user_id).await?,
        None => None,
    };

    match user {
        Some(user) => {
            state.sessions.save(&mut session).await?;
            Ok(Some(AuthenticatedUser {
                user,
                identity: Identity::Session(session),
            }))
        }
        None => Ok(None),
    }
}

async fn reject(state: &AppState, req: &HttpRequest) -> Result<HttpResponse, AppError> {
    if wants_json(req) {
        return Err(AppError::Unauthorized("Unauthenticated.".into()));
    }

    let mut session = state.sessions.load_or_start(req).await?;
    if req.method() == Method::GET {
        session.intended_url = Some(req.uri().to_string());
    }
    state.sessions.save(&mut session).await?;
    Ok(redirect(LOGIN_PATH, state.sessions.cookies(&session, false)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_bearer_token_parsing() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer tk_abc"))
            .to_http_request();
        assert_eq!(bearer_token(&req), Some("tk_abc"));

        let req = TestRequest::default()
            .insert_header(("Authorization", "Basic dXNlcjpwYXNz"))
            .to_http_request();
        assert_eq!(bearer_token(&req), None);

        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer "))
            .to_http_request();
        assert_eq!(bearer_token(&req), None);
    }

    #[test]
    fn test_requires_csrf() {
        assert!(requires_csrf(&Method::POST, "/api/tasks"));
        assert!(requires_csrf(&Method::DELETE, "/api/tasks/3"));
        assert!(!requires_csrf(&Method::GET, "/api/tasks"));
        assert!(!requires_csrf(&Method::POST, "/logout"));
        assert!(!requires_csrf(&Method::GET, "/api/refresh-token"));
    }
}
