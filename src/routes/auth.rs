use crate::{
    auth::{
        hash_password, normalize_email,
        password::verify_against_dummy,
        session::take_flash,
        strategy::{negotiate, redirect, AuthEvent, Rejection, HOME_PATH},
        verify_password, AuthenticatedUser, LoginRequest, RegisterRequest,
    },
    error::{field_errors, AppError},
    models::{NewUser, User, UserProfile},
    security::mask_secret,
    state::AppState,
};
use actix_web::{get, post, web, HttpRequest, HttpResponse};
use serde_json::json;
use validator::Validate;

type LoginBody = web::Either<web::Json<LoginRequest>, web::Form<LoginRequest>>;
type RegisterBody = web::Either<web::Json<RegisterRequest>, web::Form<RegisterRequest>>;

/// Login page props.
///
/// Starts (or resumes) the guest session, hands out the CSRF token in the body and in
/// the `XSRF-TOKEN` cookie, and returns flashed errors and old input exactly once.
/// Already authenticated sessions are sent to the dashboard.
#[get("/login")]
pub async fn login_page(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let mut session = state.sessions.load_or_start(&req).await?;
    if session.is_authenticated() {
        return Ok(redirect(HOME_PATH, state.sessions.cookies(&session, false)));
    }

    let flash = take_flash(&mut session);
    state.sessions.save(&mut session).await?;

    let mut response = HttpResponse::Ok();
    for cookie in state.sessions.cookies(&session, false) {
        response.cookie(cookie);
    }
    Ok(response.json(json!({
        "errors": flash.errors,
        "old": flash.old,
        "csrf_token": session.csrf_token,
    })))
}

/// Login
///
/// API callers receive a fresh bearer token after every earlier token of the user is
/// revoked. Browsers get a regenerated session and a redirect to the intended page.
///
/// ## Responses:
/// - `200 OK`: `{success, message, token, token_type, user}` (API).
/// - `302 Found`: to the intended URL, or back to the form with flashed errors (browser).
/// - `401 Unauthorized`: wrong e-mail or password (API).
/// - `422 Unprocessable Entity`: missing or malformed fields (API).
/// - `500 Internal Server Error`: token issuance failed.
#[post("/login")]
pub async fn login(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: LoginBody,
) -> Result<HttpResponse, AppError> {
    let strategy = negotiate(&req);
    let input = body.into_inner();
    log::info!(
        "Login attempt via {} strategy from {:?}",
        strategy.name(),
        req.peer_addr()
    );

    if let Err(errors) = input.validate() {
        return strategy
            .rejected(&state, &req, Rejection::Invalid(field_errors(&errors)), input.old_input())
            .await;
    }

    let email = normalize_email(input.email.as_deref().unwrap_or_default());
    let password = input.password.as_deref().unwrap_or_default();

    match check_credentials(&state, &email, password).await? {
        Some(user) => {
            strategy
                .authenticated(
                    &state,
                    &req,
                    user,
                    AuthEvent::Login,
                    input.remember.unwrap_or(false),
                )
                .await
        }
        None => {
            log::warn!("Invalid credentials for {}", email);
            strategy
                .rejected(&state, &req, Rejection::BadCredentials, input.old_input())
                .await
        }
    }
}

/// Register a new user
///
/// Creates the account, then signs the user in the same way `login` does.
#[post("/register")]
pub async fn register(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: RegisterBody,
) -> Result<HttpResponse, AppError> {
    let strategy = negotiate(&req);
    let input = body.into_inner();

    if let Err(errors) = input.validate() {
        return strategy
            .rejected(&state, &req, Rejection::Invalid(field_errors(&errors)), input.old_input())
            .await;
    }

    let password_hash = hash_password(
        input.password.as_deref().unwrap_or_default(),
        state.bcrypt_cost,
    )?;
    let new_user = NewUser {
        name: input.name.as_deref().unwrap_or_default().trim().to_string(),
        email: normalize_email(input.email.as_deref().unwrap_or_default()),
        password_hash,
    };

    let user = match state.users.create_user(new_user).await {
        Ok(user) => user,
        Err(AppError::ValidationError(errors)) => {
            return strategy
                .rejected(&state, &req, Rejection::Invalid(errors), input.old_input())
                .await
        }
        Err(e) => return Err(e),
    };

    log::info!("Registered user {}", user.id);
    strategy
        .authenticated(&state, &req, user, AuthEvent::Registration, false)
        .await
}

/// Logout
///
/// API callers lose every token they hold. Browsers get their session destroyed and
/// a new guest session with a new CSRF token.
#[post("/logout")]
pub async fn logout(
    state: web::Data<AppState>,
    req: HttpRequest,
    caller: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    negotiate(&req).logged_out(&state, &req, caller).await
}

/// Refresh the bearer token
///
/// Deletes the token that authenticated this request and issues a new one. The two
/// steps are not atomic: if issuance fails the caller is left without a token and
/// has to log in again.
#[get("/refresh-token")]
pub async fn refresh_token(
    state: web::Data<AppState>,
    caller: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let current = caller
        .token()
        .ok_or_else(|| AppError::Unauthorized("Unauthenticated.".into()))?;
    log::info!("Token refresh requested by user {}", caller.id());

    state
        .tokens
        .revoke_current(&caller.user, current)
        .await
        .map_err(|e| refresh_failure(&caller.user, e, state.debug))?;
    let issued = state
        .tokens
        .issue(&caller.user)
        .await
        .map_err(|e| refresh_failure(&caller.user, e, state.debug))?;

    log::info!(
        "Token refreshed for user {}: {}",
        caller.id(),
        mask_secret(&issued.plain_text)
    );
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Token refreshed successfully",
        "data": {
            "access_token": issued.plain_text,
            "token_type": "Bearer",
            "user": UserProfile::from(&caller.user),
        }
    })))
}

fn refresh_failure(user: &User, error: AppError, debug: bool) -> AppError {
    log::error!("Token refresh failed for user {}: {}", user.id, error);
    AppError::service_failure("Failed to refresh token.", &error, debug)
}

/// Looks the user up and checks the password. Unknown e-mails cost one bcrypt round too.
async fn check_credentials(
    state: &AppState,
    email: &str,
    password: &str,
) -> Result<Option<User>, AppError> {
    match state.users.find_user_by_email(email).await? {
        Some(user) => {
            if verify_password(password, &user.password_hash)? {
                Ok(Some(user))
            } else {
                Ok(None)
            }
        }
        None => {
            verify_against_dummy(password, state.bcrypt_cost);
            Ok(None)
        }
    }
}
