#![allow(dead_code)]

use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceResponse};
use actix_web::{test, web, App};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use taskboard::auth::TokenIssuer;
use taskboard::config::Config;
use taskboard::error::AppError;
use taskboard::models::{NewToken, PersonalAccessToken};
use taskboard::routes;
use taskboard::state::AppState;
use taskboard::store::{MemoryStore, TokenRepository};
use taskboard::suggestions::{
    DisabledSuggestions, SuggestedTask, SuggestionError, SuggestionSource,
};

pub const PASSWORD: &str = "password123";

/// Configuration for tests: cheap bcrypt, everything else default.
pub fn test_config() -> Config {
    config_with(&[])
}

/// Test configuration with `overrides` applied on top.
pub fn config_with(overrides: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<&str, &str> = [("BCRYPT_COST", "4")].into_iter().collect();
    vars.extend(overrides.iter().copied());
    Config::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap()
}

pub fn test_state(store: Arc<MemoryStore>, suggestions: Arc<dyn SuggestionSource>) -> web::Data<AppState> {
    web::Data::new(AppState::new(store, suggestions, &test_config()))
}

pub fn default_state(store: Arc<MemoryStore>) -> web::Data<AppState> {
    test_state(store, Arc::new(DisabledSuggestions))
}

/// State whose token table rejects every insert; `debug` toggles error details.
pub fn state_with_broken_token_writes(store: Arc<MemoryStore>, debug: bool) -> web::Data<AppState> {
    let config = config_with(&[("APP_DEBUG", if debug { "true" } else { "false" })]);
    let mut state = AppState::new(store.clone(), Arc::new(DisabledSuggestions), &config);
    state.tokens = TokenIssuer::new(Arc::new(BrokenTokenWrites(store.clone())), store);
    web::Data::new(state)
}

pub async fn init_app(
    state: web::Data<AppState>,
) -> impl Service<actix_http::Request, Response = ServiceResponse<impl MessageBody>, Error = actix_web::Error>
{
    test::init_service(App::new().app_data(state).configure(routes::config)).await
}

/// Registers through the API and returns `(user_id, token)`.
pub async fn register_user(
    app: &impl Service<actix_http::Request, Response = ServiceResponse<impl MessageBody>, Error = actix_web::Error>,
    name: &str,
    email: &str,
) -> (i32, String) {
    let req = test::TestRequest::post()
        .uri("/api/register")
        .set_json(json!({
            "name": name,
            "email": email,
            "password": PASSWORD,
            "password_confirmation": PASSWORD,
        }))
        .to_request();
    let resp = test::call_service(app, req).await;
    assert_eq!(resp.status(), 201, "registration of {} failed", email);
    let body: Value = test::read_body_json(resp).await;
    (
        body["user"]["id"].as_i64().unwrap() as i32,
        body["token"].as_str().unwrap().to_string(),
    )
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token))
}

/// Value of the cookie `name` set by `resp`.
pub fn cookie_value<B>(resp: &ServiceResponse<B>, name: &str) -> Option<String> {
    resp.response()
        .cookies()
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
}

pub fn location<B>(resp: &ServiceResponse<B>) -> Option<String> {
    resp.headers()
        .get("Location")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Suggestion source returning canned tasks or a canned failure.
pub struct StubSuggestions {
    pub tasks: Vec<SuggestedTask>,
    pub fail: bool,
}

#[async_trait]
impl SuggestionSource for StubSuggestions {
    async fn suggest(&self, _prompt: &str) -> Result<Vec<SuggestedTask>, SuggestionError> {
        if self.fail {
            Err(SuggestionError::Status(502))
        } else {
            Ok(self.tasks.clone())
        }
    }
}

pub const TOKEN_WRITE_FAILURE: &str = "token table is read-only";

/// Token repository that fails `create_token` and passes everything else through.
pub struct BrokenTokenWrites(pub Arc<MemoryStore>);

#[async_trait]
impl TokenRepository for BrokenTokenWrites {
    async fn create_token(&self, _token: NewToken) -> Result<PersonalAccessToken, AppError> {
        Err(AppError::DatabaseError(TOKEN_WRITE_FAILURE.into()))
    }

    async fn find_token_by_hash(&self, hash: &str) -> Result<Option<PersonalAccessToken>, AppError> {
        self.0.find_token_by_hash(hash).await
    }

    async fn touch_token(&self, id: i64, used_at: DateTime<Utc>) -> Result<(), AppError> {
        self.0.touch_token(id, used_at).await
    }

    async fn delete_token(&self, user_id: i32, id: i64) -> Result<u64, AppError> {
        self.0.delete_token(user_id, id).await
    }

    async fn delete_user_tokens(&self, user_id: i32) -> Result<u64, AppError> {
        self.0.delete_user_tokens(user_id).await
    }
}
