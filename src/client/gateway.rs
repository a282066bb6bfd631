//! The request gateway: one owned HTTP client that attaches credentials, and
//! refreshes the bearer token once when the server answers 401.
//!
//! Concurrent callers that hit 401 while a refresh is already running queue up and
//! receive that refresh's outcome instead of starting their own. No call is sent
//! more than twice.

use parking_lot::{Mutex, RwLock};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::mem;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use super::error::ClientError;
use super::storage::TokenStorage;
use crate::security::mask_secret;

pub const LOGIN_PATH: &str = "/api/login";
pub const REFRESH_PATH: &str = "/api/refresh-token";

const XSRF_COOKIE: &str = "XSRF-TOKEN";
const XSRF_HEADER: &str = "X-XSRF-TOKEN";

/// Where a session that can no longer be refreshed gets sent.
pub trait Navigator: Send + Sync {
    fn to_login(&self);
}

/// Navigator for headless clients: records the event in the log.
#[derive(Debug, Default)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn to_login(&self) {
        log::warn!("Session expired; the user has to log in again");
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A call that can be replayed after a refresh.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn with_json<T: Serialize>(mut self, body: &T) -> Result<Self, ClientError> {
        self.body =
            Some(serde_json::to_value(body).map_err(|e| ClientError::RequestSetup(e.to_string()))?);
        Ok(self)
    }

    /// Login and refresh answer 401 for reasons a refresh cannot fix.
    fn may_refresh(&self) -> bool {
        self.path != LOGIN_PATH && self.path != REFRESH_PATH
    }
}

/// Successful response: status plus raw body.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        serde_json::from_slice(&self.body).map_err(|e| ClientError::Decode(e.to_string()))
    }
}

type RefreshOutcome = Result<String, ClientError>;

#[derive(Default)]
struct RefreshState {
    refreshing: bool,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
}

struct Inner {
    http: Client,
    jar: Arc<Jar>,
    base_url: Url,
    storage: Box<dyn TokenStorage>,
    navigator: Box<dyn Navigator>,
    token: RwLock<Option<String>>,
    refresh: Mutex<RefreshState>,
}

/// Cheap to clone; every clone shares the token, cookies and refresh state.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<Inner>,
}

#[derive(Deserialize)]
struct RefreshEnvelope {
    data: RefreshData,
}

#[derive(Deserialize)]
struct RefreshData {
    access_token: String,
}

impl Gateway {
    /// Builds the gateway and picks up a token left in `storage` by an earlier run.
    pub fn new(
        config: GatewayConfig,
        storage: Box<dyn TokenStorage>,
        navigator: Box<dyn Navigator>,
    ) -> Result<Self, ClientError> {
        let base_url =
            Url::parse(&config.base_url).map_err(|e| ClientError::RequestSetup(e.to_string()))?;
        let jar = Arc::new(Jar::default());
        let http = Client::builder()
            .cookie_provider(jar.clone())
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::RequestSetup(e.to_string()))?;
        let token = storage.load()?;

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                jar,
                base_url,
                storage,
                navigator,
                token: RwLock::new(token),
                refresh: Mutex::new(RefreshState::default()),
            }),
        })
    }

    pub fn token(&self) -> Option<String> {
        self.inner.token.read().clone()
    }

    /// Replaces the held token and mirrors it to storage.
    pub fn set_token(&self, token: Option<String>) -> Result<(), ClientError> {
        match &token {
            Some(token) => self.inner.storage.store(token)?,
            None => self.inner.storage.clear()?,
        }
        *self.inner.token.write() = token;
        Ok(())
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.refresh.lock().refreshing
    }

    /// Sends `request`, refreshing and replaying it once on 401.
    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ClientError> {
        let used = self.token();
        let response = self.execute(request, used.as_deref()).await?;

        if response.status != StatusCode::UNAUTHORIZED || !request.may_refresh() {
            return into_result(response);
        }

        log::debug!("{} {} answered 401, refreshing", request.method, request.path);
        let fresh = self.refreshed_token(used.as_deref()).await?;
        let retried = self.execute(request, Some(&fresh)).await?;
        into_result(retried)
    }

    pub async fn send_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, ClientError> {
        self.send(request).await?.json()
    }

    /// Drops the token locally. Server-side revocation is `logout`'s job.
    pub fn teardown(&self) -> Result<(), ClientError> {
        self.set_token(None)
    }

    /// A token newer than `used`: either the outcome of a refresh in flight, one
    /// that finished since `used` was sent, or a refresh started here.
    async fn refreshed_token(&self, used: Option<&str>) -> RefreshOutcome {
        let waiter = {
            let mut state = self.inner.refresh.lock();
            if state.refreshing {
                let (tx, rx) = oneshot::channel();
                state.waiters.push(tx);
                Some(rx)
            } else {
                let current = self.inner.token.read().clone();
                match current {
                    Some(current) if Some(current.as_str()) != used => return Ok(current),
                    // Cleared since the call went out: a refresh already failed or the user logged out.
                    None if used.is_some() => {
                        return Err(ClientError::Authentication(
                            "Session expired; log in again".into(),
                        ))
                    }
                    _ => {}
                }
                state.refreshing = true;
                None
            }
        };

        if let Some(rx) = waiter {
            return rx.await.unwrap_or(Err(ClientError::RefreshAborted));
        }

        let guard = RefreshGuard {
            inner: &self.inner,
            settled: false,
        };
        let outcome = self.perform_refresh().await;

        if let Err(e) = &outcome {
            log::warn!("Token refresh failed: {}", e);
            guard.settle(outcome.clone());
            if let Err(storage) = self.set_token(None) {
                log::error!("Could not clear the stored token: {}", storage);
            }
            self.inner.navigator.to_login();
        } else {
            guard.settle(outcome.clone());
        }
        outcome
    }

    async fn perform_refresh(&self) -> RefreshOutcome {
        let current = self.token();
        let response = self
            .execute(&ApiRequest::get(REFRESH_PATH), current.as_deref())
            .await?;
        let envelope: RefreshEnvelope = into_result(response)?.json()?;
        let token = envelope.data.access_token;

        self.set_token(Some(token.clone()))?;
        log::info!("Token refreshed: {}", mask_secret(&token));
        Ok(token)
    }

    async fn execute(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> Result<ApiResponse, ClientError> {
        let url = self
            .inner
            .base_url
            .join(&request.path)
            .map_err(|e| ClientError::RequestSetup(e.to_string()))?;

        let mut builder = self
            .inner
            .http
            .request(request.method.clone(), url.clone())
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .header("X-Requested-With", "XMLHttpRequest");
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(xsrf) = self.xsrf_token(&url) {
            builder = builder.header(XSRF_HEADER, xsrf);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(ClientError::from_transport)?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(ClientError::from_transport)?
            .to_vec();
        Ok(ApiResponse { status, body })
    }

    fn xsrf_token(&self, url: &Url) -> Option<String> {
        let header = self.inner.jar.cookies(url)?;
        let cookies = header.to_str().ok()?;
        cookies.split(';').find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == XSRF_COOKIE).then(|| value.to_string())
        })
    }
}

fn into_result(response: ApiResponse) -> Result<ApiResponse, ClientError> {
    if response.status.is_success() {
        Ok(response)
    } else {
        Err(ClientError::from_status(
            response.status.as_u16(),
            &response.body,
        ))
    }
}

/// Clears `refreshing` and wakes every waiter when the refresh settles, including
/// when the refreshing future is dropped half way.
struct RefreshGuard<'a> {
    inner: &'a Inner,
    settled: bool,
}

impl RefreshGuard<'_> {
    fn settle(mut self, outcome: RefreshOutcome) {
        self.settled = true;
        release(self.inner, outcome);
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            release(self.inner, Err(ClientError::RefreshAborted));
        }
    }
}

fn release(inner: &Inner, outcome: RefreshOutcome) {
    let waiters = {
        let mut state = inner.refresh.lock();
        state.refreshing = false;
        mem::take(&mut state.waiters)
    };
    for waiter in waiters {
        let _ = waiter.send(outcome.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::storage::MemoryTokenStorage;

    fn gateway() -> Gateway {
        Gateway::new(
            GatewayConfig::new("http://127.0.0.1:9"),
            Box::new(MemoryTokenStorage::new()),
            Box::new(LogNavigator),
        )
        .unwrap()
    }

    #[test]
    fn test_login_and_refresh_never_refresh() {
        assert!(!ApiRequest::get(LOGIN_PATH).may_refresh());
        assert!(!ApiRequest::get(REFRESH_PATH).may_refresh());
        assert!(ApiRequest::get("/api/tasks").may_refresh());
    }

    #[test]
    fn test_token_is_loaded_from_storage() {
        let storage = MemoryTokenStorage::new();
        storage.store("tk_saved").unwrap();
        let gateway = Gateway::new(
            GatewayConfig::new("http://127.0.0.1:9"),
            Box::new(storage),
            Box::new(LogNavigator),
        )
        .unwrap();
        assert_eq!(gateway.token().as_deref(), Some("tk_saved"));

        gateway.teardown().unwrap();
        assert_eq!(gateway.token(), None);
    }

    #[test]
    fn test_bad_base_url_is_request_setup() {
        let result = Gateway::new(
            GatewayConfig::new("not a url"),
            Box::new(MemoryTokenStorage::new()),
            Box::new(LogNavigator),
        );
        assert!(matches!(result, Err(ClientError::RequestSetup(_))));
    }

    #[test]
    fn test_xsrf_token_is_read_from_cookie_jar() {
        let gateway = gateway();
        let url = Url::parse("http://127.0.0.1:9/api/tasks").unwrap();
        gateway
            .inner
            .jar
            .add_cookie_str("XSRF-TOKEN=abc123; Path=/", &url);
        gateway
            .inner
            .jar
            .add_cookie_str("taskboard_session=s1; Path=/; HttpOnly", &url);

        assert_eq!(gateway.xsrf_token(&url).as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn test_dropped_refresh_releases_waiters() {
        let gateway = gateway();
        let (tx, rx) = oneshot::channel();
        {
            let mut state = gateway.inner.refresh.lock();
            state.refreshing = true;
            state.waiters.push(tx);
        }

        drop(RefreshGuard {
            inner: &gateway.inner,
            settled: false,
        });

        assert_eq!(rx.await.unwrap(), Err(ClientError::RefreshAborted));
        assert!(!gateway.is_refreshing());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_connectivity() {
        let gateway = Gateway::new(
            GatewayConfig::new("http://127.0.0.1:9").with_timeout(Duration::from_secs(2)),
            Box::new(MemoryTokenStorage::new()),
            Box::new(LogNavigator),
        )
        .unwrap();
        let result = gateway.send(&ApiRequest::get("/api/tasks")).await;
        assert!(matches!(result, Err(ClientError::Connectivity(_))));
    }
}
