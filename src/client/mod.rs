//! Client side of the API.
//!
//! `Gateway` owns the HTTP client, the bearer token (mirrored to a `TokenStorage`
//! under `auth_token`) and the cookie jar holding the session and `XSRF-TOKEN`
//! cookies. Create one per user session and share it by cloning.

pub mod api;
pub mod error;
pub mod gateway;
pub mod storage;

pub use api::AuthSession;
pub use error::ClientError;
pub use gateway::{ApiRequest, ApiResponse, Gateway, GatewayConfig, LogNavigator, Navigator};
pub use storage::{FileTokenStorage, MemoryTokenStorage, TokenStorage};
