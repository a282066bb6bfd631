use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Name given to every token minted by the login, register and refresh flows.
pub const API_TOKEN_NAME: &str = "api-token";

/// The "all" ability scope.
pub const ALL_ABILITIES: &str = "*";

/// A stored bearer token. Only the SHA-256 hash of the plaintext is persisted.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PersonalAccessToken {
    pub id: i64,
    pub user_id: i32,
    pub name: String,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub abilities: Vec<String>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewToken {
    pub user_id: i32,
    pub name: String,
    pub token_hash: String,
    pub abilities: Vec<String>,
}
