use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::BTreeMap;

use crate::error::FieldErrors;

/// Data flashed into a session for exactly one subsequent read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionFlash {
    #[serde(default)]
    pub errors: FieldErrors,
    #[serde(default)]
    pub old: BTreeMap<String, String>,
}

/// A browser session. Guests get one too, so the anti-forgery token exists before login.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: Option<i32>,
    pub csrf_token: String,
    pub flash: Option<Json<SessionFlash>>,
    pub intended_url: Option<String>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, lifetime: Duration, now: DateTime<Utc>) -> bool {
        self.last_activity + lifetime < now
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }
}
