use std::env;
use std::time::Duration;

use crate::auth::session::DEFAULT_SWEEP_ODDS;

/// Raised when an environment variable is present but cannot be parsed.
#[derive(Debug, thiserror::Error)]
#[error("{name} must be {expected}, got {value:?}")]
pub struct ConfigError {
    pub name: &'static str,
    pub expected: &'static str,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string. When unset the in-process store is used.
    pub database_url: Option<String>,
    pub server_port: u16,
    pub server_host: String,
    /// Exposes error details in 500 responses.
    pub debug: bool,
    pub cors_allowed_origin: Option<String>,
    pub suggestion_webhook_url: Option<String>,
    pub suggestion_timeout: Duration,
    pub session_lifetime: chrono::Duration,
    /// Percent chance that starting a guest session also prunes expired sessions.
    pub session_sweep_chance: u32,
    pub secure_cookies: bool,
    pub bcrypt_cost: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; `from_env` uses the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Ok(Self {
            database_url: non_empty("DATABASE_URL"),
            server_port: parse_or(&lookup, "SERVER_PORT", 8080, "a port number")?,
            server_host: non_empty("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            debug: parse_flag(&lookup, "APP_DEBUG")?,
            cors_allowed_origin: non_empty("CORS_ALLOWED_ORIGIN"),
            suggestion_webhook_url: non_empty("SUGGESTION_WEBHOOK_URL"),
            suggestion_timeout: Duration::from_secs(parse_or(
                &lookup,
                "SUGGESTION_TIMEOUT_SECS",
                30,
                "a number of seconds",
            )?),
            session_lifetime: chrono::Duration::minutes(parse_or(
                &lookup,
                "SESSION_LIFETIME_MINUTES",
                120,
                "a number of minutes",
            )?),
            session_sweep_chance: parse_or(
                &lookup,
                "SESSION_SWEEP_CHANCE",
                DEFAULT_SWEEP_ODDS.0,
                "a percentage",
            )?
            .min(100),
            secure_cookies: parse_flag(&lookup, "SESSION_SECURE_COOKIE")?,
            bcrypt_cost: parse_or(&lookup, "BCRYPT_COST", bcrypt::DEFAULT_COST, "a bcrypt cost")?,
        })
    }

    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.server_host, self.server_port)
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T, expected: &'static str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError {
            name,
            expected,
            value,
        }),
        None => Ok(default),
    }
}

fn parse_flag<F>(lookup: &F, name: &'static str) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name).as_deref().map(str::trim) {
        None | Some("") => Ok(false),
        Some("1") | Some("true") | Some("TRUE") | Some("True") => Ok(true),
        Some("0") | Some("false") | Some("FALSE") | Some("False") => Ok(false),
        Some(other) => Err(ConfigError {
            name,
            expected: "true or false",
            value: other.to_string(),
        }),
    }
}
