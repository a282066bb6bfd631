use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::error::AppError;
use crate::models::token::{ALL_ABILITIES, API_TOKEN_NAME};
use crate::models::{NewToken, PersonalAccessToken, User};
use crate::security::{mask_secret, random_string};
use crate::store::{TokenRepository, UserRepository};

/// Prefix of every plaintext bearer token.
pub const TOKEN_PREFIX: &str = "tk_";
const TOKEN_RANDOM_LEN: usize = 40;

lazy_static! {
    static ref TOKEN_FORMAT: Regex = Regex::new(r"^tk_[A-Za-z0-9]{40}$").unwrap();
}

/// A freshly issued token. `plain_text` is never stored and never shown again.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub plain_text: String,
    pub token: PersonalAccessToken,
}

/// Generates a new plaintext token: `tk_` followed by 40 alphanumeric characters.
pub fn generate_plain_token() -> String {
    format!("{}{}", TOKEN_PREFIX, random_string(TOKEN_RANDOM_LEN))
}

/// Hex encoded SHA-256 of the plaintext; this is what the token table stores.
pub fn hash_token(plain_text: &str) -> String {
    hex::encode(Sha256::digest(plain_text.as_bytes()))
}

/// Checks the shape of a bearer token before it is looked up.
pub fn is_well_formed(plain_text: &str) -> bool {
    TOKEN_FORMAT.is_match(plain_text)
}

/// Issues, revokes and validates opaque bearer tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    tokens: Arc<dyn TokenRepository>,
    users: Arc<dyn UserRepository>,
}

impl TokenIssuer {
    pub fn new(tokens: Arc<dyn TokenRepository>, users: Arc<dyn UserRepository>) -> Self {
        Self { tokens, users }
    }

    pub async fn issue(&self, user: &User) -> Result<IssuedToken, AppError> {
        let plain_text = generate_plain_token();
        let token = self
            .tokens
            .create_token(NewToken {
                user_id: user.id,
                name: API_TOKEN_NAME.to_string(),
                token_hash: hash_token(&plain_text),
                abilities: vec![ALL_ABILITIES.to_string()],
            })
            .await?;

        log::info!(
            "Issued token {} (id {}) for user {}",
            mask_secret(&plain_text),
            token.id,
            user.id
        );
        Ok(IssuedToken { plain_text, token })
    }

    /// Deletes every token of `user`. Returns how many were removed.
    pub async fn revoke_all(&self, user: &User) -> Result<u64, AppError> {
        let revoked = self.tokens.delete_user_tokens(user.id).await?;
        log::info!("Revoked {} token(s) for user {}", revoked, user.id);
        Ok(revoked)
    }

    /// Deletes only the token that authenticated the current request.
    pub async fn revoke_current(
        &self,
        user: &User,
        token: &PersonalAccessToken,
    ) -> Result<(), AppError> {
        let revoked = self.tokens.delete_token(user.id, token.id).await?;
        log::info!(
            "Revoked current token (id {}) for user {}: {} row(s)",
            token.id,
            user.id,
            revoked
        );
        Ok(())
    }

    /// Resolves a plaintext bearer token to its owner.
    pub async fn validate(&self, plain_text: &str) -> Result<(User, PersonalAccessToken), AppError> {
        if !is_well_formed(plain_text) {
            return Err(AppError::Unauthorized("Invalid token".into()));
        }

        let token = self
            .tokens
            .find_token_by_hash(&hash_token(plain_text))
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid token".into()))?;

        let user = self.users.find_user(token.user_id).await?.ok_or_else(|| {
            log::warn!("Token {} belongs to a missing user", token.id);
            AppError::Unauthorized("Invalid token".into())
        })?;

        self.tokens.touch_token(token.id, Utc::now()).await?;
        Ok((user, token))
    }
}
