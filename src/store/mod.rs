//! Persistence seams.
//!
//! Handlers only talk to these traits. `PgStore` backs them with PostgreSQL through
//! sqlx; `MemoryStore` keeps everything in process and is used when no
//! `DATABASE_URL` is configured, and by the test suite.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::{NewTask, NewToken, NewUser, PersonalAccessToken, Session, Task, User};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Message used when registration hits an existing e-mail address.
pub const EMAIL_TAKEN: &str = "The email has already been taken.";

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    async fn find_user(&self, id: i32) -> Result<Option<User>, AppError>;
    /// Fails with a validation error on `email` when the address is already registered.
    async fn create_user(&self, user: NewUser) -> Result<User, AppError>;
}

#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn create_token(&self, token: NewToken) -> Result<PersonalAccessToken, AppError>;
    async fn find_token_by_hash(&self, hash: &str) -> Result<Option<PersonalAccessToken>, AppError>;
    async fn touch_token(&self, id: i64, used_at: DateTime<Utc>) -> Result<(), AppError>;
    /// Deletes one token of `user_id`; returns the number of rows removed (0 or 1).
    async fn delete_token(&self, user_id: i32, id: i64) -> Result<u64, AppError>;
    async fn delete_user_tokens(&self, user_id: i32) -> Result<u64, AppError>;
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Incomplete tasks first, then newest first.
    async fn tasks_for_user(&self, user_id: i32) -> Result<Vec<Task>, AppError>;
    async fn find_task(&self, id: i32) -> Result<Option<Task>, AppError>;
    async fn create_task(&self, task: NewTask) -> Result<Task, AppError>;
    async fn create_tasks(&self, tasks: Vec<NewTask>) -> Result<Vec<Task>, AppError>;
    /// Persists the mutable fields of `task` and bumps `updated_at`. The owner is never written.
    async fn save_task(&self, task: &Task) -> Result<Task, AppError>;
    async fn delete_task(&self, id: i32) -> Result<bool, AppError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn find_session(&self, id: &str) -> Result<Option<Session>, AppError>;
    /// Inserts or replaces the session with the same id.
    async fn save_session(&self, session: &Session) -> Result<(), AppError>;
    async fn delete_session(&self, id: &str) -> Result<(), AppError>;
    /// Deletes every session idle since before `cutoff`; returns how many went.
    async fn prune_expired(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError>;
}

/// Everything a backend has to provide to serve the application.
pub trait Store: UserRepository + TokenRepository + TaskRepository + SessionRepository {}

impl<T> Store for T where T: UserRepository + TokenRepository + TaskRepository + SessionRepository {}
