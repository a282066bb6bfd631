use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::{SessionRepository, TaskRepository, TokenRepository, UserRepository, EMAIL_TAKEN};
use crate::error::AppError;
use crate::models::{NewTask, NewToken, NewUser, PersonalAccessToken, Session, Task, User};

const USER_COLUMNS: &str = "id, name, email, password_hash, created_at";
const TOKEN_COLUMNS: &str = "id, user_id, name, token_hash, abilities, last_used_at, created_at";
const TASK_COLUMNS: &str =
    "id, title, description, due_date, priority, completed, user_id, created_at, updated_at";
const SESSION_COLUMNS: &str = "id, user_id, csrf_token, flash, intended_url, last_activity";

/// PostgreSQL backend. Schema lives in `migrations/`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Applies pending migrations from `./migrations`.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl UserRepository for PgStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user(&self, id: i32) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_user(&self, user: NewUser) -> Result<User, AppError> {
        let result = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (name, email, password_hash) VALUES ($1, $2, $3) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(AppError::invalid_field("email", EMAIL_TAKEN))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl TokenRepository for PgStore {
    async fn create_token(&self, token: NewToken) -> Result<PersonalAccessToken, AppError> {
        let token = sqlx::query_as::<_, PersonalAccessToken>(&format!(
            "INSERT INTO personal_access_tokens (user_id, name, token_hash, abilities) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            TOKEN_COLUMNS
        ))
        .bind(token.user_id)
        .bind(&token.name)
        .bind(&token.token_hash)
        .bind(&token.abilities)
        .fetch_one(&self.pool)
        .await?;
        Ok(token)
    }

    async fn find_token_by_hash(&self, hash: &str) -> Result<Option<PersonalAccessToken>, AppError> {
        let token = sqlx::query_as::<_, PersonalAccessToken>(&format!(
            "SELECT {} FROM personal_access_tokens WHERE token_hash = $1",
            TOKEN_COLUMNS
        ))
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(token)
    }

    async fn touch_token(&self, id: i64, used_at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE personal_access_tokens SET last_used_at = $1 WHERE id = $2")
            .bind(used_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_token(&self, user_id: i32, id: i64) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM personal_access_tokens WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_user_tokens(&self, user_id: i32) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM personal_access_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl TaskRepository for PgStore {
    async fn tasks_for_user(&self, user_id: i32) -> Result<Vec<Task>, AppError> {
        let tasks = sqlx::query_as::<_, Task>(&format!(
            "SELECT {} FROM tasks WHERE user_id = $1 \
             ORDER BY completed ASC, created_at DESC, id DESC",
            TASK_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tasks)
    }

    async fn find_task(&self, id: i32) -> Result<Option<Task>, AppError> {
        let task = sqlx::query_as::<_, Task>(&format!(
            "SELECT {} FROM tasks WHERE id = $1",
            TASK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(task)
    }

    async fn create_task(&self, task: NewTask) -> Result<Task, AppError> {
        let task = sqlx::query_as::<_, Task>(&format!(
            "INSERT INTO tasks (title, description, due_date, priority, completed, user_id) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            TASK_COLUMNS
        ))
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.due_date)
        .bind(task.priority)
        .bind(task.completed)
        .bind(task.user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(task)
    }

    async fn create_tasks(&self, tasks: Vec<NewTask>) -> Result<Vec<Task>, AppError> {
        if tasks.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO tasks (title, description, due_date, priority, completed, user_id) ",
        );
        builder.push_values(tasks, |mut row, task| {
            row.push_bind(task.title)
                .push_bind(task.description)
                .push_bind(task.due_date)
                .push_bind(task.priority)
                .push_bind(task.completed)
                .push_bind(task.user_id);
        });
        builder.push(" RETURNING ");
        builder.push(TASK_COLUMNS);

        let created = builder
            .build_query_as::<Task>()
            .fetch_all(&self.pool)
            .await?;
        Ok(created)
    }

    async fn save_task(&self, task: &Task) -> Result<Task, AppError> {
        let task = sqlx::query_as::<_, Task>(&format!(
            "UPDATE tasks SET title = $1, description = $2, due_date = $3, priority = $4, \
             completed = $5, updated_at = NOW() WHERE id = $6 RETURNING {}",
            TASK_COLUMNS
        ))
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.due_date)
        .bind(task.priority)
        .bind(task.completed)
        .bind(task.id)
        .fetch_one(&self.pool)
        .await?;
        Ok(task)
    }

    async fn delete_task(&self, id: i32) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl SessionRepository for PgStore {
    async fn find_session(&self, id: &str) -> Result<Option<Session>, AppError> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {} FROM sessions WHERE id = $1",
            SESSION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn save_session(&self, session: &Session) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO sessions (id, user_id, csrf_token, flash, intended_url, last_activity) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (id) DO UPDATE SET user_id = EXCLUDED.user_id, \
             csrf_token = EXCLUDED.csrf_token, flash = EXCLUDED.flash, \
             intended_url = EXCLUDED.intended_url, last_activity = EXCLUDED.last_activity",
        )
        .bind(&session.id)
        .bind(session.user_id)
        .bind(&session.csrf_token)
        .bind(&session.flash)
        .bind(&session.intended_url)
        .bind(session.last_activity)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_session(&self, id: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn prune_expired(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE last_activity < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
