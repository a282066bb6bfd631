use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

use super::{SessionRepository, TaskRepository, TokenRepository, UserRepository, EMAIL_TAKEN};
use crate::error::AppError;
use crate::models::{NewTask, NewToken, NewUser, PersonalAccessToken, Session, Task, User};

/// In-process store. Each operation holds the lock for its whole body, so single
/// operations are atomic just like single statements against PostgreSQL.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    users: BTreeMap<i32, User>,
    tokens: BTreeMap<i64, PersonalAccessToken>,
    tasks: BTreeMap<i32, Task>,
    sessions: HashMap<String, Session>,
    last_user_id: i32,
    last_token_id: i64,
    last_task_id: i32,
}

impl Inner {
    fn insert_task(&mut self, task: NewTask, now: DateTime<Utc>) -> Task {
        self.last_task_id += 1;
        let task = Task {
            id: self.last_task_id,
            title: task.title,
            description: task.description,
            due_date: task.due_date,
            priority: task.priority,
            completed: task.completed,
            user_id: task.user_id,
            created_at: now,
            updated_at: now,
        };
        self.tasks.insert(task.id, task.clone());
        task
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live tokens held by `user_id`.
    pub fn token_count(&self, user_id: i32) -> usize {
        self.inner
            .read()
            .tokens
            .values()
            .filter(|token| token.user_id == user_id)
            .count()
    }

    pub fn session_count(&self) -> usize {
        self.inner.read().sessions.len()
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .inner
            .read()
            .users
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn find_user(&self, id: i32) -> Result<Option<User>, AppError> {
        Ok(self.inner.read().users.get(&id).cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, AppError> {
        let mut inner = self.inner.write();
        if inner.users.values().any(|existing| existing.email == user.email) {
            return Err(AppError::invalid_field("email", EMAIL_TAKEN));
        }
        inner.last_user_id += 1;
        let user = User {
            id: inner.last_user_id,
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            created_at: Utc::now(),
        };
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }
}

#[async_trait]
impl TokenRepository for MemoryStore {
    async fn create_token(&self, token: NewToken) -> Result<PersonalAccessToken, AppError> {
        let mut inner = self.inner.write();
        inner.last_token_id += 1;
        let token = PersonalAccessToken {
            id: inner.last_token_id,
            user_id: token.user_id,
            name: token.name,
            token_hash: token.token_hash,
            abilities: token.abilities,
            last_used_at: None,
            created_at: Utc::now(),
        };
        inner.tokens.insert(token.id, token.clone());
        Ok(token)
    }

    async fn find_token_by_hash(&self, hash: &str) -> Result<Option<PersonalAccessToken>, AppError> {
        Ok(self
            .inner
            .read()
            .tokens
            .values()
            .find(|token| token.token_hash == hash)
            .cloned())
    }

    async fn touch_token(&self, id: i64, used_at: DateTime<Utc>) -> Result<(), AppError> {
        if let Some(token) = self.inner.write().tokens.get_mut(&id) {
            token.last_used_at = Some(used_at);
        }
        Ok(())
    }

    async fn delete_token(&self, user_id: i32, id: i64) -> Result<u64, AppError> {
        let mut inner = self.inner.write();
        match inner.tokens.get(&id) {
            Some(token) if token.user_id == user_id => {
                inner.tokens.remove(&id);
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn delete_user_tokens(&self, user_id: i32) -> Result<u64, AppError> {
        let mut inner = self.inner.write();
        let before = inner.tokens.len();
        inner.tokens.retain(|_, token| token.user_id != user_id);
        Ok((before - inner.tokens.len()) as u64)
    }
}

#[async_trait]
impl TaskRepository for MemoryStore {
    async fn tasks_for_user(&self, user_id: i32) -> Result<Vec<Task>, AppError> {
        let mut tasks: Vec<Task> = self
            .inner
            .read()
            .tasks
            .values()
            .filter(|task| task.user_id == user_id)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| {
            a.completed
                .cmp(&b.completed)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(tasks)
    }

    async fn find_task(&self, id: i32) -> Result<Option<Task>, AppError> {
        Ok(self.inner.read().tasks.get(&id).cloned())
    }

    async fn create_task(&self, task: NewTask) -> Result<Task, AppError> {
        Ok(self.inner.write().insert_task(task, Utc::now()))
    }

    async fn create_tasks(&self, tasks: Vec<NewTask>) -> Result<Vec<Task>, AppError> {
        let now = Utc::now();
        let mut inner = self.inner.write();
        Ok(tasks
            .into_iter()
            .map(|task| inner.insert_task(task, now))
            .collect())
    }

    async fn save_task(&self, task: &Task) -> Result<Task, AppError> {
        let mut inner = self.inner.write();
        let stored = inner
            .tasks
            .get_mut(&task.id)
            .ok_or_else(|| AppError::NotFound("Task not found".into()))?;
        stored.title = task.title.clone();
        stored.description = task.description.clone();
        stored.due_date = task.due_date;
        stored.priority = task.priority;
        stored.completed = task.completed;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn delete_task(&self, id: i32) -> Result<bool, AppError> {
        Ok(self.inner.write().tasks.remove(&id).is_some())
    }
}

#[async_trait]
impl SessionRepository for MemoryStore {
    async fn find_session(&self, id: &str) -> Result<Option<Session>, AppError> {
        Ok(self.inner.read().sessions.get(id).cloned())
    }

    async fn save_session(&self, session: &Session) -> Result<(), AppError> {
        self.inner
            .write()
            .sessions
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn delete_session(&self, id: &str) -> Result<(), AppError> {
        self.inner.write().sessions.remove(id);
        Ok(())
    }

    async fn prune_expired(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let mut inner = self.inner.write();
        let before = inner.sessions.len();
        inner
            .sessions
            .retain(|_, session| session.last_activity >= cutoff);
        Ok((before - inner.sessions.len()) as u64)
    }
}
