//! Typed calls to the taskboard API on top of the gateway.

use reqwest::Method;
use serde::Deserialize;
use serde_json::json;

use super::error::ClientError;
use super::gateway::{ApiRequest, Gateway, LOGIN_PATH};
use crate::models::{Task, TaskChanges, TaskInput, UserProfile};

/// Body of a successful login or registration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSession {
    pub token: String,
    pub token_type: String,
    pub user: UserProfile,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct SuggestionReply {
    tasks: Vec<Task>,
}

impl Gateway {
    /// Logs in with a bearer token; the token is kept for every later call.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession, ClientError> {
        let request = ApiRequest::new(Method::POST, LOGIN_PATH)
            .with_json(&json!({ "email": email, "password": password }))?;
        let session: AuthSession = self.send_json(&request).await?;
        self.set_token(Some(session.token.clone()))?;
        Ok(session)
    }

    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        password_confirmation: &str,
    ) -> Result<AuthSession, ClientError> {
        let request = ApiRequest::new(Method::POST, "/api/register").with_json(&json!({
            "name": name,
            "email": email,
            "password": password,
            "password_confirmation": password_confirmation,
        }))?;
        let session: AuthSession = self.send_json(&request).await?;
        self.set_token(Some(session.token.clone()))?;
        Ok(session)
    }

    /// Revokes the server-side tokens, then drops local state even if that failed.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let revoked = self
            .send(&ApiRequest::new(Method::POST, "/api/logout"))
            .await
            .map(|_| ());
        self.teardown()?;
        revoked
    }

    pub async fn list_tasks(&self) -> Result<Vec<Task>, ClientError> {
        let envelope: Envelope<Vec<Task>> = self.send_json(&ApiRequest::get("/api/tasks")).await?;
        Ok(envelope.data)
    }

    pub async fn get_task(&self, id: i32) -> Result<Task, ClientError> {
        let envelope: Envelope<Task> = self
            .send_json(&ApiRequest::get(format!("/api/tasks/{}", id)))
            .await?;
        Ok(envelope.data)
    }

    pub async fn create_task(&self, input: &TaskInput) -> Result<Task, ClientError> {
        let request = ApiRequest::new(Method::POST, "/api/tasks").with_json(input)?;
        let envelope: Envelope<Task> = self.send_json(&request).await?;
        Ok(envelope.data)
    }

    pub async fn update_task(&self, id: i32, changes: &TaskChanges) -> Result<Task, ClientError> {
        let request =
            ApiRequest::new(Method::PATCH, format!("/api/tasks/{}", id)).with_json(changes)?;
        let envelope: Envelope<Task> = self.send_json(&request).await?;
        Ok(envelope.data)
    }

    pub async fn toggle_task(&self, id: i32) -> Result<Task, ClientError> {
        let request = ApiRequest::new(Method::PATCH, format!("/api/tasks/{}/toggle", id));
        let envelope: Envelope<Task> = self.send_json(&request).await?;
        Ok(envelope.data)
    }

    pub async fn delete_task(&self, id: i32) -> Result<(), ClientError> {
        self.send(&ApiRequest::new(Method::DELETE, format!("/api/tasks/{}", id)))
            .await?;
        Ok(())
    }

    /// Asks the server for suggested tasks; they come back already stored.
    pub async fn suggest_tasks(&self, prompt: &str) -> Result<Vec<Task>, ClientError> {
        let request = ApiRequest::new(Method::POST, "/api/tasks/suggestions")
            .with_json(&json!({ "prompt": prompt }))?;
        let reply: SuggestionReply = self.send_json(&request).await?;
        Ok(reply.tasks)
    }
}
