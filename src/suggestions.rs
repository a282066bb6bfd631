//! Task suggestions from the external automation webhook.
//!
//! The webhook receives `{"chatInput": prompt}` and answers with an `output` array of
//! suggested tasks. Field names on the wire are Spanish (`titulo`, `descripcion`,
//! `completada`, `fecha_limite`); English aliases are accepted as well.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::models::task::parse_due_date;
use crate::models::{NewTask, TaskPriority};

#[derive(Debug, thiserror::Error)]
pub enum SuggestionError {
    #[error("suggestion webhook is not configured")]
    NotConfigured,
    #[error("suggestion webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("suggestion webhook answered with status {0}")]
    Status(u16),
}

/// One task proposed by the webhook. Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SuggestedTask {
    #[serde(default, rename = "titulo", alias = "title")]
    pub title: Option<String>,
    #[serde(default, rename = "descripcion", alias = "description")]
    pub description: Option<String>,
    #[serde(default, rename = "completada", alias = "completed")]
    pub completed: Option<bool>,
    #[serde(default, rename = "fecha_limite", alias = "due_date")]
    pub due_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebhookReply {
    #[serde(default)]
    output: Vec<SuggestedTask>,
}

impl SuggestedTask {
    /// Row data for a suggested task owned by `user_id`. Suggestions are always `high`.
    pub fn into_new_task(self, user_id: i32) -> NewTask {
        NewTask {
            title: self
                .title
                .map(|t| t.trim().chars().take(255).collect::<String>())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "Untitled".to_string()),
            description: Some(self.description.unwrap_or_default()),
            due_date: self.due_date.as_deref().and_then(parse_due_date),
            priority: TaskPriority::High,
            completed: self.completed.unwrap_or(false),
            user_id,
        }
    }
}

#[async_trait]
pub trait SuggestionSource: Send + Sync {
    async fn suggest(&self, prompt: &str) -> Result<Vec<SuggestedTask>, SuggestionError>;
}

/// Posts prompts to a configured webhook URL.
pub struct WebhookSuggestionSource {
    client: Client,
    url: String,
}

impl WebhookSuggestionSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SuggestionError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl SuggestionSource for WebhookSuggestionSource {
    async fn suggest(&self, prompt: &str) -> Result<Vec<SuggestedTask>, SuggestionError> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "chatInput": prompt }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SuggestionError::Status(status.as_u16()));
        }

        let reply: WebhookReply = response.json().await?;
        log::debug!("Webhook proposed {} task(s)", reply.output.len());
        Ok(reply.output)
    }
}

/// Used when no webhook URL is configured.
pub struct DisabledSuggestions;

#[async_trait]
impl SuggestionSource for DisabledSuggestions {
    async fn suggest(&self, _prompt: &str) -> Result<Vec<SuggestedTask>, SuggestionError> {
        Err(SuggestionError::NotConfigured)
    }
}
