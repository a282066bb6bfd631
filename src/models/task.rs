use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::FromRow;
use std::borrow::Cow;
use std::str::FromStr;
use validator::{Validate, ValidationError, ValidationErrors};

/// Longest accepted task title, in characters.
pub const TITLE_MAX_CHARS: u64 = 255;

/// Represents the priority of a task.
/// Corresponds to the `task_priority` SQL enum.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "task_priority", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
        }
    }
}

impl FromStr for TaskPriority {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(TaskPriority::Low),
            "medium" => Ok(TaskPriority::Medium),
            "high" => Ok(TaskPriority::High),
            _ => {
                let mut error = ValidationError::new("in");
                error.message = Some(Cow::from(
                    "The selected priority is invalid. Use low, medium or high.",
                ));
                Err(error)
            }
        }
    }
}

/// A task as stored in the database and returned by the API.
///
/// Serialization appends a derived `is_completed` flag mirroring `completed`.
#[derive(Debug, Clone, PartialEq, Deserialize, FromRow)]
pub struct Task {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub priority: TaskPriority,
    pub completed: bool,
    /// Owner. Set once at creation and never changed afterwards.
    pub user_id: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Serialize for Task {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Task", 10)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("title", &self.title)?;
        state.serialize_field("description", &self.description)?;
        state.serialize_field("due_date", &self.due_date)?;
        state.serialize_field("priority", &self.priority)?;
        state.serialize_field("completed", &self.completed)?;
        state.serialize_field("is_completed", &self.completed)?;
        state.serialize_field("user_id", &self.user_id)?;
        state.serialize_field("created_at", &self.created_at)?;
        state.serialize_field("updated_at", &self.updated_at)?;
        state.end()
    }
}

impl Task {
    /// Applies validated partial changes. `user_id` is not part of `TaskChanges`.
    pub fn apply(&mut self, changes: TaskChanges) {
        if let Some(title) = changes.title {
            self.title = title.trim().to_string();
        }
        if let Some(description) = changes.description {
            self.description = normalize_text(description);
        }
        if let Some(due_date) = changes.due_date {
            self.due_date = due_date.as_deref().and_then(parse_due_date);
        }
        if let Some(priority) = changes.priority.as_deref() {
            if let Ok(priority) = priority.parse::<TaskPriority>() {
                self.priority = priority;
            }
        }
        if let Some(completed) = changes.completed {
            self.completed = completed;
        }
    }

    pub fn toggle(&mut self) {
        self.completed = !self.completed;
    }
}

/// Payload for creating a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct TaskInput {
    #[validate(
        required,
        length(max = 255),
        custom = "validate_not_blank"
    )]
    pub title: Option<String>,

    pub description: Option<String>,

    /// `YYYY-MM-DD`, or a timestamp whose date part is kept.
    #[validate(custom = "validate_due_date")]
    pub due_date: Option<String>,

    /// `low`, `medium` or `high`; defaults to `medium`.
    #[validate(custom = "validate_priority")]
    pub priority: Option<String>,
}

impl TaskInput {
    /// Converts validated input into insertable row data owned by `user_id`.
    pub fn into_new_task(self, user_id: i32) -> NewTask {
        NewTask {
            title: self.title.unwrap_or_default().trim().to_string(),
            description: normalize_text(self.description),
            due_date: self.due_date.as_deref().and_then(parse_due_date),
            priority: self
                .priority
                .as_deref()
                .and_then(|p| p.parse::<TaskPriority>().ok())
                .unwrap_or_default(),
            completed: false,
            user_id,
        }
    }
}

/// Partial update payload. For `description` and `due_date` an absent field leaves the
/// value alone while an explicit `null` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl Validate for TaskChanges {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Some(title) = &self.title {
            if let Err(error) = validate_not_blank(title).and_then(|_| validate_title_length(title)) {
                errors.add("title", error);
            }
        }
        if let Some(Some(due_date)) = &self.due_date {
            if let Err(error) = validate_due_date(due_date) {
                errors.add("due_date", error);
            }
        }
        if let Some(priority) = &self.priority {
            if let Err(error) = validate_priority(priority) {
                errors.add("priority", error);
            }
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Insertable task row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub priority: TaskPriority,
    pub completed: bool,
    pub user_id: i32,
}

/// Accepts `YYYY-MM-DD`, RFC 3339 timestamps and `YYYY-MM-DD HH:MM:SS`.
pub fn parse_due_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.date_naive())
        })
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
}

fn normalize_text(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("required"));
    }
    Ok(())
}

fn validate_title_length(value: &str) -> Result<(), ValidationError> {
    if value.chars().count() as u64 > TITLE_MAX_CHARS {
        let mut error = ValidationError::new("length");
        error.add_param(Cow::from("max"), &TITLE_MAX_CHARS);
        return Err(error);
    }
    Ok(())
}

fn validate_due_date(value: &str) -> Result<(), ValidationError> {
    match parse_due_date(value) {
        Some(_) => Ok(()),
        None => {
            let mut error = ValidationError::new("date");
            error.message = Some(Cow::from("The due date field must be a valid date."));
            Err(error)
        }
    }
}

fn validate_priority(value: &str) -> Result<(), ValidationError> {
    TaskPriority::from_str(value).map(|_| ())
}
