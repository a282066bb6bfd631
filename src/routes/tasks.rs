use crate::{
    auth::{ensure_owner, AuthenticatedUser},
    error::AppError,
    models::{Task, TaskChanges, TaskInput},
    state::AppState,
    suggestions::SuggestedTask,
};
use actix_web::{delete, get, patch, post, route, web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::{Validate, ValidationError};

/// Payload for asking the webhook for task suggestions.
#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct SuggestionRequest {
    #[validate(required, length(max = 1000), custom = "validate_prompt")]
    pub prompt: Option<String>,
}

fn validate_prompt(prompt: &str) -> Result<(), ValidationError> {
    if prompt.trim().is_empty() {
        return Err(ValidationError::new("required"));
    }
    Ok(())
}

fn envelope<T: Serialize>(data: T, message: &str) -> serde_json::Value {
    json!({
        "data": data,
        "status": "success",
        "message": message,
    })
}

async fn owned_task(state: &AppState, id: i32, user_id: i32) -> Result<Task, AppError> {
    let task = state.tasks.find_task(id).await?;
    ensure_owner(task, user_id)
}

/// Lists the caller's tasks.
///
/// Incomplete tasks come first, newest first within each group.
///
/// ## Responses:
/// - `200 OK`: `{data: [Task], status, message}`.
/// - `401 Unauthorized`: no valid token or session.
#[get("")]
pub async fn get_tasks(
    state: web::Data<AppState>,
    caller: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let tasks = state.tasks.tasks_for_user(caller.id()).await?;
    Ok(HttpResponse::Ok().json(envelope(tasks, "Tasks retrieved successfully")))
}

/// Creates a task owned by the caller.
///
/// ## Responses:
/// - `201 Created`: `{data: Task, status, message}`.
/// - `422 Unprocessable Entity`: title missing, blank or too long; bad date or priority.
#[post("")]
pub async fn create_task(
    state: web::Data<AppState>,
    caller: AuthenticatedUser,
    task_data: web::Json<TaskInput>,
) -> Result<impl Responder, AppError> {
    task_data.validate()?;

    let task = state
        .tasks
        .create_task(task_data.into_inner().into_new_task(caller.id()))
        .await?;
    log::info!("User {} created task {}", caller.id(), task.id);

    Ok(HttpResponse::Created().json(envelope(task, "Task created successfully")))
}

/// Retrieves one task.
///
/// ## Responses:
/// - `200 OK`: `{data: Task, status, message}`.
/// - `403 Forbidden`: the task belongs to another user.
/// - `404 Not Found`: no task with that id.
#[get("/{id}")]
pub async fn get_task(
    state: web::Data<AppState>,
    caller: AuthenticatedUser,
    task_id: web::Path<i32>,
) -> Result<impl Responder, AppError> {
    let task = owned_task(&state, task_id.into_inner(), caller.id()).await?;
    Ok(HttpResponse::Ok().json(envelope(task, "Task retrieved successfully")))
}

/// Partially updates a task. Absent fields keep their value; `null` clears
/// `description` and `due_date`. The owner never changes.
#[route("/{id}", method = "PUT", method = "PATCH")]
pub async fn update_task(
    state: web::Data<AppState>,
    caller: AuthenticatedUser,
    task_id: web::Path<i32>,
    changes: web::Json<TaskChanges>,
) -> Result<impl Responder, AppError> {
    let mut task = owned_task(&state, task_id.into_inner(), caller.id()).await?;
    changes.validate()?;

    task.apply(changes.into_inner());
    let task = state.tasks.save_task(&task).await?;

    Ok(HttpResponse::Ok().json(envelope(task, "Task updated successfully")))
}

/// Flips `completed`.
#[patch("/{id}/toggle")]
pub async fn toggle_task(
    state: web::Data<AppState>,
    caller: AuthenticatedUser,
    task_id: web::Path<i32>,
) -> Result<impl Responder, AppError> {
    let mut task = owned_task(&state, task_id.into_inner(), caller.id()).await?;

    task.toggle();
    let task = state.tasks.save_task(&task).await?;

    Ok(HttpResponse::Ok().json(envelope(task, "Task status toggled successfully")))
}

/// Deletes a task.
///
/// ## Responses:
/// - `204 No Content`: deleted.
/// - `403 Forbidden` / `404 Not Found`: as for `get_task`.
#[delete("/{id}")]
pub async fn delete_task(
    state: web::Data<AppState>,
    caller: AuthenticatedUser,
    task_id: web::Path<i32>,
) -> Result<impl Responder, AppError> {
    let task = owned_task(&state, task_id.into_inner(), caller.id()).await?;

    if !state.tasks.delete_task(task.id).await? {
        return Err(AppError::NotFound("Task not found".into()));
    }
    log::info!("User {} deleted task {}", caller.id(), task.id);

    Ok(HttpResponse::NoContent().finish())
}

/// Asks the suggestion webhook for tasks and stores them for the caller with
/// priority `high`.
///
/// ## Responses:
/// - `200 OK`: `{success: true, message, tasks: [Task]}`.
/// - `422 Unprocessable Entity`: prompt missing or longer than 1000 characters.
/// - `500 Internal Server Error`: the webhook failed or is not configured.
#[post("/suggestions")]
pub async fn suggest_tasks(
    state: web::Data<AppState>,
    caller: AuthenticatedUser,
    request: web::Json<SuggestionRequest>,
) -> Result<impl Responder, AppError> {
    request.validate()?;
    let prompt = request.prompt.as_deref().unwrap_or_default();

    let suggested = match state.suggestions.suggest(prompt).await {
        Ok(suggested) => suggested,
        Err(e) => {
            log::error!("Task suggestions failed for user {}: {}", caller.id(), e);
            return Ok(HttpResponse::InternalServerError().json(json!({
                "success": false,
                "message": "Failed to generate tasks from AI",
            })));
        }
    };

    let new_tasks = suggested
        .into_iter()
        .map(|suggestion: SuggestedTask| suggestion.into_new_task(caller.id()))
        .collect();
    let tasks = state.tasks.create_tasks(new_tasks).await?;
    log::info!("Stored {} suggested task(s) for user {}", tasks.len(), caller.id());

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Tasks generated successfully",
        "tasks": tasks,
    })))
}
