use crate::error::AppError;
use crate::models::Task;

/// Ownership check run before any task is read or changed.
///
/// A missing task is `NotFound`; a task owned by someone else is `Forbidden`.
pub fn ensure_owner(task: Option<Task>, user_id: i32) -> Result<Task, AppError> {
    match task {
        None => Err(AppError::NotFound("Task not found".into())),
        Some(task) if task.user_id != user_id => {
            log::warn!("User {} tried to access task {} of another user", user_id, task.id);
            Err(AppError::Forbidden(
                "You are not authorized to access this task.".into(),
            ))
        }
        Some(task) => Ok(task),
    }
}
