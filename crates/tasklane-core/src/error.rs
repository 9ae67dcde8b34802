use thiserror::Error;
use uuid::Uuid;

/// Failures surfaced by the task store, the view-state and the reminder
/// scheduler.
#[derive(Error, Debug)]
pub enum TaskError {
    /// The draft cannot be saved as-is (empty title).
    #[error("Validation error: {0}")]
    Validation(String),

    /// The durable save did not complete; nothing changed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Task not found: {0}")]
    NotFound(String),

    /// Scheduling or cancelling a notification failed. Logged, never
    /// propagated into a save.
    #[error("Notification error: {0}")]
    Notification(String),
}

impl TaskError {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        TaskError::Validation(msg.into())
    }

    pub fn persistence<S: Into<String>>(msg: S) -> Self {
        TaskError::Persistence(msg.into())
    }

    pub fn not_found(id: Uuid) -> Self {
        TaskError::NotFound(id.to_string())
    }

    pub fn notification<S: Into<String>>(msg: S) -> Self {
        TaskError::Notification(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_failure_kind() {
        let err = TaskError::persistence("disk full");
        assert_eq!(err.to_string(), "Persistence error: disk full");

        let id = Uuid::nil();
        let err = TaskError::not_found(id);
        assert_eq!(err.to_string(), format!("Task not found: {id}"));
    }

    #[test]
    fn converts_into_anyhow() {
        let err: anyhow::Error = TaskError::validation("title is empty").into();
        assert!(err.to_string().contains("Validation error"));
    }
}
