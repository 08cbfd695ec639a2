//! Error types shared across VisaDesk crates.

use thiserror::Error;

/// Convenience alias used by every VisaDesk library crate.
pub type Result<T> = std::result::Result<T, VisaDeskError>;

#[derive(Debug, Error)]
pub enum VisaDeskError {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid time zone: {0}")]
    Timezone(String),

    #[error("invalid reminder time: {0}")]
    ReminderTime(String),

    #[error("schedule error: {0}")]
    Schedule(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("email error: {0}")]
    Email(String),

    #[error("notify error: {0}")]
    Notify(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl VisaDeskError {
    /// True for errors caused by the caller's input rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            VisaDeskError::NotFound(_) | VisaDeskError::Validation(_) | VisaDeskError::ReminderTime(_)
        )
    }
}
